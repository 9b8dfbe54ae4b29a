//! Tag selection for `--tags` / `--skip-tags`.
//!
//! A task is kept when its tag set intersects the include list (if one was
//! given) and does not intersect the skip list. Play tags are inherited by
//! every task of the play before filtering.
//!
//! # Special Tags
//!
//! - `always`: runs whatever `--tags` says, unless `always` (or one of the
//!   task's other tags) is skipped
//! - `never`: runs only when one of its tags is explicitly requested
//! - `tagged` / `untagged`: in `--tags`, match tasks with / without tags
//! - `all`: in `--tags`, matches every task not tagged `never`
//!
//! # Example
//!
//! ```rust
//! use converge::tags::TagFilter;
//!
//! let filter = TagFilter::new()
//!     .with_tags(vec!["deploy".to_string()])
//!     .with_skip_tags(vec!["debug".to_string()]);
//!
//! assert!(filter.should_run(&["deploy".to_string(), "web".to_string()]));
//! assert!(!filter.should_run(&["deploy".to_string(), "debug".to_string()]));
//! ```

mod filter;

pub use filter::TagFilter;

/// Special tag constants
pub mod special {
    /// Tag that causes a task to always run regardless of tag selection
    pub const ALWAYS: &str = "always";

    /// Tag that causes a task to never run unless explicitly selected
    pub const NEVER: &str = "never";

    /// Matches any task that has at least one tag
    pub const TAGGED: &str = "tagged";

    /// Matches any task with no tags
    pub const UNTAGGED: &str = "untagged";

    /// Matches all tasks
    pub const ALL: &str = "all";
}

/// Combine inherited (play) tags with a task's own tags, keeping first
/// occurrence order and dropping duplicates.
pub fn inherit(parent: &[String], own: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(parent.len() + own.len());
    for tag in parent.iter().chain(own) {
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    out
}

/// Split comma-separated CLI tag lists (`-t web,db -t lb`)
pub fn parse_tag_list<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.as_ref().split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
