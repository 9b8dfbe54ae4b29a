//! Tag filter implementation for task selection.

use std::collections::HashSet;

use super::special;

/// A filter for selecting tasks based on tags.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    /// Tags to include (tasks must match at least one)
    include_tags: HashSet<String>,
    /// Tags to skip (tasks matching any are excluded)
    skip_tags: HashSet<String>,
}

impl TagFilter {
    /// Create a new empty tag filter (matches all tasks)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add include tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.include_tags.extend(tags.into_iter().map(|t| t.to_lowercase()));
        self
    }

    /// Add skip tags
    pub fn with_skip_tags(mut self, tags: Vec<String>) -> Self {
        self.skip_tags.extend(tags.into_iter().map(|t| t.to_lowercase()));
        self
    }

    /// Check if any filters are active
    pub fn is_active(&self) -> bool {
        !self.include_tags.is_empty() || !self.skip_tags.is_empty()
    }

    /// Check if a task with the given tags should run
    ///
    /// # Logic
    ///
    /// 1. If any task tag is in skip_tags, skip it
    /// 2. If the task has `always`, run it
    /// 3. If the task has `never`, run it only if one of its tags is included
    /// 4. With no include_tags, run it
    /// 5. Otherwise run it iff a task tag (or `all`/`tagged`/`untagged`) matches
    pub fn should_run(&self, task_tags: &[String]) -> bool {
        let tags: HashSet<String> = task_tags.iter().map(|t| t.to_lowercase()).collect();

        if !self.skip_tags.is_disjoint(&tags) {
            return false;
        }

        if tags.contains(special::ALWAYS) {
            return true;
        }

        let explicitly_included = !self.include_tags.is_disjoint(&tags);

        if tags.contains(special::NEVER) {
            return explicitly_included;
        }

        if self.include_tags.is_empty() || explicitly_included {
            return true;
        }

        self.include_tags.contains(special::ALL)
            || (self.include_tags.contains(special::TAGGED) && !tags.is_empty())
            || (self.include_tags.contains(special::UNTAGGED) && tags.is_empty())
    }
}
