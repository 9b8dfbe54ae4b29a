//! Property-based tests using proptest.
//!
//! Tag selection, host selectors, handler dispatch and the condition
//! parser are exercised with generated inputs.

use std::collections::HashSet;

use converge::executor::Condition;
use converge::handlers::HandlerDispatcher;
use converge::inventory::Inventory;
use converge::playbook::{Handler, Task};
use converge::tags::{inherit, parse_tag_list, TagFilter};
use proptest::collection::vec;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Small tag vocabulary so generated sets overlap often
fn tag() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("web".to_string()),
        Just("db".to_string()),
        Just("deploy".to_string()),
        Just("config".to_string()),
        Just("always".to_string()),
        Just("never".to_string()),
    ]
}

fn tag_set() -> impl Strategy<Value = Vec<String>> {
    vec(tag(), 0..4)
}

fn plain_tag_set() -> impl Strategy<Value = Vec<String>> {
    vec(
        prop_oneof![
            Just("web".to_string()),
            Just("db".to_string()),
            Just("deploy".to_string()),
        ],
        0..3,
    )
}

fn disjoint(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&String> = a.iter().collect();
    b.iter().all(|t| !a.contains(t))
}

// ============================================================================
// Tag filter
// ============================================================================

proptest! {
    #[test]
    fn prop_skip_always_wins(task in tag_set(), include in tag_set(), skip in tag_set()) {
        let filter = TagFilter::new().with_tags(include).with_skip_tags(skip.clone());
        if !disjoint(&task, &skip) {
            prop_assert!(!filter.should_run(&task));
        }
    }

    #[test]
    fn prop_no_filter_runs_everything_but_never(task in tag_set()) {
        let filter = TagFilter::new();
        let expected = !task.iter().any(|t| t == "never") || task.iter().any(|t| t == "always");
        prop_assert_eq!(filter.should_run(&task), expected);
    }

    #[test]
    fn prop_plain_tags_select_by_intersection(task in plain_tag_set(), include in plain_tag_set()) {
        prop_assume!(!include.is_empty());
        let filter = TagFilter::new().with_tags(include.clone());
        prop_assert_eq!(filter.should_run(&task), !disjoint(&task, &include));
    }

    #[test]
    fn prop_always_runs_unless_skipped(extra in plain_tag_set(), include in plain_tag_set()) {
        let mut task = extra.clone();
        task.push("always".to_string());
        let filter = TagFilter::new().with_tags(include);
        prop_assert!(filter.should_run(&task));
    }

    #[test]
    fn prop_matching_ignores_case(task in plain_tag_set(), include in plain_tag_set()) {
        let upper: Vec<String> = include.iter().map(|t| t.to_uppercase()).collect();
        let lower = TagFilter::new().with_tags(include);
        let shouting = TagFilter::new().with_tags(upper);
        prop_assert_eq!(lower.should_run(&task), shouting.should_run(&task));
    }

    #[test]
    fn prop_inherit_keeps_every_tag_once(play in tag_set(), own in tag_set()) {
        let merged = inherit(&play, &own);
        let unique: HashSet<&String> = merged.iter().collect();
        prop_assert_eq!(unique.len(), merged.len());
        for t in play.iter().chain(&own) {
            prop_assert!(merged.contains(t));
        }
    }

    #[test]
    fn prop_tag_list_split_round_trips(tags in vec("[a-z]{1,8}", 0..5)) {
        let joined = tags.join(",");
        prop_assert_eq!(parse_tag_list(&[joined]), tags);
    }
}

// ============================================================================
// Host selectors
// ============================================================================

fn numbered_inventory(size: usize) -> Inventory {
    let mut ini = String::from("[pool]\n");
    for i in 0..size {
        ini.push_str(&format!("node{:02}\n", i));
    }
    Inventory::from_ini_str(&ini).unwrap()
}

proptest! {
    #[test]
    fn prop_subscript_index_matches_position(size in 1usize..20, index in 0usize..20) {
        let inv = numbered_inventory(size);
        let result = inv.select(&format!("pool[{}]", index));
        if index < size {
            let hosts = result.unwrap();
            prop_assert_eq!(hosts.len(), 1);
            prop_assert_eq!(&hosts[0].name, &format!("node{:02}", index));
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn prop_range_is_inclusive_slice(size in 1usize..20, a in 0usize..20, b in 0usize..20) {
        let (start, end) = (a.min(b), a.max(b));
        prop_assume!(end < size);
        let inv = numbered_inventory(size);
        let names: Vec<String> = inv
            .select(&format!("pool[{}:{}]", start, end))
            .unwrap()
            .into_iter()
            .map(|h| h.name.clone())
            .collect();
        let expected: Vec<String> = (start..=end).map(|i| format!("node{:02}", i)).collect();
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn prop_exclusion_partitions(size in 1usize..20, index in 0usize..20) {
        prop_assume!(index < size);
        let inv = numbered_inventory(size);
        let picked = inv.select(&format!("pool[{}]", index)).unwrap().len();
        let rest = inv.select(&format!("pool:!pool[{}]", index)).unwrap().len();
        prop_assert_eq!(picked + rest, size);
    }
}

// ============================================================================
// Handler dispatch
// ============================================================================

proptest! {
    #[test]
    fn prop_each_handler_runs_at_most_once(notifications in vec(0usize..5, 0..30)) {
        let handlers: Vec<Handler> = (0..5)
            .map(|i| Handler::new(Task::new(format!("h{}", i), "command")))
            .collect();
        let mut dispatcher = HandlerDispatcher::new(&handlers);
        for n in &notifications {
            dispatcher.notify(&format!("h{}", n));
        }

        let order: Vec<usize> = std::iter::from_fn(|| dispatcher.next_pending())
            .map(|(idx, _)| idx)
            .collect();

        let mut expected: Vec<usize> = notifications.clone();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(order, expected);
    }
}

// ============================================================================
// Condition parser
// ============================================================================

proptest! {
    #[test]
    fn prop_condition_parse_never_panics(source in "\\PC{0,40}") {
        let _ = Condition::parse(&source);
    }

    #[test]
    fn prop_integer_comparison_agrees_with_rust(a in -1000i64..1000, b in -1000i64..1000) {
        let mut vars = converge::vars::HostVars::new();
        vars.set("a", a.into(), converge::vars::VarPrecedence::Host);
        vars.set("b", b.into(), converge::vars::VarPrecedence::Host);

        let check = |expr: &str| Condition::parse(expr).unwrap().evaluate(&vars).unwrap();
        prop_assert_eq!(check("a < b"), a < b);
        prop_assert_eq!(check("a == b"), a == b);
        prop_assert_eq!(check("a >= b and not a == b"), a > b);
    }
}
