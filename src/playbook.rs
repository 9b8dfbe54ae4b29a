//! Play and task declarations.
//!
//! A playbook is a YAML list of plays. Each play binds a host selector to an
//! ordered task list and an optional handler list:
//!
//! ```yaml
//! - name: web tier
//!   hosts: nginx
//!   tags: [web]
//!   vars:
//!     motd: managed
//!   tasks:
//!     - name: write motd
//!       copy:
//!         dest: /etc/motd
//!         content: "hello"
//!       notify: reload nginx
//!   handlers:
//!     - name: reload nginx
//!       command:
//!         cmd: nginx -s reload
//! ```
//!
//! Any task key that is not a known keyword names the module to run.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use crate::executor::condition::{Condition, ConditionError};
use crate::tags::parse_tag_list;

/// Errors raised while reading or validating a playbook
#[derive(Debug, Error)]
pub enum PlaybookError {
    #[error("failed to read playbook '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse playbook{}: {source}", display_path(.path))]
    Yaml {
        path: Option<PathBuf>,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("play '{play}', task '{task}': {message}")]
    InvalidTask {
        play: String,
        task: String,
        message: String,
    },

    #[error("play '{play}': {message}")]
    InvalidPlay { play: String, message: String },

    #[error("play '{play}', task '{task}': {source}")]
    Condition {
        play: String,
        task: String,
        #[source]
        source: ConditionError,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" '{}'", p.display()))
        .unwrap_or_default()
}

/// Result type for playbook operations
pub type PlaybookResult<T> = Result<T, PlaybookError>;

/// Helper function to deserialize flexible booleans (yes/no/true/false/1/0)
fn deserialize_flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = JsonValue::deserialize(deserializer)?;
    match &value {
        JsonValue::Bool(b) => Ok(*b),
        JsonValue::String(s) => match s.to_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(true),
            "no" | "false" | "off" | "0" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("invalid boolean string: {}", s))),
        },
        JsonValue::Number(n) => n
            .as_i64()
            .map(|i| i != 0)
            .ok_or_else(|| D::Error::custom("invalid boolean number")),
        JsonValue::Null => Ok(false),
        _ => Err(D::Error::custom(format!(
            "invalid boolean value: {:?}",
            value
        ))),
    }
}

/// A scalar or a list of scalars
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum StringOrList {
    #[default]
    None,
    Single(String),
    List(Vec<String>),
}

impl StringOrList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StringOrList::None => vec![],
            StringOrList::Single(s) => vec![s.clone()],
            StringOrList::List(list) => list.clone(),
        }
    }
}

/// `when` can be a string, boolean, or list (a conjunction)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhenCondition {
    Bool(bool),
    Single(String),
    List(Vec<String>),
}

impl WhenCondition {
    fn sources(&self) -> Vec<String> {
        match self {
            WhenCondition::Bool(b) => vec![b.to_string()],
            WhenCondition::Single(s) => vec![s.clone()],
            WhenCondition::List(list) => list.clone(),
        }
    }
}

/// Raw play record as it appears in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub hosts: String,
    #[serde(default)]
    pub tags: StringOrList,
    #[serde(default)]
    pub vars: IndexMap<String, JsonValue>,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
    #[serde(default)]
    pub handlers: Vec<TaskDefinition>,
}

/// Raw task (or handler) record as it appears in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub when: Option<WhenCondition>,
    #[serde(default)]
    pub notify: StringOrList,
    #[serde(default)]
    pub listen: StringOrList,
    #[serde(default)]
    pub tags: StringOrList,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub delay: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_flexible_bool")]
    pub ignore_errors: bool,
    #[serde(default, deserialize_with = "deserialize_flexible_bool")]
    pub ignore_unreachable: bool,
    /// Module name and args (catch-all for `module: args`)
    #[serde(flatten)]
    pub module: IndexMap<String, JsonValue>,
}

/// A complete playbook containing multiple plays
#[derive(Debug, Clone, Default)]
pub struct Playbook {
    /// Source file
    pub path: Option<PathBuf>,
    /// Plays in declaration order
    pub plays: Vec<Play>,
}

impl Playbook {
    /// Load a playbook from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> PlaybookResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PlaybookError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, Some(path.to_path_buf()))
    }

    /// Parse a playbook from YAML content
    pub fn parse(content: &str, path: Option<PathBuf>) -> PlaybookResult<Self> {
        let definitions: Vec<PlayDefinition> =
            serde_yaml::from_str(content).map_err(|source| PlaybookError::Yaml {
                path: path.clone(),
                source,
            })?;

        let plays = definitions
            .into_iter()
            .map(Play::from_definition)
            .collect::<PlaybookResult<Vec<_>>>()?;

        debug!(plays = plays.len(), "Playbook parsed");
        Ok(Self { path, plays })
    }

    /// Total number of tasks across all plays
    pub fn task_count(&self) -> usize {
        self.plays.iter().map(|p| p.tasks.len()).sum()
    }
}

/// A play: a host selector bound to an ordered task list
#[derive(Debug, Clone)]
pub struct Play {
    pub name: String,
    /// Host selector expression
    pub hosts: String,
    /// Tags inherited by every task
    pub tags: Vec<String>,
    pub vars: IndexMap<String, JsonValue>,
    pub tasks: Vec<Task>,
    pub handlers: Vec<Handler>,
}

impl Play {
    /// Create a new empty play
    pub fn new(name: impl Into<String>, hosts: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hosts: hosts.into(),
            tags: Vec::new(),
            vars: IndexMap::new(),
            tasks: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Builder: add a task
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Builder: add a handler
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Builder: set a play variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Builder: set play tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    fn from_definition(def: PlayDefinition) -> PlaybookResult<Self> {
        let name = def.name.clone().unwrap_or_else(|| def.hosts.clone());
        if def.hosts.trim().is_empty() {
            return Err(PlaybookError::InvalidPlay {
                play: name,
                message: "'hosts' must not be empty".to_string(),
            });
        }

        let tasks = def
            .tasks
            .into_iter()
            .map(|t| parse_task(&name, t, false).map(|(task, _)| task))
            .collect::<PlaybookResult<Vec<_>>>()?;

        let handlers = def
            .handlers
            .into_iter()
            .map(|t| parse_task(&name, t, true).map(|(task, listen)| Handler { task, listen }))
            .collect::<PlaybookResult<Vec<_>>>()?;

        let play = Self {
            name,
            hosts: def.hosts,
            tags: parse_tag_list(&def.tags.to_vec()),
            vars: def.vars,
            tasks,
            handlers,
        };
        play.check_notify_targets()?;
        Ok(play)
    }

    /// Every `notify` must name a handler or one of its `listen` aliases.
    fn check_notify_targets(&self) -> PlaybookResult<()> {
        let notifiers = self.tasks.iter().chain(self.handlers.iter().map(|h| &h.task));
        for task in notifiers {
            for target in &task.notify {
                if !self.handlers.iter().any(|h| h.answers_to(target)) {
                    return Err(PlaybookError::InvalidTask {
                        play: self.name.clone(),
                        task: task.name.clone(),
                        message: format!("notifies unknown handler '{}'", target),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A single task: a module reference plus execution keywords
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub module: String,
    pub args: IndexMap<String, JsonValue>,
    pub tags: Vec<String>,
    /// Conjunction of predicates; empty means unconditional
    pub when: Vec<Condition>,
    /// Handler names (or listen aliases) to notify when this task changes
    pub notify: Vec<String>,
    /// Extra attempts after the first failure
    pub retries: u32,
    /// Seconds between attempts; the configured default applies when unset
    pub delay: Option<u64>,
    pub ignore_errors: bool,
    pub ignore_unreachable: bool,
}

impl Task {
    /// Create a new task
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            args: IndexMap::new(),
            tags: Vec::new(),
            when: Vec::new(),
            notify: Vec::new(),
            retries: 0,
            delay: None,
            ignore_errors: false,
            ignore_unreachable: false,
        }
    }

    /// Builder: add a module argument
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Builder: add a condition
    pub fn when(mut self, condition: Condition) -> Self {
        self.when.push(condition);
        self
    }

    /// Builder: add a handler notification
    pub fn notify(mut self, handler: impl Into<String>) -> Self {
        self.notify.push(handler.into());
        self
    }

    /// Builder: add tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Builder: retry a failing task
    pub fn retries(mut self, retries: u32, delay: u64) -> Self {
        self.retries = retries;
        self.delay = Some(delay);
        self
    }

    /// Builder: set ignore_errors
    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Builder: set ignore_unreachable
    pub fn ignore_unreachable(mut self, ignore: bool) -> Self {
        self.ignore_unreachable = ignore;
        self
    }
}

/// A deferred task that runs only when notified
#[derive(Debug, Clone)]
pub struct Handler {
    pub task: Task,
    /// Additional topic names this handler answers to
    pub listen: Vec<String>,
}

impl Handler {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            listen: Vec::new(),
        }
    }

    /// Builder: add a listen alias
    pub fn listen(mut self, topic: impl Into<String>) -> Self {
        self.listen.push(topic.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.task.name
    }

    /// Whether a notification for `target` reaches this handler
    pub fn answers_to(&self, target: &str) -> bool {
        self.task.name == target || self.listen.iter().any(|l| l == target)
    }
}

fn parse_task(
    play: &str,
    def: TaskDefinition,
    is_handler: bool,
) -> PlaybookResult<(Task, Vec<String>)> {
    let label = def.name.clone().unwrap_or_else(|| {
        def.module
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| "<unnamed>".to_string())
    });
    let invalid = |message: String| PlaybookError::InvalidTask {
        play: play.to_string(),
        task: label.clone(),
        message,
    };

    let mut modules = def.module.into_iter();
    let (module, raw_args) = modules
        .next()
        .ok_or_else(|| invalid("no module specified".to_string()))?;
    if let Some((extra, _)) = modules.next() {
        return Err(invalid(format!(
            "conflicting module keys '{}' and '{}'",
            module, extra
        )));
    }

    let args = match raw_args {
        JsonValue::Object(map) => map.into_iter().collect(),
        JsonValue::Null => IndexMap::new(),
        JsonValue::String(s) => {
            // Free-form arguments, as in `command: uptime`
            let mut args = IndexMap::new();
            args.insert("_raw_params".to_string(), JsonValue::String(s));
            args
        }
        other => return Err(invalid(format!("module arguments must be a mapping, got {}", other))),
    };

    let listen = def.listen.to_vec();
    if !is_handler && !listen.is_empty() {
        return Err(invalid("'listen' is only valid on handlers".to_string()));
    }

    let when = def
        .when
        .map(|w| w.sources())
        .unwrap_or_default()
        .iter()
        .map(|source| Condition::parse(source))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| PlaybookError::Condition {
            play: play.to_string(),
            task: label.clone(),
            source,
        })?;

    let task = Task {
        name: label,
        module,
        args,
        tags: parse_tag_list(&def.tags.to_vec()),
        when,
        notify: def.notify.to_vec(),
        retries: def.retries.unwrap_or(0),
        delay: def.delay,
        ignore_errors: def.ignore_errors,
        ignore_unreachable: def.ignore_unreachable,
    };
    Ok((task, listen))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"
- name: web tier
  hosts: nginx
  tags: web
  vars:
    motd: managed
  tasks:
    - name: write motd
      copy:
        dest: /etc/motd
        content: hello
      notify: reload nginx
      tags: [config]
    - name: check uptime
      command: uptime
      when:
        - env == 'prod'
        - port > 1024
      retries: 3
      delay: 0
      ignore_errors: yes
  handlers:
    - name: reload nginx
      listen: web restarts
      command:
        cmd: nginx -s reload
"#;

    #[test]
    fn test_parse_playbook() {
        let pb = Playbook::parse(SITE, None).unwrap();
        assert_eq!(pb.plays.len(), 1);
        assert_eq!(pb.task_count(), 2);

        let play = &pb.plays[0];
        assert_eq!(play.name, "web tier");
        assert_eq!(play.hosts, "nginx");
        assert_eq!(play.tags, vec!["web"]);
        assert_eq!(play.vars.get("motd"), Some(&JsonValue::from("managed")));

        let copy = &play.tasks[0];
        assert_eq!(copy.module, "copy");
        assert_eq!(copy.args.get("dest"), Some(&JsonValue::from("/etc/motd")));
        assert_eq!(copy.notify, vec!["reload nginx"]);
        assert_eq!(copy.tags, vec!["config"]);

        let cmd = &play.tasks[1];
        assert_eq!(cmd.args.get("_raw_params"), Some(&JsonValue::from("uptime")));
        assert_eq!(cmd.when.len(), 2);
        assert_eq!(cmd.retries, 3);
        assert_eq!(cmd.delay, Some(0));
        assert!(cmd.ignore_errors);

        let handler = &play.handlers[0];
        assert!(handler.answers_to("reload nginx"));
        assert!(handler.answers_to("web restarts"));
        assert!(!handler.answers_to("restart apache"));
    }

    #[test]
    fn test_task_name_defaults_to_module() {
        let pb = Playbook::parse("- hosts: all\n  tasks:\n    - debug:\n        msg: hi\n", None)
            .unwrap();
        assert_eq!(pb.plays[0].name, "all");
        assert_eq!(pb.plays[0].tasks[0].name, "debug");
    }

    #[test]
    fn test_conflicting_modules_rejected() {
        let err = Playbook::parse(
            "- hosts: all\n  tasks:\n    - name: two\n      debug: {}\n      command: ls\n",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PlaybookError::InvalidTask { .. }));
    }

    #[test]
    fn test_missing_module_rejected() {
        let err = Playbook::parse("- hosts: all\n  tasks:\n    - name: nothing\n", None).unwrap_err();
        assert!(err.to_string().contains("no module specified"));
    }

    #[test]
    fn test_malformed_condition_rejected() {
        let err = Playbook::parse(
            "- hosts: all\n  tasks:\n    - debug: {}\n      when: port ==\n",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PlaybookError::Condition { .. }));
    }

    #[test]
    fn test_unknown_notify_target_rejected() {
        let err = Playbook::parse(
            "- hosts: all\n  tasks:\n    - debug: {}\n      notify: ghost\n",
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown handler 'ghost'"));
    }

    #[test]
    fn test_listen_only_on_handlers() {
        let err = Playbook::parse(
            "- hosts: all\n  tasks:\n    - debug: {}\n      listen: x\n",
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("only valid on handlers"));
    }

    #[test]
    fn test_unknown_play_key_rejected() {
        assert!(matches!(
            Playbook::parse("- hosts: all\n  rolez: []\n", None),
            Err(PlaybookError::Yaml { .. })
        ));
    }
}
