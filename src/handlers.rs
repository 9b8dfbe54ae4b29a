//! Handler notification dispatch
//!
//! Handlers are deferred tasks. A task that reports `changed` notifies
//! handlers by name or by one of their `listen` topics; once the host's
//! regular tasks are done, every notified handler runs exactly once, in the
//! order the handlers were defined. A handler that changes something can in
//! turn notify other handlers. Those run too, but a handler that already ran
//! is never run a second time on the same host.
//!
//! ```
//! use converge::handlers::HandlerDispatcher;
//! use converge::playbook::{Handler, Task};
//!
//! let handlers = vec![
//!     Handler::new(Task::new("restart nginx", "command")),
//!     Handler::new(Task::new("reload haproxy", "command")).listen("web changed"),
//! ];
//! let mut dispatcher = HandlerDispatcher::new(&handlers);
//! dispatcher.notify("web changed");
//! dispatcher.notify("restart nginx");
//! dispatcher.notify("restart nginx");
//!
//! let order: Vec<&str> = std::iter::from_fn(|| dispatcher.next_pending())
//!     .map(|(_, h)| h.name())
//!     .collect();
//! assert_eq!(order, ["restart nginx", "reload haproxy"]);
//! ```

use tracing::{debug, warn};

use crate::playbook::Handler;

/// Per-host notification state for one play's handlers
#[derive(Debug)]
pub struct HandlerDispatcher<'a> {
    handlers: &'a [Handler],
    notified: Vec<bool>,
    ran: Vec<bool>,
}

impl<'a> HandlerDispatcher<'a> {
    pub fn new(handlers: &'a [Handler]) -> Self {
        Self {
            handlers,
            notified: vec![false; handlers.len()],
            ran: vec![false; handlers.len()],
        }
    }

    /// Record a notification. Returns how many handlers it reached.
    pub fn notify(&mut self, target: &str) -> usize {
        let mut reached = 0;
        for (idx, handler) in self.handlers.iter().enumerate() {
            if handler.answers_to(target) {
                reached += 1;
                if self.ran[idx] {
                    debug!(handler = %handler.name(), "Handler already ran, ignoring notification");
                } else if !self.notified[idx] {
                    debug!(handler = %handler.name(), notification = %target, "Handler notified");
                    self.notified[idx] = true;
                }
            }
        }
        if reached == 0 {
            warn!(notification = %target, "Notification matched no handler");
        }
        reached
    }

    /// Record every notification a task emitted
    pub fn notify_all<S: AsRef<str>>(&mut self, targets: &[S]) {
        for target in targets {
            self.notify(target.as_ref());
        }
    }

    /// The first notified handler, in definition order, that has not run yet,
    /// with its definition index. It is marked as run.
    pub fn next_pending(&mut self) -> Option<(usize, &'a Handler)> {
        let idx = (0..self.handlers.len()).find(|&i| self.notified[i] && !self.ran[i])?;
        self.ran[idx] = true;
        Some((idx, &self.handlers[idx]))
    }

    /// Names of handlers notified but not yet run
    pub fn pending_names(&self) -> Vec<String> {
        self.handlers
            .iter()
            .enumerate()
            .filter(|(i, _)| self.notified[*i] && !self.ran[*i])
            .map(|(_, h)| h.name().to_string())
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        (0..self.handlers.len()).any(|i| self.notified[i] && !self.ran[i])
    }

    /// How many handlers have been handed out to run
    pub fn run_count(&self) -> usize {
        self.ran.iter().filter(|r| **r).count()
    }
}
