//! Step mode: confirm each task before it runs
//!
//! The executor asks a [`StepGate`] before every task on every host. Prompts
//! from concurrently running hosts are serialised so only one question is on
//! screen at a time, and a queued prompt is dropped once another host has
//! answered `continue` or `abort`.

use async_trait::async_trait;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Answer to a step prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAnswer {
    /// Run this task
    Yes,
    /// Skip this task, it is recorded as skipped
    No,
    /// Run this task and stop asking
    Continue,
    /// Stop the whole run as if interrupted
    Abort,
}

/// Decides whether a task may proceed in step mode
#[async_trait]
pub trait StepGate: Send + Sync {
    async fn confirm(&self, host: &str, task: &str) -> StepAnswer;
}

/// Gate that approves everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl StepGate for AutoApprove {
    async fn confirm(&self, _host: &str, _task: &str) -> StepAnswer {
        StepAnswer::Yes
    }
}

/// Interactive gate that asks on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptGate;

impl PromptGate {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepGate for PromptGate {
    async fn confirm(&self, host: &str, task: &str) -> StepAnswer {
        let prompt = format!("Perform task: {} on {}?", task, host);

        let choice = tokio::task::spawn_blocking(move || {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .items(&["(y)es", "(n)o", "(c)ontinue", "(a)bort"])
                .default(0)
                .interact_opt()
        })
        .await;

        match choice {
            Ok(Ok(Some(0))) => StepAnswer::Yes,
            Ok(Ok(Some(1))) => StepAnswer::No,
            Ok(Ok(Some(2))) => StepAnswer::Continue,
            Ok(Ok(_)) => StepAnswer::Abort,
            Ok(Err(e)) => {
                warn!(error = %e, "Step prompt failed, aborting");
                StepAnswer::Abort
            }
            Err(e) => {
                warn!(error = %e, "Step prompt task failed, aborting");
                StepAnswer::Abort
            }
        }
    }
}

/// Step-mode state shared by all workers of a run
pub struct StepControl {
    gate: Arc<dyn StepGate>,
    asking: AtomicBool,
    aborted: AtomicBool,
    turn: Mutex<()>,
}

impl StepControl {
    pub fn new(gate: Arc<dyn StepGate>, enabled: bool) -> Self {
        Self {
            gate,
            asking: AtomicBool::new(enabled),
            aborted: AtomicBool::new(false),
            turn: Mutex::new(()),
        }
    }

    pub fn is_asking(&self) -> bool {
        self.asking.load(Ordering::SeqCst)
    }

    /// Ask the gate if step mode is still on. `Continue` switches it off for
    /// every host and `Abort` answers every later question.
    pub async fn check(&self, host: &str, task: &str) -> StepAnswer {
        if let Some(answer) = self.settled() {
            return answer;
        }

        let _turn = self.turn.lock().await;
        // Another host may have answered while this one waited its turn.
        if let Some(answer) = self.settled() {
            return answer;
        }

        let answer = self.gate.confirm(host, task).await;
        debug!(host = %host, task = %task, answer = ?answer, "Step answer");
        match answer {
            StepAnswer::Continue => self.asking.store(false, Ordering::SeqCst),
            StepAnswer::Abort => self.aborted.store(true, Ordering::SeqCst),
            StepAnswer::Yes | StepAnswer::No => {}
        }
        answer
    }

    fn settled(&self) -> Option<StepAnswer> {
        if self.aborted.load(Ordering::SeqCst) {
            Some(StepAnswer::Abort)
        } else if !self.is_asking() {
            Some(StepAnswer::Yes)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for StepControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepControl")
            .field("asking", &self.is_asking())
            .field("aborted", &self.aborted.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;

    struct Scripted {
        answers: SyncMutex<VecDeque<StepAnswer>>,
        asked: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl StepGate for Scripted {
        async fn confirm(&self, host: &str, task: &str) -> StepAnswer {
            self.asked.lock().push(format!("{}:{}", host, task));
            tokio::task::yield_now().await;
            self.answers.lock().pop_front().unwrap_or(StepAnswer::Yes)
        }
    }

    fn scripted(answers: impl IntoIterator<Item = StepAnswer>) -> Arc<Scripted> {
        Arc::new(Scripted {
            answers: SyncMutex::new(answers.into_iter().collect()),
            asked: SyncMutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_disabled_never_asks() {
        let gate = Arc::new(Scripted {
            answers: SyncMutex::new(VecDeque::from([StepAnswer::Abort])),
            asked: SyncMutex::new(Vec::new()),
        });
        let control = StepControl::new(gate.clone(), false);
        assert_eq!(control.check("web1", "t").await, StepAnswer::Yes);
        assert!(gate.asked.lock().is_empty());
    }

    #[tokio::test]
    async fn test_continue_stops_asking() {
        let gate = Arc::new(Scripted {
            answers: SyncMutex::new(VecDeque::from([StepAnswer::No, StepAnswer::Continue])),
            asked: SyncMutex::new(Vec::new()),
        });
        let control = StepControl::new(gate.clone(), true);

        assert_eq!(control.check("web1", "a").await, StepAnswer::No);
        assert_eq!(control.check("web1", "b").await, StepAnswer::Continue);
        assert_eq!(control.check("web2", "c").await, StepAnswer::Yes);
        assert!(!control.is_asking());
        assert_eq!(*gate.asked.lock(), vec!["web1:a", "web1:b"]);
    }

    #[tokio::test]
    async fn test_queued_prompt_dropped_after_continue() {
        let gate = scripted([StepAnswer::Continue]);
        let control = StepControl::new(gate.clone(), true);

        let (first, second) = tokio::join!(control.check("web1", "a"), control.check("web2", "a"));
        assert_eq!(first, StepAnswer::Continue);
        assert_eq!(second, StepAnswer::Yes);
        assert_eq!(*gate.asked.lock(), vec!["web1:a"]);
    }

    #[tokio::test]
    async fn test_abort_answers_queued_and_later_prompts() {
        let gate = scripted([StepAnswer::Abort, StepAnswer::Yes]);
        let control = StepControl::new(gate.clone(), true);

        let (first, second) = tokio::join!(control.check("web1", "a"), control.check("web2", "a"));
        assert_eq!(first, StepAnswer::Abort);
        assert_eq!(second, StepAnswer::Abort);
        assert_eq!(control.check("web3", "b").await, StepAnswer::Abort);
        assert_eq!(*gate.asked.lock(), vec!["web1:a"]);
    }

    #[tokio::test]
    async fn test_auto_approve() {
        assert_eq!(AutoApprove.confirm("h", "t").await, StepAnswer::Yes);
    }
}
