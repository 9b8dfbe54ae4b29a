//! Execution event callbacks
//!
//! The executor reports progress through [`ExecutionCallback`]. The CLI's
//! terminal output is one; library users can plug in their own. Every
//! method has an empty default so implementors only override what they
//! care about.

use async_trait::async_trait;
use std::sync::Arc;

use crate::report::{ExecutionResult, PlayReport, RunReport};

/// Hooks invoked by the executor while a run progresses.
///
/// Callbacks are shared between host workers, so they may be called
/// concurrently for different hosts.
#[async_trait]
pub trait ExecutionCallback: Send + Sync {
    /// Called when a play starts, with the hosts it selected.
    async fn on_play_start(&self, name: &str, hosts: &[String]) {
        let _ = (name, hosts);
    }

    /// Called when a task (or handler) is about to run on a host.
    async fn on_task_start(&self, name: &str, host: &str) {
        let _ = (name, host);
    }

    /// Called after every recorded result.
    async fn on_task_complete(&self, result: &ExecutionResult) {
        let _ = result;
    }

    /// Called when a host starts running its notified handlers.
    async fn on_handlers_start(&self, host: &str, handlers: &[String]) {
        let _ = (host, handlers);
    }

    /// Called when all hosts of a play are done.
    async fn on_play_end(&self, report: &PlayReport) {
        let _ = report;
    }

    /// Called once the whole run is over.
    async fn on_run_end(&self, report: &RunReport) {
        let _ = report;
    }
}

/// Callback that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCallback;

impl ExecutionCallback for NullCallback {}

/// Fans events out to several callbacks in order.
#[derive(Default, Clone)]
pub struct CompositeCallback {
    callbacks: Vec<Arc<dyn ExecutionCallback>>,
}

impl CompositeCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, callback: Arc<dyn ExecutionCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[async_trait]
impl ExecutionCallback for CompositeCallback {
    async fn on_play_start(&self, name: &str, hosts: &[String]) {
        for cb in &self.callbacks {
            cb.on_play_start(name, hosts).await;
        }
    }

    async fn on_task_start(&self, name: &str, host: &str) {
        for cb in &self.callbacks {
            cb.on_task_start(name, host).await;
        }
    }

    async fn on_task_complete(&self, result: &ExecutionResult) {
        for cb in &self.callbacks {
            cb.on_task_complete(result).await;
        }
    }

    async fn on_handlers_start(&self, host: &str, handlers: &[String]) {
        for cb in &self.callbacks {
            cb.on_handlers_start(host, handlers).await;
        }
    }

    async fn on_play_end(&self, report: &PlayReport) {
        for cb in &self.callbacks {
            cb.on_play_end(report).await;
        }
    }

    async fn on_run_end(&self, report: &RunReport) {
        for cb in &self.callbacks {
            cb.on_run_end(report).await;
        }
    }
}
