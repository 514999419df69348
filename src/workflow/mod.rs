//! Translation workflows.
//!
//! Two orchestrators walk the table on a background tokio task and call the
//! translation service cell by cell:
//!
//! - [`TranslationOrchestrator`]: one source to one target, resumable
//! - [`BulkTranslationOrchestrator`]: one source to every other language
//!
//! Both share the per-cell policy in [`CellAction`], the [`WorkflowHandle`]
//! returned by `start()` and the single workflow slot of the [`Document`].
//!
//! [`Document`]: crate::document::Document

mod bulk;
mod cell;
mod single;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub use bulk::BulkTranslationOrchestrator;
pub use cell::CellAction;
pub use single::TranslationOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// One source language to one target language
    Single,
    /// One source language to every other language
    Bulk,
}

/// What a workflow does with filled cells and with service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TranslationPolicy {
    /// Skip target cells that already hold non-blank text
    pub translate_just_empty: bool,
    /// Stop the whole pass on the first service failure
    pub cancel_on_exception: bool,
}

impl Default for TranslationPolicy {
    fn default() -> Self {
        Self {
            translate_just_empty: true,
            cancel_on_exception: true,
        }
    }
}

/// Summary of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub kind: WorkflowKind,
    pub state: WorkflowState,
    pub rows_visited: usize,
    pub service_calls: usize,
    pub translated: usize,
    pub skipped_filled: usize,
    pub skipped_blank_source: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowReport {
    pub(crate) fn new(kind: WorkflowKind) -> Self {
        Self {
            kind,
            state: WorkflowState::Running,
            rows_visited: 0,
            service_calls: 0,
            translated: 0,
            skipped_filled: 0,
            skipped_blank_source: 0,
            failed: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn finish(mut self, state: WorkflowState) -> Self {
        self.state = state;
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Final state and failure message of a finished run.
fn outcome(result: &Result<WorkflowReport>) -> (WorkflowState, Option<String>) {
    match result {
        Ok(report) => (report.state, None),
        Err(e) => (WorkflowState::Cancelled, Some(e.to_string())),
    }
}

/// Ownership token of a running workflow.
///
/// Only the holder can stop the run. Dropping the handle detaches the task;
/// the workflow keeps running and still releases the document when done.
#[derive(Debug)]
pub struct WorkflowHandle {
    kind: WorkflowKind,
    token: CancellationToken,
    task: JoinHandle<Result<WorkflowReport>>,
}

impl WorkflowHandle {
    pub(crate) fn spawn<F>(kind: WorkflowKind, token: CancellationToken, run: F) -> Self
    where
        F: Future<Output = Result<WorkflowReport>> + Send + 'static,
    {
        Self {
            kind,
            token,
            task: tokio::spawn(run),
        }
    }

    pub fn kind(&self) -> WorkflowKind {
        self.kind
    }

    /// Request cancellation. The workflow stops at its next row or cell
    /// boundary; a service call already in flight is allowed to finish.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the run to end.
    ///
    /// A service failure that stopped the pass comes back as
    /// `Error::TranslationServiceFailure`.
    pub async fn wait(self) -> Result<WorkflowReport> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::WorkflowAborted(e.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted translation service for the workflow tests.

    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::{Notify, Semaphore};

    use crate::translation::{ServiceError, TranslationService};

    type Responder = dyn Fn(&str, &str, &str) -> Result<String, ServiceError> + Send + Sync;

    pub(crate) struct ScriptedTranslator {
        calls: Mutex<Vec<(String, String, String)>>,
        respond: Box<Responder>,
        gate: Option<Arc<Semaphore>>,
        entered: Arc<Notify>,
    }

    impl ScriptedTranslator {
        pub(crate) fn new(
            respond: impl Fn(&str, &str, &str) -> Result<String, ServiceError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
                gate: None,
                entered: Arc::new(Notify::new()),
            }
        }

        /// `"{target}:{text}"` for every call.
        pub(crate) fn echo() -> Self {
            Self::new(|text, _, target| Ok(format!("{}:{}", target, text)))
        }

        pub(crate) fn failing() -> Self {
            Self::new(|_, _, _| Err(ServiceError::msg("service unavailable")))
        }

        /// Every call waits for a permit on `gate` before answering.
        pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        /// Notified each time a call starts.
        pub(crate) fn entered(&self) -> Arc<Notify> {
            self.entered.clone()
        }

        pub(crate) fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranslationService for ScriptedTranslator {
        async fn translate(
            &self,
            text: &str,
            source_tag: &str,
            target_tag: &str,
        ) -> Result<String, ServiceError> {
            self.calls.lock().unwrap().push((
                text.to_string(),
                source_tag.to_string(),
                target_tag.to_string(),
            ));
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            (self.respond)(text, source_tag, target_tag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = TranslationPolicy::default();
        assert!(policy.translate_just_empty);
        assert!(policy.cancel_on_exception);
    }

    #[test]
    fn test_report_serializes() {
        let report = WorkflowReport::new(WorkflowKind::Bulk).finish(WorkflowState::Completed);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "bulk");
        assert_eq!(json["state"], "completed");
        assert!(json["finished_at"].is_string());
    }

    #[tokio::test]
    async fn test_handle_stop_cancels_token() {
        let token = CancellationToken::new();
        let watched = token.clone();
        let handle = WorkflowHandle::spawn(WorkflowKind::Single, token, async move {
            watched.cancelled().await;
            Ok(WorkflowReport::new(WorkflowKind::Single).finish(WorkflowState::Cancelled))
        });

        handle.stop();
        assert!(handle.cancellation_token().is_cancelled());
        let report = handle.wait().await.unwrap();
        assert_eq!(report.state, WorkflowState::Cancelled);
    }

    #[tokio::test]
    async fn test_handle_reports_panicked_task() {
        let handle = WorkflowHandle::spawn(
            WorkflowKind::Bulk,
            CancellationToken::new(),
            async {
                if true {
                    panic!("boom");
                }
                Ok(WorkflowReport::new(WorkflowKind::Bulk))
            },
        );
        assert!(matches!(handle.wait().await, Err(Error::WorkflowAborted(_))));
    }
}
