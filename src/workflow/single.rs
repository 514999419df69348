use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::document::Document;
use crate::error::{Error, Result};
use crate::i18n::Language;
use crate::table::RowId;
use crate::translation::TranslationService;

use super::cell::{row_id_at, translate_cell, CellOutcome, CellRef};
use super::{
    outcome, TranslationPolicy, WorkflowHandle, WorkflowKind, WorkflowReport, WorkflowState,
};

#[derive(Debug, Default)]
struct Progress {
    state: WorkflowState,
    /// Last row handled, `None` before the first one
    position: Option<usize>,
    /// The row at `position` failed and must be tried again
    retry_pending: bool,
    current_row: Option<RowId>,
    source: Option<Language>,
    target: Option<Language>,
    policy: TranslationPolicy,
    /// Restrict the pass to these rows
    rows: Option<Vec<RowId>>,
}

impl Progress {
    fn reset(&mut self) {
        self.position = None;
        self.retry_pending = false;
        self.current_row = None;
    }
}

/// Translates one source language into one target language, row by row.
///
/// The pass can be stopped and started again: it resumes after the last row
/// it handled. When a service failure stopped the pass, the failing row is
/// tried again.
#[derive(Clone)]
pub struct TranslationOrchestrator {
    document: Document,
    service: Arc<dyn TranslationService>,
    progress: Arc<Mutex<Progress>>,
}

impl TranslationOrchestrator {
    pub fn new(document: Document, service: Arc<dyn TranslationService>) -> Self {
        Self {
            document,
            service,
            progress: Arc::new(Mutex::new(Progress::default())),
        }
    }

    pub fn with_policy(self, policy: TranslationPolicy) -> Self {
        self.lock().policy = policy;
        self
    }

    pub fn policy(&self) -> TranslationPolicy {
        self.lock().policy
    }

    /// Takes effect at the next `start()`.
    pub fn set_policy(&self, policy: TranslationPolicy) {
        self.lock().policy = policy;
    }

    pub fn source(&self) -> Option<Language> {
        self.lock().source.clone()
    }

    pub fn target(&self) -> Option<Language> {
        self.lock().target.clone()
    }

    /// Select the source language. A different selection resets the position.
    pub fn set_source(&self, tag: &str) -> Result<Language> {
        let language = self.document.require_language(tag)?;
        let mut progress = self.idle()?;
        if progress.source.as_ref() != Some(&language) {
            progress.source = Some(language.clone());
            progress.reset();
        }
        Ok(language)
    }

    /// Select the target language. A different selection resets the position.
    pub fn set_target(&self, tag: &str) -> Result<Language> {
        let language = self.document.require_language(tag)?;
        let mut progress = self.idle()?;
        if progress.target.as_ref() != Some(&language) {
            progress.target = Some(language.clone());
            progress.reset();
        }
        Ok(language)
    }

    /// Languages that can be picked as target: everything but the source.
    pub fn target_languages(&self) -> Vec<Language> {
        let source = self.source();
        self.document.with_table(|table| match &source {
            Some(source) => table.languages().others(source),
            None => table.languages().iter().cloned().collect(),
        })
    }

    /// Only translate these rows, e.g. the single key the user picked.
    pub fn restrict_to_rows(&self, rows: Vec<RowId>) -> Result<()> {
        let mut progress = self.idle()?;
        progress.rows = Some(rows);
        progress.reset();
        Ok(())
    }

    /// Translate every row again.
    pub fn all_rows(&self) -> Result<()> {
        let mut progress = self.idle()?;
        progress.rows = None;
        progress.reset();
        Ok(())
    }

    pub fn state(&self) -> WorkflowState {
        self.lock().state
    }

    /// Index of the last row handled, `None` before the first one.
    pub fn position(&self) -> Option<usize> {
        self.lock().position
    }

    /// One-based row number for display, 0 before the first row.
    pub fn display_position(&self) -> usize {
        self.position().map_or(0, |p| p + 1)
    }

    pub fn current_row(&self) -> Option<RowId> {
        self.lock().current_row
    }

    /// Start over from the first row. Cell values are left alone.
    pub fn reset(&self) -> Result<()> {
        self.idle()?.reset();
        Ok(())
    }

    pub fn start(&self) -> Result<WorkflowHandle> {
        self.start_with_token(CancellationToken::new())
    }

    /// Start with a caller-provided cancellation token.
    pub fn start_with_token(&self, token: CancellationToken) -> Result<WorkflowHandle> {
        let mut progress = self.idle()?;
        let source = progress
            .source
            .clone()
            .ok_or(Error::LanguageNotSelected("source"))?;
        let target = progress
            .target
            .clone()
            .ok_or(Error::LanguageNotSelected("target"))?;
        if source == target {
            return Err(Error::SameSourceAndTarget(source.tag().to_string()));
        }

        // Resolve positions and claim the slot under one table lock.
        let table = self.document.lock_table();
        let source_index = table
            .languages()
            .index_of(source.tag())
            .ok_or_else(|| Error::LanguageNotFound(source.tag().to_string()))?;
        let target_index = table
            .languages()
            .index_of(target.tag())
            .ok_or_else(|| Error::LanguageNotFound(target.tag().to_string()))?;
        let rows: Vec<usize> = match &progress.rows {
            Some(ids) => {
                let mut indices: Vec<usize> =
                    ids.iter().filter_map(|id| table.index_of(*id)).collect();
                indices.sort_unstable();
                indices.dedup();
                indices
            }
            None => (0..table.len()).collect(),
        };
        let active = self.document.try_begin_workflow(WorkflowKind::Single)?;
        drop(table);

        let at_end = progress.position.is_some_and(|p| p + 1 >= rows.len());
        if at_end && !progress.retry_pending {
            progress.reset();
        }
        let first = match (progress.position, progress.retry_pending) {
            (Some(p), true) => p,
            (Some(p), false) => p + 1,
            (None, _) => 0,
        };
        progress.retry_pending = false;
        progress.current_row = None;
        progress.state = WorkflowState::Running;
        let policy = progress.policy;
        drop(progress);

        info!(
            "Translating {} -> {} from row {} of {}",
            source.tag(),
            target.tag(),
            first + 1,
            rows.len()
        );

        let run = SingleRun {
            document: self.document.clone(),
            service: self.service.clone(),
            progress: RunGuard(self.progress.clone()),
            token: token.clone(),
            source: (source_index, source),
            target: (target_index, target),
            rows,
            policy,
        };
        Ok(WorkflowHandle::spawn(
            WorkflowKind::Single,
            token,
            async move {
                let result = run.execute(first).await;
                let (state, error) = outcome(&result);
                active.finish(state, error, || run.progress.end(state));
                result
            },
        ))
    }

    /// Progress guard, failing while this orchestrator runs.
    fn idle(&self) -> Result<MutexGuard<'_, Progress>> {
        let progress = self.lock();
        if progress.state == WorkflowState::Running {
            return Err(Error::WorkflowAlreadyRunning);
        }
        Ok(progress)
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        lock(&self.progress)
    }
}

fn lock(progress: &Mutex<Progress>) -> MutexGuard<'_, Progress> {
    progress.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Leaves the orchestrator startable even if the run panics.
struct RunGuard(Arc<Mutex<Progress>>);

impl RunGuard {
    fn end(&self, state: WorkflowState) {
        lock(&self.0).state = state;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut progress = lock(&self.0);
        if progress.state == WorkflowState::Running {
            progress.state = WorkflowState::Cancelled;
            progress.current_row = None;
        }
    }
}

struct SingleRun {
    document: Document,
    service: Arc<dyn TranslationService>,
    progress: RunGuard,
    token: CancellationToken,
    source: (usize, Language),
    target: (usize, Language),
    rows: Vec<usize>,
    policy: TranslationPolicy,
}

impl SingleRun {
    /// Walk the rows from `first`. The caller publishes the final state.
    async fn execute(&self, first: usize) -> Result<WorkflowReport> {
        let mut report = WorkflowReport::new(WorkflowKind::Single);
        let mut index = first;

        let failure = loop {
            if index >= self.rows.len() {
                break None;
            }
            if self.token.is_cancelled() {
                info!("Translation stopped after row {}", index);
                return Ok(report.finish(WorkflowState::Cancelled));
            }

            let row = self.rows[index];
            {
                let mut progress = lock(&self.progress.0);
                progress.position = Some(index);
                progress.current_row = row_id_at(&self.document, row);
            }
            report.rows_visited += 1;

            let cell = CellRef {
                row,
                source: (self.source.0, &self.source.1),
                target: (self.target.0, &self.target.1),
            };
            match translate_cell(
                &self.document,
                self.service.as_ref(),
                cell,
                &self.policy,
                &mut report,
            )
            .await
            {
                CellOutcome::Done => {}
                CellOutcome::Failed(e) if self.policy.cancel_on_exception => break Some(e),
                CellOutcome::Failed(e) => warn!("Skipping row {}: {}", index + 1, e),
            }
            index += 1;
        };

        let mut progress = lock(&self.progress.0);
        match failure {
            Some(e) => {
                error!("Translation stopped at row {}: {}", index + 1, e);
                progress.retry_pending = true;
                Err(e)
            }
            None => {
                progress.position = self.rows.len().checked_sub(1);
                progress.current_row = None;
                info!(
                    "Translation {} -> {} completed: {} translated, {} failed",
                    self.source.1.tag(),
                    self.target.1.tag(),
                    report.translated,
                    report.failed
                );
                Ok(report.finish(WorkflowState::Completed))
            }
        }
    }
}
