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
    current_cell: Option<(RowId, Language)>,
    source: Option<Language>,
    policy: TranslationPolicy,
    rows: Option<Vec<RowId>>,
}

/// Translates one source language into every other registered language.
///
/// Each `start()` walks the table from the first row; a stopped pass is not
/// resumed.
#[derive(Clone)]
pub struct BulkTranslationOrchestrator {
    document: Document,
    service: Arc<dyn TranslationService>,
    progress: Arc<Mutex<Progress>>,
}

impl BulkTranslationOrchestrator {
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

    pub fn set_policy(&self, policy: TranslationPolicy) {
        self.lock().policy = policy;
    }

    pub fn source(&self) -> Option<Language> {
        self.lock().source.clone()
    }

    pub fn set_source(&self, tag: &str) -> Result<Language> {
        let language = self.document.require_language(tag)?;
        self.idle()?.source = Some(language.clone());
        Ok(language)
    }

    /// Only translate these rows.
    pub fn restrict_to_rows(&self, rows: Vec<RowId>) -> Result<()> {
        self.idle()?.rows = Some(rows);
        Ok(())
    }

    pub fn all_rows(&self) -> Result<()> {
        self.idle()?.rows = None;
        Ok(())
    }

    pub fn state(&self) -> WorkflowState {
        self.lock().state
    }

    /// The cell being worked on while running.
    pub fn current_cell(&self) -> Option<(RowId, Language)> {
        self.lock().current_cell.clone()
    }

    pub fn start(&self) -> Result<WorkflowHandle> {
        self.start_with_token(CancellationToken::new())
    }

    pub fn start_with_token(&self, token: CancellationToken) -> Result<WorkflowHandle> {
        let mut progress = self.idle()?;
        let source = progress
            .source
            .clone()
            .ok_or(Error::LanguageNotSelected("source"))?;

        let table = self.document.lock_table();
        let source_index = table
            .languages()
            .index_of(source.tag())
            .ok_or_else(|| Error::LanguageNotFound(source.tag().to_string()))?;
        let targets: Vec<(usize, Language)> = table
            .languages()
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != source_index)
            .map(|(index, language)| (index, language.clone()))
            .collect();
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
        let active = self.document.try_begin_workflow(WorkflowKind::Bulk)?;
        drop(table);

        progress.state = WorkflowState::Running;
        progress.current_cell = None;
        let policy = progress.policy;
        drop(progress);

        info!(
            "Translating {} into {} languages over {} rows",
            source.tag(),
            targets.len(),
            rows.len()
        );

        let run = BulkRun {
            document: self.document.clone(),
            service: self.service.clone(),
            progress: RunGuard(self.progress.clone()),
            token: token.clone(),
            source: (source_index, source),
            targets,
            rows,
            policy,
        };
        Ok(WorkflowHandle::spawn(WorkflowKind::Bulk, token, async move {
            let result = run.execute().await;
            let (state, error) = outcome(&result);
            active.finish(state, error, || run.progress.end(state));
            result
        }))
    }

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

struct RunGuard(Arc<Mutex<Progress>>);

impl RunGuard {
    fn end(&self, state: WorkflowState) {
        let mut progress = lock(&self.0);
        progress.state = state;
        progress.current_cell = None;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut progress = lock(&self.0);
        if progress.state == WorkflowState::Running {
            progress.state = WorkflowState::Cancelled;
            progress.current_cell = None;
        }
    }
}

struct BulkRun {
    document: Document,
    service: Arc<dyn TranslationService>,
    progress: RunGuard,
    token: CancellationToken,
    source: (usize, Language),
    targets: Vec<(usize, Language)>,
    rows: Vec<usize>,
    policy: TranslationPolicy,
}

impl BulkRun {
    /// Walk every cell. The caller publishes the final state.
    async fn execute(&self) -> Result<WorkflowReport> {
        let mut report = WorkflowReport::new(WorkflowKind::Bulk);

        for &row in &self.rows {
            report.rows_visited += 1;
            let id = row_id_at(&self.document, row);

            for (target_index, target) in &self.targets {
                if self.token.is_cancelled() {
                    info!("Bulk translation stopped at row {}", row + 1);
                    return Ok(report.finish(WorkflowState::Cancelled));
                }
                lock(&self.progress.0).current_cell = id.map(|id| (id, target.clone()));

                let cell = CellRef {
                    row,
                    source: (self.source.0, &self.source.1),
                    target: (*target_index, target),
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
                    CellOutcome::Failed(e) if self.policy.cancel_on_exception => {
                        error!("Bulk translation aborted: {}", e);
                        return Err(e);
                    }
                    CellOutcome::Failed(e) => warn!("Skipping cell: {}", e),
                }
            }
        }

        info!(
            "Bulk translation from {} completed: {} translated, {} failed",
            self.source.1.tag(),
            report.translated,
            report.failed
        );
        Ok(report.finish(WorkflowState::Completed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentEvent;
    use crate::table::KeyTable;
    use crate::translation::ServiceError;
    use crate::workflow::testing::ScriptedTranslator;
    use tokio::sync::Semaphore;

    fn document() -> Document {
        let mut table = KeyTable::with_languages(&["en", "de", "fr"]).unwrap();
        table.upsert("en", "a", "A").unwrap();
        table.upsert("en", "b", "").unwrap();
        table.upsert("en", "c", "C").unwrap();
        table.upsert("fr", "c", "Cé").unwrap();
        Document::from_table(table)
    }

    fn value(doc: &Document, key: &str, tag: &str) -> String {
        doc.with_table(|t| t.row_by_key(key).unwrap().value(tag).unwrap().value().to_string())
    }

    #[tokio::test]
    async fn test_start_requires_source() {
        let doc = document();
        let bulk = BulkTranslationOrchestrator::new(doc, Arc::new(ScriptedTranslator::echo()));
        assert!(matches!(bulk.start(), Err(Error::LanguageNotSelected("source"))));
        assert!(matches!(bulk.set_source("it"), Err(Error::LanguageNotFound(_))));
    }

    #[tokio::test]
    async fn test_translates_into_every_other_language() {
        let doc = document();
        let service = Arc::new(ScriptedTranslator::echo());
        let bulk = BulkTranslationOrchestrator::new(doc.clone(), service.clone());
        bulk.set_source("en").unwrap();

        let report = bulk.start().unwrap().wait().await.unwrap();

        assert_eq!(report.state, WorkflowState::Completed);
        assert_eq!(report.rows_visited, 3);
        // a -> de, fr; b blank twice; c -> de only (fr filled)
        assert_eq!(report.service_calls, 3);
        assert_eq!(report.skipped_blank_source, 2);
        assert_eq!(report.skipped_filled, 1);
        assert_eq!(value(&doc, "a", "de"), "de:A");
        assert_eq!(value(&doc, "a", "fr"), "fr:A");
        assert_eq!(value(&doc, "b", "de"), "");
        assert_eq!(value(&doc, "c", "de"), "de:C");
        assert_eq!(value(&doc, "c", "fr"), "Cé");
        assert!(service.calls().iter().all(|(_, source, _)| source == "en"));
        assert_eq!(bulk.state(), WorkflowState::Completed);
        assert!(bulk.current_cell().is_none());
    }

    #[tokio::test]
    async fn test_failure_aborts_whole_pass() {
        let doc = document();
        let service = Arc::new(ScriptedTranslator::new(|text, _, target| {
            if target == "fr" {
                Err(ServiceError::msg("unsupported language"))
            } else {
                Ok(format!("{}:{}", target, text))
            }
        }));
        let bulk = BulkTranslationOrchestrator::new(doc.clone(), service.clone());
        bulk.set_source("en").unwrap();

        let err = bulk.start().unwrap().wait().await.unwrap_err();

        assert!(matches!(err, Error::TranslationServiceFailure { ref target_tag, .. } if target_tag == "fr"));
        assert_eq!(bulk.state(), WorkflowState::Cancelled);
        assert_eq!(service.calls().len(), 2);
        assert_eq!(value(&doc, "a", "de"), "de:A");
        assert_eq!(value(&doc, "c", "de"), "");
        assert!(!doc.is_workflow_running());
    }

    #[tokio::test]
    async fn test_failure_skips_cell_without_cancel_on_exception() {
        let doc = document();
        let bulk = BulkTranslationOrchestrator::new(doc.clone(), Arc::new(ScriptedTranslator::failing()))
            .with_policy(TranslationPolicy {
                translate_just_empty: true,
                cancel_on_exception: false,
            });
        bulk.set_source("en").unwrap();

        let report = bulk.start().unwrap().wait().await.unwrap();

        assert_eq!(report.state, WorkflowState::Completed);
        assert_eq!(report.failed, 3);
        assert_eq!(report.translated, 0);
        assert_eq!(value(&doc, "a", "de"), "");
    }

    #[tokio::test]
    async fn test_stop_between_cells() {
        let doc = document();
        let gate = Arc::new(Semaphore::new(0));
        let service = Arc::new(ScriptedTranslator::echo().gated(gate.clone()));
        let entered = service.entered();
        let bulk = BulkTranslationOrchestrator::new(doc.clone(), service.clone());
        bulk.set_source("en").unwrap();

        let handle = bulk.start().unwrap();
        entered.notified().await;
        let (_, language) = bulk.current_cell().unwrap();
        assert_eq!(language.tag(), "de");

        handle.stop();
        gate.add_permits(1);
        let report = handle.wait().await.unwrap();

        assert_eq!(report.state, WorkflowState::Cancelled);
        assert_eq!(service.calls().len(), 1);
        assert_eq!(value(&doc, "a", "de"), "de:A");
        assert_eq!(value(&doc, "a", "fr"), "");

        // A new pass starts from the first row
        gate.add_permits(10);
        bulk.start().unwrap().wait().await.unwrap();
        assert_eq!(service.calls()[1].0, "A");
    }

    #[tokio::test]
    async fn test_one_workflow_per_document() {
        let doc = document();
        let gate = Arc::new(Semaphore::new(0));
        let service = Arc::new(ScriptedTranslator::echo().gated(gate.clone()));
        let bulk = BulkTranslationOrchestrator::new(doc.clone(), service.clone());
        bulk.set_source("en").unwrap();
        let single = crate::workflow::TranslationOrchestrator::new(doc.clone(), service.clone());
        single.set_source("en").unwrap();
        single.set_target("de").unwrap();

        let handle = bulk.start().unwrap();
        assert!(matches!(single.start(), Err(Error::WorkflowAlreadyRunning)));
        assert_eq!(single.state(), WorkflowState::Idle);

        gate.add_permits(10);
        handle.wait().await.unwrap();
        assert!(single.start().is_ok());
    }

    #[tokio::test]
    async fn test_events_for_translated_cells() {
        let doc = document();
        let mut rx = doc.subscribe();
        let bulk = BulkTranslationOrchestrator::new(doc.clone(), Arc::new(ScriptedTranslator::echo()));
        bulk.set_source("en").unwrap();

        bulk.start().unwrap().wait().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&DocumentEvent::WorkflowStarted(WorkflowKind::Bulk)));
        assert_eq!(
            events.last(),
            Some(&DocumentEvent::WorkflowFinished {
                kind: WorkflowKind::Bulk,
                state: WorkflowState::Completed,
                error: None,
            })
        );
        let translated = events
            .iter()
            .filter(|e| matches!(e, DocumentEvent::CellTranslated { .. }))
            .count();
        assert_eq!(translated, 3);
    }
}
