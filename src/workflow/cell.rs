use tracing::{debug, warn};

use crate::document::{Document, DocumentEvent};
use crate::error::Error;
use crate::i18n::{Language, PlaceholderValidator};
use crate::table::RowId;
use crate::translation::TranslationService;

use super::{TranslationPolicy, WorkflowReport};

/// What a workflow does with one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellAction {
    /// The target already holds text and only empty cells are translated
    SkipFilled,
    /// Nothing to translate
    SkipBlankSource,
    Translate,
}

impl CellAction {
    /// Blank means empty or whitespace only. The target is checked first.
    pub fn decide(source: &str, target: &str, policy: &TranslationPolicy) -> Self {
        if policy.translate_just_empty && !target.trim().is_empty() {
            CellAction::SkipFilled
        } else if source.trim().is_empty() {
            CellAction::SkipBlankSource
        } else {
            CellAction::Translate
        }
    }
}

/// A cell addressed by position. Positions stay valid while the workflow
/// holds the document's slot, since structural edits are refused.
pub(super) struct CellRef<'a> {
    pub row: usize,
    pub source: (usize, &'a Language),
    pub target: (usize, &'a Language),
}

pub(super) enum CellOutcome {
    Done,
    Failed(Error),
}

struct CellSnapshot {
    id: RowId,
    key: String,
    source: String,
    target: String,
}

/// Row id at a position, or `None` if the row is gone.
pub(super) fn row_id_at(document: &Document, row: usize) -> Option<RowId> {
    document.with_table(|table| table.row_at(row).map(|r| r.id()))
}

/// Apply the cell policy and, if needed, translate and write one cell.
///
/// The table lock is held for the read and for the write only, never across
/// the service call. The result is only written if the target still holds
/// what was read before the call. Counters in `report` are updated as a side
/// effect.
pub(super) async fn translate_cell(
    document: &Document,
    service: &dyn TranslationService,
    cell: CellRef<'_>,
    policy: &TranslationPolicy,
    report: &mut WorkflowReport,
) -> CellOutcome {
    let (source_index, source) = cell.source;
    let (target_index, target) = cell.target;

    let snapshot = document.with_table(|table| {
        let row = table.row_at(cell.row)?;
        Some(CellSnapshot {
            id: row.id(),
            key: row.key().to_string(),
            source: row.value_at(source_index)?.value().to_string(),
            target: row.value_at(target_index)?.value().to_string(),
        })
    });
    let Some(snapshot) = snapshot else {
        report.failed += 1;
        return CellOutcome::Failed(Error::WorkflowAborted(format!(
            "row {} disappeared during the run",
            cell.row
        )));
    };

    match CellAction::decide(&snapshot.source, &snapshot.target, policy) {
        CellAction::SkipFilled => {
            report.skipped_filled += 1;
            return CellOutcome::Done;
        }
        CellAction::SkipBlankSource => {
            report.skipped_blank_source += 1;
            return CellOutcome::Done;
        }
        CellAction::Translate => {}
    }

    report.service_calls += 1;
    debug!(
        "Translating '{}' {} -> {}",
        snapshot.key,
        source.tag(),
        target.tag()
    );

    let translated = match service
        .translate(&snapshot.source, source.tag(), target.tag())
        .await
    {
        Ok(text) => text,
        Err(e) => {
            report.failed += 1;
            return CellOutcome::Failed(Error::TranslationServiceFailure {
                key: snapshot.key,
                source_tag: source.tag().to_string(),
                target_tag: target.tag().to_string(),
                message: format!("{:#}", e),
            });
        }
    };

    let validation = PlaceholderValidator::validate(&snapshot.source, &translated);
    for problem in validation.errors.iter().chain(&validation.warnings) {
        warn!("'{}' ({}): {}", snapshot.key, target.tag(), problem);
    }

    // The cell may have been edited while the call was in flight.
    let mut table = document.lock_table();
    let unchanged = table
        .row_at(cell.row)
        .and_then(|row| row.value_at(target_index))
        .map(|slot| slot.value() == snapshot.target);
    match unchanged {
        Some(true) => {
            table.set_value_at(cell.row, target_index, translated);
        }
        Some(false) => {
            drop(table);
            debug!(
                "'{}' ({}) was edited during translation, keeping the edit",
                snapshot.key,
                target.tag()
            );
            report.skipped_filled += 1;
            return CellOutcome::Done;
        }
        None => {
            drop(table);
            report.failed += 1;
            return CellOutcome::Failed(Error::RowNotFound(snapshot.id));
        }
    }
    drop(table);

    report.translated += 1;
    document.emit(DocumentEvent::CellTranslated {
        row: snapshot.id,
        language: target.clone(),
    });
    CellOutcome::Done
}
