//! Multi-language translation key tables with cancellable machine translation.
//!
//! A [`Document`] holds a [`KeyTable`] of rows (one per key) with one value
//! per registered language, the files those languages were loaded from, and a
//! single slot for a running translation workflow. The workflows in
//! [`workflow`] call a [`TranslationService`] on a background task and can be
//! stopped between rows or cells.

pub mod config;
pub mod document;
pub mod error;
pub mod i18n;
pub mod resource;
pub mod retry;
pub mod search;
pub mod table;
pub mod translation;
pub mod workflow;

pub use document::{Document, DocumentEvent, FileBinding, SavePolicy, SaveReport};
pub use error::{Error, Result};
pub use i18n::{Language, LanguageRegistry};
pub use resource::{JsonResourceAdapter, ResourceFile, ResourceFileAdapter};
pub use search::{SearchMode, SearchQuery};
pub use table::{KeyTable, LangValue, Row, RowId};
pub use translation::{OpenAiTranslator, ServiceError, TranslationService};
pub use workflow::{
    BulkTranslationOrchestrator, CellAction, TranslationOrchestrator, TranslationPolicy,
    WorkflowHandle, WorkflowKind, WorkflowReport, WorkflowState,
};
