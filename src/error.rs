//! Error type shared by the table, the document and the workflows.

use std::path::PathBuf;

use thiserror::Error;

use crate::table::RowId;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Language '{0}' already exists")]
    DuplicateLanguage(String),

    #[error("Unknown language: '{0}'")]
    LanguageNotFound(String),

    #[error("Language tag must not be empty")]
    EmptyLanguageTag,

    #[error("Key '{0}' already exists")]
    DuplicateKey(String),

    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Row {0} does not exist")]
    RowNotFound(RowId),

    #[error("Structural edits are not allowed while a translation workflow is running")]
    StructuralEditWhileRunning,

    #[error("A translation workflow is already running")]
    WorkflowAlreadyRunning,

    #[error("No {0} language selected")]
    LanguageNotSelected(&'static str),

    #[error("Source and target language are both '{0}'")]
    SameSourceAndTarget(String),

    /// The translation service failed and the workflow was told to stop on errors.
    #[error("Translation of '{key}' from {source_tag} to {target_tag} failed: {message}")]
    TranslationServiceFailure {
        key: String,
        source_tag: String,
        target_tag: String,
        message: String,
    },

    #[error("Invalid search pattern: {0}")]
    InvalidSearchPattern(#[from] regex::Error),

    #[error("No language tag found for {}", .0.display())]
    MissingLanguageTag(PathBuf),

    #[error("Resource file {}: {source:#}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Translation workflow aborted: {0}")]
    WorkflowAborted(String),
}

impl Error {
    /// True for errors that come from the external translation service.
    pub fn is_service_failure(&self) -> bool {
        matches!(self, Error::TranslationServiceFailure { .. })
    }
}
