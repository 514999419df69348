//! A loaded document: the key table, its file bindings and the workflow slot.
//!
//! `Document` is a cheap, clonable handle. The GUI thread performs edits
//! through it while at most one translation workflow runs in the background.
//! While that workflow is active every structural edit (languages, keys,
//! ordering, import, clear) fails with `StructuralEditWhileRunning`; cell
//! edits and reads stay available.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::i18n::Language;
use crate::resource::ResourceFileAdapter;
use crate::search::SearchQuery;
use crate::table::{KeyTable, RowId};
use crate::workflow::{WorkflowKind, WorkflowState};

const EVENT_CAPACITY: usize = 256;

/// Change notifications for whoever presents the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    LanguageAdded(Language),
    LanguageRemoved(Language),
    KeyAdded(RowId),
    KeyRemoved(RowId),
    KeyRenamed(RowId),
    KeysSorted,
    Cleared,
    /// The presenter should bring this row into view.
    ScrollIntoView(RowId),
    CellTranslated { row: RowId, language: Language },
    WorkflowStarted(WorkflowKind),
    /// `error` carries the failure that stopped the workflow, if any.
    WorkflowFinished {
        kind: WorkflowKind,
        state: WorkflowState,
        error: Option<String>,
    },
}

/// The file a language was loaded from and is saved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBinding {
    pub language: Language,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    /// Return the first write error.
    #[default]
    StopOnError,
    /// Try every file and report the failures.
    ContinueOnError,
}

#[derive(Debug, Default)]
pub struct SaveReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<Error>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
struct Inner {
    table: Mutex<KeyTable>,
    files: Mutex<Vec<FileBinding>>,
    active: Mutex<Option<WorkflowKind>>,
    events: broadcast::Sender<DocumentEvent>,
}

#[derive(Debug, Clone)]
pub struct Document {
    inner: Arc<Inner>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::from_table(KeyTable::new())
    }

    pub fn from_table(table: KeyTable) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(table),
                files: Mutex::new(Vec::new()),
                active: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.inner.events.subscribe()
    }

    // ==================== Workflow slot ====================

    /// Kind of the workflow currently running, if any.
    pub fn active_workflow(&self) -> Option<WorkflowKind> {
        *self.active_slot()
    }

    pub fn is_workflow_running(&self) -> bool {
        self.active_workflow().is_some()
    }

    /// Claim the single workflow slot. The slot is released when the returned
    /// guard is dropped, whether the workflow completed, failed or panicked.
    ///
    /// Callers that resolve row or language indices must hold the table lock
    /// while claiming, so no structural edit slips in between.
    pub(crate) fn try_begin_workflow(&self, kind: WorkflowKind) -> Result<ActiveWorkflow> {
        let mut slot = self.active_slot();
        if slot.is_some() {
            return Err(Error::WorkflowAlreadyRunning);
        }
        *slot = Some(kind);
        drop(slot);
        self.emit(DocumentEvent::WorkflowStarted(kind));
        Ok(ActiveWorkflow {
            document: self.clone(),
            kind,
        })
    }

    // ==================== Structural edits ====================

    pub fn add_language(&self, tag: &str) -> Result<Language> {
        let mut table = self.edit_table()?;
        let language = table.add_language(tag)?;
        drop(table);
        info!("Added language {}", language.tag());
        self.emit(DocumentEvent::LanguageAdded(language.clone()));
        Ok(language)
    }

    /// Remove a language, its column and its file binding.
    pub fn remove_language(&self, tag: &str) -> Result<Language> {
        let mut table = self.edit_table()?;
        let language = table.remove_language(tag)?;
        drop(table);
        self.files().retain(|binding| binding.language != language);
        info!("Removed language {}", language.tag());
        self.emit(DocumentEvent::LanguageRemoved(language.clone()));
        Ok(language)
    }

    /// Append an unnamed row and ask the presenter to show it.
    pub fn add_key(&self) -> Result<RowId> {
        let mut table = self.edit_table()?;
        let id = table.add_key().id();
        drop(table);
        self.emit(DocumentEvent::KeyAdded(id));
        self.emit(DocumentEvent::ScrollIntoView(id));
        Ok(id)
    }

    pub fn remove_key(&self, id: RowId) -> Result<()> {
        let mut table = self.edit_table()?;
        table.remove_key(id)?;
        drop(table);
        self.emit(DocumentEvent::KeyRemoved(id));
        Ok(())
    }

    pub fn rename_key(&self, id: RowId, key: &str) -> Result<()> {
        self.edit_table()?.rename_key(id, key)?;
        self.emit(DocumentEvent::KeyRenamed(id));
        Ok(())
    }

    pub fn upsert(&self, tag: &str, key: &str, value: &str) -> Result<RowId> {
        let mut table = self.edit_table()?;
        let had_language = table.contains_language(tag);
        let existed = table.row_by_key(key).is_some();
        let id = table.upsert(tag, key, value)?;
        let language = table.languages().find(tag).cloned();
        drop(table);

        if let (false, Some(language)) = (had_language, language) {
            self.emit(DocumentEvent::LanguageAdded(language));
        }
        if !existed {
            self.emit(DocumentEvent::KeyAdded(id));
        }
        Ok(id)
    }

    pub fn sort_by_key(&self) -> Result<()> {
        self.edit_table()?.sort_by_key();
        self.emit(DocumentEvent::KeysSorted);
        Ok(())
    }

    /// Drop every row, language and file binding.
    pub fn clear(&self) -> Result<()> {
        self.edit_table()?.clear();
        self.files().clear();
        info!("Document cleared");
        self.emit(DocumentEvent::Cleared);
        Ok(())
    }

    // ==================== Cell edits and reads ====================

    /// Edit one cell. Allowed while a workflow runs.
    pub fn set_value(&self, id: RowId, tag: &str, value: &str) -> Result<()> {
        self.lock_table().set_value(id, tag, value)
    }

    pub fn value(&self, id: RowId, tag: &str) -> Option<String> {
        self.lock_table().value(id, tag).map(str::to_string)
    }

    /// Run a closure with read access to the table.
    pub fn with_table<R>(&self, f: impl FnOnce(&KeyTable) -> R) -> R {
        f(&self.lock_table())
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> KeyTable {
        self.lock_table().clone()
    }

    pub fn languages(&self) -> Vec<Language> {
        self.lock_table().languages().iter().cloned().collect()
    }

    pub fn find_language(&self, tag: &str) -> Option<Language> {
        self.lock_table().languages().find(tag).cloned()
    }

    /// Like `find_language`, failing with `LanguageNotFound`.
    pub fn require_language(&self, tag: &str) -> Result<Language> {
        self.lock_table().languages().require(tag).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.lock_table().len()
    }

    /// Owned `(key, value)` pairs of one language.
    pub fn export(&self, tag: &str) -> Result<Vec<(String, String)>> {
        let table = self.lock_table();
        let entries = table
            .export_for_language(tag)?
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Ok(entries)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<RowId>> {
        self.lock_table().search(query)
    }

    /// Search and, when exactly one row matches, ask the presenter to show it.
    pub fn search_and_focus(&self, query: &SearchQuery) -> Result<Vec<RowId>> {
        let matches = self.search(query)?;
        if let [single] = matches.as_slice() {
            self.emit(DocumentEvent::ScrollIntoView(*single));
        }
        Ok(matches)
    }

    // ==================== Files ====================

    pub fn bound_files(&self) -> Vec<FileBinding> {
        self.files().clone()
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.files().iter().any(|binding| binding.path == path)
    }

    /// Save `tag` to `path` from now on, registering the language if needed.
    pub fn bind_file(&self, tag: &str, path: &Path) -> Result<Language> {
        let mut table = self.edit_table()?;
        let (language, added) = match table.languages().find(tag).cloned() {
            Some(language) => (language, false),
            None => (table.add_language(tag)?, true),
        };
        drop(table);

        let mut files = self.files();
        files.retain(|binding| binding.language != language);
        files.push(FileBinding {
            language: language.clone(),
            path: path.to_path_buf(),
        });
        drop(files);

        if added {
            self.emit(DocumentEvent::LanguageAdded(language.clone()));
        }
        Ok(language)
    }

    /// Import one resource file as a new language.
    ///
    /// Returns `Ok(None)` when the file is already loaded. `tag_override`
    /// replaces the tag the file declares.
    pub fn import_file(
        &self,
        adapter: &dyn ResourceFileAdapter,
        path: &Path,
        tag_override: Option<&str>,
    ) -> Result<Option<Language>> {
        if self.contains_file(path) {
            debug!("{} is already loaded, skipping", path.display());
            return Ok(None);
        }

        let file = adapter.read(path).map_err(|source| Error::Resource {
            path: path.to_path_buf(),
            source,
        })?;

        let tag = tag_override
            .map(str::to_string)
            .or(file.language_tag)
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .ok_or_else(|| Error::MissingLanguageTag(path.to_path_buf()))?;

        let mut table = self.edit_table()?;
        if table.contains_language(&tag) {
            return Err(Error::DuplicateLanguage(tag));
        }
        let language = table.add_language(&tag)?;
        let mut imported = 0;
        for (key, value) in &file.entries {
            if key.trim().is_empty() {
                warn!("Skipping entry with an empty key in {}", path.display());
                continue;
            }
            table.upsert(&tag, key, value)?;
            imported += 1;
        }
        drop(table);

        self.files().push(FileBinding {
            language: language.clone(),
            path: path.to_path_buf(),
        });
        info!(
            "Imported {} entries for {} from {}",
            imported,
            language.tag(),
            path.display()
        );
        self.emit(DocumentEvent::LanguageAdded(language.clone()));
        Ok(Some(language))
    }

    /// Import several files and sort the rows by key afterwards.
    pub fn import_files(
        &self,
        adapter: &dyn ResourceFileAdapter,
        paths: &[PathBuf],
    ) -> Result<Vec<Language>> {
        let mut languages = Vec::new();
        for path in paths {
            if let Some(language) = self.import_file(adapter, path, None)? {
                languages.push(language);
            }
        }
        self.sort_by_key()?;
        Ok(languages)
    }

    /// Write every bound language back to its file.
    pub fn save_all(&self, adapter: &dyn ResourceFileAdapter, policy: SavePolicy) -> Result<SaveReport> {
        let mut report = SaveReport::default();

        for binding in self.bound_files() {
            let result = self.export(binding.language.tag()).and_then(|entries| {
                let mut iter = entries.iter().map(|(k, v)| (k.as_str(), v.as_str()));
                adapter
                    .write(binding.language.tag(), &mut iter, &binding.path)
                    .map_err(|source| Error::Resource {
                        path: binding.path.clone(),
                        source,
                    })
            });

            match result {
                Ok(()) => {
                    debug!("Saved {} to {}", binding.language.tag(), binding.path.display());
                    report.written.push(binding.path);
                }
                Err(e) if policy == SavePolicy::StopOnError => return Err(e),
                Err(e) => {
                    warn!("Could not save {}: {}", binding.path.display(), e);
                    report.failed.push(e);
                }
            }
        }

        info!(
            "Saved {} files ({} failed)",
            report.written.len(),
            report.failed.len()
        );
        Ok(report)
    }

    // ==================== Internals ====================

    pub(crate) fn lock_table(&self) -> MutexGuard<'_, KeyTable> {
        self.inner.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Table guard for a structural edit; fails while a workflow runs.
    fn edit_table(&self) -> Result<MutexGuard<'_, KeyTable>> {
        let table = self.lock_table();
        if self.is_workflow_running() {
            return Err(Error::StructuralEditWhileRunning);
        }
        Ok(table)
    }

    fn files(&self) -> MutexGuard<'_, Vec<FileBinding>> {
        self.inner.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_slot(&self) -> MutexGuard<'_, Option<WorkflowKind>> {
        self.inner.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: DocumentEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

/// Ownership of the document's workflow slot.
#[derive(Debug)]
pub(crate) struct ActiveWorkflow {
    document: Document,
    kind: WorkflowKind,
}

impl ActiveWorkflow {
    /// Release the slot, run `settle` and announce how the workflow ended.
    ///
    /// `settle` publishes the final state of the orchestrator. It runs after
    /// the slot is free, so anyone who sees that state can start again.
    pub(crate) fn finish(self, state: WorkflowState, error: Option<String>, settle: impl FnOnce()) {
        let document = self.document.clone();
        let kind = self.kind;
        drop(self);
        settle();
        document.emit(DocumentEvent::WorkflowFinished { kind, state, error });
    }
}

impl Drop for ActiveWorkflow {
    fn drop(&mut self) {
        *self.document.active_slot() = None;
    }
}
