//! The key table: one row per translation key, one value slot per language.
//!
//! Every row holds exactly one `LangValue` per registered language, in
//! registry order. Adding a language appends an empty slot to every row;
//! removing one drops the matching slot and keeps the others in order.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::i18n::{Language, LanguageRegistry};

/// Stable identifier of a row, unique within its table.
///
/// Unlike an index it survives sorting and the removal of other rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RowId(u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value slot: the text of one key in one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangValue {
    language: Language,
    value: String,
}

impl LangValue {
    fn empty(language: Language) -> Self {
        Self {
            language,
            value: String::new(),
        }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    /// Empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// One translation key with its values.
#[derive(Debug, Clone)]
pub struct Row {
    id: RowId,
    key: String,
    values: Vec<LangValue>,
}

impl Row {
    pub fn id(&self) -> RowId {
        self.id
    }

    /// The key; empty until the user names a freshly added row.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn values(&self) -> &[LangValue] {
        &self.values
    }

    /// The slot for a language tag, if that language is registered.
    pub fn value(&self, tag: &str) -> Option<&LangValue> {
        self.values.iter().find(|slot| slot.language.matches(tag))
    }

    /// The slot at a registry index.
    pub fn value_at(&self, index: usize) -> Option<&LangValue> {
        self.values.get(index)
    }
}

/// Rows plus the language registry they are aligned to.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    languages: LanguageRegistry,
    rows: Vec<Row>,
    keys: HashMap<String, RowId>,
    next_id: u64,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the given languages and no rows.
    pub fn with_languages(tags: &[&str]) -> Result<Self> {
        let mut table = Self::new();
        for tag in tags {
            table.add_language(tag)?;
        }
        Ok(table)
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    pub fn contains_language(&self, tag: &str) -> bool {
        self.languages.contains(tag)
    }

    // ==================== Languages ====================

    /// Register a language and give every row an empty slot for it.
    pub fn add_language(&mut self, tag: &str) -> Result<Language> {
        let language = self.languages.add(tag)?;
        for row in &mut self.rows {
            row.values.push(LangValue::empty(language.clone()));
        }
        Ok(language)
    }

    /// Unregister a language and drop its slot from every row.
    pub fn remove_language(&mut self, tag: &str) -> Result<Language> {
        let (index, language) = self.languages.remove(tag)?;
        for row in &mut self.rows {
            row.values.remove(index);
        }
        Ok(language)
    }

    // ==================== Rows ====================

    /// Append an unnamed row with one empty slot per language.
    pub fn add_key(&mut self) -> &Row {
        let id = self.allocate_id();
        let row = Row {
            id,
            key: String::new(),
            values: self.languages.iter().cloned().map(LangValue::empty).collect(),
        };
        self.rows.push(row);
        &self.rows[self.rows.len() - 1]
    }

    pub fn remove_key(&mut self, id: RowId) -> Result<Row> {
        let index = self.index_of(id).ok_or(Error::RowNotFound(id))?;
        let row = self.rows.remove(index);
        if !row.key.is_empty() {
            self.keys.remove(&row.key);
        }
        Ok(row)
    }

    /// Give a row a new key.
    ///
    /// Keys are unique; renaming to the row's current key is a no-op.
    pub fn rename_key(&mut self, id: RowId, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        match self.keys.get(key) {
            Some(owner) if *owner == id => return Ok(()),
            Some(_) => return Err(Error::DuplicateKey(key.to_string())),
            None => {}
        }
        let index = self.index_of(id).ok_or(Error::RowNotFound(id))?;
        let row = &mut self.rows[index];
        let old = std::mem::replace(&mut row.key, key.to_string());
        if !old.is_empty() {
            self.keys.remove(&old);
        }
        self.keys.insert(key.to_string(), id);
        Ok(())
    }

    /// Set the value of `key` in `tag`, creating the row if needed.
    ///
    /// This is the merge primitive for importing resource files one language
    /// at a time: importing the same key from several files yields one row.
    /// An unregistered language is registered first.
    pub fn upsert(&mut self, tag: &str, key: &str, value: &str) -> Result<RowId> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let lang_index = match self.languages.index_of(tag) {
            Some(index) => index,
            None => {
                self.add_language(tag)?;
                self.languages.len() - 1
            }
        };

        let id = match self.keys.get(key) {
            Some(id) => *id,
            None => {
                let id = self.add_key().id;
                if let Some(row) = self.rows.last_mut() {
                    row.key = key.to_string();
                }
                self.keys.insert(key.to_string(), id);
                id
            }
        };

        let index = self.index_of(id).ok_or(Error::RowNotFound(id))?;
        self.rows[index].values[lang_index].set_value(value);
        Ok(id)
    }

    pub fn set_value(&mut self, id: RowId, tag: &str, value: &str) -> Result<()> {
        let lang_index = self
            .languages
            .index_of(tag)
            .ok_or_else(|| Error::LanguageNotFound(tag.to_string()))?;
        let index = self.index_of(id).ok_or(Error::RowNotFound(id))?;
        self.rows[index].values[lang_index].set_value(value);
        Ok(())
    }

    /// Write a cell by position. Used by the workflows, which resolve the
    /// positions once while structural edits are blocked.
    pub(crate) fn set_value_at(&mut self, row: usize, lang: usize, value: String) -> bool {
        match self.rows.get_mut(row).and_then(|r| r.values.get_mut(lang)) {
            Some(slot) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }

    pub fn value(&self, id: RowId, tag: &str) -> Option<&str> {
        self.row(id)
            .and_then(|row| row.value(tag))
            .map(LangValue::value)
    }

    /// Order rows by key. Unnamed rows go last.
    pub fn sort_by_key(&mut self) {
        self.rows
            .sort_by(|a, b| match (a.key.is_empty(), b.key.is_empty()) {
                (false, true) => std::cmp::Ordering::Less,
                (true, false) => std::cmp::Ordering::Greater,
                _ => a.key.cmp(&b.key),
            });
    }

    /// Drop all rows and languages.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.keys.clear();
        self.languages.clear();
    }

    // ==================== Lookup ====================

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn row_by_key(&self, key: &str) -> Option<&Row> {
        self.keys.get(key.trim()).and_then(|id| self.row(*id))
    }

    pub fn row_at(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn index_of(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|row| row.id == id)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All `(key, value)` pairs of one language, for writing it back to a file.
    ///
    /// Empty values are included; the writer decides whether to keep them.
    /// The returned iterator is lazy and can be cloned to restart it.
    pub fn export_for_language(&self, tag: &str) -> Result<ExportIter<'_>> {
        let lang_index = self
            .languages
            .index_of(tag)
            .ok_or_else(|| Error::LanguageNotFound(tag.to_string()))?;
        Ok(ExportIter {
            rows: self.rows.iter(),
            lang_index,
        })
    }

    /// Every row has one slot per language, in registry order.
    pub fn is_aligned(&self) -> bool {
        self.rows.iter().all(|row| {
            row.values.len() == self.languages.len()
                && row
                    .values
                    .iter()
                    .zip(self.languages.iter())
                    .all(|(slot, lang)| slot.language == *lang)
        })
    }

    fn allocate_id(&mut self) -> RowId {
        let id = RowId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Lazy `(key, value)` sequence for one language.
#[derive(Debug, Clone)]
pub struct ExportIter<'a> {
    rows: std::slice::Iter<'a, Row>,
    lang_index: usize,
}

impl<'a> Iterator for ExportIter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = self.rows.next()?;
            // Unnamed rows cannot be written to a resource file.
            if row.key.is_empty() {
                continue;
            }
            let value = row.values.get(self.lang_index).map_or("", LangValue::value);
            return Some((row.key.as_str(), value));
        }
    }
}
