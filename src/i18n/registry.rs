//! Language registry: the ordered set of languages of one document.
//!
//! The position of a language in the registry is the position of its value
//! slot in every row of the bound `KeyTable`. The registry itself does not
//! know about rows; `KeyTable::add_language` and `KeyTable::remove_language`
//! keep both in step.

use crate::error::{Error, Result};
use crate::i18n::Language;

/// Ordered, duplicate-free list of languages.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    languages: Vec<Language>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a language at the tail.
    ///
    /// # Errors
    /// * `EmptyLanguageTag` if the tag is blank
    /// * `DuplicateLanguage` if a language with the same tag (ignoring case) exists
    pub fn add(&mut self, tag: &str) -> Result<Language> {
        self.add_language(Language::new(tag))
    }

    /// Append an already constructed language at the tail.
    pub fn add_language(&mut self, language: Language) -> Result<Language> {
        if language.tag().is_empty() {
            return Err(Error::EmptyLanguageTag);
        }
        if self.contains(language.tag()) {
            return Err(Error::DuplicateLanguage(language.tag().to_string()));
        }
        self.languages.push(language.clone());
        Ok(language)
    }

    /// Remove a language, returning the index it occupied.
    pub fn remove(&mut self, tag: &str) -> Result<(usize, Language)> {
        let index = self
            .index_of(tag)
            .ok_or_else(|| Error::LanguageNotFound(tag.to_string()))?;
        let language = self.languages.remove(index);
        Ok((index, language))
    }

    pub fn find(&self, tag: &str) -> Option<&Language> {
        self.languages.iter().find(|lang| lang.matches(tag))
    }

    /// Look up a language, failing with `LanguageNotFound`.
    pub fn require(&self, tag: &str) -> Result<&Language> {
        self.find(tag)
            .ok_or_else(|| Error::LanguageNotFound(tag.to_string()))
    }

    pub fn index_of(&self, tag: &str) -> Option<usize> {
        self.languages.iter().position(|lang| lang.matches(tag))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.index_of(tag).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&Language> {
        self.languages.get(index)
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Language> {
        self.languages.iter()
    }

    /// Every language except `source`, in registry order.
    ///
    /// These are the possible targets when translating from `source`.
    pub fn others(&self, source: &Language) -> Vec<Language> {
        self.languages
            .iter()
            .filter(|lang| *lang != source)
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.languages.clear();
    }
}
