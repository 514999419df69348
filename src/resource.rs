//! Resource file adapters.
//!
//! The table never reads or writes files itself. A `ResourceFileAdapter`
//! turns a file into `(language tag, entries)` on import and writes one
//! language's entries back on save. `JsonResourceAdapter` handles flat JSON
//! objects; other formats plug in through the same trait.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

/// Contents of one resource file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFile {
    /// Language declared by the file, if it declares one
    pub language_tag: Option<String>,
    pub entries: Vec<(String, String)>,
}

pub trait ResourceFileAdapter: Send + Sync {
    fn read(&self, path: &Path) -> Result<ResourceFile>;

    fn write<'a>(
        &self,
        language_tag: &str,
        entries: &mut dyn Iterator<Item = (&'a str, &'a str)>,
        path: &Path,
    ) -> Result<()>;
}

/// Key under which a JSON resource file declares its language.
pub const LANGUAGE_ENTRY: &str = "@language";

/// Flat JSON object: `{ "@language": "de", "menu.file": "Datei", ... }`.
///
/// Without an `@language` entry, a file stem that looks like a language tag
/// (`de.json`, `pt-BR.json`) is used instead.
#[derive(Debug, Clone, Default)]
pub struct JsonResourceAdapter {
    /// Leave empty values out when writing
    pub skip_empty: bool,
}

impl JsonResourceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_empty(mut self, yes: bool) -> Self {
        self.skip_empty = yes;
        self
    }
}

impl ResourceFileAdapter for JsonResourceAdapter {
    fn read(&self, path: &Path) -> Result<ResourceFile> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;
        let Value::Object(object) = value else {
            bail!("{} must contain a JSON object", path.display());
        };

        let mut file = ResourceFile::default();
        for (key, value) in object {
            match (key.as_str(), value) {
                (LANGUAGE_ENTRY, Value::String(tag)) => file.language_tag = Some(tag),
                (_, Value::String(text)) => file.entries.push((key, text)),
                (_, Value::Null) => file.entries.push((key, String::new())),
                (_, other) => bail!(
                    "Value of '{}' in {} is not a string: {}",
                    key,
                    path.display(),
                    other
                ),
            }
        }

        if file.language_tag.is_none() {
            file.language_tag = tag_from_file_stem(path);
        }
        Ok(file)
    }

    fn write<'a>(
        &self,
        language_tag: &str,
        entries: &mut dyn Iterator<Item = (&'a str, &'a str)>,
        path: &Path,
    ) -> Result<()> {
        let mut object = Map::new();
        object.insert(
            LANGUAGE_ENTRY.to_string(),
            Value::String(language_tag.to_string()),
        );
        for (key, value) in entries {
            if self.skip_empty && value.is_empty() {
                continue;
            }
            object.insert(key.to_string(), Value::String(value.to_string()));
        }

        let json = serde_json::to_string_pretty(&Value::Object(object))
            .context("Failed to serialize resource file")?;
        fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// `de.json` → `de`, `pt-BR.json` → `pt-BR`, `strings.json` → none.
fn tag_from_file_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts = stem.split(['-', '_']);
    let primary = parts.next()?;
    let primary_ok = (2..=3).contains(&primary.len())
        && primary.chars().all(|c| c.is_ascii_lowercase());
    let rest_ok = parts.all(|p| (2..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()));
    (primary_ok && rest_ok).then(|| stem.to_string())
}
