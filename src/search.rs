//! Row search over keys and values.

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::table::{KeyTable, Row, RowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Substring,
    Regex,
}

/// What to look for and where.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub pattern: String,
    pub mode: SearchMode,
    pub case_sensitive: bool,
    pub include_keys: bool,
    pub include_values: bool,
}

impl SearchQuery {
    /// Case-insensitive substring search over keys and values.
    pub fn text(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            mode: SearchMode::Substring,
            case_sensitive: false,
            include_keys: true,
            include_values: true,
        }
    }

    pub fn regex(pattern: &str) -> Self {
        Self {
            mode: SearchMode::Regex,
            ..Self::text(pattern)
        }
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.include_keys = true;
        self.include_values = false;
        self
    }

    pub fn values_only(mut self) -> Self {
        self.include_keys = false;
        self.include_values = true;
        self
    }

    fn compile(&self) -> Result<Matcher> {
        let source = match self.mode {
            SearchMode::Substring => regex::escape(&self.pattern),
            SearchMode::Regex => self.pattern.clone(),
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(!self.case_sensitive)
            .build()?;
        Ok(Matcher {
            regex,
            keys: self.include_keys,
            values: self.include_values,
        })
    }
}

struct Matcher {
    regex: Regex,
    keys: bool,
    values: bool,
}

impl Matcher {
    fn is_match(&self, row: &Row) -> bool {
        (self.keys && self.regex.is_match(row.key()))
            || (self.values && row.values().iter().any(|v| self.regex.is_match(v.value())))
    }
}

impl KeyTable {
    /// Rows matching the query, in table order.
    ///
    /// An empty pattern matches nothing.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<RowId>> {
        if query.pattern.is_empty() {
            return Ok(Vec::new());
        }
        let matcher = query.compile()?;
        Ok(self
            .rows()
            .iter()
            .filter(|row| matcher.is_match(row))
            .map(Row::id)
            .collect())
    }
}
