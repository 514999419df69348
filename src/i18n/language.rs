//! Language type: a tag with display metadata.
//!
//! Tags are compared ASCII case-insensitively, so `de-DE` and `de-de` name the
//! same language. The spelling used when the language was created is kept for
//! display and is what the translation service receives.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A language column of the key table.
///
/// Cheap to clone: the tag and name are shared.
#[derive(Clone)]
pub struct Language {
    tag: Arc<str>,
    name: Arc<str>,
}

impl Language {
    /// Create a language from a tag, looking up its display name.
    ///
    /// Unknown tags use the tag itself as their name.
    pub fn new(tag: &str) -> Self {
        let tag = tag.trim();
        let name = display_name(tag).unwrap_or(tag);
        Self {
            tag: Arc::from(tag),
            name: Arc::from(name),
        }
    }

    /// The language tag as it was given (e.g., "en", "pt-BR").
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// English name of the language (e.g., "German").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive tag comparison.
    pub fn matches(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag.trim())
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.tag)
    }
}

impl Eq for Language {}

impl Hash for Language {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.tag.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Language({})", self.tag)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

/// English names for common tags, keyed by primary subtag.
const KNOWN_LANGUAGES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("he", "Hebrew"),
    ("hu", "Hungarian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sv", "Swedish"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("zh", "Chinese"),
];

fn display_name(tag: &str) -> Option<&'static str> {
    let primary = tag.split(['-', '_']).next()?;
    KNOWN_LANGUAGES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(primary))
        .map(|(_, name)| *name)
}
