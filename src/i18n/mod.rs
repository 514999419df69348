//! Languages known to a document.
//!
//! # Architecture
//!
//! - `language`: the `Language` value type (a tag plus display metadata)
//! - `registry`: the ordered set of languages a `KeyTable` is aligned to
//! - `validator`: placeholder checks run on every machine translation
//!
//! # Example
//!
//! ```rust,ignore
//! use translate_keys::i18n::{Language, LanguageRegistry};
//!
//! let mut registry = LanguageRegistry::new();
//! let german = registry.add("de")?;
//! assert_eq!(german.name(), "German");
//! ```

mod language;
mod registry;
mod validator;

pub use language::Language;
pub use registry::LanguageRegistry;
pub use validator::{PlaceholderValidator, ValidationReport};
