//! Translation quality validation.
//!
//! Resource strings carry placeholders that the application substitutes at
//! runtime (`{0}`, `{name}`, `%s`, `%1$d`) and sometimes inline markup
//! (`<b>`, `</b>`). A machine translation that drops or renames them breaks
//! the string at runtime, so every translated cell is checked here.

use regex::Regex;
use std::sync::OnceLock;

/// Validation report containing errors and warnings about a translation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// Critical problems (the translation is unusable as is)
    pub errors: Vec<String>,

    /// Non-critical issues worth a look
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// No errors and no warnings
    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}

/// Validator for placeholder and markup preservation.
pub struct PlaceholderValidator;

static BRACE_REGEX: OnceLock<Regex> = OnceLock::new();
static PRINTF_REGEX: OnceLock<Regex> = OnceLock::new();
static TAG_REGEX: OnceLock<Regex> = OnceLock::new();

impl PlaceholderValidator {
    /// Compare a source string with its translation.
    ///
    /// Placeholders may be reordered by the translation; only the multiset is
    /// compared.
    pub fn validate(original: &str, translated: &str) -> ValidationReport {
        let mut report = ValidationReport::new();

        if translated.trim().is_empty() && !original.trim().is_empty() {
            report
                .errors
                .push("Translation is empty but the original is not".to_string());
            return report;
        }

        let orig_braces = Self::extract_brace_placeholders(original);
        let trans_braces = Self::extract_brace_placeholders(translated);
        if orig_braces != trans_braces {
            report.errors.push(format!(
                "Placeholder mismatch: original has {:?}, translation has {:?}",
                orig_braces, trans_braces
            ));
        }

        let orig_printf = Self::extract_printf_placeholders(original);
        let trans_printf = Self::extract_printf_placeholders(translated);
        if orig_printf != trans_printf {
            report.errors.push(format!(
                "Format specifier mismatch: original has {:?}, translation has {:?}",
                orig_printf, trans_printf
            ));
        }

        let orig_tags = Self::extract_tags(original);
        let trans_tags = Self::extract_tags(translated);
        if orig_tags != trans_tags {
            report.warnings.push(format!(
                "Markup mismatch: original has {} tags, translation has {}",
                orig_tags.len(),
                trans_tags.len()
            ));
        }

        let orig_lines = original.matches('\n').count();
        let trans_lines = translated.matches('\n').count();
        if orig_lines != trans_lines {
            report.warnings.push(format!(
                "Line break count changed from {} to {}",
                orig_lines, trans_lines
            ));
        }

        report
    }

    /// `{0}`, `{name}`, `{count:N0}`
    fn extract_brace_placeholders(text: &str) -> Vec<String> {
        let regex = BRACE_REGEX
            .get_or_init(|| Regex::new(r"\{[A-Za-z0-9_]+(?:[:,][^{}]*)?\}").unwrap());
        sorted_matches(regex, text)
    }

    /// `%s`, `%d`, `%1$s`, `%.2f`
    fn extract_printf_placeholders(text: &str) -> Vec<String> {
        let regex = PRINTF_REGEX
            .get_or_init(|| Regex::new(r"%(?:\d+\$)?[-+0#]*\d*(?:\.\d+)?[sdifuxXeEgGc@]").unwrap());
        sorted_matches(regex, text)
    }

    /// `<b>`, `</b>`, `<br/>`
    fn extract_tags(text: &str) -> Vec<String> {
        let regex = TAG_REGEX.get_or_init(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9]*\s*/?>").unwrap());
        sorted_matches(regex, text)
    }
}

fn sorted_matches(regex: &Regex, text: &str) -> Vec<String> {
    let mut found: Vec<String> = regex
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Extraction Tests ====================

    #[test]
    fn test_extract_brace_placeholders() {
        let found = PlaceholderValidator::extract_brace_placeholders("Hello {name}, you have {0} items");
        assert_eq!(found, vec!["{0}", "{name}"]);
    }

    #[test]
    fn test_extract_brace_placeholders_with_format() {
        let found = PlaceholderValidator::extract_brace_placeholders("Total: {0:N2}");
        assert_eq!(found, vec!["{0:N2}"]);
    }

    #[test]
    fn test_extract_printf_placeholders() {
        let found = PlaceholderValidator::extract_printf_placeholders("%1$s has %d files (%.2f MB)");
        assert_eq!(found, vec!["%.2f", "%1$s", "%d"]);
    }

    #[test]
    fn test_percent_sign_alone_is_not_a_placeholder() {
        assert!(PlaceholderValidator::extract_printf_placeholders("100 % sure").is_empty());
    }

    #[test]
    fn test_extract_tags() {
        let found = PlaceholderValidator::extract_tags("<b>Bold</b> and<br/>break");
        assert_eq!(found.len(), 3);
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_validate_clean_translation() {
        let report = PlaceholderValidator::validate(
            "Hello {name}, you have <b>{0}</b> messages",
            "Hallo {name}, du hast <b>{0}</b> Nachrichten",
        );
        assert!(report.is_clean());
    }

    #[test]
    fn test_validate_reordered_placeholders_is_clean() {
        let report = PlaceholderValidator::validate("{0} of {1}", "{1} von {0}");
        assert!(report.is_clean());
    }

    #[test]
    fn test_validate_missing_placeholder() {
        let report = PlaceholderValidator::validate("Hello {name}", "Hallo Name");
        assert!(report.has_errors());
        assert!(report.errors[0].contains("Placeholder mismatch"));
    }

    #[test]
    fn test_validate_renamed_format_specifier() {
        let report = PlaceholderValidator::validate("%d files", "%s Dateien");
        assert!(report.has_errors());
        assert!(report.errors[0].contains("Format specifier mismatch"));
    }

    #[test]
    fn test_validate_lost_markup_is_warning() {
        let report = PlaceholderValidator::validate("<b>Save</b>", "Speichern");
        assert!(!report.has_errors());
        assert!(report.warnings[0].contains("Markup mismatch"));
    }

    #[test]
    fn test_validate_line_breaks() {
        let report = PlaceholderValidator::validate("Line one\nLine two", "Zeile eins Zeile zwei");
        assert!(report.has_warnings());
    }

    #[test]
    fn test_validate_empty_translation() {
        let report = PlaceholderValidator::validate("Hello", "   ");
        assert!(report.has_errors());
        assert!(report.errors[0].contains("empty"));
    }

    #[test]
    fn test_validation_report_default_is_clean() {
        let report = ValidationReport::default();
        assert!(report.is_clean());
    }
}
