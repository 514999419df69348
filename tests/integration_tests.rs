//! Integration tests for translate-keys
//!
//! These tests drive the public API end to end: tables bound to language
//! registries, documents loaded from resource files, and both translation
//! workflows against a local fake service and a mocked HTTP endpoint.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proptest::prelude::*;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use translate_keys::retry::RetryConfig;
use translate_keys::{
    BulkTranslationOrchestrator, Document, Error, JsonResourceAdapter, KeyTable, OpenAiTranslator,
    ResourceFileAdapter, SavePolicy, ServiceError, TranslationOrchestrator, TranslationPolicy,
    TranslationService, WorkflowState,
};

// ==================== Test Helpers ====================

type Call = (String, String, String);

/// Records every call and answers `"[target] text"`, or fails for texts
/// listed in `fail_on`.
#[derive(Default)]
struct FakeTranslator {
    calls: Mutex<Vec<Call>>,
    fail_on: Vec<String>,
    fail_always: bool,
}

impl FakeTranslator {
    fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing_on(texts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_on: texts.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        })
    }

    fn always_failing() -> Arc<Self> {
        Arc::new(Self {
            fail_always: true,
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationService for FakeTranslator {
    async fn translate(
        &self,
        text: &str,
        source_tag: &str,
        target_tag: &str,
    ) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push((
            text.to_string(),
            source_tag.to_string(),
            target_tag.to_string(),
        ));
        if self.fail_always || self.fail_on.iter().any(|t| t == text) {
            return Err(ServiceError::msg(format!("cannot translate '{}'", text)));
        }
        Ok(format!("[{}] {}", target_tag, text))
    }
}

fn value(doc: &Document, key: &str, tag: &str) -> String {
    doc.with_table(|t| {
        t.row_by_key(key)
            .and_then(|row| row.value(tag))
            .map(|slot| slot.value().to_string())
            .unwrap_or_default()
    })
}

fn hello_document() -> Document {
    let mut table = KeyTable::with_languages(&["en", "de"]).unwrap();
    table.upsert("en", "hello", "Hello").unwrap();
    Document::from_table(table)
}

// ==================== Table Scenarios ====================

#[test]
fn test_add_then_remove_language_keeps_rows_aligned() {
    let mut table = KeyTable::with_languages(&["en", "de"]).unwrap();
    table.upsert("en", "hello", "Hello").unwrap();

    table.add_language("fr").unwrap();
    let row = table.row_by_key("hello").unwrap();
    assert_eq!(row.values().len(), 3);
    assert_eq!(row.value("fr").unwrap().value(), "");

    table.remove_language("de").unwrap();
    let row = table.row_by_key("hello").unwrap();
    let tags: Vec<_> = row.values().iter().map(|v| v.language().tag()).collect();
    assert_eq!(tags, vec!["en", "fr"]);
    assert_eq!(row.value("en").unwrap().value(), "Hello");
    assert!(table.is_aligned());
}

#[test]
fn test_upsert_is_idempotent_and_merges_languages() {
    let mut table = KeyTable::new();
    let first = table.upsert("en", "hello", "Hello").unwrap();
    let again = table.upsert("en", "hello", "Hello").unwrap();
    let merged = table.upsert("de", "hello", "Hallo").unwrap();

    assert_eq!(first, again);
    assert_eq!(first, merged);
    assert_eq!(table.len(), 1);
    assert_eq!(table.value(first, "en"), Some("Hello"));
    assert_eq!(table.value(first, "de"), Some("Hallo"));
}

#[test]
fn test_export_is_restartable_and_includes_empty_values() {
    let mut table = KeyTable::with_languages(&["en", "de"]).unwrap();
    table.upsert("en", "a", "A").unwrap();
    table.upsert("en", "b", "B").unwrap();
    table.upsert("de", "a", "Ä").unwrap();

    let export = table.export_for_language("de").unwrap();
    let first: Vec<_> = export.clone().collect();
    let second: Vec<_> = export.collect();

    assert_eq!(first, vec![("a", "Ä"), ("b", "")]);
    assert_eq!(first, second);
}

#[derive(Debug, Clone)]
enum Edit {
    AddLanguage(u8),
    RemoveLanguage(u8),
    AddKey,
    Upsert(u8, u8),
    RemoveFirstRow,
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0u8..6).prop_map(Edit::AddLanguage),
        (0u8..6).prop_map(Edit::RemoveLanguage),
        Just(Edit::AddKey),
        (0u8..6, 0u8..10).prop_map(|(l, k)| Edit::Upsert(l, k)),
        Just(Edit::RemoveFirstRow),
    ]
}

const TAGS: [&str; 6] = ["en", "de", "fr", "es", "it", "ja"];

proptest! {
    #[test]
    fn prop_rows_stay_aligned(edits in prop::collection::vec(edit(), 0..40)) {
        let mut table = KeyTable::new();
        for edit in edits {
            // Rejected edits (duplicates, unknown languages) are fine here
            match edit {
                Edit::AddLanguage(l) => { let _ = table.add_language(TAGS[l as usize]); }
                Edit::RemoveLanguage(l) => { let _ = table.remove_language(TAGS[l as usize]); }
                Edit::AddKey => { table.add_key(); }
                Edit::Upsert(l, k) => {
                    let _ = table.upsert(TAGS[l as usize], &format!("key{}", k), "v");
                }
                Edit::RemoveFirstRow => {
                    if let Some(id) = table.row_at(0).map(|r| r.id()) {
                        table.remove_key(id).unwrap();
                    }
                }
            }
            prop_assert!(table.is_aligned());
        }
    }
}

// ==================== Single-Target Workflow ====================

#[tokio::test]
async fn test_hello_en_to_de() {
    let doc = hello_document();
    let service = FakeTranslator::ok();
    let orchestrator = TranslationOrchestrator::new(doc.clone(), service.clone());
    orchestrator.set_source("en").unwrap();
    orchestrator.set_target("de").unwrap();

    let report = orchestrator.start().unwrap().wait().await.unwrap();

    assert_eq!(report.state, WorkflowState::Completed);
    assert_eq!(
        service.calls(),
        vec![("Hello".to_string(), "en".to_string(), "de".to_string())]
    );
    assert_eq!(value(&doc, "hello", "de"), "[de] Hello");
}

#[tokio::test]
async fn test_filled_target_untouched_without_calls() {
    let doc = hello_document();
    let id = doc.with_table(|t| t.row_by_key("hello").unwrap().id());
    doc.set_value(id, "de", "Servus").unwrap();
    let service = FakeTranslator::ok();
    let orchestrator = TranslationOrchestrator::new(doc.clone(), service.clone());
    orchestrator.set_source("en").unwrap();
    orchestrator.set_target("de").unwrap();

    orchestrator.start().unwrap().wait().await.unwrap();

    assert!(service.calls().is_empty());
    assert_eq!(value(&doc, "hello", "de"), "Servus");
}

#[tokio::test]
async fn test_failure_on_row_k_keeps_position_at_k() {
    let mut table = KeyTable::with_languages(&["en", "de"]).unwrap();
    for (key, text) in [("k0", "zero"), ("k1", "one"), ("k2", "two"), ("k3", "three")] {
        table.upsert("en", key, text).unwrap();
    }
    let doc = Document::from_table(table);
    let orchestrator = TranslationOrchestrator::new(doc.clone(), FakeTranslator::failing_on(&["two"]));
    orchestrator.set_source("en").unwrap();
    orchestrator.set_target("de").unwrap();

    let err = orchestrator.start().unwrap().wait().await.unwrap_err();

    assert!(matches!(err, Error::TranslationServiceFailure { ref key, .. } if key == "k2"));
    assert_eq!(orchestrator.position(), Some(2));
    assert_eq!(orchestrator.state(), WorkflowState::Cancelled);
    assert_eq!(value(&doc, "k0", "de"), "[de] zero");
    assert_eq!(value(&doc, "k1", "de"), "[de] one");
    assert_eq!(value(&doc, "k2", "de"), "");
    assert_eq!(value(&doc, "k3", "de"), "");
    assert!(!doc.is_workflow_running());
}

#[tokio::test]
async fn test_always_failing_service_completes_without_changes() {
    let mut table = KeyTable::with_languages(&["en", "de"]).unwrap();
    table.upsert("en", "a", "A").unwrap();
    table.upsert("en", "b", "B").unwrap();
    table.upsert("en", "c", "C").unwrap();
    let doc = Document::from_table(table);
    let orchestrator = TranslationOrchestrator::new(doc.clone(), FakeTranslator::always_failing())
        .with_policy(TranslationPolicy {
            translate_just_empty: true,
            cancel_on_exception: false,
        });
    orchestrator.set_source("en").unwrap();
    orchestrator.set_target("de").unwrap();

    let report = orchestrator.start().unwrap().wait().await.unwrap();

    assert_eq!(report.state, WorkflowState::Completed);
    assert_eq!(report.translated, 0);
    assert_eq!(orchestrator.position(), Some(2));
    for key in ["a", "b", "c"] {
        assert_eq!(value(&doc, key, "de"), "");
    }
}

// ==================== Bulk Workflow ====================

#[tokio::test]
async fn test_bulk_call_bound() {
    let mut table = KeyTable::with_languages(&["en", "de", "fr", "es"]).unwrap();
    table.upsert("en", "a", "A").unwrap();
    table.upsert("en", "b", "B").unwrap();
    table.upsert("en", "blank", "   ").unwrap();
    let doc = Document::from_table(table);
    let service = FakeTranslator::ok();
    let bulk = BulkTranslationOrchestrator::new(doc.clone(), service.clone());
    bulk.set_source("en").unwrap();

    let report = bulk.start().unwrap().wait().await.unwrap();

    let (rows, languages) = (3, 4);
    assert!(service.calls().len() <= rows * (languages - 1));
    assert_eq!(service.calls().len(), 6);
    assert!(service.calls().iter().all(|(text, _, _)| text != "   "));
    assert_eq!(report.skipped_blank_source, 3);
    assert_eq!(value(&doc, "b", "es"), "[es] B");
}

// ==================== Files ====================

#[tokio::test]
async fn test_import_translate_save() {
    let dir = TempDir::new().unwrap();
    let en = dir.path().join("en.json");
    let de = dir.path().join("de.json");
    std::fs::write(&en, r#"{"greeting": "Hello {name}", "farewell": "Bye"}"#).unwrap();
    std::fs::write(&de, r#"{"farewell": "Tschüss"}"#).unwrap();

    let doc = Document::new();
    let adapter = JsonResourceAdapter::new();
    doc.import_files(&adapter, &[en, de.clone()]).unwrap();

    let bulk = BulkTranslationOrchestrator::new(doc.clone(), FakeTranslator::ok());
    bulk.set_source("en").unwrap();
    bulk.start().unwrap().wait().await.unwrap();

    let report = doc.save_all(&adapter, SavePolicy::StopOnError).unwrap();
    assert_eq!(report.written.len(), 2);

    let saved = adapter.read(&de).unwrap();
    assert_eq!(saved.language_tag.as_deref(), Some("de"));
    assert!(saved
        .entries
        .contains(&("greeting".to_string(), "[de] Hello {name}".to_string())));
    assert!(saved
        .entries
        .contains(&("farewell".to_string(), "Tschüss".to_string())));
}

// ==================== OpenAI Client ====================

#[tokio::test]
async fn test_openai_translator_in_workflow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hallo" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let translator = OpenAiTranslator::new(
        &format!("{}/v1/chat/completions", server.uri()),
        "test-key",
        "gpt-4o-mini",
    )
    .with_retry(RetryConfig::none());
    let doc = hello_document();
    let orchestrator = TranslationOrchestrator::new(doc.clone(), Arc::new(translator));
    orchestrator.set_source("en").unwrap();
    orchestrator.set_target("de").unwrap();

    orchestrator.start().unwrap().wait().await.unwrap();

    assert_eq!(value(&doc, "hello", "de"), "Hallo");
}

#[tokio::test]
async fn test_openai_client_error_stops_workflow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let translator = OpenAiTranslator::new(&server.uri(), "bad-key", "gpt-4o-mini");
    let doc = hello_document();
    let orchestrator = TranslationOrchestrator::new(doc.clone(), Arc::new(translator));
    orchestrator.set_source("en").unwrap();
    orchestrator.set_target("de").unwrap();

    let err = orchestrator.start().unwrap().wait().await.unwrap_err();

    assert!(err.is_service_failure());
    assert_eq!(value(&doc, "hello", "de"), "");
}
