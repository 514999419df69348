//! Translation service interface and the OpenAI-backed client.
//!
//! The workflows only see `TranslationService`: text plus source and target
//! tags in, translated text or a `ServiceError` out. Every failure is treated
//! the same way by the workflows, whatever its cause.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::i18n::Language;
use crate::retry::{with_retry_if, RetryConfig};

/// Any failure of the translation service (network, quota, unsupported language, ...).
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ServiceError(#[from] anyhow::Error);

impl ServiceError {
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }
}

#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_tag: &str,
        target_tag: &str,
    ) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: TranslationService + ?Sized> TranslationService for Arc<T> {
    async fn translate(
        &self,
        text: &str,
        source_tag: &str,
        target_tag: &str,
    ) -> Result<String, ServiceError> {
        (**self).translate(text, source_tag, target_tag).await
    }
}

// ==================== OpenAI client ====================

/// OpenAI Chat Completion request for translation
#[derive(Debug, Serialize)]
struct TranslationRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Non-success HTTP response from the API.
#[derive(Debug, Error)]
#[error("OpenAI API error during translation ({status}): {body}")]
struct ApiStatusError {
    status: StatusCode,
    body: String,
}

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

fn build_system_prompt(source: &Language, target: &Language) -> String {
    format!(
        r#"You are a professional software localizer. Translate the user interface string you receive from {} ({}) to {} ({}).

## Rules
- Reply with the translated string only: no quotes, no explanations.
- Keep placeholders exactly as they are: {{0}}, {{name}}, %s, %d, %1$s.
- Keep markup tags such as <b>, </b> and <br/> and keep line breaks.
- Keep keyboard accelerators (_File, &File) on a sensible letter.
- Match the tone and length of the original; it is shown in an application UI."#,
        source.name(),
        source.tag(),
        target.name(),
        target.tag()
    )
}

/// Translation service backed by an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl OpenAiTranslator {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            retry: RetryConfig::translation_call(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let retry = RetryConfig {
            max_attempts: config.translation_max_attempts,
            ..RetryConfig::translation_call()
        };
        Self::new(&config.openai_api_url, &config.openai_api_key, &config.openai_model)
            .with_retry(retry)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn build_request(&self, text: &str, source: &Language, target: &Language) -> TranslationRequest {
        // Reasoning models don't support temperature - use reasoning_effort instead
        let is_reasoning = is_reasoning_model(&self.model);
        TranslationRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: build_system_prompt(source, target),
                },
                Message {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: if is_reasoning { None } else { Some(0.3) },
            reasoning_effort: is_reasoning.then(|| "low".to_string()),
        }
    }

    async fn send(&self, request: &TranslationRequest) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .context("Failed to send translation request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(ApiStatusError { status, body }.into());
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI translation response")?;

        let translated = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .context("OpenAI translation response contained no choices")?;

        Ok(translated)
    }
}

#[async_trait]
impl TranslationService for OpenAiTranslator {
    async fn translate(
        &self,
        text: &str,
        source_tag: &str,
        target_tag: &str,
    ) -> Result<String, ServiceError> {
        let source = Language::new(source_tag);
        let target = Language::new(target_tag);
        let request = self.build_request(text, &source, &target);

        let translated = with_retry_if(
            &self.retry,
            &format!("Translation {} -> {}", source.tag(), target.tag()),
            || self.send(&request),
            is_retryable_error,
        )
        .await?;

        Ok(translated)
    }
}

/// Retry 429 (rate limit), 5xx and network errors.
/// Other 4xx client errors and unusable 200 responses fail right away.
fn is_retryable_error(error: &anyhow::Error) -> bool {
    if let Some(api) = error.downcast_ref::<ApiStatusError>() {
        return api.status == StatusCode::TOO_MANY_REQUESTS || api.status.is_server_error();
    }
    match error.downcast_ref::<reqwest::Error>() {
        Some(e) => !e.is_decode(),
        None => false,
    }
}
