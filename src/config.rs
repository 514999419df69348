use anyhow::{Context, Result};

use crate::workflow::TranslationPolicy;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct Config {
    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_api_url: String,
    pub translation_max_attempts: u32,

    // Workflow policy
    pub translate_just_empty: bool,
    pub cancel_on_exception: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // OpenAI
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY not set")?,
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_API_URL.to_string()),
            translation_max_attempts: std::env::var("TRANSLATION_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            // Workflow policy
            translate_just_empty: env_flag("TRANSLATE_JUST_EMPTY")?.unwrap_or(true),
            cancel_on_exception: env_flag("CANCEL_ON_EXCEPTION")?.unwrap_or(true),
        })
    }

    /// Failure and overwrite policy for the translation workflows.
    pub fn policy(&self) -> TranslationPolicy {
        TranslationPolicy {
            translate_just_empty: self.translate_just_empty,
            cancel_on_exception: self.cancel_on_exception,
        }
    }
}

/// Read a boolean variable; unset means `None`.
fn env_flag(name: &str) -> Result<Option<bool>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => anyhow::bail!("{} must be a boolean, got '{}'", name, other),
    }
}
