//! Translation backends
//!
//! Primary REST backend against a managed translation service, an LLM
//! backend prompting a local model, and a fallback wrapper chaining the
//! two. All implement [`Translator`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use babelroom_core::{Error, Language, Result, Translator};

/// REST translation backend configuration
#[derive(Debug, Clone)]
pub struct RestTranslatorConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

/// Managed translation service client
pub struct RestTranslator {
    config: RestTranslatorConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

impl RestTranslator {
    pub fn new(config: RestTranslatorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Backend(format!("translate client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Translator for RestTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        if source == target {
            return Ok(text.to_string());
        }

        let url = format!("{}/translate", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "text": text,
                "source_language_code": source,
                "target_language_code": target,
            }))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("translate request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Backend(format!(
                "translate service returned {}",
                response.status()
            )));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("translate response parse: {e}")))?;

        Ok(parsed.translated_text)
    }

    fn name(&self) -> &str {
        "rest-translate"
    }
}

/// LLM translation backend configuration
#[derive(Debug, Clone)]
pub struct LlmTranslatorConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

/// Local LLM translation via an Ollama-compatible generate API
pub struct LlmTranslator {
    config: LlmTranslatorConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LlmTranslator {
    pub fn new(config: LlmTranslatorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Backend(format!("llm client: {e}")))?;
        Ok(Self { config, client })
    }

    fn prompt(text: &str, source: &str, target: &str) -> String {
        let source_name = Language::from_code(source)
            .map(|l| l.name())
            .unwrap_or("English");
        let target_name = Language::from_code(target)
            .map(|l| l.name())
            .unwrap_or("English");

        format!(
            "Translate this {source_name} text to {target_name}.\n\
             Rules:\n\
             - Output ONLY the {target_name} translation\n\
             - Do NOT include the original text\n\
             - Do NOT add explanations\n\
             \n\
             Text: {text}\n\
             \n\
             {target_name} translation:"
        )
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        if source == target {
            return Ok(text.to_string());
        }

        let url = format!("{}/api/generate", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "model": self.config.model,
                "prompt": Self::prompt(text, source, target),
                "stream": false,
                "options": { "temperature": 0.0 },
            }))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("llm request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Backend(format!(
                "llm returned {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("llm response parse: {e}")))?;

        Ok(clean_translation(&parsed.response))
    }

    fn name(&self) -> &str {
        "llm-translate"
    }
}

/// Primary/fallback translator chain
///
/// A primary failure is logged and retried on the fallback; only a double
/// failure surfaces to the caller.
pub struct FallbackTranslator {
    primary: Arc<dyn Translator>,
    fallback: Arc<dyn Translator>,
}

impl FallbackTranslator {
    pub fn new(primary: Arc<dyn Translator>, fallback: Arc<dyn Translator>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Translator for FallbackTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        match self.primary.translate(text, source, target).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(
                    target: "translate",
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "primary translator failed, trying fallback"
                );
                self.fallback.translate(text, source, target).await
            }
        }
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}

/// Clean up LLM translation output.
///
/// Strips known preamble phrases, collapses to the substantive line, and
/// removes symmetric wrapping quotes.
pub fn clean_translation(raw: &str) -> String {
    let mut result = raw.trim().to_string();

    const PREFIXES: [&str; 5] = [
        "Here is the translation:",
        "Here's the translation:",
        "Translation:",
        "The translation is:",
        "Translated text:",
    ];
    for prefix in PREFIXES {
        if result.to_lowercase().starts_with(&prefix.to_lowercase()) {
            result = result[prefix.len()..].trim().to_string();
        }
    }

    let lines: Vec<&str> = result
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() > 1 {
        // A short first line is usually a leftover label
        if lines[0].chars().count() < 5 {
            result = lines[1].to_string();
        } else {
            result = lines[0].to_string();
        }
    } else if let Some(line) = lines.first() {
        result = line.to_string();
    }

    if (result.starts_with('"') && result.ends_with('"') && result.len() >= 2)
        || (result.starts_with('\'') && result.ends_with('\'') && result.len() >= 2)
    {
        result = result[1..result.len() - 1].to_string();
    }

    result.trim().to_string()
}
