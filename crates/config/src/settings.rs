//! Main settings module
//!
//! Layered configuration: defaults < `config/default.{yaml,toml}` <
//! `config/{env}.{yaml,toml}` < `BABELROOM__`-prefixed environment
//! variables. Loaded once at startup and frozen.

use std::collections::BTreeMap;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{cache, timeouts, workers};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// STT backend configuration
    #[serde(default)]
    pub stt: SttConfig,

    /// Translation backend configuration
    #[serde(default)]
    pub translation: TranslationConfig,

    /// TTS backend configuration
    #[serde(default)]
    pub tts: TtsConfig,

    /// Segmentation and fan-out tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Room cache tuning
    #[serde(default)]
    pub cache: CacheConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted frame size (bytes)
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Maximum concurrent chat streams
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    50051
}
fn default_max_message_bytes() -> usize {
    50 * 1024 * 1024
}
fn default_max_workers() -> usize {
    workers::MAX_WORKERS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_message_bytes: default_max_message_bytes(),
            max_workers: default_max_workers(),
        }
    }
}

/// STT backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SttBackendKind {
    /// Language-specific models with a shared fallback
    #[default]
    Multi,
    /// One Whisper model for every language
    Whisper,
    /// Streaming cloud transcription
    Transcribe,
}

/// Model family for one language entry in multi-model mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SttModelKind {
    #[default]
    Whisper,
    Canary,
}

/// One language -> model mapping in multi-model mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SttModelSpec {
    #[serde(default)]
    pub kind: SttModelKind,
    /// Whisper: GGML model file path. Canary: model name served by the
    /// sidecar.
    pub model: String,
}

/// STT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default)]
    pub backend: SttBackendKind,

    /// Language-specific models (multi mode); two languages naming the same
    /// model share one loaded instance
    #[serde(default = "default_stt_models")]
    pub models: BTreeMap<String, SttModelSpec>,

    /// Fallback model for languages without a dedicated entry
    #[serde(default = "default_fallback_model")]
    pub fallback: SttModelSpec,

    /// Whisper model path (whisper mode)
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,

    /// Canary sidecar endpoint
    #[serde(default = "default_canary_endpoint")]
    pub canary_endpoint: String,

    /// Streaming cloud STT endpoint
    #[serde(default = "default_cloud_endpoint")]
    pub cloud_endpoint: String,

    /// Per-call timeout (seconds)
    #[serde(default = "default_stt_timeout")]
    pub timeout_secs: u64,
}

fn default_whisper_model() -> String {
    "models/whisper/ggml-large-v3-turbo.bin".to_string()
}

fn default_stt_models() -> BTreeMap<String, SttModelSpec> {
    // large-v3-turbo handles all four launch languages well; per-language
    // overrides go through configuration
    let spec = SttModelSpec {
        kind: SttModelKind::Whisper,
        model: default_whisper_model(),
    };
    ["en", "ko", "ja", "zh"]
        .into_iter()
        .map(|lang| (lang.to_string(), spec.clone()))
        .collect()
}

fn default_fallback_model() -> SttModelSpec {
    SttModelSpec {
        kind: SttModelKind::Whisper,
        model: default_whisper_model(),
    }
}

fn default_canary_endpoint() -> String {
    "http://127.0.0.1:8090".to_string()
}
fn default_cloud_endpoint() -> String {
    "https://transcribe.us-east-1.amazonaws.com".to_string()
}
fn default_stt_timeout() -> u64 {
    timeouts::STT.as_secs()
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: SttBackendKind::default(),
            models: default_stt_models(),
            fallback: default_fallback_model(),
            whisper_model: default_whisper_model(),
            canary_endpoint: default_canary_endpoint(),
            cloud_endpoint: default_cloud_endpoint(),
            timeout_secs: default_stt_timeout(),
        }
    }
}

/// Translation backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationBackendKind {
    /// Managed REST translation service
    #[default]
    Aws,
    /// Local LLM translation
    Llm,
}

/// Translation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default)]
    pub backend: TranslationBackendKind,

    /// REST translation endpoint
    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,

    /// LLM endpoint (used by the llm backend and as the REST fallback)
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,

    /// LLM model name
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Per-call timeout (seconds)
    #[serde(default = "default_translation_timeout")]
    pub timeout_secs: u64,
}

fn default_translate_endpoint() -> String {
    "https://translate.us-east-1.amazonaws.com".to_string()
}
fn default_llm_endpoint() -> String {
    std::env::var("LLM_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
}
fn default_llm_model() -> String {
    "qwen3:8b".to_string()
}
fn default_translation_timeout() -> u64 {
    timeouts::TRANSLATION.as_secs()
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: TranslationBackendKind::default(),
            endpoint: default_translate_endpoint(),
            llm_endpoint: default_llm_endpoint(),
            llm_model: default_llm_model(),
            timeout_secs: default_translation_timeout(),
        }
    }
}

/// TTS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Speech synthesis endpoint
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,

    /// Per-call timeout (seconds)
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,
}

fn default_tts_endpoint() -> String {
    "https://polly.ap-northeast-2.amazonaws.com".to_string()
}
fn default_tts_timeout() -> u64 {
    timeouts::TTS.as_secs()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_tts_endpoint(),
            timeout_secs: default_tts_timeout(),
        }
    }
}

/// Segmentation and fan-out tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Shared fan-out permits across all rooms
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,

    /// WebRTC VAD aggressiveness (0..=3)
    #[serde(default = "default_vad_aggressiveness")]
    pub vad_aggressiveness: u8,
}

fn default_parallel_workers() -> usize {
    workers::PARALLEL_WORKERS
}
fn default_vad_aggressiveness() -> u8 {
    2
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel_workers: default_parallel_workers(),
            vad_aggressiveness: default_vad_aggressiveness(),
        }
    }
}

/// Room cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live (seconds)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Sweep cadence (seconds)
    #[serde(default = "default_cache_cleanup")]
    pub cleanup_interval_secs: u64,
}

fn default_cache_ttl() -> u64 {
    cache::TTL.as_secs()
}
fn default_cache_cleanup() -> u64 {
    cache::CLEANUP_INTERVAL.as_secs()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            cleanup_interval_secs: default_cache_cleanup(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_workers".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.pipeline.parallel_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.parallel_workers".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.pipeline.vad_aggressiveness > 3 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.vad_aggressiveness".to_string(),
                message: format!(
                    "Must be 0..=3, got {}",
                    self.pipeline.vad_aggressiveness
                ),
            });
        }

        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.ttl_secs".to_string(),
                message: "TTL must be at least 1 second".to_string(),
            });
        }

        if self.stt.backend == SttBackendKind::Multi
            && self.stt.models.is_empty()
            && self.stt.fallback.model.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "stt.models".to_string(),
                message: "Multi backend needs at least one model or a fallback".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`BABELROOM__` prefix, `__` separator)
/// 2. `config/{env}` (if env specified)
/// 3. `config/default`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("BABELROOM")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 50051);
        assert_eq!(settings.pipeline.parallel_workers, 8);
        assert_eq!(settings.stt.timeout_secs, 15);
        assert_eq!(settings.translation.timeout_secs, 10);
        assert_eq!(settings.tts.timeout_secs, 8);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_model_table_shares_one_model() {
        let settings = Settings::default();
        let names: std::collections::HashSet<_> = settings
            .stt
            .models
            .values()
            .map(|spec| spec.model.as_str())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(settings.stt.models.len(), 4);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.pipeline.vad_aggressiveness = 7;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.cache.ttl_secs = 0;
        assert!(settings.validate().is_err());
    }
}
