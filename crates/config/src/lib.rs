//! Settings and constants for the room translation service

pub mod constants;
mod settings;

pub use settings::{
    load_settings, CacheConfig, ObservabilityConfig, PipelineConfig, ServerConfig, Settings,
    SttBackendKind, SttConfig, SttModelKind, SttModelSpec, TranslationBackendKind,
    TranslationConfig, TtsConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}
