//! Canary-family STT backend
//!
//! Canary ASR inference runs in a sidecar service with the reference
//! implementation; this backend posts PCM16 audio to it over HTTP. The
//! blocking client fits the synchronous backend contract (calls already run
//! on blocking worker threads).

use std::time::Duration;

use serde::Deserialize;

use babelroom_core::audio::f32_to_pcm16;
use babelroom_core::{Error, Result};

use super::{SttBackend, SttOutcome};

/// Canary sidecar configuration
#[derive(Debug, Clone)]
pub struct CanaryConfig {
    /// Base URL of the sidecar
    pub endpoint: String,
    /// Model name served by the sidecar
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SidecarResponse {
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    error: Option<String>,
}

pub struct CanaryStt {
    config: CanaryConfig,
    client: reqwest::blocking::Client,
}

impl CanaryStt {
    pub fn new(config: CanaryConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Backend(format!("canary client: {e}")))?;

        // Reachability is advisory; the sidecar may come up later
        let health_url = format!("{}/health", config.endpoint);
        match client.get(&health_url).send() {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    target: "stt",
                    endpoint = %config.endpoint,
                    model = %config.model,
                    "canary sidecar connected"
                );
            }
            Ok(response) => {
                tracing::warn!(
                    target: "stt",
                    status = %response.status(),
                    "canary sidecar returned non-success, proceeding anyway"
                );
            }
            Err(e) => {
                tracing::warn!(
                    target: "stt",
                    error = %e,
                    "canary sidecar not reachable, will retry on first request"
                );
            }
        }

        Ok(Self { config, client })
    }
}

impl SttBackend for CanaryStt {
    fn transcribe(&self, samples: &[f32], language: &str, _audio_rms: f32) -> Result<SttOutcome> {
        let pcm = f32_to_pcm16(samples);
        let url = format!("{}/transcribe", self.config.endpoint);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "audio/pcm")
            .header("X-Language", language)
            .header("X-Model", &self.config.model)
            .body(pcm)
            .send()
            .map_err(|e| Error::Backend(format!("canary request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Backend(format!(
                "canary sidecar returned {}",
                response.status()
            )));
        }

        let result: SidecarResponse = response
            .json()
            .map_err(|e| Error::Backend(format!("canary response parse: {e}")))?;

        if let Some(error) = &result.error {
            tracing::warn!(target: "stt", error = %error, "canary sidecar reported an error");
        }

        Ok(SttOutcome {
            text: result.text.trim().to_string(),
            confidence: result.confidence.unwrap_or(0.95),
            no_speech_prob: 0.0,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn family(&self) -> &'static str {
        "C"
    }
}
