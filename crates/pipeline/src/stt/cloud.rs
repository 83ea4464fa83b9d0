//! Streaming cloud STT backend
//!
//! Streams PCM16 audio to a managed transcription service and aggregates
//! the non-partial results. The service client is async-only; synchronous
//! callers go through the process-wide [`AsyncBridge`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use babelroom_config::constants::{audio, langmap};
use babelroom_core::audio::f32_to_pcm16;
use babelroom_core::{Error, Result};

use super::{SttBackend, SttOutcome};
use crate::bridge::AsyncBridge;

/// Upload chunk size in bytes
const CHUNK_SIZE: usize = 8192;

/// Streaming cloud STT configuration
#[derive(Debug, Clone)]
pub struct CloudSttConfig {
    /// Streaming transcription endpoint
    pub endpoint: String,
    /// Request timeout
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    is_partial: bool,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    results: Vec<StreamResult>,
}

pub struct CloudStreamingStt {
    config: CloudSttConfig,
    client: reqwest::Client,
    bridge: Arc<AsyncBridge>,
}

impl CloudStreamingStt {
    pub fn new(config: CloudSttConfig, bridge: Arc<AsyncBridge>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Backend(format!("cloud stt client: {e}")))?;
        Ok(Self {
            config,
            client,
            bridge,
        })
    }

    async fn stream_transcription(
        client: reqwest::Client,
        endpoint: String,
        language_code: String,
        pcm: Vec<u8>,
    ) -> Result<SttOutcome> {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = pcm
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        let body = reqwest::Body::wrap_stream(futures::stream::iter(chunks));

        let url = format!("{}/stream-transcription", endpoint);
        let response = client
            .post(&url)
            .header("Content-Type", "audio/pcm")
            .header("X-Language-Code", &language_code)
            .header("X-Sample-Rate", audio::SAMPLE_RATE.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("cloud stt request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Backend(format!(
                "cloud stt returned {}",
                response.status()
            )));
        }

        let parsed: StreamResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("cloud stt response parse: {e}")))?;

        let mut texts = Vec::new();
        let mut confidences = Vec::new();
        for result in parsed.results {
            if result.is_partial {
                continue;
            }
            let text = result.transcript.trim();
            if text.is_empty() {
                continue;
            }
            texts.push(text.to_string());
            confidences.push(result.confidence.unwrap_or(0.95));
            tracing::debug!(target: "stt", segment = %text, "cloud stt segment");
        }

        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        Ok(SttOutcome {
            text: texts.join(" "),
            confidence,
            no_speech_prob: 0.0,
        })
    }
}

impl SttBackend for CloudStreamingStt {
    fn transcribe(&self, samples: &[f32], language: &str, _audio_rms: f32) -> Result<SttOutcome> {
        let pcm = f32_to_pcm16(samples);
        let language_code = langmap::cloud_stt_code(language).to_string();

        let future = Self::stream_transcription(
            self.client.clone(),
            self.config.endpoint.clone(),
            language_code,
            pcm,
        );

        // Flatten the bridge's own timeout error into the backend result
        self.bridge.run(future, self.config.timeout)?
    }

    fn model_name(&self) -> &str {
        "cloud-streaming"
    }

    fn family(&self) -> &'static str {
        "S"
    }
}
