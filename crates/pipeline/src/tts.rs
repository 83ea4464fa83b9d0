//! Speech synthesis backend
//!
//! Posts text to a managed synthesis service and returns MP3 at 24 kHz.
//! Voice selection comes from the per-language voice table; duration is
//! estimated from the MP3 byte length.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use babelroom_config::constants::{audio, voices};
use babelroom_core::{Error, Result, SynthesizedAudio, TextToSpeech};

/// TTS backend configuration
#[derive(Debug, Clone)]
pub struct RestTtsConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

/// Managed speech synthesis client
pub struct RestTts {
    config: RestTtsConfig,
    client: reqwest::Client,
}

impl RestTts {
    pub fn new(config: RestTtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Backend(format!("tts client: {e}")))?;
        Ok(Self { config, client })
    }
}

/// Rough playback duration of an MP3 payload at the service bitrate
fn estimate_duration_ms(mp3_len: usize) -> u64 {
    (mp3_len as u64 * 8) / 24
}

#[async_trait]
impl TextToSpeech for RestTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<SynthesizedAudio> {
        if text.trim().is_empty() {
            return Ok(SynthesizedAudio::default());
        }

        let (voice_id, engine) = voices::voice_for(language);

        let url = format!("{}/v1/speech", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "text": text,
                "voice_id": voice_id,
                "engine": engine.as_str(),
                "output_format": "mp3",
                "sample_rate": audio::TTS_SAMPLE_RATE.to_string(),
            }))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("tts request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Backend(format!(
                "tts service returned {}",
                response.status()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Backend(format!("tts body read: {e}")))?
            .to_vec();

        let duration_ms = estimate_duration_ms(audio.len());

        tracing::debug!(
            target: "tts",
            language,
            voice = voice_id,
            audio_bytes = audio.len(),
            duration_ms,
            "synthesis complete"
        );

        Ok(SynthesizedAudio { audio, duration_ms })
    }

    fn name(&self) -> &str {
        "rest-tts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_estimate() {
        // 24 bytes ≈ 8 ms at the service bitrate
        assert_eq!(estimate_duration_ms(24), 8);
        assert_eq!(estimate_duration_ms(24_000), 8_000);
        assert_eq!(estimate_duration_ms(0), 0);
    }
}
