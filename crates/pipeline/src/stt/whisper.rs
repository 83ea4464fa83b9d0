//! Whisper-family STT backend (whisper.cpp bindings)

#[cfg(feature = "whisper")]
use parking_lot::Mutex;

use babelroom_core::{Error, Result};

use super::{SttBackend, SttOutcome};
#[cfg(feature = "whisper")]
use crate::filters::is_audio_artifact;

#[cfg(feature = "whisper")]
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Segments above this no-speech probability are discarded
#[cfg(feature = "whisper")]
const NO_SPEECH_THRESHOLD: f32 = 0.6;

/// Whisper model wrapper
///
/// The context is immutable after load; each transcription creates its own
/// decode state, so concurrent calls are safe. A mutex still serializes
/// decodes because one model instance may be shared by several languages
/// and decode is CPU-bound anyway.
pub struct WhisperStt {
    #[cfg(feature = "whisper")]
    ctx: WhisperContext,
    #[cfg(feature = "whisper")]
    decode_lock: Mutex<()>,
    model: String,
}

impl WhisperStt {
    #[cfg(feature = "whisper")]
    pub fn new(model_path: &str) -> Result<Self> {
        let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            .map_err(|e| Error::Backend(format!("whisper load failed for {model_path}: {e}")))?;
        tracing::info!(target: "stt", model = model_path, "whisper model loaded");
        Ok(Self {
            ctx,
            decode_lock: Mutex::new(()),
            model: model_path.to_string(),
        })
    }

    #[cfg(not(feature = "whisper"))]
    pub fn new(model_path: &str) -> Result<Self> {
        Err(Error::Unavailable(format!(
            "whisper support not compiled in (model {model_path} unavailable)"
        )))
    }
}

impl SttBackend for WhisperStt {
    #[cfg(feature = "whisper")]
    fn transcribe(&self, samples: &[f32], language: &str, _audio_rms: f32) -> Result<SttOutcome> {
        let _guard = self.decode_lock.lock();

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| Error::Backend(format!("whisper state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(4);
        params.set_language(Some(language));
        params.set_temperature(0.0);
        params.set_suppress_blank(true);
        params.set_no_context(true);

        state
            .full(params, samples)
            .map_err(|e| Error::Backend(format!("whisper decode: {e}")))?;

        let n_segments = state.full_n_segments();
        let mut texts: Vec<String> = Vec::new();
        let mut max_no_speech: f32 = 0.0;

        for i in 0..n_segments {
            let Some(segment) = state.get_segment(i) else {
                continue;
            };
            let no_speech = segment.no_speech_probability();
            max_no_speech = max_no_speech.max(no_speech);

            if no_speech > NO_SPEECH_THRESHOLD {
                continue;
            }

            let Ok(segment_text) = segment.to_str() else {
                continue;
            };
            let trimmed = segment_text.trim();
            if trimmed.is_empty() || is_audio_artifact(trimmed) {
                continue;
            }
            texts.push(trimmed.to_string());
        }

        let text = texts.join(" ").trim().to_string();
        let confidence = (1.0 - max_no_speech).clamp(0.0, 1.0);

        Ok(SttOutcome {
            text,
            confidence,
            no_speech_prob: max_no_speech,
        })
    }

    #[cfg(not(feature = "whisper"))]
    fn transcribe(&self, _samples: &[f32], _language: &str, _audio_rms: f32) -> Result<SttOutcome> {
        Err(Error::Unavailable("whisper support not compiled in".into()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn family(&self) -> &'static str {
        "W"
    }
}
