//! STT routing and model management
//!
//! Routes transcription to a language-specific model when one is
//! registered, falling back to a shared multilingual model otherwise.
//! Model instances are deduplicated by name: two languages requesting the
//! same model share one loaded instance.

mod canary;
mod cloud;
mod whisper;

pub use canary::{CanaryConfig, CanaryStt};
pub use cloud::{CloudSttConfig, CloudStreamingStt};
pub use whisper::WhisperStt;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use babelroom_config::constants::audio;
use babelroom_config::{SttBackendKind, SttConfig, SttModelKind};
use babelroom_core::audio::rms;
use babelroom_core::{Result, SpeechToText, Transcription};

use crate::bridge::AsyncBridge;
use crate::filters::{is_audio_artifact, is_likely_hallucination};
use crate::PipelineError;

/// Raw backend output before post-filtering
#[derive(Debug, Clone, Default)]
pub struct SttOutcome {
    pub text: String,
    pub confidence: f32,
    /// Maximum per-segment no-speech probability (0.0 when the backend
    /// does not report one)
    pub no_speech_prob: f32,
}

/// Synchronous model backend contract
///
/// Implementations run on blocking worker threads; async-only clients go
/// through the [`AsyncBridge`] internally.
pub trait SttBackend: Send + Sync {
    fn transcribe(&self, samples: &[f32], language: &str, audio_rms: f32) -> Result<SttOutcome>;

    /// Model name used for instance deduplication and display
    fn model_name(&self) -> &str;

    /// One-letter family tag for the display summary
    fn family(&self) -> &'static str;
}

/// Multi-backend STT router
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct SttRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    backend: SttBackendKind,
    by_language: HashMap<String, Arc<dyn SttBackend>>,
    fallback: Option<Arc<dyn SttBackend>>,
}

impl SttRouter {
    pub fn new(config: &SttConfig, bridge: Arc<AsyncBridge>) -> std::result::Result<Self, PipelineError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut by_language: HashMap<String, Arc<dyn SttBackend>> = HashMap::new();
        let mut fallback: Option<Arc<dyn SttBackend>> = None;

        match config.backend {
            SttBackendKind::Multi => {
                // model name -> shared instance
                let mut loaded: HashMap<String, Arc<dyn SttBackend>> = HashMap::new();

                for (lang, spec) in &config.models {
                    match load_model(&spec.model, spec.kind, config, timeout, &mut loaded) {
                        Ok(backend) => {
                            by_language.insert(lang.clone(), backend);
                        }
                        Err(e) => {
                            tracing::warn!(
                                target: "stt",
                                language = %lang,
                                model = %spec.model,
                                error = %e,
                                "skipping language model"
                            );
                        }
                    }
                }

                match load_model(
                    &config.fallback.model,
                    config.fallback.kind,
                    config,
                    timeout,
                    &mut loaded,
                ) {
                    Ok(backend) => fallback = Some(backend),
                    Err(e) => {
                        tracing::warn!(target: "stt", error = %e, "no fallback model available");
                    }
                }

                tracing::info!(
                    target: "stt",
                    unique_models = loaded.len(),
                    language_mappings = by_language.len(),
                    "multi-model STT initialized"
                );
            }
            SttBackendKind::Whisper => match WhisperStt::new(&config.whisper_model) {
                Ok(backend) => fallback = Some(Arc::new(backend)),
                Err(e) => {
                    tracing::warn!(target: "stt", error = %e, "whisper model unavailable");
                }
            },
            SttBackendKind::Transcribe => {
                let cloud = CloudStreamingStt::new(
                    CloudSttConfig {
                        endpoint: config.cloud_endpoint.clone(),
                        timeout,
                    },
                    bridge,
                )
                .map_err(|e| PipelineError::Model(e.to_string()))?;
                fallback = Some(Arc::new(cloud));
            }
        }

        if by_language.is_empty() && fallback.is_none() {
            tracing::warn!(target: "stt", "no STT backend available, transcription will be empty");
        }

        Ok(Self {
            inner: Arc::new(RouterInner {
                backend: config.backend,
                by_language,
                fallback,
            }),
        })
    }

    /// Transcribe one utterance on the calling (blocking) thread.
    ///
    /// Pre-gates silent or too-short audio, routes to the model for the
    /// language, and post-filters artifacts and hallucinations. Backend
    /// failures collapse to an empty result: the pipeline stops for this
    /// segment but the stream stays healthy.
    pub fn transcribe_blocking(&self, samples: &[f32], language: &str) -> Transcription {
        let audio_rms = rms(samples);
        let duration_secs = samples.len() as f32 / audio::SAMPLE_RATE as f32;

        tracing::debug!(
            target: "stt",
            samples = samples.len(),
            duration_secs,
            rms = audio_rms,
            language,
            "transcription start"
        );

        if audio_rms < audio::MIN_SEGMENT_RMS {
            tracing::debug!(target: "stt", rms = audio_rms, "skipping silent segment");
            return Transcription::empty();
        }
        if duration_secs < audio::MIN_AUDIO_DURATION_SECS {
            tracing::debug!(target: "stt", duration_secs, "skipping short segment");
            return Transcription::empty();
        }

        let Some(backend) = self
            .inner
            .by_language
            .get(language)
            .or(self.inner.fallback.as_ref())
        else {
            tracing::error!(target: "stt", language, "no model available");
            return Transcription::empty();
        };

        let outcome = match backend.transcribe(samples, language, audio_rms) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(target: "stt", error = %e, "transcription failed");
                return Transcription::empty();
            }
        };

        let text = outcome.text.trim();
        if text.is_empty() {
            return Transcription::empty();
        }
        if is_audio_artifact(text) {
            tracing::debug!(target: "stt", "dropping audio artifact");
            return Transcription::empty();
        }
        if is_likely_hallucination(text, audio_rms, outcome.no_speech_prob) {
            tracing::debug!(
                target: "stt",
                rms = audio_rms,
                no_speech_prob = outcome.no_speech_prob,
                "dropping hallucination"
            );
            return Transcription::empty();
        }

        Transcription {
            text: text.to_string(),
            confidence: outcome.confidence,
        }
    }

    /// Run one dummy inference through every unique model instance.
    ///
    /// Failures are logged and skipped; warmup never aborts startup. Runs
    /// on the calling thread, so wrap in `spawn_blocking` from async code.
    pub fn warmup(&self) {
        let dummy = vec![0.0f32; audio::SAMPLE_RATE as usize];
        let mut warmed: std::collections::HashSet<usize> = std::collections::HashSet::new();

        let instances = self
            .inner
            .by_language
            .iter()
            .map(|(lang, backend)| (lang.as_str(), backend))
            .chain(
                self.inner
                    .fallback
                    .iter()
                    .map(|backend| ("fallback", backend)),
            );

        for (lang, backend) in instances {
            let key = Arc::as_ptr(backend).cast::<()>() as usize;
            if !warmed.insert(key) {
                continue;
            }
            let language = if lang == "fallback" { "en" } else { lang };
            match backend.transcribe(&dummy, language, 0.0) {
                Ok(_) => {
                    tracing::info!(target: "stt", model = backend.model_name(), "warmup complete")
                }
                Err(e) => {
                    tracing::warn!(target: "stt", model = backend.model_name(), error = %e, "warmup failed")
                }
            }
        }
    }
}

impl SttRouter {
    /// Router that sends every language to one injected backend.
    ///
    /// Bypasses configuration-driven loading; useful for custom backends
    /// and for tests.
    pub fn with_backend(model: Arc<dyn SttBackend>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                backend: SttBackendKind::Multi,
                by_language: HashMap::new(),
                fallback: Some(model),
            }),
        }
    }
}

fn load_model(
    name: &str,
    kind: SttModelKind,
    config: &SttConfig,
    timeout: Duration,
    loaded: &mut HashMap<String, Arc<dyn SttBackend>>,
) -> Result<Arc<dyn SttBackend>> {
    if let Some(existing) = loaded.get(name) {
        tracing::info!(target: "stt", model = name, "reusing already loaded model");
        return Ok(Arc::clone(existing));
    }

    let backend: Arc<dyn SttBackend> = match kind {
        SttModelKind::Whisper => Arc::new(WhisperStt::new(name)?),
        SttModelKind::Canary => Arc::new(CanaryStt::new(CanaryConfig {
            endpoint: config.canary_endpoint.clone(),
            model: name.to_string(),
            timeout,
        })?),
    };

    loaded.insert(name.to_string(), Arc::clone(&backend));
    Ok(backend)
}

#[async_trait]
impl SpeechToText for SttRouter {
    async fn transcribe(&self, samples: &[f32], language: &str) -> Result<Transcription> {
        let router = self.clone();
        let samples = samples.to_vec();
        let language = language.to_string();
        tokio::task::spawn_blocking(move || router.transcribe_blocking(&samples, &language))
            .await
            .map_err(|e| babelroom_core::Error::Backend(format!("stt task join: {e}")))
    }

    fn display_name(&self) -> String {
        match self.inner.backend {
            SttBackendKind::Multi => {
                let mut parts: Vec<String> = self
                    .inner
                    .by_language
                    .iter()
                    .map(|(lang, backend)| format!("{}({})", lang, backend.family()))
                    .collect();
                parts.sort();
                if self.inner.fallback.is_some() {
                    parts.push("fallback".to_string());
                }
                format!("multi({})", parts.join(", "))
            }
            SttBackendKind::Whisper => match &self.inner.fallback {
                Some(backend) => format!("whisper({})", backend.model_name()),
                None => "whisper(unavailable)".to_string(),
            },
            SttBackendKind::Transcribe => "cloud-streaming".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend {
        text: &'static str,
        no_speech_prob: f32,
    }

    impl SttBackend for FixedBackend {
        fn transcribe(
            &self,
            _samples: &[f32],
            _language: &str,
            _audio_rms: f32,
        ) -> Result<SttOutcome> {
            Ok(SttOutcome {
                text: self.text.to_string(),
                confidence: 0.9,
                no_speech_prob: self.no_speech_prob,
            })
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn family(&self) -> &'static str {
            "F"
        }
    }

    fn router_with(backend: Arc<dyn SttBackend>) -> SttRouter {
        SttRouter {
            inner: Arc::new(RouterInner {
                backend: SttBackendKind::Multi,
                by_language: HashMap::from([("ko".to_string(), backend)]),
                fallback: None,
            }),
        }
    }

    fn loud_samples(secs: f32) -> Vec<f32> {
        let count = (audio::SAMPLE_RATE as f32 * secs) as usize;
        (0..count)
            .map(|i| if (i / 40) % 2 == 0 { 0.3 } else { -0.3 })
            .collect()
    }

    #[test]
    fn test_gates_silent_audio() {
        let router = router_with(Arc::new(FixedBackend {
            text: "should not appear",
            no_speech_prob: 0.0,
        }));
        let result = router.transcribe_blocking(&vec![0.0; 16_000], "ko");
        assert!(result.is_empty());
    }

    #[test]
    fn test_gates_short_audio() {
        let router = router_with(Arc::new(FixedBackend {
            text: "should not appear",
            no_speech_prob: 0.0,
        }));
        let result = router.transcribe_blocking(&loud_samples(0.1), "ko");
        assert!(result.is_empty());
    }

    #[test]
    fn test_routes_and_returns_text() {
        let router = router_with(Arc::new(FixedBackend {
            text: "안녕하세요 반갑습니다",
            no_speech_prob: 0.1,
        }));
        let result = router.transcribe_blocking(&loud_samples(1.0), "ko");
        assert_eq!(result.text, "안녕하세요 반갑습니다");
        assert!(result.confidence > 0.8);
    }

    #[test]
    fn test_missing_language_without_fallback_is_empty() {
        let router = router_with(Arc::new(FixedBackend {
            text: "whatever",
            no_speech_prob: 0.0,
        }));
        let result = router.transcribe_blocking(&loud_samples(1.0), "fr");
        assert!(result.is_empty());
    }

    #[test]
    fn test_repetition_hallucination_dropped() {
        let router = router_with(Arc::new(FixedBackend {
            text: "감사합니다 감사합니다 감사합니다 감사합니다 감사합니다",
            no_speech_prob: 0.0,
        }));
        let result = router.transcribe_blocking(&loud_samples(1.0), "ko");
        assert!(result.is_empty());
    }

    #[test]
    fn test_high_no_speech_prob_dropped() {
        let router = router_with(Arc::new(FixedBackend {
            text: "hello hello there friends",
            no_speech_prob: 0.85,
        }));
        let result = router.transcribe_blocking(&loud_samples(1.0), "ko");
        assert!(result.is_empty());
    }
}
