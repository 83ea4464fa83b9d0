//! Engine wiring
//!
//! Builds the STT router, translator chain, and TTS client from settings.
//! Engines are shared, immutable after init; one async bridge serves the
//! whole process.

use std::sync::Arc;
use std::time::Duration;

use babelroom_config::{Settings, TranslationBackendKind};
use babelroom_core::{TextToSpeech, Translator};

use crate::bridge::AsyncBridge;
use crate::stt::SttRouter;
use crate::translate::{
    FallbackTranslator, LlmTranslator, LlmTranslatorConfig, RestTranslator, RestTranslatorConfig,
};
use crate::tts::{RestTts, RestTtsConfig};
use crate::PipelineError;

/// Shared engine handles
#[derive(Clone)]
pub struct Engines {
    pub stt: SttRouter,
    pub translator: Arc<dyn Translator>,
    pub tts: Arc<dyn TextToSpeech>,
}

/// Build all engines from settings.
///
/// The returned bridge must outlive the engines; dropping it tears the
/// bridge runtime down.
pub fn build_engines(settings: &Settings) -> Result<(Engines, Arc<AsyncBridge>), PipelineError> {
    let bridge = Arc::new(
        AsyncBridge::new().map_err(|e| PipelineError::Init(format!("async bridge: {e}")))?,
    );

    let stt = SttRouter::new(&settings.stt, Arc::clone(&bridge))?;

    let translation_timeout = Duration::from_secs(settings.translation.timeout_secs);
    let rest = Arc::new(
        RestTranslator::new(RestTranslatorConfig {
            endpoint: settings.translation.endpoint.clone(),
            timeout: translation_timeout,
        })
        .map_err(|e| PipelineError::Init(e.to_string()))?,
    );
    let llm = Arc::new(
        LlmTranslator::new(LlmTranslatorConfig {
            endpoint: settings.translation.llm_endpoint.clone(),
            model: settings.translation.llm_model.clone(),
            timeout: translation_timeout,
        })
        .map_err(|e| PipelineError::Init(e.to_string()))?,
    );

    let translator: Arc<dyn Translator> = match settings.translation.backend {
        TranslationBackendKind::Aws => Arc::new(FallbackTranslator::new(rest, llm)),
        TranslationBackendKind::Llm => llm,
    };

    let tts = Arc::new(
        RestTts::new(RestTtsConfig {
            endpoint: settings.tts.endpoint.clone(),
            timeout: Duration::from_secs(settings.tts.timeout_secs),
        })
        .map_err(|e| PipelineError::Init(e.to_string()))?,
    );

    let engines = Engines {
        stt,
        translator,
        tts,
    };

    Ok((engines, bridge))
}

/// Warm every engine once; failures are logged, never fatal.
pub async fn warmup(engines: &Engines) {
    tracing::info!(target: "pipeline", "warming up engines");

    let router = engines.stt.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || router.warmup()).await {
        tracing::warn!(target: "pipeline", error = %e, "stt warmup task failed");
    }

    match engines.translator.translate("안녕하세요", "ko", "en").await {
        Ok(_) => tracing::info!(target: "pipeline", "translation warmup complete"),
        Err(e) => tracing::warn!(target: "pipeline", error = %e, "translation warmup failed"),
    }

    match engines.tts.synthesize("Hello", "en").await {
        Ok(_) => tracing::info!(target: "pipeline", "tts warmup complete"),
        Err(e) => tracing::warn!(target: "pipeline", error = %e, "tts warmup failed"),
    }
}
