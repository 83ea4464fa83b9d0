//! Per-room utterance processing
//!
//! Turns one segmented utterance into a transcript plus per-language
//! translations and synthesized audio, with bounded parallel fan-out. One
//! processor per room; a process-wide semaphore bounds translation and TTS
//! concurrency across all rooms.
//!
//! Ordering contract: the transcript response is emitted before any audio
//! response of the same utterance. Audio responses within an utterance may
//! arrive in any order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use babelroom_cache::RoomCache;
use babelroom_config::constants::{audio, text};
use babelroom_config::Settings;
use babelroom_core::audio::{duration_secs, pcm16_to_f32, rms};
use babelroom_core::{
    AudioResult, ChatResponse, ResponseBody, SpeakerInfo, SpeechToText, TranscriptResult,
    TranslationEntry,
};

use crate::engines::Engines;

/// Per-operation timeouts taken from settings
#[derive(Debug, Clone, Copy)]
pub struct OpTimeouts {
    pub stt: Duration,
    pub translation: Duration,
    pub tts: Duration,
}

impl OpTimeouts {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            stt: Duration::from_secs(settings.stt.timeout_secs),
            translation: Duration::from_secs(settings.translation.timeout_secs),
            tts: Duration::from_secs(settings.tts.timeout_secs),
        }
    }
}

/// Everything the processor needs to know about one utterance
#[derive(Debug, Clone)]
pub struct Utterance {
    pub session_id: String,
    pub room_id: String,
    pub speaker: SpeakerInfo,
    /// Active target languages at detach time (translation enabled, target
    /// differs from the source)
    pub target_languages: Vec<String>,
    /// Segment closed by sentence end or session end
    pub is_final: bool,
}

/// Per-stage latencies reported back to the session for its statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct UtteranceReport {
    pub transcript_emitted: bool,
    pub stt_ms: u64,
    pub translation_ms: u64,
    pub tts_ms: u64,
}

/// One successful translation with its recipients
#[derive(Debug, Clone)]
struct TranslationOutcome {
    target_lang: String,
    translated_text: String,
    target_participant_ids: Vec<String>,
    cached: bool,
}

/// One synthesized audio payload with its recipients
#[derive(Debug, Clone)]
struct TtsOutcome {
    target_lang: String,
    audio: Vec<u8>,
    duration_ms: u64,
    target_participant_ids: Vec<String>,
    cached: bool,
}

/// Room-scoped utterance processor
pub struct RoomProcessor {
    room_id: String,
    cache: Arc<RoomCache>,
    engines: Engines,
    permits: Arc<Semaphore>,
    timeouts: OpTimeouts,
}

impl RoomProcessor {
    fn new(
        room_id: String,
        cache: Arc<RoomCache>,
        engines: Engines,
        permits: Arc<Semaphore>,
        timeouts: OpTimeouts,
    ) -> Self {
        tracing::debug!(target: "pipeline", room = %room_id, "room processor created");
        Self {
            room_id,
            cache,
            engines,
            permits,
            timeouts,
        }
    }

    /// Run the full pipeline for one detached segment.
    ///
    /// Responses go out through `emit`; a closed receiver abandons the
    /// remaining emissions without failing the pipeline.
    pub async fn process_audio(
        &self,
        utterance: &Utterance,
        audio_bytes: Vec<u8>,
        emit: &mpsc::Sender<ChatResponse>,
    ) -> UtteranceReport {
        let pipeline_start = Instant::now();
        let mut report = UtteranceReport::default();

        let samples = pcm16_to_f32(&audio_bytes);
        let segment_rms = rms(&samples);
        let segment_secs = duration_secs(audio_bytes.len(), audio::SAMPLE_RATE);

        tracing::debug!(
            target: "pipeline",
            room = %self.room_id,
            bytes = audio_bytes.len(),
            duration_secs = segment_secs,
            is_final = utterance.is_final,
            "pipeline start"
        );

        if segment_rms < audio::MIN_SEGMENT_RMS || segment_secs < audio::MIN_AUDIO_DURATION_SECS {
            tracing::debug!(target: "pipeline", rms = segment_rms, "segment below pre-flight gates");
            return report;
        }

        // STT, deduplicated per (room, speaker, audio)
        let stt_start = Instant::now();
        let source_lang = utterance.speaker.source_language.clone();
        let stt_result = {
            let stt = self.engines.stt.clone();
            let samples = samples.clone();
            let source_lang = source_lang.clone();
            self.cache
                .get_or_create_stt(
                    &self.room_id,
                    &utterance.speaker.participant_id,
                    &audio_bytes,
                    self.timeouts.stt,
                    move || async move { stt.transcribe(&samples, &source_lang).await },
                )
                .await
        };
        report.stt_ms = stt_start.elapsed().as_millis() as u64;

        let (transcription, stt_cached) = match stt_result {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(target: "pipeline", error = %e, "stt stage failed");
                return report;
            }
        };
        if transcription.is_empty() {
            tracing::debug!(target: "pipeline", "no text from stt");
            return report;
        }
        if stt_cached {
            tracing::debug!(target: "pipeline", "stt served from cache");
        }

        let original_text = transcription.text.clone();
        let transcript_id = new_transcript_id();

        // Filler interjections and single characters carry no content:
        // deliver the transcript, skip translation and synthesis
        let stripped_len = original_text.trim().chars().count();
        if text::is_filler(&original_text) || stripped_len <= 1 {
            report.transcript_emitted = self
                .emit_transcript(
                    utterance,
                    &transcript_id,
                    &original_text,
                    transcription.confidence,
                    Vec::new(),
                    true,
                    emit,
                )
                .await;
            return report;
        }

        // Parallel translation fan-out
        let translation_start = Instant::now();
        let translations = self
            .translate_parallel(utterance, &original_text, &source_lang)
            .await;
        report.translation_ms = translation_start.elapsed().as_millis() as u64;

        let entries: Vec<TranslationEntry> = translations
            .iter()
            .map(|outcome| TranslationEntry {
                target_language: outcome.target_lang.clone(),
                translated_text: outcome.translated_text.clone(),
                target_participant_ids: outcome.target_participant_ids.clone(),
            })
            .collect();

        report.transcript_emitted = self
            .emit_transcript(
                utterance,
                &transcript_id,
                &original_text,
                transcription.confidence,
                entries,
                utterance.is_final,
                emit,
            )
            .await;
        if !report.transcript_emitted {
            return report;
        }

        // Parallel TTS fan-out, bound to the transcript just emitted
        let tts_start = Instant::now();
        self.synthesize_parallel(utterance, &transcript_id, translations, emit)
            .await;
        report.tts_ms = tts_start.elapsed().as_millis() as u64;

        tracing::debug!(
            target: "pipeline",
            total_ms = pipeline_start.elapsed().as_millis() as u64,
            stt_ms = report.stt_ms,
            translation_ms = report.translation_ms,
            tts_ms = report.tts_ms,
            "pipeline complete"
        );

        report
    }

    async fn translate_parallel(
        &self,
        utterance: &Utterance,
        original_text: &str,
        source_lang: &str,
    ) -> Vec<TranslationOutcome> {
        let targets: Vec<String> = utterance
            .target_languages
            .iter()
            .filter(|target| target.as_str() != source_lang)
            .cloned()
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let mut set = JoinSet::new();
        for target_lang in targets {
            let permits = Arc::clone(&self.permits);
            let cache = Arc::clone(&self.cache);
            let translator = Arc::clone(&self.engines.translator);
            let room_id = self.room_id.clone();
            let source = source_lang.to_string();
            let text = original_text.to_string();
            let timeout = self.timeouts.translation;

            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;

                let outcome = cache
                    .get_or_create_translation(&room_id, &source, &target_lang, &text, timeout, {
                        let translator = Arc::clone(&translator);
                        let text = text.clone();
                        let source = source.clone();
                        let target = target_lang.clone();
                        move || async move { translator.translate(&text, &source, &target).await }
                    })
                    .await;

                match outcome {
                    Ok((translated_text, cached)) if !translated_text.is_empty() => {
                        let target_participant_ids =
                            cache.listeners_for_language(&room_id, &target_lang);
                        Some(TranslationOutcome {
                            target_lang,
                            translated_text,
                            target_participant_ids,
                            cached,
                        })
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(
                            target: "translate",
                            target_lang = %target_lang,
                            error = %e,
                            "translation failed"
                        );
                        None
                    }
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(outcome)) => {
                    if outcome.cached {
                        tracing::debug!(
                            target: "translate",
                            target_lang = %outcome.target_lang,
                            "translation served from cache"
                        );
                    }
                    results.push(outcome);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(target: "translate", error = %e, "translation task failed"),
            }
        }
        results
    }

    async fn synthesize_parallel(
        &self,
        utterance: &Utterance,
        transcript_id: &str,
        translations: Vec<TranslationOutcome>,
        emit: &mpsc::Sender<ChatResponse>,
    ) {
        let candidates: Vec<TranslationOutcome> = translations
            .into_iter()
            .filter(|outcome| {
                let trimmed = outcome.translated_text.trim();
                trimmed.chars().count() >= text::MIN_TTS_TEXT_LENGTH && !text::is_filler(trimmed)
            })
            .collect();
        if candidates.is_empty() {
            return;
        }

        let mut set = JoinSet::new();
        for translation in candidates {
            let permits = Arc::clone(&self.permits);
            let cache = Arc::clone(&self.cache);
            let tts = Arc::clone(&self.engines.tts);
            let room_id = self.room_id.clone();
            let timeout = self.timeouts.tts;

            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;

                let outcome = cache
                    .get_or_create_tts(
                        &room_id,
                        &translation.target_lang,
                        &translation.translated_text,
                        timeout,
                        {
                            let tts = Arc::clone(&tts);
                            let text = translation.translated_text.clone();
                            let lang = translation.target_lang.clone();
                            move || async move { tts.synthesize(&text, &lang).await }
                        },
                    )
                    .await;

                match outcome {
                    Ok((synthesized, cached)) if !synthesized.audio.is_empty() => Some(TtsOutcome {
                        target_lang: translation.target_lang,
                        audio: synthesized.audio,
                        duration_ms: synthesized.duration_ms,
                        target_participant_ids: translation.target_participant_ids,
                        cached,
                    }),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(
                            target: "tts",
                            target_lang = %translation.target_lang,
                            error = %e,
                            "synthesis failed"
                        );
                        None
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            let outcome = match joined {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(target: "tts", error = %e, "tts task failed");
                    continue;
                }
            };

            if outcome.cached {
                tracing::debug!(
                    target: "tts",
                    target_lang = %outcome.target_lang,
                    "synthesis served from cache"
                );
            }

            let response = ChatResponse {
                session_id: utterance.session_id.clone(),
                room_id: utterance.room_id.clone(),
                body: ResponseBody::Audio(AudioResult {
                    transcript_id: transcript_id.to_string(),
                    target_language: outcome.target_lang,
                    target_participant_ids: outcome.target_participant_ids,
                    audio_data: outcome.audio,
                    format: "mp3".to_string(),
                    sample_rate: audio::TTS_SAMPLE_RATE,
                    duration_ms: outcome.duration_ms,
                    speaker_participant_id: utterance.speaker.participant_id.clone(),
                }),
            };
            if emit.send(response).await.is_err() {
                // Stream is gone; let the remaining tasks finish unobserved
                return;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_transcript(
        &self,
        utterance: &Utterance,
        transcript_id: &str,
        original_text: &str,
        confidence: f32,
        translations: Vec<TranslationEntry>,
        is_final: bool,
        emit: &mpsc::Sender<ChatResponse>,
    ) -> bool {
        let response = ChatResponse {
            session_id: utterance.session_id.clone(),
            room_id: utterance.room_id.clone(),
            body: ResponseBody::Transcript(TranscriptResult {
                id: transcript_id.to_string(),
                speaker: utterance.speaker.clone(),
                original_text: original_text.to_string(),
                original_language: utterance.speaker.source_language.clone(),
                translations,
                is_partial: !is_final,
                is_final,
                timestamp_ms: chrono::Utc::now().timestamp_millis() as u64,
                confidence,
            }),
        };
        emit.send(response).await.is_ok()
    }
}

fn new_transcript_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Process-wide registry of room processors
///
/// All rooms share one fan-out semaphore; processors are created on first
/// use and dropped when their room collapses.
pub struct RoomProcessorManager {
    cache: Arc<RoomCache>,
    engines: Engines,
    permits: Arc<Semaphore>,
    timeouts: OpTimeouts,
    processors: Mutex<HashMap<String, Arc<RoomProcessor>>>,
}

impl RoomProcessorManager {
    pub fn new(
        cache: Arc<RoomCache>,
        engines: Engines,
        parallel_workers: usize,
        timeouts: OpTimeouts,
    ) -> Self {
        tracing::info!(
            target: "pipeline",
            workers = parallel_workers,
            "shared fan-out pool created"
        );
        Self {
            cache,
            engines,
            permits: Arc::new(Semaphore::new(parallel_workers)),
            timeouts,
            processors: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, room_id: &str) -> Arc<RoomProcessor> {
        let mut processors = self.processors.lock();
        Arc::clone(processors.entry(room_id.to_string()).or_insert_with(|| {
            Arc::new(RoomProcessor::new(
                room_id.to_string(),
                Arc::clone(&self.cache),
                self.engines.clone(),
                Arc::clone(&self.permits),
                self.timeouts,
            ))
        }))
    }

    pub fn remove(&self, room_id: &str) {
        self.processors.lock().remove(room_id);
    }

    pub fn count(&self) -> usize {
        self.processors.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use babelroom_core::{Error, Result, SynthesizedAudio, TextToSpeech, Translator};

    struct CountingTranslator {
        calls: AtomicUsize,
        fail_targets: Vec<&'static str>,
    }

    #[async_trait]
    impl Translator for CountingTranslator {
        async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_targets.contains(&target) {
                return Err(Error::Backend("translate down".into()));
            }
            Ok(format!("[{target}] {text}"))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct CountingTts {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextToSpeech for CountingTts {
        async fn synthesize(&self, _text: &str, _language: &str) -> Result<SynthesizedAudio> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SynthesizedAudio {
                audio: vec![0xFF; 240],
                duration_ms: 80,
            })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct FixedStt {
        text: &'static str,
    }

    impl crate::stt::SttBackend for FixedStt {
        fn transcribe(
            &self,
            _samples: &[f32],
            _language: &str,
            _audio_rms: f32,
        ) -> Result<crate::stt::SttOutcome> {
            Ok(crate::stt::SttOutcome {
                text: self.text.to_string(),
                confidence: 0.92,
                no_speech_prob: 0.05,
            })
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn family(&self) -> &'static str {
            "F"
        }
    }

    fn manager_with(
        stt_text: &'static str,
        translator: Arc<CountingTranslator>,
        tts: Arc<CountingTts>,
    ) -> (Arc<RoomProcessorManager>, Arc<RoomCache>) {
        let cache = Arc::new(RoomCache::new(
            Duration::from_secs(10),
            Duration::from_secs(30),
        ));
        let engines = Engines {
            stt: crate::stt::SttRouter::with_backend(Arc::new(FixedStt { text: stt_text })),
            translator,
            tts,
        };
        let timeouts = OpTimeouts {
            stt: Duration::from_secs(5),
            translation: Duration::from_secs(5),
            tts: Duration::from_secs(5),
        };
        let manager = Arc::new(RoomProcessorManager::new(
            Arc::clone(&cache),
            engines,
            8,
            timeouts,
        ));
        (manager, cache)
    }

    fn utterance(targets: &[&str]) -> Utterance {
        Utterance {
            session_id: "s1".to_string(),
            room_id: "r1".to_string(),
            speaker: SpeakerInfo {
                participant_id: "speaker".to_string(),
                nickname: "Kim".to_string(),
                profile_img: String::new(),
                source_language: "ko".to_string(),
            },
            target_languages: targets.iter().map(|t| t.to_string()).collect(),
            is_final: true,
        }
    }

    fn one_second_speech() -> Vec<u8> {
        // Loud square wave: passes pre-flight gates
        let mut bytes = Vec::with_capacity(32_000);
        for i in 0..16_000usize {
            let value: i16 = if (i / 40) % 2 == 0 { 9_000 } else { -9_000 };
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fanout_per_language_with_shared_listeners() {
        let translator = Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            fail_targets: vec![],
        });
        let tts = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
        });
        let (manager, cache) = manager_with("안녕하세요", Arc::clone(&translator), Arc::clone(&tts));

        cache.register_listener("r1", "l-en-1", "en");
        cache.register_listener("r1", "l-en-2", "en");
        cache.register_listener("r1", "l-ja", "ja");

        let (tx, mut rx) = mpsc::channel(32);
        let processor = manager.get_or_create("r1");
        let report = processor
            .process_audio(&utterance(&["en", "ja"]), one_second_speech(), &tx)
            .await;
        drop(tx);

        assert!(report.transcript_emitted);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(tts.calls.load(Ordering::SeqCst), 2);

        let mut transcript: Option<TranscriptResult> = None;
        let mut audio_results = Vec::new();
        while let Some(response) = rx.recv().await {
            match response.body {
                ResponseBody::Transcript(t) => {
                    assert!(audio_results.is_empty(), "transcript must precede audio");
                    transcript = Some(t);
                }
                ResponseBody::Audio(a) => audio_results.push(a),
                other => panic!("unexpected body: {other:?}"),
            }
        }

        let transcript = transcript.expect("transcript emitted");
        assert_eq!(transcript.translations.len(), 2);
        let en_entry = transcript
            .translations
            .iter()
            .find(|entry| entry.target_language == "en")
            .expect("en translation");
        assert_eq!(en_entry.target_participant_ids, vec!["l-en-1", "l-en-2"]);

        assert_eq!(audio_results.len(), 2);
        for audio_result in &audio_results {
            assert_eq!(audio_result.transcript_id, transcript.id);
            assert_eq!(audio_result.format, "mp3");
            assert_eq!(audio_result.sample_rate, 24_000);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_partial_translation_failure_is_isolated() {
        let translator = Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            fail_targets: vec!["ja"],
        });
        let tts = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
        });
        let (manager, cache) = manager_with("안녕하세요", translator, Arc::clone(&tts));

        cache.register_listener("r1", "l-en", "en");
        cache.register_listener("r1", "l-ja", "ja");

        let (tx, mut rx) = mpsc::channel(32);
        let processor = manager.get_or_create("r1");
        processor
            .process_audio(&utterance(&["en", "ja"]), one_second_speech(), &tx)
            .await;
        drop(tx);

        let mut transcript = None;
        let mut audio_count = 0;
        while let Some(response) = rx.recv().await {
            match response.body {
                ResponseBody::Transcript(t) => transcript = Some(t),
                ResponseBody::Audio(a) => {
                    assert_eq!(a.target_language, "en");
                    audio_count += 1;
                }
                _ => {}
            }
        }

        let transcript = transcript.expect("transcript still emitted");
        assert_eq!(transcript.translations.len(), 1);
        assert_eq!(transcript.translations[0].target_language, "en");
        assert_eq!(audio_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_filler_short_circuit() {
        let translator = Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            fail_targets: vec![],
        });
        let tts = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
        });
        let (manager, cache) = manager_with("네", Arc::clone(&translator), Arc::clone(&tts));

        cache.register_listener("r1", "l-en", "en");

        let (tx, mut rx) = mpsc::channel(8);
        let processor = manager.get_or_create("r1");
        let report = processor
            .process_audio(&utterance(&["en"]), one_second_speech(), &tx)
            .await;
        drop(tx);

        assert!(report.transcript_emitted);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);

        let response = rx.recv().await.expect("one transcript");
        match response.body {
            ResponseBody::Transcript(t) => {
                assert_eq!(t.original_text, "네");
                assert!(t.translations.is_empty());
                assert!(t.is_final);
            }
            other => panic!("unexpected body: {other:?}"),
        }
        assert!(rx.recv().await.is_none(), "no audio for fillers");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_quiet_segment_produces_nothing() {
        let translator = Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            fail_targets: vec![],
        });
        let tts = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
        });
        let (manager, cache) = manager_with("ghost text", translator, tts);
        cache.register_listener("r1", "l-en", "en");

        let (tx, mut rx) = mpsc::channel(8);
        let processor = manager.get_or_create("r1");
        let report = processor
            .process_audio(&utterance(&["en"]), vec![0u8; 32_000], &tx)
            .await;
        drop(tx);

        assert!(!report.transcript_emitted);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_transcript_id_is_8_hex() {
        let id = new_transcript_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
