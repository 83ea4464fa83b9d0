//! Streaming chat handler
//!
//! One WebSocket connection carries one session: `session_init`, then
//! audio chunks (JSON envelopes or raw binary frames), then `session_end`.
//! Responses flow back through a single writer task, which preserves the
//! transcript-before-audio ordering the processor establishes.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;

use babelroom_config::constants::audio;
use babelroom_core::{
    BufferingStrategyInfo, ChatRequest, ChatResponse, ErrorResponse, RequestPayload, ResponseBody,
    SessionStatus, SessionStatusKind,
};
use babelroom_pipeline::{Utterance, VadConfig};

use crate::metrics;
use crate::session::{DetachReason, SessionState};
use crate::state::AppState;

/// Messages for the single writer task
enum Outgoing {
    Response(Box<ChatResponse>),
    Pong(Vec<u8>),
}

/// Streaming chat upgrade handler
pub async fn chat_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let permit = match Arc::clone(&state.stream_permits).try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(target: "session", "stream capacity exhausted");
            return StatusCode::from(crate::ServerError::Capacity).into_response();
        }
    };

    ws.max_message_size(state.settings.server.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, permit))
}

async fn handle_socket(socket: WebSocket, state: AppState, _permit: OwnedSemaphorePermit) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outgoing>(64);

    // Single writer task; closing the channel ends it
    let writer = tokio::spawn(async move {
        while let Some(outgoing) = out_rx.recv().await {
            let message = match outgoing {
                Outgoing::Response(response) => match serde_json::to_string(&*response) {
                    Ok(json) => Message::Text(json),
                    Err(e) => {
                        tracing::error!(target: "session", error = %e, "response serialization failed");
                        continue;
                    }
                },
                Outgoing::Pong(payload) => Message::Pong(payload),
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    // Responses from the processor fan into the writer channel
    let (emit_tx, mut emit_rx) = mpsc::channel::<ChatResponse>(64);
    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(response) = emit_rx.recv().await {
            if forward_tx
                .send(Outgoing::Response(Box::new(response)))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let mut session: Option<Arc<SessionState>> = None;

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let request: ChatRequest = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        tracing::warn!(target: "session", error = %e, "malformed request");
                        metrics::record_error("protocol");
                        send_error(&out_tx, &session, "PROTOCOL", "malformed request").await;
                        break;
                    }
                };

                match request.payload {
                    RequestPayload::SessionInit(init) => {
                        if session.is_some() {
                            send_error(&out_tx, &session, "PROTOCOL", "session already initialized")
                                .await;
                            break;
                        }
                        let new_session = init_session(&state, &request.session_id, &request.room_id, init);
                        send_ready(&out_tx, &new_session).await;
                        session = Some(new_session);
                    }
                    RequestPayload::AudioChunk(bytes) => {
                        let Some(session) = session.as_ref() else {
                            send_error(&out_tx, &session, "PROTOCOL", "audio before session_init")
                                .await;
                            break;
                        };
                        ingest_audio(&state, session, &bytes, &emit_tx).await;
                    }
                    RequestPayload::SessionEnd(_) => {
                        if let Some(session) = session.take() {
                            end_session(&state, &session, &emit_tx, &out_tx).await;
                        }
                        break;
                    }
                }
            }
            Ok(Message::Binary(bytes)) => {
                let Some(session) = session.as_ref() else {
                    send_error(&out_tx, &session, "PROTOCOL", "audio before session_init").await;
                    break;
                };
                ingest_audio(&state, session, &bytes, &emit_tx).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = out_tx.send(Outgoing::Pong(payload)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(target: "session", error = %e, "stream error");
                break;
            }
        }
    }

    // Unconditional teardown; also covers transport errors and abrupt closes
    if let Some(session) = session.take() {
        teardown(&state, &session);
    }

    drop(emit_tx);
    let _ = forwarder.await;
    drop(out_tx);
    let _ = writer.await;
}

fn init_session(
    state: &AppState,
    session_id: &str,
    room_id: &str,
    init: babelroom_core::SessionInit,
) -> Arc<SessionState> {
    let vad_config = VadConfig::with_aggressiveness(state.settings.pipeline.vad_aggressiveness);
    let session = Arc::new(SessionState::new(session_id, room_id, init, vad_config));

    for participant in session.listeners() {
        if participant.translation_enabled {
            state.cache.register_listener(
                room_id,
                &participant.participant_id,
                &participant.target_language,
            );
        }
    }

    state.sessions.insert(Arc::clone(&session));
    metrics::set_active_sessions(state.sessions.count());
    session
}

async fn send_ready(out_tx: &mpsc::Sender<Outgoing>, session: &Arc<SessionState>) {
    let strategy = session.primary_strategy();
    let targets = session.active_target_languages();
    let status = SessionStatus {
        status: SessionStatusKind::Ready,
        message: "session ready".to_string(),
        buffering_strategy: Some(BufferingStrategyInfo {
            source_language: session.speaker.source_language.clone(),
            primary_target_language: targets.first().cloned().unwrap_or_default(),
            strategy,
            buffer_size_ms: strategy
                .buffer_size_ms(audio::CHUNK_DURATION_MS, audio::SENTENCE_MAX_DURATION_MS),
        }),
    };
    let response = ChatResponse {
        session_id: session.session_id.clone(),
        room_id: session.room_id.clone(),
        body: ResponseBody::Status(status),
    };
    let _ = out_tx.send(Outgoing::Response(Box::new(response))).await;
}

async fn ingest_audio(
    state: &AppState,
    session: &Arc<SessionState>,
    bytes: &[u8],
    emit_tx: &mpsc::Sender<ChatResponse>,
) {
    if let Some((segment, reason)) = session.ingest_chunk(bytes) {
        process_segment(state, session, segment, reason, emit_tx).await;
    }
}

async fn process_segment(
    state: &AppState,
    session: &Arc<SessionState>,
    segment: Vec<u8>,
    reason: DetachReason,
    emit_tx: &mpsc::Sender<ChatResponse>,
) {
    tracing::debug!(
        target: "session",
        session = %session.session_id,
        bytes = segment.len(),
        ?reason,
        "segment detached"
    );

    let utterance = Utterance {
        session_id: session.session_id.clone(),
        room_id: session.room_id.clone(),
        speaker: session.speaker.clone(),
        target_languages: session.active_target_languages(),
        is_final: true,
    };

    let processor = state.processors.get_or_create(&session.room_id);
    let report = processor.process_audio(&utterance, segment, emit_tx).await;
    session.record_report(&report, true);

    if report.transcript_emitted {
        metrics::record_utterance();
        metrics::record_stt_latency(report.stt_ms);
        metrics::record_translation_latency(report.translation_ms);
        metrics::record_tts_latency(report.tts_ms);
    }
}

async fn end_session(
    state: &AppState,
    session: &Arc<SessionState>,
    emit_tx: &mpsc::Sender<ChatResponse>,
    out_tx: &mpsc::Sender<Outgoing>,
) {
    // Flush residual speech worth keeping before the session goes away
    if let Some(residual) = session.flush() {
        process_segment(state, session, residual, DetachReason::SessionEnd, emit_tx).await;
    }

    let response = ChatResponse {
        session_id: session.session_id.clone(),
        room_id: session.room_id.clone(),
        body: ResponseBody::Status(SessionStatus {
            status: SessionStatusKind::Ended,
            message: "session ended".to_string(),
            buffering_strategy: None,
        }),
    };
    let _ = out_tx.send(Outgoing::Response(Box::new(response))).await;

    teardown(state, session);
}

fn teardown(state: &AppState, session: &Arc<SessionState>) {
    for participant in session.listeners() {
        state
            .cache
            .unregister_listener(&session.room_id, &participant.participant_id);
    }
    state.sessions.remove(&session.session_id);

    // Last session out collapses the room processor; cached results expire
    // on their own TTL
    if state.sessions.for_room(&session.room_id).is_empty() {
        state.processors.remove(&session.room_id);
    }

    metrics::set_active_sessions(state.sessions.count());
}

async fn send_error(
    out_tx: &mpsc::Sender<Outgoing>,
    session: &Option<Arc<SessionState>>,
    code: &str,
    message: &str,
) {
    let (session_id, room_id) = session
        .as_ref()
        .map(|s| (s.session_id.clone(), s.room_id.clone()))
        .unwrap_or_default();
    let response = ChatResponse {
        session_id,
        room_id,
        body: ResponseBody::Error(ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
        }),
    };
    let _ = out_tx.send(Outgoing::Response(Box::new(response))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use babelroom_cache::RoomCache;
    use babelroom_config::Settings;
    use babelroom_core::{
        Error as CoreError, ParticipantInfo, Result as CoreResult, SessionInit, SpeakerInfo,
        SynthesizedAudio, TextToSpeech, Translator,
    };
    use babelroom_pipeline::stt::{SttBackend, SttOutcome, SttRouter};
    use babelroom_pipeline::{AsyncBridge, Engines, OpTimeouts, RoomProcessorManager};

    use crate::session::SessionRegistry;

    struct FixedStt;

    impl SttBackend for FixedStt {
        fn transcribe(
            &self,
            _samples: &[f32],
            _language: &str,
            _audio_rms: f32,
        ) -> CoreResult<SttOutcome> {
            Ok(SttOutcome {
                text: "안녕하세요 좋은 아침입니다".to_string(),
                confidence: 0.9,
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

    struct EchoTranslator;

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(&self, text: &str, _source: &str, target: &str) -> CoreResult<String> {
            Ok(format!("[{target}] {text}"))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct FixedTts;

    #[async_trait]
    impl TextToSpeech for FixedTts {
        async fn synthesize(&self, _text: &str, _language: &str) -> CoreResult<SynthesizedAudio> {
            Ok(SynthesizedAudio {
                audio: vec![0xAB; 480],
                duration_ms: 160,
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct DeadTts;

    #[async_trait]
    impl TextToSpeech for DeadTts {
        async fn synthesize(&self, _text: &str, _language: &str) -> CoreResult<SynthesizedAudio> {
            Err(CoreError::Backend("tts down".into()))
        }

        fn name(&self) -> &str {
            "dead"
        }
    }

    fn app_state(tts: Arc<dyn TextToSpeech>) -> AppState {
        let settings = Arc::new(Settings::default());
        let cache = Arc::new(RoomCache::new(
            Duration::from_secs(10),
            Duration::from_secs(30),
        ));
        let engines = Engines {
            stt: SttRouter::with_backend(Arc::new(FixedStt)),
            translator: Arc::new(EchoTranslator),
            tts,
        };
        let processors = Arc::new(RoomProcessorManager::new(
            Arc::clone(&cache),
            engines.clone(),
            8,
            OpTimeouts {
                stt: Duration::from_secs(5),
                translation: Duration::from_secs(5),
                tts: Duration::from_secs(5),
            },
        ));
        let bridge = Arc::new(AsyncBridge::new().unwrap());
        AppState::new(
            settings,
            cache,
            processors,
            Arc::new(SessionRegistry::new()),
            engines,
            bridge,
        )
    }

    fn session_init() -> SessionInit {
        SessionInit {
            speaker: SpeakerInfo {
                participant_id: "speaker".into(),
                nickname: "Kim".into(),
                profile_img: String::new(),
                source_language: "ko".into(),
            },
            participants: vec![ParticipantInfo {
                participant_id: "listener".into(),
                nickname: String::new(),
                profile_img: String::new(),
                target_language: "en".into(),
                translation_enabled: true,
            }],
        }
    }

    fn half_second_speech() -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16_000);
        for i in 0..8_000usize {
            let value: i16 = if (i / 40) % 2 == 0 { 9_000 } else { -9_000 };
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_session_end_flushes_residual_buffer() {
        let state = app_state(Arc::new(FixedTts));
        let session = init_session(&state, "s1", "r1", session_init());
        session.push_raw_audio(&half_second_speech());

        let (emit_tx, mut emit_rx) = mpsc::channel(32);
        let (out_tx, mut out_rx) = mpsc::channel(32);
        end_session(&state, &session, &emit_tx, &out_tx).await;
        drop(emit_tx);
        drop(out_tx);

        // Final transcript first, then its audio
        let first = emit_rx.recv().await.expect("final transcript");
        let transcript = match first.body {
            ResponseBody::Transcript(transcript) => transcript,
            other => panic!("unexpected body: {other:?}"),
        };
        assert!(transcript.is_final);
        assert_eq!(transcript.translations.len(), 1);
        assert_eq!(
            transcript.translations[0].target_participant_ids,
            vec!["listener"]
        );

        let second = emit_rx.recv().await.expect("audio for the flush");
        match second.body {
            ResponseBody::Audio(audio_result) => {
                assert_eq!(audio_result.transcript_id, transcript.id);
                assert_eq!(audio_result.target_language, "en");
            }
            other => panic!("unexpected body: {other:?}"),
        }

        // Ended status on the control path, session gone from the registry
        match out_rx.recv().await.expect("ended status") {
            Outgoing::Response(response) => match response.body {
                ResponseBody::Status(status) => {
                    assert_eq!(status.status, SessionStatusKind::Ended)
                }
                other => panic!("unexpected body: {other:?}"),
            },
            Outgoing::Pong(_) => panic!("unexpected pong"),
        }
        assert!(state.sessions.get("s1").is_none());
        assert_eq!(state.processors.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tts_failure_still_delivers_transcript() {
        let state = app_state(Arc::new(DeadTts));
        let session = init_session(&state, "s1", "r1", session_init());
        session.push_raw_audio(&half_second_speech());

        let (emit_tx, mut emit_rx) = mpsc::channel(32);
        let (out_tx, _out_rx) = mpsc::channel(32);
        end_session(&state, &session, &emit_tx, &out_tx).await;
        drop(emit_tx);

        let first = emit_rx.recv().await.expect("transcript survives tts failure");
        assert!(matches!(first.body, ResponseBody::Transcript(_)));
        assert!(emit_rx.recv().await.is_none(), "no audio responses");
    }

    #[tokio::test]
    async fn test_init_session_registers_listeners() {
        let state = app_state(Arc::new(FixedTts));
        let session = init_session(&state, "s1", "r1", session_init());

        assert_eq!(
            state.cache.listeners_for_language("r1", "en"),
            vec!["listener"]
        );
        assert_eq!(state.sessions.count(), 1);

        teardown(&state, &session);
        assert!(state.cache.listeners_for_language("r1", "en").is_empty());
        assert_eq!(state.sessions.count(), 0);
    }
}
