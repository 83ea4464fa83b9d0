//! Session state and the audio ingestion state machine
//!
//! One session per chat stream. The session owns the audio buffer and VAD
//! state; the participant roster and strategy are shared with the settings
//! route through the registry, so they sit behind locks.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use babelroom_config::constants::audio;
use babelroom_core::audio::bytes_for_duration_ms;
use babelroom_core::{BufferingStrategy, ParticipantInfo, SessionInit, SpeakerInfo};
use babelroom_pipeline::{UtteranceReport, VadConfig, VadProcessor};

/// Why a segment was detached from the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    SentenceEnd,
    BufferFull,
    SessionEnd,
}

/// Cumulative per-session statistics, logged at teardown
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStats {
    pub chunks_processed: u64,
    pub sentences_completed: u64,
    pub total_stt_ms: u64,
    pub total_translation_ms: u64,
    pub total_tts_ms: u64,
}

impl SessionStats {
    pub fn record(&mut self, report: &UtteranceReport, is_final: bool) {
        self.chunks_processed += 1;
        if is_final {
            self.sentences_completed += 1;
        }
        self.total_stt_ms += report.stt_ms;
        self.total_translation_ms += report.translation_ms;
        self.total_tts_ms += report.tts_ms;
    }
}

/// Per-stream session state
pub struct SessionState {
    pub session_id: String,
    pub room_id: String,
    pub speaker: SpeakerInfo,
    participants: Mutex<HashMap<String, ParticipantInfo>>,
    primary_strategy: Mutex<BufferingStrategy>,
    vad: Mutex<VadProcessor>,
    buffer: Mutex<Vec<u8>>,
    stats: Mutex<SessionStats>,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        room_id: impl Into<String>,
        init: SessionInit,
        vad_config: VadConfig,
    ) -> Self {
        let participants: HashMap<String, ParticipantInfo> = init
            .participants
            .into_iter()
            .map(|p| (p.participant_id.clone(), p))
            .collect();

        let session = Self {
            session_id: session_id.into(),
            room_id: room_id.into(),
            speaker: init.speaker,
            participants: Mutex::new(participants),
            primary_strategy: Mutex::new(BufferingStrategy::ChunkBased),
            vad: Mutex::new(VadProcessor::new(vad_config)),
            buffer: Mutex::new(Vec::new()),
            stats: Mutex::new(SessionStats::default()),
        };
        session.recompute_primary_strategy();
        session
    }

    /// Distinct target languages of current listeners, sorted.
    ///
    /// A listener has translation enabled and a target different from the
    /// speaker's source language.
    pub fn active_target_languages(&self) -> Vec<String> {
        let participants = self.participants.lock();
        let mut targets: Vec<String> = participants
            .values()
            .filter(|p| p.translation_enabled && p.target_language != self.speaker.source_language)
            .map(|p| p.target_language.clone())
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// Listeners to (re-)register in the room cache registry
    pub fn listeners(&self) -> Vec<ParticipantInfo> {
        self.participants.lock().values().cloned().collect()
    }

    /// Session-level buffering strategy hint
    pub fn primary_strategy(&self) -> BufferingStrategy {
        *self.primary_strategy.lock()
    }

    pub fn recompute_primary_strategy(&self) {
        let targets = self.active_target_languages();
        let strategy = BufferingStrategy::primary(
            &self.speaker.source_language,
            targets.iter().map(String::as_str),
        );
        *self.primary_strategy.lock() = strategy;
    }

    /// Apply a settings mutation to one participant.
    ///
    /// Takes effect for the next utterance's target snapshot. Returns false
    /// when the participant is not part of this session.
    pub fn update_participant(
        &self,
        participant_id: &str,
        target_language: &str,
        translation_enabled: bool,
    ) -> bool {
        let updated = {
            let mut participants = self.participants.lock();
            match participants.get_mut(participant_id) {
                Some(participant) => {
                    participant.target_language = target_language.to_string();
                    participant.translation_enabled = translation_enabled;
                    true
                }
                None => false,
            }
        };
        if updated {
            self.recompute_primary_strategy();
            tracing::info!(
                target: "session",
                session = %self.session_id,
                participant = participant_id,
                target_language,
                translation_enabled,
                "participant settings updated"
            );
        }
        updated
    }

    /// Ingest one audio chunk; returns a detached segment when ready.
    pub fn ingest_chunk(&self, chunk: &[u8]) -> Option<(Vec<u8>, DetachReason)> {
        let mut vad = self.vad.lock();
        let verdict = vad.process_chunk(chunk);

        let mut buffer = self.buffer.lock();
        if verdict.has_speech {
            let speech = vad.filter_speech(chunk);
            buffer.extend_from_slice(&speech);
        }

        tracing::trace!(
            target: "vad",
            has_speech = verdict.has_speech,
            sentence_end = verdict.is_sentence_end,
            buffered_bytes = buffer.len(),
            "chunk processed"
        );

        let min_sentence_bytes =
            bytes_for_duration_ms(audio::MIN_SENTENCE_MS, audio::SAMPLE_RATE);

        if verdict.is_sentence_end && buffer.len() >= min_sentence_bytes {
            let segment = std::mem::take(&mut *buffer);
            return Some((segment, DetachReason::SentenceEnd));
        }

        if buffer.len() >= audio::SENTENCE_MAX_BYTES {
            let segment = std::mem::take(&mut *buffer);
            vad.reset();
            return Some((segment, DetachReason::BufferFull));
        }

        None
    }

    /// Detach the residual buffer at session end when it is worth flushing.
    pub fn flush(&self) -> Option<Vec<u8>> {
        let mut buffer = self.buffer.lock();
        let min_flush_bytes = bytes_for_duration_ms(audio::MIN_FLUSH_MS, audio::SAMPLE_RATE);
        if buffer.len() >= min_flush_bytes {
            Some(std::mem::take(&mut *buffer))
        } else {
            buffer.clear();
            None
        }
    }

    /// Push raw bytes straight into the buffer, bypassing the VAD
    #[cfg(test)]
    pub(crate) fn push_raw_audio(&self, bytes: &[u8]) {
        self.buffer.lock().extend_from_slice(bytes);
    }

    pub fn record_report(&self, report: &UtteranceReport, is_final: bool) {
        self.stats.lock().record(report, is_final);
    }

    pub fn stats(&self) -> SessionStats {
        *self.stats.lock()
    }
}

/// Process-wide session registry
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<SessionState>) {
        tracing::info!(
            target: "session",
            session = %session.session_id,
            room = %session.room_id,
            "session registered"
        );
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionState>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(&entry))
    }

    /// Remove a session, returning it for final logging
    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionState>> {
        let removed = self.sessions.remove(session_id).map(|(_, session)| session);
        if let Some(session) = &removed {
            let stats = session.stats();
            tracing::info!(
                target: "session",
                session = %session.session_id,
                room = %session.room_id,
                chunks = stats.chunks_processed,
                sentences = stats.sentences_completed,
                stt_ms = stats.total_stt_ms,
                translation_ms = stats.total_translation_ms,
                tts_ms = stats.total_tts_ms,
                "session removed"
            );
        }
        removed
    }

    /// Live sessions belonging to one room
    pub fn for_room(&self, room_id: &str) -> Vec<Arc<SessionState>> {
        self.sessions
            .iter()
            .filter(|entry| entry.room_id == room_id)
            .map(|entry| Arc::clone(&entry))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
