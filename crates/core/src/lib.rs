//! Core traits and types for the room translation service
//!
//! This crate provides the foundational pieces used across all other crates:
//! - PCM audio utilities
//! - Language definitions and word-order topology
//! - Streaming chat protocol messages
//! - Engine collaborator traits (STT, translation, TTS)
//! - Shared error type

pub mod audio;
pub mod error;
pub mod language;
pub mod messages;
pub mod traits;

pub use error::{Error, Result};
pub use language::{BufferingStrategy, Language, WordOrder};
pub use messages::{
    AudioResult, BufferingStrategyInfo, ChatRequest, ChatResponse, ErrorResponse,
    ParticipantInfo, ParticipantSettingsResponse, RequestPayload, ResponseBody, SessionEnd,
    SessionInit, SessionStatus, SessionStatusKind, SpeakerInfo, TranscriptResult,
    TranslationEntry, UpdateParticipantSettingsRequest,
};
pub use traits::{SpeechToText, SynthesizedAudio, TextToSpeech, Transcription, Translator};
