//! Streaming chat protocol messages
//!
//! JSON envelopes carried over the bidirectional stream. Client requests hold
//! exactly one payload (`session_init`, `audio_chunk`, `session_end`); server
//! responses hold exactly one body (`status`, `transcript`, `audio`,
//! `error`). Binary PCM fields are base64 inside JSON frames; raw binary
//! frames on the socket are treated as bare `audio_chunk` payloads.

use serde::{Deserialize, Serialize};

use crate::language::BufferingStrategy;

/// Base64 (de)serialization for binary payload fields
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Active speaker of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub participant_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub profile_img: String,
    pub source_language: String,
}

/// A listening participant of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub profile_img: String,
    pub target_language: String,
    #[serde(default = "default_true")]
    pub translation_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Client request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub room_id: String,
    pub participant_id: String,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

/// Exactly one of the three client payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPayload {
    SessionInit(SessionInit),
    AudioChunk(#[serde(with = "base64_bytes")] Vec<u8>),
    SessionEnd(SessionEnd),
}

/// Session bootstrap: speaker identity plus the initial participant roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInit {
    pub speaker: SpeakerInfo,
    #[serde(default)]
    pub participants: Vec<ParticipantInfo>,
}

/// Session teardown marker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionEnd {}

/// Server response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub room_id: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

/// Exactly one of the four server bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    Status(SessionStatus),
    Transcript(TranscriptResult),
    Audio(AudioResult),
    Error(ErrorResponse),
}

/// Session lifecycle status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatusKind {
    Ready,
    Ended,
}

/// Session status body (sent on ready and on end)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub status: SessionStatusKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffering_strategy: Option<BufferingStrategyInfo>,
}

/// Latency-tuning hint advertised to the client on session ready
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferingStrategyInfo {
    pub source_language: String,
    pub primary_target_language: String,
    pub strategy: BufferingStrategy,
    pub buffer_size_ms: u32,
}

/// One translated utterance, with all successful target translations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub id: String,
    pub speaker: SpeakerInfo,
    pub original_text: String,
    pub original_language: String,
    #[serde(default)]
    pub translations: Vec<TranslationEntry>,
    pub is_partial: bool,
    pub is_final: bool,
    pub timestamp_ms: u64,
    pub confidence: f32,
}

/// One target-language translation and its recipient set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationEntry {
    pub target_language: String,
    pub translated_text: String,
    #[serde(default)]
    pub target_participant_ids: Vec<String>,
}

/// Synthesized speech for one target language of one utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResult {
    pub transcript_id: String,
    pub target_language: String,
    #[serde(default)]
    pub target_participant_ids: Vec<String>,
    #[serde(with = "base64_bytes")]
    pub audio_data: Vec<u8>,
    pub format: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub speaker_participant_id: String,
}

/// Stream-level error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Unary mutation of a participant's translation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateParticipantSettingsRequest {
    pub room_id: String,
    pub participant_id: String,
    pub target_language: String,
    pub translation_enabled: bool,
}

/// Result of a settings mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSettingsResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip_audio() {
        let request = ChatRequest {
            session_id: "s1".into(),
            room_id: "r1".into(),
            participant_id: "p1".into(),
            payload: RequestPayload::AudioChunk(vec![1, 2, 3, 4]),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("audio_chunk"));

        let back: ChatRequest = serde_json::from_str(&json).unwrap();
        match back.payload {
            RequestPayload::AudioChunk(bytes) => assert_eq!(bytes, vec![1, 2, 3, 4]),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_request_parse_session_init() {
        let json = r#"{
            "session_id": "s1",
            "room_id": "r1",
            "participant_id": "speaker",
            "session_init": {
                "speaker": {
                    "participant_id": "speaker",
                    "nickname": "Kim",
                    "profile_img": "",
                    "source_language": "ko"
                },
                "participants": [
                    {"participant_id": "l1", "target_language": "en", "translation_enabled": true}
                ]
            }
        }"#;

        let request: ChatRequest = serde_json::from_str(json).unwrap();
        match request.payload {
            RequestPayload::SessionInit(init) => {
                assert_eq!(init.speaker.source_language, "ko");
                assert_eq!(init.participants.len(), 1);
                assert!(init.participants[0].translation_enabled);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_response_tags() {
        let response = ChatResponse {
            session_id: "s1".into(),
            room_id: "r1".into(),
            body: ResponseBody::Error(ErrorResponse {
                code: "PROTOCOL".into(),
                message: "bad frame".into(),
            }),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\""));
        assert!(json.contains("PROTOCOL"));
    }
}
