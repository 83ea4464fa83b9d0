//! Cache key types and hashing
//!
//! Keys are room-scoped. Audio keys hash the raw PCM bytes; text keys use a
//! process-local stable hash (keys are never persisted or shared across
//! processes).

use std::hash::{Hash, Hasher};

use md5::{Digest, Md5};

/// First 16 hex chars of the MD5 of the raw audio bytes
pub fn audio_hash(audio: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(audio);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Stable process-local hash of utterance text
pub fn text_hash(text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// STT cache key: one entry per (room, speaker, audio)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SttKey {
    pub room_id: String,
    pub speaker_id: String,
    pub audio_hash: String,
}

impl SttKey {
    pub fn new(room_id: &str, speaker_id: &str, audio: &[u8]) -> Self {
        Self {
            room_id: room_id.to_string(),
            speaker_id: speaker_id.to_string(),
            audio_hash: audio_hash(audio),
        }
    }

    /// Pending-request key shared with the waiter protocol
    pub fn pending_key(&self) -> String {
        format!("stt:{}:{}:{}", self.room_id, self.speaker_id, self.audio_hash)
    }
}

/// Translation cache key: one entry per (room, pair, text)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslationKey {
    pub room_id: String,
    pub source_lang: String,
    pub target_lang: String,
    pub text_hash: u64,
}

impl TranslationKey {
    pub fn new(room_id: &str, source_lang: &str, target_lang: &str, text: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            text_hash: text_hash(text),
        }
    }

    pub fn pending_key(&self) -> String {
        format!(
            "trans:{}:{}:{}:{}",
            self.room_id, self.source_lang, self.target_lang, self.text_hash
        )
    }
}

/// TTS cache key: one entry per (room, target language, text)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TtsKey {
    pub room_id: String,
    pub target_lang: String,
    pub text_hash: u64,
}

impl TtsKey {
    pub fn new(room_id: &str, target_lang: &str, text: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            target_lang: target_lang.to_string(),
            text_hash: text_hash(text),
        }
    }

    pub fn pending_key(&self) -> String {
        format!("tts:{}:{}:{}", self.room_id, self.target_lang, self.text_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_hash_is_16_hex() {
        let hash = audio_hash(&[0u8; 960]);
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash, audio_hash(&[1u8; 960]));
        assert_eq!(hash, audio_hash(&[0u8; 960]));
    }

    #[test]
    fn test_text_hash_stable() {
        assert_eq!(text_hash("안녕하세요"), text_hash("안녕하세요"));
        assert_ne!(text_hash("hello"), text_hash("hello "));
    }

    #[test]
    fn test_keys_scoped_by_room() {
        let a = TranslationKey::new("room-a", "ko", "en", "text");
        let b = TranslationKey::new("room-b", "ko", "en", "text");
        assert_ne!(a, b);
        assert_ne!(a.pending_key(), b.pending_key());
    }
}
