//! Centralized constants
//!
//! Single source of truth for signal-processing parameters, operation
//! timeouts, cache tuning, text filters, and per-language tables. Anything a
//! deployment may want to override lives in `Settings` instead; these are the
//! fixed parameters of the pipeline.

/// Audio and segmentation parameters
pub mod audio {
    /// Input sample rate (Hz)
    pub const SAMPLE_RATE: u32 = 16_000;

    /// Bytes per PCM16 sample
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Bytes per second of input audio
    pub const BYTES_PER_SECOND: usize = SAMPLE_RATE as usize * BYTES_PER_SAMPLE;

    /// VAD frame duration (ms)
    pub const FRAME_MS: u32 = 30;

    /// Bytes per VAD frame (960 at 16 kHz PCM16)
    pub const FRAME_BYTES: usize = BYTES_PER_SECOND * FRAME_MS as usize / 1000;

    /// Client chunk duration hint (ms); segmentation is VAD-driven
    pub const CHUNK_DURATION_MS: u32 = 1500;

    /// Hard cap before a buffer-full detach (ms)
    pub const SENTENCE_MAX_DURATION_MS: u32 = 2500;

    /// Bytes equivalent of the hard cap
    pub const SENTENCE_MAX_BYTES: usize =
        BYTES_PER_SECOND * SENTENCE_MAX_DURATION_MS as usize / 1000;

    /// Silence run length that closes a sentence (ms)
    pub const SILENCE_DURATION_MS: u32 = 350;

    /// Energy-fallback VAD threshold, int16 scale
    pub const SILENCE_THRESHOLD_RMS: f32 = 30.0;

    /// Consecutive speech chunks before entering Speaking
    pub const MIN_SPEECH_FRAMES: u32 = 3;

    /// Fraction of speech frames for a chunk to count as speech
    pub const SPEECH_FRAME_RATIO: f32 = 0.3;

    /// Minimum buffered speech before a sentence-end detach (ms)
    pub const MIN_SENTENCE_MS: u32 = 500;

    /// Residual buffer worth flushing at session end (ms)
    pub const MIN_FLUSH_MS: u32 = 300;

    /// Minimum segment duration fed to STT (seconds)
    pub const MIN_AUDIO_DURATION_SECS: f32 = 0.3;

    /// Segments quieter than this (normalized RMS) are dropped pre-STT
    pub const MIN_SEGMENT_RMS: f32 = 0.001;

    /// Low-energy hallucination gate (normalized RMS)
    pub const HALLUCINATION_RMS_THRESHOLD: f32 = 0.005;

    /// TTS output sample rate (Hz)
    pub const TTS_SAMPLE_RATE: u32 = 24_000;
}

/// Per-operation timeouts (seconds)
pub mod timeouts {
    use std::time::Duration;

    pub const STT: Duration = Duration::from_secs(15);
    pub const TRANSLATION: Duration = Duration::from_secs(10);
    pub const TTS: Duration = Duration::from_secs(8);
}

/// Room cache tuning
pub mod cache {
    use std::time::Duration;

    /// Cache entry time-to-live
    pub const TTL: Duration = Duration::from_secs(10);

    /// Expired-entry sweep cadence
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
}

/// Worker pool sizing
pub mod workers {
    /// Stream handler concurrency
    pub const MAX_WORKERS: usize = 32;

    /// Shared translation/TTS fan-out permits
    pub const PARALLEL_WORKERS: usize = 8;
}

/// Text filters applied around translation and TTS
pub mod text {
    use once_cell::sync::Lazy;
    use std::collections::HashSet;

    /// Minimum trimmed length to synthesize
    pub const MIN_TTS_TEXT_LENGTH: usize = 2;

    /// Interjections that short-circuit translation and TTS
    pub static FILLER_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
        HashSet::from([
            // Korean
            "네", "예", "응", "음", "어", "아", "으", "흠", "뭐", "그", "저", "아아", "어어",
            "음음", "네네", "예예", "그래", "응응",
            // English
            "uh", "um", "ah", "oh", "hmm", "yeah", "yes", "no", "ok", "okay", "well", "so",
            "like", "you know", "i mean",
            // Japanese
            "あ", "え", "う", "ん", "はい", "うん", "ええ", "まあ",
            // Chinese
            "嗯", "啊", "哦", "呃", "好", "是",
        ])
    });

    /// Transcription artifacts that are never real speech
    pub static AUDIO_ARTIFACT_PATTERNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
        HashSet::from([
            "[음악]", "[音楽]", "[music]", "[applause]", "[laughter]", "[박수]", "[웃음]",
            "♪", "♫", "...", "…",
        ])
    });

    /// True when the trimmed, lowercased text is a filler interjection
    pub fn is_filler(text: &str) -> bool {
        let trimmed = text.trim();
        FILLER_WORDS.contains(trimmed) || FILLER_WORDS.contains(trimmed.to_lowercase().as_str())
    }
}

/// Language code maps for cloud backends
pub mod langmap {
    use once_cell::sync::Lazy;
    use std::collections::HashMap;

    /// ISO code -> streaming cloud STT locale
    pub static CLOUD_STT_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
        HashMap::from([
            ("ko", "ko-KR"),
            ("en", "en-US"),
            ("ja", "ja-JP"),
            ("zh", "zh-CN"),
            ("es", "es-US"),
            ("fr", "fr-FR"),
            ("de", "de-DE"),
            ("pt", "pt-BR"),
            ("ru", "ru-RU"),
            ("ar", "ar-SA"),
            ("hi", "hi-IN"),
            ("tr", "tr-TR"),
        ])
    });

    /// Streaming STT locale for a language code ("en-US" fallback)
    pub fn cloud_stt_code(lang: &str) -> &'static str {
        CLOUD_STT_CODES.get(lang).copied().unwrap_or("en-US")
    }
}

/// Per-language TTS voice table
pub mod voices {
    use once_cell::sync::Lazy;
    use std::collections::HashMap;

    /// Voice engine quality tier
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum VoiceEngine {
        Neural,
        Standard,
    }

    impl VoiceEngine {
        pub fn as_str(&self) -> &'static str {
            match self {
                Self::Neural => "neural",
                Self::Standard => "standard",
            }
        }
    }

    /// Language code -> (voice id, engine)
    pub static VOICE_TABLE: Lazy<HashMap<&'static str, (&'static str, VoiceEngine)>> =
        Lazy::new(|| {
            HashMap::from([
                ("ko", ("Seoyeon", VoiceEngine::Neural)),
                ("en", ("Joanna", VoiceEngine::Neural)),
                ("zh", ("Zhiyu", VoiceEngine::Neural)),
                ("ja", ("Takumi", VoiceEngine::Neural)),
                ("es", ("Lucia", VoiceEngine::Neural)),
                ("fr", ("Lea", VoiceEngine::Neural)),
                ("de", ("Vicki", VoiceEngine::Neural)),
                ("pt", ("Camila", VoiceEngine::Neural)),
                ("ru", ("Tatyana", VoiceEngine::Standard)),
                ("ar", ("Zeina", VoiceEngine::Standard)),
                ("hi", ("Aditi", VoiceEngine::Standard)),
                ("tr", ("Filiz", VoiceEngine::Standard)),
            ])
        });

    /// Voice for a language code; unknown languages use the English default
    pub fn voice_for(lang: &str) -> (&'static str, VoiceEngine) {
        VOICE_TABLE
            .get(lang)
            .copied()
            .unwrap_or(("Joanna", VoiceEngine::Neural))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_constants_consistent() {
        assert_eq!(audio::FRAME_BYTES, 960);
        assert_eq!(audio::SENTENCE_MAX_BYTES, 80_000);
        assert!(audio::SPEECH_FRAME_RATIO > 0.0 && audio::SPEECH_FRAME_RATIO < 1.0);
    }

    #[test]
    fn test_filler_detection() {
        assert!(text::is_filler("네"));
        assert!(text::is_filler(" Yeah "));
        assert!(text::is_filler("OKAY"));
        assert!(!text::is_filler("hello there"));
    }

    #[test]
    fn test_langmap_fallback() {
        assert_eq!(langmap::cloud_stt_code("ko"), "ko-KR");
        assert_eq!(langmap::cloud_stt_code("xx"), "en-US");
    }

    #[test]
    fn test_voice_fallback() {
        let (voice, engine) = voices::voice_for("ko");
        assert_eq!(voice, "Seoyeon");
        assert_eq!(engine, voices::VoiceEngine::Neural);
        let (default_voice, _) = voices::voice_for("xx");
        assert_eq!(default_voice, "Joanna");
    }
}
