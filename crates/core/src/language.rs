//! Language definitions and word-order topology
//!
//! Languages are grouped by dominant word order. The group pairing of a
//! speaker and a listener decides the buffering strategy advertised to the
//! client on session ready.

use serde::{Deserialize, Serialize};

/// Languages with first-class support (models, voices, code maps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Korean,
    #[default]
    English,
    Japanese,
    Chinese,
    Spanish,
    French,
    German,
    Portuguese,
    Russian,
    Italian,
    Arabic,
    Hebrew,
    Hindi,
    Bengali,
    Turkish,
}

impl Language {
    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Korean => "ko",
            Self::English => "en",
            Self::Japanese => "ja",
            Self::Chinese => "zh",
            Self::Spanish => "es",
            Self::French => "fr",
            Self::German => "de",
            Self::Portuguese => "pt",
            Self::Russian => "ru",
            Self::Italian => "it",
            Self::Arabic => "ar",
            Self::Hebrew => "he",
            Self::Hindi => "hi",
            Self::Bengali => "bn",
            Self::Turkish => "tr",
        }
    }

    /// Human-readable name (used in LLM translation prompts)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Korean => "Korean",
            Self::English => "English",
            Self::Japanese => "Japanese",
            Self::Chinese => "Chinese",
            Self::Spanish => "Spanish",
            Self::French => "French",
            Self::German => "German",
            Self::Portuguese => "Portuguese",
            Self::Russian => "Russian",
            Self::Italian => "Italian",
            Self::Arabic => "Arabic",
            Self::Hebrew => "Hebrew",
            Self::Hindi => "Hindi",
            Self::Bengali => "Bengali",
            Self::Turkish => "Turkish",
        }
    }

    /// Parse from an ISO code (case-insensitive)
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ko" => Some(Self::Korean),
            "en" => Some(Self::English),
            "ja" => Some(Self::Japanese),
            "zh" => Some(Self::Chinese),
            "es" => Some(Self::Spanish),
            "fr" => Some(Self::French),
            "de" => Some(Self::German),
            "pt" => Some(Self::Portuguese),
            "ru" => Some(Self::Russian),
            "it" => Some(Self::Italian),
            "ar" => Some(Self::Arabic),
            "he" => Some(Self::Hebrew),
            "hi" => Some(Self::Hindi),
            "bn" => Some(Self::Bengali),
            "tr" => Some(Self::Turkish),
            _ => None,
        }
    }

    /// Dominant word order of this language
    pub fn word_order(&self) -> WordOrder {
        match self {
            Self::Korean | Self::Japanese | Self::Turkish | Self::Hindi | Self::Bengali => {
                WordOrder::Sov
            }
            Self::English
            | Self::Chinese
            | Self::Spanish
            | Self::French
            | Self::German
            | Self::Portuguese
            | Self::Russian
            | Self::Italian => WordOrder::Svo,
            Self::Arabic | Self::Hebrew => WordOrder::Vso,
        }
    }

    /// All supported languages
    pub fn all() -> &'static [Language] {
        &[
            Self::Korean,
            Self::English,
            Self::Japanese,
            Self::Chinese,
            Self::Spanish,
            Self::French,
            Self::German,
            Self::Portuguese,
            Self::Russian,
            Self::Italian,
            Self::Arabic,
            Self::Hebrew,
            Self::Hindi,
            Self::Bengali,
            Self::Turkish,
        ]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Dominant word order groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordOrder {
    Sov,
    Svo,
    Vso,
}

impl WordOrder {
    /// Word order for an arbitrary language code; unknown codes default to SVO
    pub fn of(code: &str) -> Self {
        Language::from_code(code)
            .map(|l| l.word_order())
            .unwrap_or(WordOrder::Svo)
    }
}

/// Buffering strategy hint derived from word-order topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BufferingStrategy {
    ChunkBased,
    SentenceBased,
}

impl BufferingStrategy {
    /// Strategy for one source/target pair: chunk-based when the word-order
    /// groups match, sentence-based when a reorder is expected.
    pub fn for_pair(source: &str, target: &str) -> Self {
        if WordOrder::of(source) == WordOrder::of(target) {
            Self::ChunkBased
        } else {
            Self::SentenceBased
        }
    }

    /// Session-level primary strategy: sentence-based as soon as any listener
    /// target crosses word-order groups with the speaker.
    pub fn primary<'a>(source: &str, targets: impl IntoIterator<Item = &'a str>) -> Self {
        for target in targets {
            if Self::for_pair(source, target) == Self::SentenceBased {
                return Self::SentenceBased;
            }
        }
        Self::ChunkBased
    }

    /// Buffer-size hint advertised in the session-ready status
    pub fn buffer_size_ms(&self, chunk_ms: u32, sentence_max_ms: u32) -> u32 {
        match self {
            Self::ChunkBased => chunk_ms,
            Self::SentenceBased => sentence_max_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes_roundtrip() {
        for lang in Language::all() {
            assert_eq!(Language::from_code(lang.code()), Some(*lang));
        }
        assert_eq!(Language::from_code("KO"), Some(Language::Korean));
        assert_eq!(Language::from_code("xx"), None);
    }

    #[test]
    fn test_word_order_groups() {
        assert_eq!(WordOrder::of("ko"), WordOrder::Sov);
        assert_eq!(WordOrder::of("ja"), WordOrder::Sov);
        assert_eq!(WordOrder::of("en"), WordOrder::Svo);
        assert_eq!(WordOrder::of("ar"), WordOrder::Vso);
        // Unknown languages fall back to SVO
        assert_eq!(WordOrder::of("xx"), WordOrder::Svo);
    }

    #[test]
    fn test_pair_strategy() {
        assert_eq!(
            BufferingStrategy::for_pair("ko", "ja"),
            BufferingStrategy::ChunkBased
        );
        assert_eq!(
            BufferingStrategy::for_pair("ko", "en"),
            BufferingStrategy::SentenceBased
        );
        assert_eq!(
            BufferingStrategy::for_pair("en", "fr"),
            BufferingStrategy::ChunkBased
        );
    }

    #[test]
    fn test_primary_strategy() {
        // All listeners share the speaker's group
        assert_eq!(
            BufferingStrategy::primary("ko", ["ja", "tr"]),
            BufferingStrategy::ChunkBased
        );
        // One cross-group listener flips the session
        assert_eq!(
            BufferingStrategy::primary("ko", ["ja", "en"]),
            BufferingStrategy::SentenceBased
        );
        assert_eq!(
            BufferingStrategy::primary("en", std::iter::empty::<&str>()),
            BufferingStrategy::ChunkBased
        );
    }
}
