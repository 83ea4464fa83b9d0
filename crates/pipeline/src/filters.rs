//! Transcription post-filters
//!
//! Drops non-speech artifacts and repetition hallucinations. Real words are
//! never filtered by content alone; only clear artifact patterns and
//! degenerate repetition shapes are removed.

use once_cell::sync::Lazy;
use regex::Regex;

use babelroom_config::constants::{audio, text};

/// `word..` dot-suffixed token, e.g. "잘.." in "잘.. 잘.. 잘.."
static DOT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S+)\.\.+").expect("valid regex"));

/// True when the text is a transcription artifact or a repetition
/// hallucination rather than speech.
pub fn is_audio_artifact(raw: &str) -> bool {
    if raw.is_empty() {
        return false;
    }

    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return false;
    }

    if text::AUDIO_ARTIFACT_PATTERNS.contains(lowered.as_str()) {
        return true;
    }

    let words: Vec<&str> = lowered.split_whitespace().collect();
    let unique_words: std::collections::HashSet<&&str> = words.iter().collect();

    // Single token repeated many times ("음 음 음 음 음")
    if words.len() >= 5 && unique_words.len() == 1 {
        return true;
    }

    // Alternating two-token loop ("릴리 릴리 릴리 릴리 릴리 릴리")
    if words.len() >= 6 && unique_words.len() <= 2 {
        return true;
    }

    // "잘.. 잘.. 잘.." shape
    let dot_tokens: Vec<&str> = DOT_PATTERN
        .captures_iter(&lowered)
        .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
        .collect();
    if dot_tokens.len() >= 3 {
        let unique: std::collections::HashSet<&&str> = dot_tokens.iter().collect();
        if unique.len() == 1 {
            return true;
        }
    }

    // One character dominating the text ("강강강강강강강강")
    let char_count = lowered.chars().count();
    if char_count >= 10 {
        let mut counts: std::collections::HashMap<char, usize> = std::collections::HashMap::new();
        for c in lowered.chars() {
            if c != ' ' && c != '.' {
                *counts.entry(c).or_insert(0) += 1;
            }
        }
        if let Some(&max_count) = counts.values().max() {
            let total: usize = counts.values().sum();
            if total > 0 && max_count as f32 / total as f32 > 0.6 {
                return true;
            }
        }
    }

    // Long text drawn from a tiny alphabet
    if char_count >= 50 {
        let unique_chars: std::collections::HashSet<char> = lowered
            .chars()
            .filter(|&c| c != ' ' && c != '.')
            .collect();
        if unique_chars.len() <= 3 {
            return true;
        }
    }

    false
}

/// True when audio characteristics say the text cannot be real speech.
///
/// Quiet audio that still produced text, or a high no-speech probability
/// alongside non-trivial text, marks a hallucination.
pub fn is_likely_hallucination(text: &str, audio_rms: f32, no_speech_prob: f32) -> bool {
    if text.is_empty() {
        return false;
    }

    let char_count = text.chars().count();

    if audio_rms < audio::HALLUCINATION_RMS_THRESHOLD && char_count > 3 {
        return true;
    }

    if no_speech_prob > 0.7 && char_count > 5 {
        return true;
    }

    false
}
