//! Speech engine traits

use async_trait::async_trait;

use crate::Result;

/// Output of a transcription call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    /// Transcribed text (empty when nothing usable was heard)
    pub text: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl Transcription {
    /// Empty result used when the backend drops the segment
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Output of a synthesis call
#[derive(Debug, Clone, Default)]
pub struct SynthesizedAudio {
    /// Encoded MP3 bytes at 24 kHz
    pub audio: Vec<u8>,
    /// Estimated playback duration
    pub duration_ms: u64,
}

/// Speech-to-Text interface
///
/// Implementations route to a language-specific model when one is
/// registered and fall back to a shared multilingual model otherwise.
///
/// # Example
///
/// ```ignore
/// let stt: Arc<dyn SpeechToText> = engines.stt.clone();
/// let result = stt.transcribe(&samples, "ko").await?;
/// println!("heard: {}", result.text);
/// ```
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe one utterance of normalized f32 samples at 16 kHz
    ///
    /// Returns an empty `Transcription` (not an error) when the audio is
    /// silent, too short, or filtered as a hallucination.
    async fn transcribe(&self, samples: &[f32], language: &str) -> Result<Transcription>;

    /// Backend summary for the startup banner and logs
    fn display_name(&self) -> String;
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize text into MP3 speech for the target language
    async fn synthesize(&self, text: &str, language: &str) -> Result<SynthesizedAudio>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStt;

    #[async_trait]
    impl SpeechToText for MockStt {
        async fn transcribe(&self, _samples: &[f32], _language: &str) -> Result<Transcription> {
            Ok(Transcription {
                text: "test transcription".to_string(),
                confidence: 0.95,
            })
        }

        fn display_name(&self) -> String {
            "mock-stt".to_string()
        }
    }

    #[tokio::test]
    async fn test_mock_stt() {
        let stt = MockStt;
        let result = stt.transcribe(&[0.0; 160], "en").await.unwrap();
        assert!(!result.is_empty());
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn test_empty_transcription() {
        assert!(Transcription::empty().is_empty());
    }
}
