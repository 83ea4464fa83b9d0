//! Translation trait

use async_trait::async_trait;

use crate::Result;

/// Translation interface
///
/// Implementations:
/// - REST backend against a managed translation service
/// - LLM backend prompting a local model
/// - A fallback wrapper chaining the two
#[async_trait]
pub trait Translator: Send + Sync + 'static {
    /// Translate text between two language codes.
    ///
    /// Identical source and target returns the input unchanged; empty input
    /// returns an empty string.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;

    /// Translator name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockTranslator;

    #[async_trait]
    impl Translator for MockTranslator {
        async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String> {
            Ok(format!("[{target}] {text}"))
        }

        fn name(&self) -> &str {
            "mock-translator"
        }
    }

    #[tokio::test]
    async fn test_mock_translator() {
        let translator = MockTranslator;
        let out = translator.translate("안녕하세요", "ko", "en").await.unwrap();
        assert!(out.starts_with("[en]"));
    }
}
