//! Engine collaborator traits

mod speech;
mod translate;

pub use speech::{SpeechToText, SynthesizedAudio, TextToSpeech, Transcription};
pub use translate::Translator;
