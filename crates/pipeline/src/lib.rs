//! Audio pipeline: VAD segmentation, STT routing, translation and TTS
//! fan-out with room-scoped deduplication.

pub mod bridge;
pub mod engines;
pub mod filters;
pub mod processor;
pub mod stt;
pub mod translate;
pub mod tts;
pub mod vad;

pub use bridge::AsyncBridge;
pub use engines::{build_engines, warmup, Engines};
pub use processor::{OpTimeouts, RoomProcessor, RoomProcessorManager, Utterance, UtteranceReport};
pub use stt::SttRouter;
pub use vad::{ChunkVerdict, VadConfig, VadProcessor, VadState};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Engine error: {0}")]
    Engine(#[from] babelroom_core::Error),
}
