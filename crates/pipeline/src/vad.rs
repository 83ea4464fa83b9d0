//! Voice activity detection and utterance segmentation
//!
//! Classifies 30 ms PCM16 frames as speech or silence and drives the
//! Idle/Speaking state machine that declares sentence ends. Frame
//! classification tries the WebRTC VAD first and falls back to an RMS gate
//! when the detector rejects the frame.

use babelroom_config::constants::audio;
use babelroom_core::audio::rms_i16;
use webrtc_vad::{SampleRate, Vad, VadMode};

/// VAD configuration
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// WebRTC VAD aggressiveness (0..=3)
    pub aggressiveness: u8,
    /// Energy-fallback threshold, int16 scale
    pub silence_threshold_rms: f32,
    /// Consecutive speech chunks before entering Speaking
    pub min_speech_frames: u32,
    /// Consecutive silence chunks before declaring sentence end
    pub max_silence_frames: u32,
    /// Fraction of speech frames for a chunk to count as speech
    pub speech_frame_ratio: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            aggressiveness: 2,
            silence_threshold_rms: audio::SILENCE_THRESHOLD_RMS,
            min_speech_frames: audio::MIN_SPEECH_FRAMES,
            max_silence_frames: audio::SILENCE_DURATION_MS / audio::FRAME_MS,
            speech_frame_ratio: audio::SPEECH_FRAME_RATIO,
        }
    }
}

impl VadConfig {
    pub fn with_aggressiveness(aggressiveness: u8) -> Self {
        Self {
            aggressiveness,
            ..Self::default()
        }
    }
}

/// Segmentation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadState {
    #[default]
    Idle,
    Speaking,
}

/// Outcome of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkVerdict {
    pub has_speech: bool,
    pub is_sentence_end: bool,
}

/// Per-session VAD processor
///
/// Owned exclusively by its session's stream handler; chunks arrive in
/// order from one client.
pub struct VadProcessor {
    config: VadConfig,
    state: VadState,
    speech_frames: u32,
    silence_frames: u32,
}

impl VadProcessor {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Idle,
            speech_frames: 0,
            silence_frames: 0,
        }
    }

    /// Current segmentation state
    pub fn state(&self) -> VadState {
        self.state
    }

    /// Classify one chunk and advance the state machine.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> ChunkVerdict {
        let flags = self.classify_frames(chunk);
        let speech_count = flags.iter().filter(|&&s| s).count();
        let chunk_is_speech = !flags.is_empty()
            && speech_count as f32 / flags.len() as f32 >= self.config.speech_frame_ratio;
        self.advance(chunk_is_speech)
    }

    /// Advance the Idle/Speaking state machine by one classified chunk.
    pub fn advance(&mut self, chunk_is_speech: bool) -> ChunkVerdict {
        match (self.state, chunk_is_speech) {
            (VadState::Idle, true) => {
                self.speech_frames += 1;
                if self.speech_frames >= self.config.min_speech_frames {
                    self.state = VadState::Speaking;
                }
                ChunkVerdict {
                    has_speech: true,
                    is_sentence_end: false,
                }
            }
            (VadState::Idle, false) => ChunkVerdict {
                has_speech: false,
                is_sentence_end: false,
            },
            (VadState::Speaking, true) => {
                self.silence_frames = 0;
                ChunkVerdict {
                    has_speech: true,
                    is_sentence_end: false,
                }
            }
            (VadState::Speaking, false) => {
                self.silence_frames += 1;
                let sentence_end = self.silence_frames >= self.config.max_silence_frames;
                if sentence_end {
                    self.state = VadState::Idle;
                    self.speech_frames = 0;
                    self.silence_frames = 0;
                }
                ChunkVerdict {
                    has_speech: false,
                    is_sentence_end: sentence_end,
                }
            }
        }
    }

    /// Concatenation of the chunk's speech-classified frames.
    ///
    /// Drops silent frames inside a mostly-speech chunk; the trailing
    /// partial frame is kept only if it passes the energy gate.
    pub fn filter_speech(&self, chunk: &[u8]) -> Vec<u8> {
        let flags = self.classify_frames(chunk);
        let mut out = Vec::with_capacity(chunk.len());
        for (frame, &is_speech) in chunk.chunks(audio::FRAME_BYTES).zip(flags.iter()) {
            if is_speech {
                out.extend_from_slice(frame);
            }
        }
        out
    }

    /// Return to Idle with zeroed counters
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.speech_frames = 0;
        self.silence_frames = 0;
    }

    /// Classify each 30 ms frame of the chunk as speech or silence.
    ///
    /// The WebRTC detector is constructed per call and dropped before
    /// returning: it holds a raw C pointer and must not cross an await
    /// point. A frame the detector rejects falls back to the RMS gate.
    fn classify_frames(&self, chunk: &[u8]) -> Vec<bool> {
        let frame_samples = audio::FRAME_BYTES / audio::BYTES_PER_SAMPLE;
        let mut vad = Vad::new_with_rate_and_mode(SampleRate::Rate16kHz, self.vad_mode());

        chunk
            .chunks(audio::FRAME_BYTES)
            .map(|frame| {
                if frame.len() < audio::FRAME_BYTES {
                    // Trailing partial frame: energy gate only
                    return rms_i16(frame) >= self.config.silence_threshold_rms;
                }
                let mut samples = Vec::with_capacity(frame_samples);
                for pair in frame.chunks_exact(2) {
                    samples.push(i16::from_le_bytes([pair[0], pair[1]]));
                }
                match vad.is_voice_segment(&samples) {
                    Ok(is_speech) => is_speech,
                    Err(_) => rms_i16(frame) >= self.config.silence_threshold_rms,
                }
            })
            .collect()
    }

    fn vad_mode(&self) -> VadMode {
        match self.config.aggressiveness {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            _ => VadMode::VeryAggressive,
        }
    }
}
