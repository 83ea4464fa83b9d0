//! PCM audio utilities
//!
//! The wire format is signed 16-bit little-endian PCM, mono, 16 kHz. Session
//! buffers and cache keys work on raw bytes; the STT backends consume f32
//! samples normalized to [-1.0, 1.0].

/// PCM16 normalization divisor (PCM16 -> f32)
pub const PCM16_NORMALIZE: f32 = 32768.0;

/// PCM16 scaling multiplier (f32 -> PCM16)
pub const PCM16_SCALE: f32 = 32767.0;

/// Bytes per PCM16 sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Decode PCM16 little-endian bytes into normalized f32 samples.
///
/// A trailing odd byte is ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / PCM16_NORMALIZE
        })
        .collect()
}

/// Encode normalized f32 samples as PCM16 little-endian bytes.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let clamped = sample.clamp(-1.0, 1.0);
            let pcm16 = (clamped * PCM16_SCALE) as i16;
            pcm16.to_le_bytes()
        })
        .collect()
}

/// RMS of normalized f32 samples (0.0 for empty input)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// RMS of PCM16 bytes on the int16 scale (0..32768)
///
/// Used by the energy-fallback VAD whose threshold is configured on the
/// int16 scale rather than the normalized one.
pub fn rms_i16(bytes: &[u8]) -> f32 {
    let count = bytes.len() / BYTES_PER_SAMPLE;
    if count == 0 {
        return 0.0;
    }
    let sum_squares: f64 = bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]) as f64;
            sample * sample
        })
        .sum();
    (sum_squares / count as f64).sqrt() as f32
}

/// Duration in seconds of a PCM16 byte buffer at the given sample rate
pub fn duration_secs(byte_len: usize, sample_rate: u32) -> f32 {
    byte_len as f32 / (sample_rate as f32 * BYTES_PER_SAMPLE as f32)
}

/// Number of PCM16 bytes covering the given duration
pub fn bytes_for_duration_ms(duration_ms: u32, sample_rate: u32) -> usize {
    (sample_rate as usize * BYTES_PER_SAMPLE * duration_ms as usize) / 1000
}
