//! Decoding of synthesized speech: base64 PCM16 little-endian mono samples.

use base64::{engine::general_purpose::STANDARD, Engine as _};

pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
  pub sample_rate: u32,
  /// Normalized to `[-1.0, 1.0)`.
  pub samples: Vec<f32>,
}

impl DecodedAudio {
  pub fn duration_secs(&self) -> f32 {
    self.samples.len() as f32 / self.sample_rate as f32
  }
}

/// A trailing odd byte is dropped.
pub fn decode_pcm16(audio_base64: &str) -> Result<DecodedAudio, base64::DecodeError> {
  let bytes = STANDARD.decode(audio_base64.trim())?;
  let samples = bytes
    .chunks_exact(2)
    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
    .collect();
  Ok(DecodedAudio { sample_rate: SPEECH_SAMPLE_RATE, samples })
}
