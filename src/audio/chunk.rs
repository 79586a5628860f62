use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Marks the final chunk of an utterance
    pub last_chunk: bool,
}

impl AudioChunk {
    /// Mono chunk
    pub fn new(samples: Vec<i16>, sample_rate: u32, last_chunk: bool) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
            last_chunk,
        }
    }

    /// Build a chunk from little-endian PCM bytes. A trailing odd byte is ignored.
    pub fn from_bytes(bytes: &[u8], sample_rate: u32, channels: u16, last_chunk: bool) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        Self {
            samples,
            sample_rate,
            channels,
            last_chunk,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square level normalised to 0.0..=1.0
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let v = s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        (sum / self.samples.len() as f64).sqrt().min(1.0) as f32
    }
}

/// Convert normalised float samples to 16-bit PCM with clipping
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect()
}
