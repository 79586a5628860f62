//! Fixed-cadence audio framing.
//!
//! [`AudioStreamBatcher`] repackages arbitrary-length [`AudioChunk`]s into
//! frames of exactly one video frame's worth of audio. Partial input is kept
//! in a carry-over buffer until either more audio arrives or the utterance
//! ends, at which point the remainder is zero-padded into one last frame.

use anyhow::Result;
use tracing::debug;

use super::chunk::AudioChunk;
use crate::error::StreamError;

/// One frame of audio, possibly zero-padded at the end
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedAudioFrame {
    /// Exactly `frame_len` interleaved samples
    pub samples: Vec<i16>,
    /// Number of leading samples that carry real audio
    pub valid_samples: usize,
    pub sample_rate: u32,
    pub channels: u16,
    /// Set on the frame that closes an utterance
    pub end_of_utterance: bool,
}

impl PaddedAudioFrame {
    pub fn is_padded(&self) -> bool {
        self.valid_samples < self.samples.len()
    }

    /// Unpadded copy as a chunk, carrying the end-of-utterance marker
    pub fn to_chunk(&self) -> Result<AudioChunk> {
        let samples = AudioStreamBatcher::unpad(self)?.to_vec();
        Ok(AudioChunk {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            last_chunk: self.end_of_utterance,
        })
    }
}

/// Frame length in samples per channel for a sample rate and frame rate.
///
/// Rounded rather than truncated so that long streams do not drift.
pub fn frame_samples_for(sample_rate: u32, fps: f64) -> Result<usize> {
    if sample_rate == 0 || !(fps > 0.0) || !fps.is_finite() {
        return Err(StreamError::Config(format!(
            "cannot derive frame size from {}Hz at {} fps",
            sample_rate, fps
        ))
        .into());
    }

    let samples = (sample_rate as f64 / fps).round() as usize;
    if samples == 0 {
        return Err(StreamError::Config(format!(
            "frame rate {} too high for {}Hz audio",
            fps, sample_rate
        ))
        .into());
    }
    Ok(samples)
}

pub struct AudioStreamBatcher {
    sample_rate: u32,
    channels: u16,
    frame_len: usize,
    carry: Vec<i16>,
}

impl AudioStreamBatcher {
    /// Mono batcher producing one frame per video frame at `fps`
    pub fn new(sample_rate: u32, fps: f64) -> Result<Self> {
        let frame_samples = frame_samples_for(sample_rate, fps)?;
        Self::with_frame_samples(sample_rate, 1, frame_samples)
    }

    /// Batcher with an explicit frame length (samples per channel)
    pub fn with_frame_samples(sample_rate: u32, channels: u16, frame_samples: usize) -> Result<Self> {
        if sample_rate == 0 || channels == 0 || frame_samples == 0 {
            return Err(StreamError::Config(format!(
                "invalid batcher format: {}Hz, {} channels, {} samples per frame",
                sample_rate, channels, frame_samples
            ))
            .into());
        }

        let frame_len = frame_samples * channels as usize;
        Ok(Self {
            sample_rate,
            channels,
            frame_len,
            carry: Vec::with_capacity(frame_len),
        })
    }

    /// Physical frame length (all channels)
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples currently held back waiting for a full frame
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Feed a chunk, or `None` to mark end of stream.
    ///
    /// Returns every frame completed by this call. End of stream (or a chunk
    /// flagged `last_chunk`) flushes the carry buffer as one padded frame.
    pub fn push(&mut self, chunk: Option<&AudioChunk>) -> Result<Vec<PaddedAudioFrame>> {
        let chunk = match chunk {
            Some(chunk) => chunk,
            None => return Ok(self.flush().into_iter().collect()),
        };

        if chunk.sample_rate != self.sample_rate || chunk.channels != self.channels {
            return Err(StreamError::SampleRateMismatch {
                expected_rate: self.sample_rate,
                expected_channels: self.channels,
                actual_rate: chunk.sample_rate,
                actual_channels: chunk.channels,
            }
            .into());
        }

        self.carry.extend_from_slice(&chunk.samples);

        let full = self.carry.len() / self.frame_len;
        let mut frames = Vec::with_capacity(full + 1);
        let mut rest = self.carry.split_off(full * self.frame_len);
        std::mem::swap(&mut rest, &mut self.carry);

        for samples in rest.chunks_exact(self.frame_len) {
            frames.push(PaddedAudioFrame {
                samples: samples.to_vec(),
                valid_samples: self.frame_len,
                sample_rate: self.sample_rate,
                channels: self.channels,
                end_of_utterance: false,
            });
        }

        if chunk.last_chunk {
            match self.flush() {
                Some(frame) => frames.push(frame),
                None => {
                    if let Some(last) = frames.last_mut() {
                        last.end_of_utterance = true;
                    }
                }
            }
        }

        Ok(frames)
    }

    /// Strip trailing padding from a frame
    pub fn unpad(frame: &PaddedAudioFrame) -> Result<&[i16]> {
        if frame.valid_samples > frame.samples.len() {
            return Err(StreamError::InvalidFrame {
                valid: frame.valid_samples,
                len: frame.samples.len(),
            }
            .into());
        }
        Ok(&frame.samples[..frame.valid_samples])
    }

    /// Drop any carried samples without emitting them
    pub fn reset(&mut self) {
        if !self.carry.is_empty() {
            debug!("Discarding {} carried samples", self.carry.len());
        }
        self.carry.clear();
    }

    fn flush(&mut self) -> Option<PaddedAudioFrame> {
        if self.carry.is_empty() {
            return None;
        }

        let valid_samples = self.carry.len();
        let mut samples = std::mem::replace(&mut self.carry, Vec::with_capacity(self.frame_len));
        samples.resize(self.frame_len, 0);

        Some(PaddedAudioFrame {
            samples,
            valid_samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            end_of_utterance: true,
        })
    }
}
