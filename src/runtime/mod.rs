//! Frame-generation runtime boundary.
//!
//! The runtime turns pushed audio into a stream of [`VideoFrame`]s. Its
//! mutating calls (`push_audio`, `flush`, `interrupt`) are only ever issued
//! from the command worker; `set_token` goes through the guarded
//! [`TokenCell`], so the refresh worker never races a reader.

mod loopback;

pub use loopback::LoopbackRuntime;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::audio::AudioChunk;
use crate::token::Token;

/// Configuration for creating a runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Avatar model file
    pub model_path: PathBuf,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Sample rate the runtime consumes
    pub sample_rate: u32,
    /// Frame cadence the runtime generates for
    pub fps: f64,
    /// Frames buffered between the generator and the consumer
    pub output_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            frame_width: 512,
            frame_height: 512,
            sample_rate: 16000,
            fps: 25.0,
            output_capacity: 2,
        }
    }
}

/// Packed RGB24 image
#[derive(Debug, Clone, PartialEq)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// One generated frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// `None` for metadata-only frames
    pub image: Option<FrameImage>,
    /// Audio to play alongside this frame
    pub audio: Option<AudioChunk>,
    pub frame_index: u64,
    /// Last frame of an utterance
    pub end_of_speech: bool,
}

impl VideoFrame {
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn is_metadata(&self) -> bool {
        self.image.is_none() && self.audio.is_none()
    }
}

/// Avatar frame-generation runtime
#[async_trait::async_trait]
pub trait AvatarRuntime: Send + Sync {
    /// Start generating. The receiver closes when the runtime stops.
    ///
    /// Not restartable: a second call fails.
    async fn run(&self) -> Result<mpsc::Receiver<VideoFrame>>;

    async fn push_audio(&self, chunk: AudioChunk) -> Result<()>;

    /// Mark end of speech; pending partial audio is emitted
    async fn flush(&self) -> Result<()>;

    /// Drop all queued audio immediately
    async fn interrupt(&self) -> Result<()>;

    fn set_token(&self, token: Token) -> Result<()>;

    fn frame_size(&self) -> (u32, u32);

    fn sample_rate(&self) -> u32;

    fn expiration_time(&self) -> Option<DateTime<Utc>>;

    /// Stable identifier of the loaded model
    fn fingerprint(&self) -> String;

    /// Stop generating. Idempotent.
    async fn stop(&self) -> Result<()>;
}

/// Guarded holder for the active token
///
/// Writers replace the whole value; readers get a clone. No caller ever
/// observes a half-written token.
#[derive(Debug, Default)]
pub struct TokenCell {
    inner: RwLock<Option<Token>>,
}

impl TokenCell {
    pub fn new(token: Option<Token>) -> Self {
        Self {
            inner: RwLock::new(token),
        }
    }

    /// Swap in a new token, returning the previous one
    pub fn replace(&self, token: Token) -> Option<Token> {
        self.inner.write().replace(token)
    }

    pub fn get(&self) -> Option<Token> {
        self.inner.read().clone()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().as_ref().and_then(|t| t.expires_at())
    }
}
