//! Playback sinks.
//!
//! Sinks own what they are given: a captured frame or chunk is moved in and
//! never handed back. `buffer_empty` is the backpressure signal the
//! orchestrator checks before delivering audio.

mod overlay;
mod queue;
mod video;
mod wav;

pub use overlay::render_overlay;
pub use queue::PlaybackQueue;
pub use video::PreviewVideoSink;
pub use wav::WavAudioSink;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::audio::AudioChunk;
use crate::runtime::VideoFrame;

#[async_trait::async_trait]
pub trait VideoSink: Send {
    /// Acquire device resources before the first frame
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn capture(
        &mut self,
        frame: VideoFrame,
        fps: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// True when another frame can be accepted without exceeding the buffer
    fn buffer_empty(&self) -> bool;

    /// Release device resources. Idempotent.
    async fn close(&mut self) -> Result<()>;

    fn name(&self) -> &str;
}

#[async_trait::async_trait]
pub trait AudioSink: Send {
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn capture(&mut self, chunk: AudioChunk) -> Result<()>;

    /// True when another chunk can be accepted without exceeding the buffer
    fn buffer_empty(&self) -> bool;

    /// Release device resources. Idempotent.
    async fn close(&mut self) -> Result<()>;

    fn name(&self) -> &str;
}
