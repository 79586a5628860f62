use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Starting,
    Streaming,
    Draining,
    Stopped,
}

/// Statistics about a streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStats {
    pub session_id: String,

    pub state: StreamState,

    /// When streaming started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since streaming started
    pub duration_secs: f64,

    /// Frames pulled from the runtime (metadata frames included)
    pub frames_received: u64,

    /// Metadata-only frames skipped
    pub metadata_frames: u64,

    /// Frames handed to the video sink
    pub video_frames: u64,

    pub audio_chunks_delivered: u64,

    /// Audio chunks dropped under backpressure
    pub audio_chunks_dropped: u64,

    pub sink_errors: u64,

    /// Rolling output rate
    pub average_fps: f64,

    pub token_expires_at: Option<DateTime<Utc>>,
}

impl StreamStats {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: StreamState::Idle,
            started_at: None,
            duration_secs: 0.0,
            frames_received: 0,
            metadata_frames: 0,
            video_frames: 0,
            audio_chunks_delivered: 0,
            audio_chunks_dropped: 0,
            sink_errors: 0,
            average_fps: 0.0,
            token_expires_at: None,
        }
    }
}

/// Shared, read-mostly view of the session statistics
#[derive(Debug, Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<StreamStats>>,
}

impl StatusHandle {
    pub fn new(stats: StreamStats) -> Self {
        Self {
            inner: Arc::new(RwLock::new(stats)),
        }
    }

    pub fn snapshot(&self) -> StreamStats {
        let mut stats = self.inner.read().clone();
        if stats.state != StreamState::Stopped {
            stats.duration_secs = elapsed_since(stats.started_at);
        }
        stats
    }

    /// Move to `state`; the duration freezes once stopped
    pub(crate) fn set_state(&self, state: StreamState) {
        let mut stats = self.inner.write();
        if state == StreamState::Stopped {
            stats.duration_secs = elapsed_since(stats.started_at);
        }
        stats.state = state;
    }

    pub fn state(&self) -> StreamState {
        self.inner.read().state
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut StreamStats)) {
        f(&mut self.inner.write());
    }
}

fn elapsed_since(started_at: Option<DateTime<Utc>>) -> f64 {
    started_at
        .map(|started| {
            Utc::now().signed_duration_since(started).num_milliseconds() as f64 / 1000.0
        })
        .unwrap_or(0.0)
}
