use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with audio when the audio sink reports it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AudioBackpressure {
    /// Wait until the sink has room, however long that takes
    Wait,
    /// Wait up to `timeout_ms`; keep at most `max_pending` chunks waiting,
    /// dropping the oldest beyond that
    WaitThenDropOldest { timeout_ms: u64, max_pending: usize },
    /// Drop the chunk if the sink is not ready right away
    Drop,
}

impl Default for AudioBackpressure {
    fn default() -> Self {
        AudioBackpressure::WaitThenDropOldest {
            timeout_ms: 40,
            max_pending: 8,
        }
    }
}

/// Configuration for a streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Unique session identifier (e.g., "avatar-2025-10-28-lobby")
    pub session_id: String,

    /// Output frame rate
    pub target_fps: f64,

    /// Stop after this many paced frames; metadata frames don't count (None = until cancelled)
    pub max_frames: Option<u64>,

    /// Upper bound for each teardown wait (ingestion, command worker, token refresh)
    pub teardown_timeout_ms: u64,

    pub backpressure: AudioBackpressure,

    /// How often a full audio sink is re-checked
    pub ready_poll_ms: u64,

    /// Abort the stream after this many consecutive sink failures.
    /// None keeps streaming through any number of dropped frames.
    pub max_consecutive_sink_errors: Option<u32>,
}

impl StreamConfig {
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms.max(1))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            session_id: format!("avatar-{}", uuid::Uuid::new_v4()),
            target_fps: 25.0,
            max_frames: None,
            teardown_timeout_ms: 2000,
            backpressure: AudioBackpressure::default(),
            ready_poll_ms: 5,
            max_consecutive_sink_errors: None,
        }
    }
}
