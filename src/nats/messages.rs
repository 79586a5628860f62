use serde::{Deserialize, Serialize};

use crate::session::StreamStats;

/// Subject carrying `ControlMessage` JSON for a session
pub fn control_subject(session_id: &str) -> String {
    format!("avatar.control.{}", session_id)
}

/// Subject carrying periodic `StatusMessage` JSON for a session
pub fn status_subject(session_id: &str) -> String {
    format!("avatar.status.{}", session_id)
}

/// Status message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub timestamp: String, // RFC3339 timestamp
    #[serde(flatten)]
    pub stats: StreamStats,
}

impl StatusMessage {
    pub fn new(stats: StreamStats) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            stats,
        }
    }
}
