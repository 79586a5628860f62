use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, info};

use super::messages::{control_subject, status_subject, StatusMessage};
use crate::control::ControlMessage;
use crate::session::StreamStats;

pub struct NatsClient {
    client: Client,
    session_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Publish a status snapshot
    pub async fn publish_status(&self, stats: StreamStats) -> Result<()> {
        let subject = status_subject(&self.session_id);
        let payload = serde_json::to_vec(&StatusMessage::new(stats))?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish status")?;

        debug!("Published status to {}", subject);
        Ok(())
    }

    /// Subscribe to control messages for this session
    pub async fn subscribe_control(&self) -> Result<async_nats::Subscriber> {
        let subject = control_subject(&self.session_id);

        info!("Subscribing to control messages on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to control messages")?;

        info!("Subscribed to {}", subject);

        Ok(subscriber)
    }

    /// Flush pending publishes
    pub async fn close(self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }
}

/// Decode a control payload
pub fn parse_control(payload: &[u8]) -> Result<ControlMessage> {
    serde_json::from_slice(payload).context("Invalid control message")
}
