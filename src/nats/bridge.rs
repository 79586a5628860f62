use anyhow::Result;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::client::{parse_control, NatsClient};
use crate::control::{ControlMessage, ControllerHandle};
use crate::session::StatusHandle;

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Relay NATS control messages to the command worker and publish status
/// every second until `shutdown` fires.
///
/// A `stop` message also cancels `shutdown`.
pub async fn spawn_bridge(
    client: NatsClient,
    controller: ControllerHandle,
    status: StatusHandle,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let mut control = client.subscribe_control().await?;

    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = client.publish_status(status.snapshot()).await {
                        warn!("Status publish failed: {:#}", e);
                    }
                }
                msg = control.next() => {
                    let Some(msg) = msg else {
                        warn!("Control subscription closed");
                        break;
                    };

                    let command = match parse_control(&msg.payload) {
                        Ok(command) => command,
                        Err(e) => {
                            warn!("Ignoring control message on {}: {:#}", msg.subject, e);
                            continue;
                        }
                    };

                    info!("Control over NATS: {}", command.kind());
                    let stop = matches!(command, ControlMessage::Stop);
                    if let Err(e) = controller.push(command) {
                        warn!("Control message rejected: {}", e);
                    }
                    if stop {
                        shutdown.cancel();
                    }
                }
            }
        }

        // final snapshot so subscribers see the terminal state
        if let Err(e) = client.publish_status(status.snapshot()).await {
            warn!("Final status publish failed: {:#}", e);
        }
        if let Err(e) = client.close().await {
            error!("{:#}", e);
        }
        info!("NATS bridge stopped");
    }))
}
