use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::service::{TokenRequestConfig, TokenService};
use super::Token;
use crate::error::StreamError;

/// Requests the startup token and keeps it fresh in the background
pub struct TokenLifecycleManager {
    service: Arc<dyn TokenService>,
    config: TokenRequestConfig,
    stop: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl TokenLifecycleManager {
    pub fn new(service: Arc<dyn TokenService>, config: TokenRequestConfig) -> Self {
        Self {
            service,
            config,
            stop: CancellationToken::new(),
            worker: None,
        }
    }

    pub fn config(&self) -> &TokenRequestConfig {
        &self.config
    }

    /// Scope subsequent requests to a runtime fingerprint
    pub fn set_fingerprint(&mut self, fingerprint: impl Into<String>) {
        self.config.fingerprint = Some(fingerprint.into());
    }

    /// Request the token used to start streaming.
    ///
    /// Any failure is reported as [`StreamError::Auth`]; the caller treats it
    /// as fatal.
    pub async fn request_initial(&self) -> Result<Token> {
        info!("Requesting initial runtime token");
        match self.service.request_token(&self.config).await {
            Ok(token) => {
                info!(
                    "Initial token acquired (expires: {})",
                    token
                        .expires_at()
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                );
                Ok(token)
            }
            Err(e) => {
                error!("Initial token request failed: {:#}", e);
                Err(StreamError::Auth(format!("{:#}", e)).into())
            }
        }
    }

    /// Spawn the refresh worker.
    ///
    /// Every `refresh_interval` a new token is requested and handed to
    /// `on_refresh`. Failures are logged and retried on the next tick; the
    /// previously applied token stays in effect.
    pub fn start_refresh_worker<F>(&mut self, on_refresh: F)
    where
        F: Fn(Token) -> Result<()> + Send + Sync + 'static,
    {
        if self.worker.is_some() {
            warn!("Token refresh worker already running");
            return;
        }

        let service = Arc::clone(&self.service);
        let config = self.config.clone();
        let stop = self.stop.clone();
        let period = config.refresh_interval.max(Duration::from_millis(1));

        let worker = tokio::spawn(async move {
            info!("Token refresh worker started (every {:?})", period);

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    _ = stop.cancelled() => break,
                    result = service.request_token(&config) => result,
                };

                match result {
                    Ok(token) => match on_refresh(token) {
                        Ok(()) => debug!("Token refreshed and set successfully"),
                        Err(e) => error!("Error setting refreshed token: {:#}", e),
                    },
                    Err(e) => warn!("Token refresh failed, retrying next interval: {:#}", e),
                }
            }

            info!("Token refresh worker stopped");
        });

        self.worker = Some(worker);
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| !w.is_finished())
            .unwrap_or(false)
    }

    /// Signal the worker and wait up to `timeout` for it to exit.
    ///
    /// Returns `true` when the worker was observed finished (or never ran).
    pub async fn stop(&mut self, timeout: Duration) -> bool {
        self.stop.cancel();

        let Some(worker) = self.worker.take() else {
            return true;
        };

        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Token refresh worker panicked: {}", e);
                true
            }
            Err(_) => {
                warn!("Token refresh worker did not stop within {:?}", timeout);
                false
            }
        }
    }
}
