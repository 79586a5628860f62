use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::overlay::render_overlay;
use super::queue::PlaybackQueue;
use super::VideoSink;
use crate::runtime::VideoFrame;

struct Presented {
    frame: VideoFrame,
    fps: f64,
    expires_at: Option<DateTime<Utc>>,
}

/// Headless preview "window"
///
/// Presents frames from a small buffer and logs the overlay line once per
/// `log_every` frames.
pub struct PreviewVideoSink {
    window_size: (u32, u32),
    buffer_size: usize,
    present_delay: Duration,
    log_every: u64,
    queue: Option<PlaybackQueue<Presented>>,
    presented: Arc<AtomicU64>,
    last_overlay: Arc<Mutex<String>>,
}

impl PreviewVideoSink {
    pub fn new(window_size: (u32, u32), buffer_size: usize) -> Self {
        Self {
            window_size,
            buffer_size,
            present_delay: Duration::ZERO,
            log_every: 25,
            queue: None,
            presented: Arc::new(AtomicU64::new(0)),
            last_overlay: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Simulated display latency per frame
    pub fn with_present_delay(mut self, delay: Duration) -> Self {
        self.present_delay = delay;
        self
    }

    pub fn with_log_every(mut self, frames: u64) -> Self {
        self.log_every = frames.max(1);
        self
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }

    pub fn last_overlay(&self) -> String {
        self.last_overlay.lock().clone()
    }
}

#[async_trait::async_trait]
impl VideoSink for PreviewVideoSink {
    async fn start(&mut self) -> Result<()> {
        if self.queue.is_some() {
            return Ok(());
        }

        let presented = Arc::clone(&self.presented);
        let last_overlay = Arc::clone(&self.last_overlay);
        let delay = self.present_delay;
        let log_every = self.log_every;
        let started = Instant::now();
        let (width, height) = self.window_size;

        self.queue = Some(PlaybackQueue::spawn(
            self.buffer_size,
            move |item: Presented| {
                let presented = Arc::clone(&presented);
                let last_overlay = Arc::clone(&last_overlay);
                async move {
                    if let Some(image) = &item.frame.image {
                        if image.width != width || image.height != height {
                            debug!(
                                "Scaling {}x{} frame into {}x{} window",
                                image.width, image.height, width, height
                            );
                        }
                    }

                    let overlay =
                        render_overlay(item.fps, started.elapsed(), item.expires_at, Utc::now());
                    let count = presented.fetch_add(1, Ordering::SeqCst) + 1;
                    if count % log_every == 0 {
                        info!("[frame {}] {}", item.frame.frame_index, overlay);
                    }
                    *last_overlay.lock() = overlay;

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(())
                }
            },
            || Ok(()),
        ));

        info!(
            "Video preview started ({}x{}, buffer {})",
            width, height, self.buffer_size
        );
        Ok(())
    }

    async fn capture(
        &mut self,
        frame: VideoFrame,
        fps: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let Some(queue) = &self.queue else {
            bail!("Video sink is not started");
        };
        queue
            .push(Presented {
                frame,
                fps,
                expires_at,
            })
            .await
    }

    fn buffer_empty(&self) -> bool {
        self.queue.as_ref().map(|q| q.has_room()).unwrap_or(false)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut queue) = self.queue.take() {
            queue.close().await?;
            info!("Video preview closed after {} frames", self.frames_presented());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "preview"
    }
}
