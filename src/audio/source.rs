use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::chunk::AudioChunk;
use super::file::AudioFile;

/// Configuration for a live audio source
#[derive(Debug, Clone)]
pub struct AudioSourceConfig {
    /// Sample rate the runtime expects (will resample if needed)
    pub target_sample_rate: u32,
    /// Chunk size in milliseconds (affects latency)
    pub chunk_duration_ms: u64,
    /// Channel capacity between the capture task and the consumer
    pub queue_capacity: usize,
}

impl Default for AudioSourceConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            chunk_duration_ms: 20,
            queue_capacity: 32,
        }
    }
}

/// Live audio input feeding the ingestion task
///
/// The receiver closes when the source is exhausted. The final chunk of an
/// utterance is flagged with `last_chunk`.
#[async_trait::async_trait]
pub trait AudioSource: Send {
    /// Start capturing audio
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Streams an audio file in real time, as if it were a microphone
pub struct FileAudioSource {
    path: PathBuf,
    config: AudioSourceConfig,
    task: Option<JoinHandle<()>>,
}

impl FileAudioSource {
    pub fn new(path: impl Into<PathBuf>, config: AudioSourceConfig) -> Self {
        Self {
            path: path.into(),
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioSource for FileAudioSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.task.is_some() {
            bail!("Already capturing");
        }

        let path = self.path.clone();
        let sample_rate = self.config.target_sample_rate;
        let samples = tokio::task::spawn_blocking(move || {
            AudioFile::open(&path)?.to_mono(sample_rate)
        })
        .await??;

        let chunk_len = ((sample_rate as u64 * self.config.chunk_duration_ms) / 1000).max(1) as usize;
        let chunk_interval = Duration::from_millis(self.config.chunk_duration_ms.max(1));
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));

        info!(
            "Streaming {} live ({} samples, {}ms chunks)",
            self.path.display(),
            samples.len(),
            self.config.chunk_duration_ms
        );

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(chunk_interval);
            let total = samples.len().div_ceil(chunk_len);

            for (i, part) in samples.chunks(chunk_len).enumerate() {
                ticker.tick().await;
                let chunk = AudioChunk::new(part.to_vec(), sample_rate, i + 1 == total);
                if tx.send(chunk).await.is_err() {
                    debug!("File source receiver dropped");
                    return;
                }
            }

            debug!("File source exhausted");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("File audio source stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "file"
    }
}
