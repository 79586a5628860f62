use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::queue::PlaybackQueue;
use super::AudioSink;
use crate::audio::AudioChunk;

type Writer = hound::WavWriter<BufWriter<File>>;

/// Audio "speaker" that records what it plays to a WAV file
///
/// Chunks are played back at real time when `realtime` is set, so the
/// buffer fills up exactly like a device buffer would.
pub struct WavAudioSink {
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    buffer_size: usize,
    realtime: bool,
    queue: Option<PlaybackQueue<AudioChunk>>,
    writer: Arc<Mutex<Option<Writer>>>,
}

impl WavAudioSink {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, channels: u16, buffer_size: usize) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            channels,
            buffer_size,
            realtime: true,
            queue: None,
            writer: Arc::new(Mutex::new(None)),
        }
    }

    /// Play chunks as fast as they arrive instead of at real time
    pub fn without_realtime(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait::async_trait]
impl AudioSink for WavAudioSink {
    async fn start(&mut self) -> Result<()> {
        if self.queue.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create audio output directory")?;
        }

        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&self.path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", self.path))?;
        *self.writer.lock() = Some(writer);

        let play_writer = Arc::clone(&self.writer);
        let finish_writer = Arc::clone(&self.writer);
        let realtime = self.realtime;
        let path = self.path.clone();

        self.queue = Some(PlaybackQueue::spawn(
            self.buffer_size,
            move |chunk: AudioChunk| {
                let writer = Arc::clone(&play_writer);
                async move {
                    {
                        let mut guard = writer.lock();
                        if let Some(writer) = guard.as_mut() {
                            for &sample in &chunk.samples {
                                writer
                                    .write_sample(sample)
                                    .context("Failed to write sample to WAV")?;
                            }
                        }
                    }
                    if realtime {
                        tokio::time::sleep(chunk.duration()).await;
                    }
                    Ok(())
                }
            },
            move || {
                if let Some(writer) = finish_writer.lock().take() {
                    writer.finalize().context("Failed to finalize WAV file")?;
                }
                info!("Audio written to {}", path.display());
                Ok(())
            },
        ));

        info!(
            "Audio sink started: {} ({}Hz, {} channels, buffer {})",
            self.path.display(),
            self.sample_rate,
            self.channels,
            self.buffer_size
        );
        Ok(())
    }

    async fn capture(&mut self, chunk: AudioChunk) -> Result<()> {
        let Some(queue) = &self.queue else {
            bail!("Audio sink is not started");
        };

        if chunk.sample_rate != self.sample_rate || chunk.channels != self.channels {
            bail!(
                "Chunk format {}Hz/{}ch does not match sink {}Hz/{}ch",
                chunk.sample_rate,
                chunk.channels,
                self.sample_rate,
                self.channels
            );
        }

        queue.push(chunk).await
    }

    fn buffer_empty(&self) -> bool {
        self.queue.as_ref().map(|q| q.has_room()).unwrap_or(false)
    }

    async fn close(&mut self) -> Result<()> {
        match self.queue.take() {
            Some(mut queue) => queue.close().await,
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "wav"
    }
}

impl Drop for WavAudioSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.lock().take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
