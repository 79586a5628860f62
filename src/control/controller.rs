use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::ControlMessage;
use crate::audio::{AudioChunk, AudioFile, AudioStreamBatcher};
use crate::error::StreamError;
use crate::runtime::AvatarRuntime;

/// Re-chunking granularity for file playback (10ms)
const CHUNKS_PER_SECOND: u32 = 100;

/// Producer side of the command queue
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControllerHandle {
    /// Enqueue a message. Never blocks.
    ///
    /// Fails with [`StreamError::ControllerClosed`] once the worker has exited.
    pub fn push(&self, msg: ControlMessage) -> Result<(), StreamError> {
        self.tx
            .send(msg)
            .map_err(|_| StreamError::ControllerClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Single worker executing control messages against the runtime
pub struct CommandController {
    runtime: Arc<dyn AvatarRuntime>,
    tx: mpsc::UnboundedSender<ControlMessage>,
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

impl CommandController {
    pub fn new(runtime: Arc<dyn AvatarRuntime>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { runtime, tx, rx }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run the worker on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process messages until `Stop` (or every handle is dropped)
    pub async fn run(self) {
        let CommandController { runtime, tx, mut rx } = self;
        // only external handles keep the queue open from here on
        drop(tx);

        info!("Command worker started");
        let mut processed = 0u64;

        while let Some(msg) = rx.recv().await {
            let kind = msg.kind();
            if matches!(msg, ControlMessage::Stop) {
                debug!("Stop received");
                break;
            }

            if let Err(e) = execute(runtime.as_ref(), msg).await {
                error!("Command '{}' failed: {:#}", kind, e);
            }
            processed += 1;
        }

        rx.close();
        let dropped = std::iter::from_fn(|| rx.try_recv().ok()).count();
        if dropped > 0 {
            warn!("Command worker exiting with {} unprocessed messages", dropped);
        }
        info!("Command worker stopped ({} commands processed)", processed);
    }
}

async fn execute(runtime: &dyn AvatarRuntime, msg: ControlMessage) -> Result<()> {
    match msg {
        ControlMessage::PushAudio { path } => push_audio_file(runtime, &path).await,
        ControlMessage::PushPcm(chunk) => runtime.push_audio(chunk).await,
        ControlMessage::Flush => runtime.flush().await,
        ControlMessage::Interrupt => {
            info!("Interrupting playback");
            runtime.interrupt().await
        }
        ControlMessage::Stop => Ok(()),
    }
}

/// Decode a file and stream it to the runtime as one utterance
async fn push_audio_file(runtime: &dyn AvatarRuntime, path: &Path) -> Result<()> {
    let sample_rate = runtime.sample_rate();
    let owned = path.to_path_buf();
    let samples =
        tokio::task::spawn_blocking(move || AudioFile::open(&owned)?.to_mono(sample_rate))
            .await??;

    let chunk_samples = (sample_rate / CHUNKS_PER_SECOND).max(1) as usize;
    let mut batcher = AudioStreamBatcher::with_frame_samples(sample_rate, 1, chunk_samples)?;

    let whole = AudioChunk::new(samples, sample_rate, false);
    let mut frames = batcher.push(Some(&whole))?;
    frames.extend(batcher.push(None)?);

    info!(
        "Pushing {} ({:.2}s, {} chunks)",
        path.display(),
        whole.duration().as_secs_f64(),
        frames.len()
    );

    for frame in &frames {
        let samples = AudioStreamBatcher::unpad(frame)?.to_vec();
        runtime
            .push_audio(AudioChunk::new(samples, sample_rate, false))
            .await?;
    }

    // end of speech
    runtime.flush().await
}
