use super::config::{AudioBackpressure, StreamConfig};
use super::stats::{StatusHandle, StreamState, StreamStats};
use crate::audio::{AudioChunk, AudioSource, AudioStreamBatcher};
use crate::control::{CommandController, ControlMessage, ControllerHandle};
use crate::error::StreamError;
use crate::output::{AudioSink, VideoSink};
use crate::pacing::FpsController;
use crate::runtime::{AvatarRuntime, VideoFrame};
use crate::token::TokenLifecycleManager;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the streaming loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    RuntimeEnded,
    MaxFrames,
}

enum Readiness {
    Ready,
    TimedOut,
    Cancelled,
}

/// Background units started in `Starting`, torn down in `Draining`
#[derive(Default)]
struct Workers {
    ingest: Option<(JoinHandle<()>, CancellationToken)>,
    command: Option<JoinHandle<()>>,
}

/// Drives one streaming session from startup to teardown
///
/// Pulls frames from the runtime, paces them with an [`FpsController`],
/// hands images to the video sink and audio to the audio sink (respecting
/// its backpressure), and owns the ordered shutdown of every background
/// unit it started.
pub struct StreamOrchestrator {
    config: StreamConfig,
    runtime: Arc<dyn AvatarRuntime>,
    video_sink: Box<dyn VideoSink>,
    audio_sink: Box<dyn AudioSink>,
    audio_source: Option<Box<dyn AudioSource>>,
    token_manager: Option<TokenLifecycleManager>,
    controller: Option<CommandController>,
    controller_handle: ControllerHandle,
    cancel: CancellationToken,
    state_tx: watch::Sender<StreamState>,
    status: StatusHandle,
    fps: FpsController,
    pending_audio: VecDeque<AudioChunk>,
    sink_error_streak: u32,
}

impl StreamOrchestrator {
    pub fn new(
        config: StreamConfig,
        runtime: Arc<dyn AvatarRuntime>,
        video_sink: Box<dyn VideoSink>,
        audio_sink: Box<dyn AudioSink>,
    ) -> Self {
        let controller = CommandController::new(Arc::clone(&runtime));
        let controller_handle = controller.handle();
        let (state_tx, _) = watch::channel(StreamState::Idle);
        let status = StatusHandle::new(StreamStats::new(config.session_id.clone()));
        let fps = FpsController::new(config.target_fps);

        Self {
            config,
            runtime,
            video_sink,
            audio_sink,
            audio_source: None,
            token_manager: None,
            controller: Some(controller),
            controller_handle,
            cancel: CancellationToken::new(),
            state_tx,
            status,
            fps,
            pending_audio: VecDeque::new(),
            sink_error_streak: 0,
        }
    }

    /// Ingest live audio from `source` while streaming
    pub fn with_audio_source(mut self, source: Box<dyn AudioSource>) -> Self {
        self.audio_source = Some(source);
        self
    }

    /// Run the token refresh worker for the lifetime of the session
    pub fn with_token_refresh(mut self, manager: TokenLifecycleManager) -> Self {
        self.token_manager = Some(manager);
        self
    }

    /// Queue for control messages; usable before `run` starts
    pub fn controller(&self) -> ControllerHandle {
        self.controller_handle.clone()
    }

    /// Cancelling this token ends the session gracefully
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    /// Run the session to completion.
    ///
    /// Teardown always runs. An error raised while starting or streaming is
    /// returned only after every teardown step has been attempted.
    pub async fn run(mut self) -> Result<StreamStats> {
        info!("Starting stream session: {}", self.config.session_id);

        let mut workers = Workers::default();
        let outcome = match self.start(&mut workers).await {
            Ok(frames) => {
                self.set_state(StreamState::Streaming);
                self.status.update(|s| s.started_at = Some(Utc::now()));
                self.stream(frames).await
            }
            Err(e) => Err(e),
        };

        self.set_state(StreamState::Draining);
        self.drain(workers).await;
        self.set_state(StreamState::Stopped);

        let stats = self.status.snapshot();
        match outcome {
            Ok(reason) => {
                info!(
                    "Stream session {} stopped ({:?}): {} frames, {:.1} fps average",
                    self.config.session_id, reason, stats.video_frames, stats.average_fps
                );
                Ok(stats)
            }
            Err(e) => {
                error!("Stream session {} failed: {:#}", self.config.session_id, e);
                Err(e)
            }
        }
    }

    fn set_state(&self, state: StreamState) {
        debug!("Stream state -> {:?}", state);
        self.state_tx.send_replace(state);
        self.status.set_state(state);
    }

    /// Bring up sinks, then workers, then the runtime
    async fn start(&mut self, workers: &mut Workers) -> Result<mpsc::Receiver<VideoFrame>> {
        self.set_state(StreamState::Starting);

        self.video_sink
            .start()
            .await
            .with_context(|| format!("Failed to start video sink '{}'", self.video_sink.name()))?;
        self.audio_sink
            .start()
            .await
            .with_context(|| format!("Failed to start audio sink '{}'", self.audio_sink.name()))?;

        if let Some(controller) = self.controller.take() {
            workers.command = Some(controller.spawn());
        }

        if let Some(manager) = self.token_manager.as_mut() {
            let runtime = Arc::clone(&self.runtime);
            manager.start_refresh_worker(move |token| runtime.set_token(token));
        }

        if let Some(source) = self.audio_source.take() {
            let cancel = self.cancel.child_token();
            let handle = tokio::spawn(ingest_audio(
                source,
                self.controller_handle.clone(),
                self.runtime.sample_rate(),
                cancel.clone(),
            ));
            workers.ingest = Some((handle, cancel));
        }

        self.runtime.run().await.context("Failed to start runtime")
    }

    async fn stream(&mut self, mut frames: mpsc::Receiver<VideoFrame>) -> Result<StopReason> {
        let mut received = 0u64;
        let mut paced = 0u64;

        loop {
            if let Some(max) = self.config.max_frames {
                if paced >= max {
                    return Ok(StopReason::MaxFrames);
                }
            }

            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(StopReason::Cancelled),
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => return Ok(StopReason::RuntimeEnded),
                },
            };
            received += 1;
            self.status.update(|s| s.frames_received = received);

            let is_metadata = frame.is_metadata();
            if !self.handle_frame(frame).await? {
                return Ok(StopReason::Cancelled);
            }
            if !is_metadata {
                paced += 1;
            }
        }
    }

    /// Pace and deliver one frame. Returns `false` if cancelled midway.
    async fn handle_frame(&mut self, mut frame: VideoFrame) -> Result<bool> {
        if frame.is_metadata() {
            debug!("Received metadata frame #{}", frame.frame_index);
            self.status.update(|s| s.metadata_frames += 1);
            return Ok(true);
        }

        let sleep = self.fps.wait_next_frame();
        if !sleep.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        let audio = frame.audio.take();

        if frame.has_image() {
            let fps = self.fps.average_fps();
            let expires_at = self.runtime.expiration_time();
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(false),
                result = self.video_sink.capture(frame, fps, expires_at) => result,
            };
            match result {
                Ok(()) => {
                    self.sink_error_streak = 0;
                    self.status.update(|s| s.video_frames += 1);
                }
                Err(e) => self.record_sink_error(self.video_sink.name().to_string(), e)?,
            }
        }

        let delivered = match audio {
            Some(chunk) => self.deliver_audio(chunk).await?,
            // backlog goes out as soon as the sink has room again
            None if !self.pending_audio.is_empty() && self.audio_sink.buffer_empty() => {
                self.flush_pending_audio().await?
            }
            None => true,
        };
        if !delivered {
            return Ok(false);
        }

        self.fps.update();
        let average_fps = self.fps.average_fps();
        let token_expires_at = self.runtime.expiration_time();
        self.status.update(|s| {
            s.average_fps = average_fps;
            s.token_expires_at = token_expires_at;
        });

        Ok(true)
    }

    /// Queue `chunk` for the audio sink and deliver whatever the sink can take.
    ///
    /// Only this frame's delivery waits on the sink; control messages keep
    /// flowing on the command worker meanwhile.
    async fn deliver_audio(&mut self, chunk: AudioChunk) -> Result<bool> {
        self.pending_audio.push_back(chunk);

        let readiness = match self.config.backpressure {
            AudioBackpressure::Wait => self.wait_audio_ready(None).await,
            AudioBackpressure::WaitThenDropOldest { timeout_ms, .. } => {
                self.wait_audio_ready(Some(Duration::from_millis(timeout_ms)))
                    .await
            }
            AudioBackpressure::Drop => {
                if self.audio_sink.buffer_empty() {
                    Readiness::Ready
                } else {
                    Readiness::TimedOut
                }
            }
        };

        match readiness {
            Readiness::Cancelled => return Ok(false),
            Readiness::Ready => return self.flush_pending_audio().await,
            Readiness::TimedOut => {
                let keep = match self.config.backpressure {
                    AudioBackpressure::WaitThenDropOldest { max_pending, .. } => max_pending,
                    AudioBackpressure::Wait => usize::MAX,
                    AudioBackpressure::Drop => 0,
                };
                let mut dropped = 0u64;
                while self.pending_audio.len() > keep {
                    self.pending_audio.pop_front();
                    dropped += 1;
                }
                if dropped > 0 {
                    warn!(
                        "Audio sink '{}' backpressured, dropped {} chunk(s)",
                        self.audio_sink.name(),
                        dropped
                    );
                    self.status.update(|s| s.audio_chunks_dropped += dropped);
                }
            }
        }

        Ok(true)
    }

    /// Deliver pending chunks oldest first while the sink has room.
    ///
    /// The caller has already seen the sink ready, so at least one chunk goes out.
    async fn flush_pending_audio(&mut self) -> Result<bool> {
        let mut first = true;
        while first || self.audio_sink.buffer_empty() {
            let Some(next) = self.pending_audio.pop_front() else {
                break;
            };
            first = false;

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(false),
                result = self.audio_sink.capture(next) => result,
            };
            match result {
                Ok(()) => {
                    self.sink_error_streak = 0;
                    self.status.update(|s| s.audio_chunks_delivered += 1);
                }
                Err(e) => self.record_sink_error(self.audio_sink.name().to_string(), e)?,
            }
        }
        Ok(true)
    }

    async fn wait_audio_ready(&mut self, limit: Option<Duration>) -> Readiness {
        let deadline = limit.map(|d| Instant::now() + d);
        let poll = self.config.ready_poll();

        loop {
            if self.audio_sink.buffer_empty() {
                return Readiness::Ready;
            }

            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Readiness::TimedOut;
                    }
                    poll.min(deadline - now)
                }
                None => poll,
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return Readiness::Cancelled,
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    /// Count a transient sink failure.
    ///
    /// The frame is dropped and streaming continues, unless a consecutive
    /// failure limit is configured and has been reached.
    fn record_sink_error(&mut self, sink: String, e: anyhow::Error) -> Result<()> {
        self.sink_error_streak += 1;
        self.status.update(|s| s.sink_errors += 1);
        warn!("Sink '{}' failed, frame dropped: {:#}", sink, e);

        let Some(limit) = self.config.max_consecutive_sink_errors else {
            return Ok(());
        };
        if self.sink_error_streak >= limit.max(1) {
            return Err(StreamError::Sink {
                sink,
                message: format!("{} consecutive failures, last: {:#}", self.sink_error_streak, e),
            }
            .into());
        }
        Ok(())
    }

    /// Ordered, best-effort teardown
    async fn drain(&mut self, workers: Workers) {
        let timeout = self.config.teardown_timeout();

        if let Some((mut handle, cancel)) = workers.ingest {
            cancel.cancel();
            join_bounded("audio ingestion", &mut handle, timeout).await;
        }

        match workers.command {
            Some(mut handle) => {
                if let Err(e) = self.controller_handle.push(ControlMessage::Stop) {
                    debug!("Command worker already gone: {}", e);
                }
                join_bounded("command worker", &mut handle, timeout).await;
            }
            None => {
                // never started; dropping it closes the queue
                self.controller.take();
            }
        }

        if let Some(manager) = self.token_manager.as_mut() {
            manager.stop(timeout).await;
        }

        if !self.pending_audio.is_empty() {
            debug!("Discarding {} undelivered audio chunks", self.pending_audio.len());
            self.pending_audio.clear();
        }

        if let Err(e) = self.video_sink.close().await {
            error!("Failed to close video sink '{}': {:#}", self.video_sink.name(), e);
        }
        if let Err(e) = self.audio_sink.close().await {
            error!("Failed to close audio sink '{}': {:#}", self.audio_sink.name(), e);
        }

        if let Err(e) = self.runtime.stop().await {
            error!("Failed to stop runtime: {:#}", e);
        }

        info!("Stream session {} drained", self.config.session_id);
    }
}

/// Wait up to `timeout` for a task; abort it if it does not finish
async fn join_bounded(name: &str, handle: &mut JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut *handle).await {
        Ok(Ok(())) => info!("{} stopped", name),
        Ok(Err(e)) => error!("{} panicked: {}", name, e),
        Err(_) => {
            warn!("{} did not stop within {:?}, aborting", name, timeout);
            handle.abort();
        }
    }
}

/// Forward live audio to the command worker as 10ms chunks.
///
/// Runs until the source is exhausted, the controller closes, or `cancel`
/// fires. The source is always stopped on the way out.
async fn ingest_audio(
    mut source: Box<dyn AudioSource>,
    controller: ControllerHandle,
    sample_rate: u32,
    cancel: CancellationToken,
) {
    let rx = match source.start().await {
        Ok(rx) => rx,
        Err(e) => {
            error!("Failed to start audio source '{}': {:#}", source.name(), e);
            return;
        }
    };

    info!("Audio ingestion started from '{}'", source.name());

    match AudioStreamBatcher::with_frame_samples(sample_rate, 1, (sample_rate / 100).max(1) as usize) {
        Ok(batcher) => pump_audio(rx, batcher, &controller, &cancel).await,
        Err(e) => error!("Cannot frame ingested audio: {:#}", e),
    }

    if let Err(e) = source.stop().await {
        warn!("Failed to stop audio source '{}': {:#}", source.name(), e);
    }
}

async fn pump_audio(
    mut rx: mpsc::Receiver<AudioChunk>,
    mut batcher: AudioStreamBatcher,
    controller: &ControllerHandle,
    cancel: &CancellationToken,
) {
    let mut utterance_open = false;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Audio ingestion cancelled");
                return;
            }
            chunk = rx.recv() => chunk,
        };

        let frames = match batcher.push(chunk.as_ref()) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Dropping ingested audio: {:#}", e);
                Vec::new()
            }
        };
        utterance_open |= !frames.is_empty();

        // a closed source ends any open utterance
        let end_of_speech = match &chunk {
            Some(chunk) => chunk.last_chunk,
            None => utterance_open,
        };

        if let Err(e) = forward_frames(controller, &frames, end_of_speech) {
            debug!("Stopping ingestion: {}", e);
            return;
        }
        if end_of_speech {
            utterance_open = false;
        }

        if chunk.is_none() {
            info!("Audio source exhausted");
            return;
        }
    }
}

fn forward_frames(
    controller: &ControllerHandle,
    frames: &[crate::audio::PaddedAudioFrame],
    end_of_speech: bool,
) -> Result<(), StreamError> {
    for frame in frames {
        match frame.to_chunk() {
            Ok(mut chunk) => {
                chunk.last_chunk = false;
                controller.push(ControlMessage::PushPcm(chunk))?;
            }
            Err(e) => error!("Malformed ingested frame: {:#}", e),
        }
    }

    if end_of_speech {
        controller.push(ControlMessage::Flush)?;
    }
    Ok(())
}
