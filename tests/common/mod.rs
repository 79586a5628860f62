// Shared test doubles: a scripted runtime, recording sinks and an event log
//
// Every double appends to the same EventLog so tests can assert on the
// relative order of startup and teardown steps.

#![allow(dead_code)]

use anyhow::{bail, Result};
use avatar_stream::audio::{AudioChunk, AudioSource};
use avatar_stream::output::{AudioSink, VideoSink};
use avatar_stream::runtime::{AvatarRuntime, FrameImage, VideoFrame};
use avatar_stream::token::{Token, TokenRequestConfig, TokenService};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const SAMPLE_RATE: u32 = 16000;

#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.count(event) > 0
    }

    /// Index of the first occurrence of `event`
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    /// Poll until `event` shows up (or give up after `timeout`)
    pub async fn wait_for(&self, event: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.contains(event) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.contains(event)
    }
}

pub fn image(width: u32, height: u32) -> FrameImage {
    FrameImage {
        width,
        height,
        rgb: vec![0; (width * height * 3) as usize],
    }
}

pub fn metadata_frame() -> VideoFrame {
    VideoFrame {
        image: None,
        audio: None,
        frame_index: 0,
        end_of_speech: false,
    }
}

pub fn image_frame(index: u64, audio: Option<AudioChunk>) -> VideoFrame {
    VideoFrame {
        image: Some(image(4, 4)),
        audio,
        frame_index: index,
        end_of_speech: false,
    }
}

/// 40ms chunk whose first sample identifies it
pub fn tagged_chunk(tag: i16) -> AudioChunk {
    let mut samples = vec![0i16; 640];
    samples[0] = tag;
    AudioChunk::new(samples, SAMPLE_RATE, false)
}

/// Mono 16-bit WAV of `duration_ms` silence-ish ramp
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, duration_ms: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let frames = sample_rate as u64 * duration_ms as u64 / 1000;
    for i in 0..frames {
        for _ in 0..channels {
            writer.write_sample(((i % 200) as i16 - 100) * 50)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Runtime that plays a fixed script of frames and records every call
pub struct RecordingRuntime {
    log: EventLog,
    script: Mutex<Option<Vec<VideoFrame>>>,
    keep_open: bool,
    fail_run: bool,
    token: Mutex<Option<Token>>,
    pushed: Mutex<Vec<AudioChunk>>,
    cancel: CancellationToken,
}

impl RecordingRuntime {
    /// Emits `frames` then ends the stream
    pub fn new(log: EventLog, frames: Vec<VideoFrame>) -> Self {
        Self {
            log,
            script: Mutex::new(Some(frames)),
            keep_open: false,
            fail_run: false,
            token: Mutex::new(None),
            pushed: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Emits `frames`, then idle frames until stopped
    pub fn endless(log: EventLog, frames: Vec<VideoFrame>) -> Self {
        Self {
            keep_open: true,
            ..Self::new(log, frames)
        }
    }

    pub fn failing(log: EventLog) -> Self {
        Self {
            fail_run: true,
            ..Self::new(log, Vec::new())
        }
    }

    pub fn pushed(&self) -> Vec<AudioChunk> {
        self.pushed.lock().clone()
    }

    pub fn token(&self) -> Option<Token> {
        self.token.lock().clone()
    }
}

#[async_trait::async_trait]
impl AvatarRuntime for RecordingRuntime {
    async fn run(&self) -> Result<mpsc::Receiver<VideoFrame>> {
        self.log.push("runtime.run");
        if self.fail_run {
            bail!("scripted runtime failure");
        }

        let Some(frames) = self.script.lock().take() else {
            bail!("runtime already started");
        };

        let (tx, rx) = mpsc::channel(2);
        let keep_open = self.keep_open;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut index = frames.len() as u64;
            for frame in frames {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(frame) => if sent.is_err() { return },
                }
            }

            while keep_open {
                index += 1;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(image_frame(index, None)) => if sent.is_err() { return },
                }
            }
        });

        Ok(rx)
    }

    async fn push_audio(&self, chunk: AudioChunk) -> Result<()> {
        self.log.push("runtime.push_audio");
        self.pushed.lock().push(chunk);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.log.push("runtime.flush");
        Ok(())
    }

    async fn interrupt(&self) -> Result<()> {
        self.log.push("runtime.interrupt");
        Ok(())
    }

    fn set_token(&self, token: Token) -> Result<()> {
        self.log.push("runtime.set_token");
        *self.token.lock() = Some(token);
        Ok(())
    }

    fn frame_size(&self) -> (u32, u32) {
        (4, 4)
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.token.lock().as_ref().and_then(|t| t.expires_at())
    }

    fn fingerprint(&self) -> String {
        "recording-runtime".to_string()
    }

    async fn stop(&self) -> Result<()> {
        self.log.push("runtime.stop");
        self.cancel.cancel();
        Ok(())
    }
}

/// Video sink keeping the index of every captured frame
pub struct RecordingVideoSink {
    log: EventLog,
    pub captured: Arc<Mutex<Vec<u64>>>,
    fail: bool,
}

impl RecordingVideoSink {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            captured: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    /// Every capture fails
    pub fn broken(log: EventLog) -> Self {
        Self {
            fail: true,
            ..Self::new(log)
        }
    }
}

#[async_trait::async_trait]
impl VideoSink for RecordingVideoSink {
    async fn start(&mut self) -> Result<()> {
        self.log.push("video.start");
        Ok(())
    }

    async fn capture(
        &mut self,
        frame: VideoFrame,
        _fps: f64,
        _expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if self.fail {
            bail!("display lost");
        }
        self.captured.lock().push(frame.frame_index);
        Ok(())
    }

    fn buffer_empty(&self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push("video.close");
        Ok(())
    }

    fn name(&self) -> &str {
        "recording-video"
    }
}

/// Audio sink whose readiness is controlled by the test
pub struct RecordingAudioSink {
    log: EventLog,
    pub captured: Arc<Mutex<Vec<AudioChunk>>>,
    pub ready: Arc<AtomicBool>,
}

impl RecordingAudioSink {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            captured: Arc::new(Mutex::new(Vec::new())),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A sink whose buffer never drains
    pub fn stalled(log: EventLog) -> Self {
        let sink = Self::new(log);
        sink.ready.store(false, Ordering::SeqCst);
        sink
    }
}

#[async_trait::async_trait]
impl AudioSink for RecordingAudioSink {
    async fn start(&mut self) -> Result<()> {
        self.log.push("audio.start");
        Ok(())
    }

    async fn capture(&mut self, chunk: AudioChunk) -> Result<()> {
        self.captured.lock().push(chunk);
        Ok(())
    }

    fn buffer_empty(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push("audio.close");
        Ok(())
    }

    fn name(&self) -> &str {
        "recording-audio"
    }
}

/// Token service that counts requests and can be switched to failing
pub struct CountingTokenService {
    pub requests: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
}

impl CountingTokenService {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl TokenService for CountingTokenService {
    async fn request_token(&self, config: &TokenRequestConfig) -> Result<Token> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            bail!("token service unavailable");
        }
        let token = Token::new(format!("token-{}", n));
        Ok(match &config.fingerprint {
            Some(fp) => token.with_fingerprint(fp.clone()),
            None => token,
        })
    }
}

/// Live source that stays open until stopped and logs its lifecycle
pub struct RecordingAudioSource {
    log: EventLog,
    sender: Option<mpsc::Sender<AudioChunk>>,
}

impl RecordingAudioSource {
    pub fn new(log: EventLog) -> Self {
        Self { log, sender: None }
    }
}

#[async_trait::async_trait]
impl AudioSource for RecordingAudioSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        self.log.push("source.start");
        let (tx, rx) = mpsc::channel(4);
        self.sender = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.log.push("source.stop");
        self.sender.take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.sender.is_some()
    }

    fn name(&self) -> &str {
        "recording-source"
    }
}
