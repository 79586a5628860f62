use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{AvatarRuntime, FrameImage, RuntimeConfig, TokenCell, VideoFrame};
use crate::audio::{AudioChunk, AudioStreamBatcher, PaddedAudioFrame};
use crate::error::StreamError;
use crate::token::Token;

const BACKGROUND: [u8; 3] = [28, 30, 38];
const FACE: [u8; 3] = [214, 178, 150];
const MOUTH: [u8; 3] = [120, 30, 40];

/// Reference runtime that animates a placeholder face from the audio level.
///
/// Pushed audio is cut into one chunk per frame and played back in order;
/// with nothing queued it produces idle frames without audio.
pub struct LoopbackRuntime {
    config: RuntimeConfig,
    fingerprint: String,
    token: TokenCell,
    shared: Arc<Mutex<Playback>>,
    started: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Playback {
    batcher: AudioStreamBatcher,
    queue: VecDeque<PaddedAudioFrame>,
}

impl LoopbackRuntime {
    pub fn create(config: RuntimeConfig) -> Result<Self> {
        let metadata = std::fs::metadata(&config.model_path).map_err(|e| {
            StreamError::Init(format!(
                "cannot open model {}: {}",
                config.model_path.display(),
                e
            ))
        })?;
        if !metadata.is_file() {
            return Err(StreamError::Init(format!(
                "model path is not a file: {}",
                config.model_path.display()
            ))
            .into());
        }

        if config.frame_width == 0 || config.frame_height == 0 {
            return Err(StreamError::Init(format!(
                "invalid frame size {}x{}",
                config.frame_width, config.frame_height
            ))
            .into());
        }

        let batcher = AudioStreamBatcher::new(config.sample_rate, config.fps)
            .map_err(|e| StreamError::Init(format!("{:#}", e)))?;

        let mut hasher = DefaultHasher::new();
        config.model_path.hash(&mut hasher);
        metadata.len().hash(&mut hasher);
        let fingerprint = format!("{:016x}", hasher.finish());

        info!(
            "Loopback runtime created: model={}, {}x{}, {}Hz @ {} fps, fingerprint={}",
            config.model_path.display(),
            config.frame_width,
            config.frame_height,
            config.sample_rate,
            config.fps,
            fingerprint
        );

        Ok(Self {
            config,
            fingerprint,
            token: TokenCell::default(),
            shared: Arc::new(Mutex::new(Playback {
                batcher,
                queue: VecDeque::new(),
            })),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Frames of audio waiting to be played
    pub fn queued_frames(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

#[async_trait::async_trait]
impl AvatarRuntime for LoopbackRuntime {
    async fn run(&self) -> Result<mpsc::Receiver<VideoFrame>> {
        if self.token.get().is_none() {
            return Err(StreamError::Auth("no runtime token set".to_string()).into());
        }
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("Runtime already started; create a new instance to run again");
        }

        let (tx, rx) = mpsc::channel(self.config.output_capacity.max(1));
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let (width, height) = (self.config.frame_width, self.config.frame_height);

        let task = tokio::spawn(async move {
            info!("Loopback runtime generating frames");

            let mut frame = VideoFrame {
                image: None,
                audio: None,
                frame_index: 0,
                end_of_speech: false,
            };
            let mut index = 0u64;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(frame) => {
                        if sent.is_err() {
                            debug!("Frame receiver dropped");
                            break;
                        }
                    }
                }

                index += 1;
                let next = shared.lock().queue.pop_front();
                frame = match next {
                    Some(padded) => {
                        let audio = match padded.to_chunk() {
                            Ok(chunk) => Some(chunk),
                            Err(e) => {
                                error!("Dropping malformed audio frame: {:#}", e);
                                None
                            }
                        };
                        let level = audio.as_ref().map(AudioChunk::rms).unwrap_or(0.0);
                        VideoFrame {
                            image: Some(render_face(width, height, level)),
                            audio,
                            frame_index: index,
                            end_of_speech: padded.end_of_utterance,
                        }
                    }
                    None => VideoFrame {
                        image: Some(render_face(width, height, 0.0)),
                        audio: None,
                        frame_index: index,
                        end_of_speech: false,
                    },
                };
            }

            info!("Loopback runtime stopped after {} frames", index);
        });

        *self.task.lock() = Some(task);
        Ok(rx)
    }

    async fn push_audio(&self, chunk: AudioChunk) -> Result<()> {
        let mut playback = self.shared.lock();
        let frames = playback.batcher.push(Some(&chunk))?;
        playback.queue.extend(frames);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut playback = self.shared.lock();
        let frames = playback.batcher.push(None)?;
        if frames.is_empty() {
            if let Some(last) = playback.queue.back_mut() {
                last.end_of_utterance = true;
            }
        }
        playback.queue.extend(frames);
        Ok(())
    }

    async fn interrupt(&self) -> Result<()> {
        let mut playback = self.shared.lock();
        let dropped = playback.queue.len();
        playback.queue.clear();
        playback.batcher.reset();
        info!("Interrupted playback ({} queued frames dropped)", dropped);
        Ok(())
    }

    fn set_token(&self, token: Token) -> Result<()> {
        self.token.replace(token);
        Ok(())
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.config.frame_width, self.config.frame_height)
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.token.expires_at()
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Loopback generator panicked: {}", e);
            }
            info!("Loopback runtime stopped");
        }
        Ok(())
    }
}

/// Placeholder face whose mouth opens with the audio level
fn render_face(width: u32, height: u32, level: f32) -> FrameImage {
    let (w, h) = (width as usize, height as usize);
    let mut rgb = vec![0u8; w * h * 3];

    let (cx, cy) = (w / 2, h / 2);
    let radius = (w.min(h) * 2 / 5) as i64;
    let mouth_half_w = w / 8;
    let mouth_half_h = 1 + ((h / 12) as f32 * level.clamp(0.0, 1.0).sqrt()) as usize;
    let mouth_cy = cy + h / 6;

    for y in 0..h {
        for x in 0..w {
            let dx = x as i64 - cx as i64;
            let dy = y as i64 - cy as i64;
            let in_mouth = x + mouth_half_w >= cx
                && x <= cx + mouth_half_w
                && y + mouth_half_h >= mouth_cy
                && y <= mouth_cy + mouth_half_h;

            let color = if in_mouth {
                MOUTH
            } else if dx * dx + dy * dy <= radius * radius {
                FACE
            } else {
                BACKGROUND
            };

            let offset = (y * w + x) * 3;
            rgb[offset..offset + 3].copy_from_slice(&color);
        }
    }

    FrameImage { width, height, rgb }
}
