use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::audio::AudioChunk;

/// Command for the runtime, consumed exactly once in FIFO order
///
/// JSON form: `{"type":"push_audio","path":"speech.wav"}`, `{"type":"interrupt"}`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Load an audio file and play it as one utterance
    PushAudio { path: PathBuf },
    /// Push live audio as is (ingestion only)
    #[serde(skip)]
    PushPcm(AudioChunk),
    /// Mark end of speech
    Flush,
    /// Drop all queued playback
    Interrupt,
    /// Exit the worker
    Stop,
}

impl ControlMessage {
    pub fn push_audio(path: impl Into<PathBuf>) -> Self {
        ControlMessage::PushAudio { path: path.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::PushAudio { .. } => "push_audio",
            ControlMessage::PushPcm(_) => "push_pcm",
            ControlMessage::Flush => "flush",
            ControlMessage::Interrupt => "interrupt",
            ControlMessage::Stop => "stop",
        }
    }
}
