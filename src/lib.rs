pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod http;
pub mod nats;
pub mod output;
pub mod pacing;
pub mod runtime;
pub mod session;
pub mod token;

pub use audio::{
    AudioChunk, AudioFile, AudioSource, AudioSourceConfig, AudioStreamBatcher, FileAudioSource,
    PaddedAudioFrame,
};
pub use config::Config;
pub use control::{CommandController, ControlMessage, ControllerHandle};
pub use error::StreamError;
pub use http::{create_router, AppState};
pub use nats::NatsClient;
pub use output::{AudioSink, PreviewVideoSink, VideoSink, WavAudioSink};
pub use pacing::FpsController;
pub use runtime::{AvatarRuntime, LoopbackRuntime, RuntimeConfig, VideoFrame};
pub use session::{AudioBackpressure, StreamConfig, StreamOrchestrator, StreamState, StreamStats};
pub use token::{Token, TokenLifecycleManager, TokenService};
