pub mod batcher;
pub mod chunk;
pub mod file;
pub mod source;

pub use batcher::{frame_samples_for, AudioStreamBatcher, PaddedAudioFrame};
pub use chunk::{f32_to_i16, AudioChunk};
pub use file::AudioFile;
pub use source::{AudioSource, AudioSourceConfig, FileAudioSource};
