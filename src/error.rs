//! Error taxonomy for the streaming engine.
//!
//! Plumbing code returns `anyhow::Result` with context attached; the variants
//! below are the conditions callers are expected to tell apart, and can be
//! recovered from an `anyhow::Error` with `downcast_ref::<StreamError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Runtime creation failed. Fatal to startup.
    #[error("runtime initialisation failed: {0}")]
    Init(String),

    /// Token service rejected the request. Fatal only for the initial request.
    #[error("token request rejected: {0}")]
    Auth(String),

    /// A padded frame claims more valid samples than it physically holds.
    #[error("invalid audio frame: {valid} valid samples exceed frame length {len}")]
    InvalidFrame { valid: usize, len: usize },

    /// A chunk does not match the batcher's audio format.
    #[error("audio format mismatch: expected {expected_rate}Hz/{expected_channels}ch, got {actual_rate}Hz/{actual_channels}ch")]
    SampleRateMismatch {
        expected_rate: u32,
        expected_channels: u16,
        actual_rate: u32,
        actual_channels: u16,
    },

    /// The command queue no longer accepts messages (shutdown in progress).
    #[error("command controller is closed")]
    ControllerClosed,

    /// Output sink failure.
    #[error("sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}
