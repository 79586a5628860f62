//! Streaming session orchestration
//!
//! `StreamOrchestrator` owns one session end to end:
//! - startup of sinks, command worker, token refresh and audio ingestion
//! - the paced frame loop with audio backpressure
//! - ordered teardown and session statistics

mod config;
mod session;
mod stats;

pub use config::{AudioBackpressure, StreamConfig};
pub use session::StreamOrchestrator;
pub use stats::{StatusHandle, StreamState, StreamStats};
