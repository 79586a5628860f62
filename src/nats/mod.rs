pub mod bridge;
pub mod client;
pub mod messages;

pub use bridge::spawn_bridge;
pub use client::NatsClient;
pub use messages::{control_subject, status_subject, StatusMessage};
