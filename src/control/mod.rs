//! Serialized control of the runtime
//!
//! Every mutating runtime call (`push_audio`, `flush`, `interrupt`) goes
//! through one [`CommandController`] worker, in arrival order. Producers
//! (HTTP handlers, NATS subscriptions, the ingestion task, the CLI) hold a
//! cheap [`ControllerHandle`].

mod controller;
mod messages;

pub use controller::{CommandController, ControllerHandle};
pub use messages::ControlMessage;
