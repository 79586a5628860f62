//! HTTP API for controlling a running stream
//!
//! - GET /health - Health check
//! - GET /status - Session statistics
//! - POST /control/push-audio - Play an audio file as one utterance
//! - POST /control/interrupt - Drop queued playback
//! - POST /control/flush - Mark end of speech
//! - POST /control/stop - Stop the session

mod handlers;
mod routes;
mod state;

pub use handlers::{CommandResponse, ErrorResponse, PushAudioRequest};
pub use routes::create_router;
pub use state::AppState;
