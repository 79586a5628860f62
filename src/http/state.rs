use crate::control::ControllerHandle;
use crate::session::StatusHandle;
use tokio_util::sync::CancellationToken;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Command queue of the running session
    pub controller: ControllerHandle,

    /// Live session statistics
    pub status: StatusHandle,

    /// Cancels the running session
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(controller: ControllerHandle, status: StatusHandle, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            status,
            shutdown,
        }
    }
}
