//! Common error types for mkhook-platform.

use mkhook_core::{HookError, Scope};
use thiserror::Error;

/// Platform-level errors.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to install {0} hook")]
    HookInstall(&'static str),
    #[error("failed to spawn hook thread: {0}")]
    ThreadSpawn(String),
    #[error("hook thread exited before reporting readiness")]
    HookThreadExited,
    #[error("global listener unavailable: {0}")]
    ListenerUnavailable(String),
    #[error("source already running")]
    AlreadyRunning,
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

impl From<PlatformError> for HookError {
    fn from(error: PlatformError) -> Self {
        HookError::activation(Scope::Global, error.to_string())
    }
}
