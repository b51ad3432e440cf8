//! Error types for mkhook-core.

use crate::event::{EventKind, Scope};
use thiserror::Error;

/// Errors surfaced by scope management and sources.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to activate {scope} scope: {reason}")]
    ScopeActivation { scope: Scope, reason: String },
    #[error("no source exists for scope {0}")]
    InvalidScope(Scope),
    #[error("hook has been torn down")]
    Disposed,
}

impl HookError {
    pub fn activation(scope: Scope, reason: impl Into<String>) -> Self {
        HookError::ScopeActivation {
            scope,
            reason: reason.into(),
        }
    }
}

/// Result type for hook operations.
pub type HookResult<T> = Result<T, HookError>;

/// Error returned by a subscriber handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for subscriber handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// A handler that failed (returned an error or panicked) during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} handler #{index} failed: {message}")]
pub struct HandlerFault {
    pub kind: EventKind,
    /// Position of the handler in registration order.
    pub index: usize,
    pub message: String,
}
