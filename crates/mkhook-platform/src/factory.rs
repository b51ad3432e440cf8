//! Source factory wiring scopes to this platform's sources.

use crate::global::GlobalSource;
use mkhook_core::{AppInputPort, AppSource, HookError, HookResult, RawSource, Scope, SourceFactory};
use tracing::debug;

/// Builds a [`GlobalSource`] for `Scope::Global` and an [`AppSource`] bound to
/// one shared [`AppInputPort`] for `Scope::Application`.
#[derive(Clone, Default)]
pub struct PlatformSourceFactory {
    port: AppInputPort,
}

impl PlatformSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The port through which the host forwards its own window input.
    pub fn app_port(&self) -> AppInputPort {
        self.port.clone()
    }
}

impl SourceFactory for PlatformSourceFactory {
    fn create(&mut self, scope: Scope) -> HookResult<Box<dyn RawSource>> {
        debug!(%scope, "Creating source");
        match scope {
            Scope::Global => Ok(Box::new(GlobalSource::new())),
            Scope::Application => Ok(Box::new(AppSource::new(self.port.clone()))),
            Scope::None => Err(HookError::InvalidScope(scope)),
        }
    }
}
