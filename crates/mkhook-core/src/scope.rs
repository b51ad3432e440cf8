//! Scope management: keeps exactly the source the current scope needs alive.

use crate::dispatcher::Dispatcher;
use crate::error::{HookError, HookResult};
use crate::event::Scope;
use crate::source::{EventSink, RawSource, SourceFactory};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Dispatcher shared between the manager, the running source and the host.
pub type SharedDispatcher = Arc<Mutex<Dispatcher>>;

/// Lock a shared dispatcher, recovering from a poisoned lock.
pub fn lock_dispatcher(dispatcher: &SharedDispatcher) -> MutexGuard<'_, Dispatcher> {
    dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the active [`RawSource`] and switches it when the scope changes.
///
/// At most one source exists at any time. The old source is always stopped
/// before a new one is created.
pub struct ScopeManager {
    factory: Box<dyn SourceFactory>,
    dispatcher: SharedDispatcher,
    source: Option<Box<dyn RawSource>>,
    scope: Scope,
    disposed: bool,
}

impl ScopeManager {
    pub fn new(factory: Box<dyn SourceFactory>, dispatcher: SharedDispatcher) -> Self {
        Self {
            factory,
            dispatcher,
            source: None,
            scope: Scope::None,
            disposed: false,
        }
    }

    /// Switch to `scope`.
    ///
    /// When the new scope cannot be activated the previous one is restored
    /// and the activation error is returned. If restoring fails as well the
    /// manager ends at [`Scope::None`].
    pub fn set_scope(&mut self, scope: Scope) -> HookResult<()> {
        self.follow_dispatcher_teardown();
        if self.disposed {
            return if scope == Scope::None {
                Ok(())
            } else {
                Err(HookError::Disposed)
            };
        }

        let healthy = self.source.as_ref().map_or(true, |s| s.is_running());
        if scope == self.scope && healthy {
            debug!(%scope, "Scope unchanged");
            return Ok(());
        }

        let previous = self.scope;
        self.release();

        if scope == Scope::None {
            info!(from = %previous, "Scope deactivated");
            return Ok(());
        }

        match self.activate(scope) {
            Ok(()) => {
                info!(from = %previous, to = %scope, "Scope changed");
                Ok(())
            }
            Err(error) => {
                warn!(%scope, %error, "Scope activation failed");
                if previous != Scope::None && previous != scope {
                    match self.activate(previous) {
                        Ok(()) => info!(scope = %previous, "Previous scope restored"),
                        Err(restore) => {
                            warn!(scope = %previous, error = %restore, "Previous scope could not be restored")
                        }
                    }
                }
                Err(error)
            }
        }
    }

    /// The active scope. [`Scope::None`] once the dispatcher is torn down.
    pub fn scope(&self) -> Scope {
        if self.dispatcher_torn_down() {
            Scope::None
        } else {
            self.scope
        }
    }

    /// Whether a source is currently delivering into a live dispatcher.
    pub fn is_active(&self) -> bool {
        !self.dispatcher_torn_down() && self.source.as_ref().is_some_and(|s| s.is_running())
    }

    /// Shared handle used to subscribe and toggle suppression.
    pub fn dispatcher(&self) -> SharedDispatcher {
        Arc::clone(&self.dispatcher)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed || self.dispatcher_torn_down()
    }

    /// Release the source and tear down the dispatcher. Idempotent.
    ///
    /// Also the way to release the source after the dispatcher was torn down
    /// on its own; `set_scope` does the same on its next call.
    pub fn teardown(&mut self) {
        if self.disposed {
            return;
        }
        self.release();
        lock_dispatcher(&self.dispatcher).teardown();
        self.disposed = true;
        info!("Scope manager torn down");
    }

    fn dispatcher_torn_down(&self) -> bool {
        lock_dispatcher(&self.dispatcher).is_torn_down()
    }

    /// A dispatcher torn down directly disposes the manager: release the
    /// source that still feeds it.
    fn follow_dispatcher_teardown(&mut self) {
        if !self.disposed && self.dispatcher_torn_down() {
            warn!(scope = %self.scope, "Dispatcher torn down outside the scope manager");
            self.teardown();
        }
    }

    /// Create, start and bind a source for `scope`. Leaves the manager at
    /// `Scope::None` on failure.
    fn activate(&mut self, scope: Scope) -> HookResult<()> {
        let mut source = self.factory.create(scope)?;
        let target = Arc::clone(&self.dispatcher);
        let sink = EventSink::new(move |raw| lock_dispatcher(&target).handle_raw(raw));
        source.start(sink)?;

        lock_dispatcher(&self.dispatcher).bind(scope);
        self.source = Some(source);
        self.scope = scope;
        Ok(())
    }

    /// Stop and drop the current source, if any.
    fn release(&mut self) {
        // The dispatcher lock must not be held here: stopping may wait for a
        // hook thread that is delivering into the dispatcher.
        if let Some(mut source) = self.source.take() {
            source.stop();
            debug!(scope = %source.scope(), "Source released");
        }
        lock_dispatcher(&self.dispatcher).unbind();
        self.scope = Scope::None;
    }
}

impl Drop for ScopeManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ScopeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeManager")
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
