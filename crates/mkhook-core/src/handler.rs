//! Handler references and the ordered per-kind handler sets.

use crate::error::{HandlerFault, HandlerResult};
use crate::event::EventKind;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// A subscriber callback.
///
/// Identity is the shared allocation: clones of one `Handler` are the same
/// subscriber, two handlers built from identical closures are not.
pub struct Handler<E: ?Sized> {
    func: Arc<dyn Fn(&E) -> HandlerResult + Send + Sync>,
}

impl<E: ?Sized> Handler<E> {
    /// Wrap a fallible callback.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Wrap a callback that cannot fail.
    pub fn observe<F>(func: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        Self::new(move |event: &E| {
            func(event);
            Ok(())
        })
    }

    pub fn same(&self, other: &Handler<E>) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }

    pub(crate) fn call(&self, event: &E) -> HandlerResult {
        (self.func)(event)
    }
}

impl<E: ?Sized> Clone for Handler<E> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
        }
    }
}

impl<E: ?Sized> PartialEq for Handler<E> {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl<E: ?Sized> Eq for Handler<E> {}

impl<E: ?Sized> fmt::Debug for Handler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("ptr", &Arc::as_ptr(&self.func).cast::<()>())
            .finish()
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were invoked, faulting ones included.
    pub invoked: usize,
    pub faults: Vec<HandlerFault>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Ordered set of handlers for one event kind. Insertion order is delivery
/// order and every handler appears at most once.
pub(crate) struct HandlerSet<E: ?Sized> {
    handlers: Vec<Handler<E>>,
}

impl<E: ?Sized> Default for HandlerSet<E> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<E: ?Sized> HandlerSet<E> {
    /// Append the handler unless already present.
    pub(crate) fn insert(&mut self, handler: &Handler<E>) -> bool {
        if self.contains(handler) {
            return false;
        }
        self.handlers.push(handler.clone());
        true
    }

    /// Remove the handler if present.
    pub(crate) fn remove(&mut self, handler: &Handler<E>) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| !h.same(handler));
        self.handlers.len() != before
    }

    pub(crate) fn contains(&self, handler: &Handler<E>) -> bool {
        self.handlers.iter().any(|h| h.same(handler))
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke every handler in order. Faults are isolated.
    pub(crate) fn invoke(&self, kind: EventKind, event: &E) -> DispatchReport {
        self.invoke_until(kind, event, |_| false)
    }

    /// Invoke handlers in order, stopping after the first one for which
    /// `stop(event)` holds once it has returned.
    pub(crate) fn invoke_until<S>(&self, kind: EventKind, event: &E, stop: S) -> DispatchReport
    where
        S: Fn(&E) -> bool,
    {
        let mut report = DispatchReport::default();

        for (index, handler) in self.handlers.iter().enumerate() {
            report.invoked += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.call(event)));
            let message = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };
            if let Some(message) = message {
                warn!(%kind, index, %message, "Handler fault");
                report.faults.push(HandlerFault {
                    kind,
                    index,
                    message,
                });
            }
            if stop(event) {
                break;
            }
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
