//! Raw event sources.
//!
//! A source owns one native subscription (a global hook, or the application's
//! own input stream) and pushes every primitive it sees into an
//! [`EventSink`], synchronously, waiting for the verdict before letting the
//! event continue.

use crate::error::{HookError, HookResult};
use crate::event::{RawEvent, RawEventKind, Scope, Verdict};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, trace};

/// Where a running source delivers raw events.
#[derive(Clone)]
pub struct EventSink {
    func: Arc<dyn Fn(&RawEvent) -> Verdict + Send + Sync>,
}

impl EventSink {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&RawEvent) -> Verdict + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Deliver one event and return what the source should do with it.
    pub fn deliver(&self, event: &RawEvent) -> Verdict {
        (self.func)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// A native input subscription.
pub trait RawSource: Send {
    /// The scope this source observes.
    fn scope(&self) -> Scope;

    /// Install the subscription and start delivering into `sink`.
    fn start(&mut self, sink: EventSink) -> HookResult<()>;

    /// Release the subscription. Safe to call more than once.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Creates sources for scopes.
pub trait SourceFactory: Send {
    /// Build a fresh, not yet started source. `Scope::None` has no source.
    fn create(&mut self, scope: Scope) -> HookResult<Box<dyn RawSource>>;
}

/// The application's side of an [`AppSource`].
///
/// The host forwards input its own windows receive through `push`. Events
/// pushed while no application source is running are passed through without
/// dispatch.
///
/// A delivery holds the slot for reading until the sink returns, so stopping
/// the source waits for in-flight events. Pushing or stopping from inside the
/// sink deadlocks.
#[derive(Clone)]
pub struct AppInputPort {
    slot: Arc<RwLock<Option<EventSink>>>,
    epoch: Instant,
}

impl Default for AppInputPort {
    fn default() -> Self {
        Self::new()
    }
}

impl AppInputPort {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            epoch: Instant::now(),
        }
    }

    /// Forward an application input event, timestamped now.
    pub fn push(&self, kind: RawEventKind) -> Verdict {
        let timestamp_ms = self.epoch.elapsed().as_millis() as u64;
        self.push_event(RawEvent { timestamp_ms, kind })
    }

    /// Forward an event carrying its own timestamp.
    pub fn push_event(&self, event: RawEvent) -> Verdict {
        match self.read().as_ref() {
            Some(sink) => sink.deliver(&event),
            None => {
                trace!(?event, "Application event with no active source");
                Verdict::Pass
            }
        }
    }

    /// Whether an application source is currently attached.
    pub fn is_attached(&self) -> bool {
        self.read().is_some()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<EventSink>> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<EventSink>> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self, sink: EventSink) {
        *self.write() = Some(sink);
    }

    /// Blocks until every delivery already in progress has returned.
    fn detach(&self) {
        self.write().take();
    }
}

/// Source for input addressed to the host application only.
pub struct AppSource {
    port: AppInputPort,
    running: bool,
}

impl AppSource {
    pub fn new(port: AppInputPort) -> Self {
        Self {
            port,
            running: false,
        }
    }
}

impl RawSource for AppSource {
    fn scope(&self) -> Scope {
        Scope::Application
    }

    fn start(&mut self, sink: EventSink) -> HookResult<()> {
        if self.running {
            return Err(HookError::activation(
                Scope::Application,
                "application source already running",
            ));
        }
        self.port.attach(sink);
        self.running = true;
        debug!("Application source started");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.port.detach();
        self.running = false;
        debug!("Application source stopped");
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for AppSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ButtonAction, MouseButton};
    use crossbeam_channel::{bounded, RecvTimeoutError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    fn press() -> RawEventKind {
        RawEventKind::MouseButton {
            button: MouseButton::Right,
            action: ButtonAction::Down,
            x: 1,
            y: 2,
        }
    }

    #[test]
    fn test_port_passes_without_source() {
        let port = AppInputPort::new();
        assert!(!port.is_attached());
        assert_eq!(port.push(press()), Verdict::Pass);
    }

    #[test]
    fn test_app_source_delivers_while_running() {
        let port = AppInputPort::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let sink = EventSink::new(move |event| {
            s.fetch_add(1, Ordering::SeqCst);
            Verdict::from_handled(event.kind.is_suppressible())
        });

        let mut source = AppSource::new(port.clone());
        assert_eq!(source.scope(), Scope::Application);
        source.start(sink.clone()).unwrap();
        assert!(source.is_running());
        assert!(source.start(sink).is_err());

        assert_eq!(port.push(press()), Verdict::Suppress);
        assert_eq!(port.push(RawEventKind::MouseMove { x: 0, y: 0 }), Verdict::Pass);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        source.stop();
        source.stop();
        assert!(!source.is_running());
        assert_eq!(port.push(press()), Verdict::Pass);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_source_detaches() {
        let port = AppInputPort::new();
        {
            let mut source = AppSource::new(port.clone());
            source.start(EventSink::new(|_| Verdict::Pass)).unwrap();
            assert!(port.is_attached());
        }
        assert!(!port.is_attached());
    }

    #[test]
    fn test_push_event_keeps_timestamp() {
        let port = AppInputPort::new();
        let stamp = Arc::new(Mutex::new(None));
        let s = stamp.clone();
        let mut source = AppSource::new(port.clone());
        source
            .start(EventSink::new(move |event| {
                *s.lock().unwrap() = Some(event.timestamp_ms);
                Verdict::Pass
            }))
            .unwrap();

        port.push_event(RawEvent {
            timestamp_ms: 4242,
            kind: press(),
        });
        assert_eq!(*stamp.lock().unwrap(), Some(4242));
    }

    #[test]
    fn test_stop_waits_for_in_flight_delivery() {
        let port = AppInputPort::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = bounded::<()>(1);
        let (release_tx, release_rx) = bounded::<()>(1);

        let mut source = AppSource::new(port.clone());
        let l = log.clone();
        source
            .start(EventSink::new(move |_| {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
                l.lock().unwrap().push("delivered");
                Verdict::Pass
            }))
            .unwrap();

        let pusher = {
            let port = port.clone();
            thread::spawn(move || port.push(press()))
        };
        entered_rx.recv().unwrap();

        let (stopped_tx, stopped_rx) = bounded::<()>(1);
        let stopper = {
            let log = log.clone();
            thread::spawn(move || {
                source.stop();
                log.lock().unwrap().push("stopped");
                let _ = stopped_tx.send(());
            })
        };

        assert_eq!(
            stopped_rx.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout)
        );
        release_tx.send(()).unwrap();

        assert_eq!(pusher.join().unwrap(), Verdict::Pass);
        stopper.join().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["delivered", "stopped"]);
        assert!(!port.is_attached());
    }
}
