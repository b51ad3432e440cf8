//! rdev-based global source for platforms without a native hook.
//!
//! `rdev::listen` blocks its thread forever and cannot be stopped, so a single
//! process-wide listener thread is started on first use and global sources
//! attach and detach their sink to it. The listener only observes: a suppress
//! verdict is logged but the event still reaches its target.
//!
//! Deliveries hold the sink slot for reading, so detaching waits until the
//! event in flight has been dispatched.

use crate::error::{PlatformError, PlatformResult};
use crossbeam_channel::{bounded, RecvTimeoutError};
use mkhook_core::{
    ButtonAction, EventSink, HookResult, KeyCode, MouseButton, RawEvent, RawEventKind, RawSource,
    Scope, WheelAxis,
};
use rdev::{Event, EventType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// How long `rdev::listen` gets to fail before the listener counts as running.
const STARTUP_GRACE: Duration = Duration::from_millis(150);

/// Wheel units per notch, matching the Windows `WHEEL_DELTA`.
const WHEEL_DELTA: i32 = 120;

static LISTENER: OnceLock<Listener> = OnceLock::new();

fn listener() -> &'static Listener {
    LISTENER.get_or_init(Listener::new)
}

/// The process-wide listener and its current subscriber.
struct Listener {
    sink: RwLock<Option<EventSink>>,
    alive: AtomicBool,
    epoch: Instant,
}

impl Listener {
    fn new() -> Self {
        Self {
            sink: RwLock::new(None),
            alive: AtomicBool::new(false),
            epoch: Instant::now(),
        }
    }

    fn sink(&self) -> RwLockReadGuard<'_, Option<EventSink>> {
        self.sink.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink_mut(&self) -> RwLockWriteGuard<'_, Option<EventSink>> {
        self.sink.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `sink` unless another source holds the listener.
    fn attach(&self, sink: EventSink) -> PlatformResult<()> {
        let mut slot = self.sink_mut();
        if slot.is_some() {
            return Err(PlatformError::AlreadyRunning);
        }
        *slot = Some(sink);
        Ok(())
    }

    /// Remove the sink once the delivery in progress, if any, has returned.
    fn detach(&self) {
        self.sink_mut().take();
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Start the listener thread unless it is already running.
    fn ensure_running(&'static self) -> PlatformResult<()> {
        if self.alive.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (err_tx, err_rx) = bounded::<String>(1);
        let spawned = thread::Builder::new()
            .name("mkhook-rdev-listen".into())
            .spawn(move || {
                info!("Global listener thread started (rdev)");
                let mut last_pos = (0, 0);
                let result = rdev::listen(move |event| self.on_event(event, &mut last_pos));
                let reason = match result {
                    Ok(()) => "listener returned".to_string(),
                    Err(error) => {
                        error!(?error, "Global listener error");
                        format!("{error:?}")
                    }
                };
                self.alive.store(false, Ordering::SeqCst);
                let _ = err_tx.send(reason);
                info!("Global listener thread exiting");
            });
        if let Err(e) = spawned {
            self.alive.store(false, Ordering::SeqCst);
            return Err(PlatformError::ThreadSpawn(e.to_string()));
        }

        match err_rx.recv_timeout(STARTUP_GRACE) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(reason) => Err(PlatformError::ListenerUnavailable(reason)),
            Err(RecvTimeoutError::Disconnected) => Err(PlatformError::HookThreadExited),
        }
    }

    fn on_event(&self, event: Event, last_pos: &mut (i32, i32)) {
        let slot = self.sink();
        let Some(sink) = slot.as_ref() else {
            return;
        };
        let timestamp_ms = self.epoch.elapsed().as_millis() as u64;

        for kind in translate(&event, last_pos) {
            let raw = RawEvent { timestamp_ms, kind };
            if sink.deliver(&raw).is_suppress() {
                debug!(kind = ?raw.kind, "Suppression requested but rdev cannot swallow events");
            }
        }
    }
}

/// Map one rdev event to raw primitives, tracking the pointer position
/// since rdev reports none for button and wheel events.
fn translate(event: &Event, last_pos: &mut (i32, i32)) -> Vec<RawEventKind> {
    let (x, y) = *last_pos;
    match event.event_type {
        EventType::MouseMove { x, y } => {
            *last_pos = (x as i32, y as i32);
            vec![RawEventKind::MouseMove {
                x: last_pos.0,
                y: last_pos.1,
            }]
        }
        EventType::ButtonPress(button) => mouse_button(button)
            .map(|button| RawEventKind::MouseButton {
                button,
                action: ButtonAction::Down,
                x,
                y,
            })
            .into_iter()
            .collect(),
        EventType::ButtonRelease(button) => mouse_button(button)
            .map(|button| RawEventKind::MouseButton {
                button,
                action: ButtonAction::Up,
                x,
                y,
            })
            .into_iter()
            .collect(),
        EventType::Wheel { delta_x, delta_y } => {
            let mut out = Vec::new();
            if delta_y != 0 {
                out.push(RawEventKind::MouseWheel {
                    delta: delta_y as i32 * WHEEL_DELTA,
                    axis: WheelAxis::Vertical,
                    x,
                    y,
                });
            }
            if delta_x != 0 {
                out.push(RawEventKind::MouseWheel {
                    delta: delta_x as i32 * WHEEL_DELTA,
                    axis: WheelAxis::Horizontal,
                    x,
                    y,
                });
            }
            out
        }
        EventType::KeyPress(key) => {
            let mut out = vec![RawEventKind::KeyDown { key: key_code(key) }];
            if let Some(ch) = typed_char(event.name.as_deref()) {
                out.push(RawEventKind::KeyPress { ch });
            }
            out
        }
        EventType::KeyRelease(key) => vec![RawEventKind::KeyUp { key: key_code(key) }],
    }
}

fn mouse_button(button: rdev::Button) -> Option<MouseButton> {
    match button {
        rdev::Button::Left => Some(MouseButton::Left),
        rdev::Button::Right => Some(MouseButton::Right),
        rdev::Button::Middle => Some(MouseButton::Middle),
        // X11 back / forward buttons.
        rdev::Button::Unknown(8) => Some(MouseButton::XButton1),
        rdev::Button::Unknown(9) => Some(MouseButton::XButton2),
        rdev::Button::Unknown(other) => {
            trace!(other, "Ignoring unknown mouse button");
            None
        }
    }
}

/// The character a key press typed, if it typed exactly one printable one.
fn typed_char(name: Option<&str>) -> Option<char> {
    let mut chars = name?.chars();
    let ch = chars.next()?;
    (chars.next().is_none() && !ch.is_control()).then_some(ch)
}

/// rdev exposes no portable key code, so only unknown keys carry one.
fn key_code(key: rdev::Key) -> KeyCode {
    use rdev::Key;

    let name = match key {
        Key::Unknown(code) => return KeyCode::new(code, format!("Unknown({code})")),
        Key::Return | Key::KpReturn => "Return".to_string(),
        Key::BackQuote => "`".to_string(),
        Key::Minus => "-".to_string(),
        Key::Equal => "=".to_string(),
        Key::LeftBracket => "[".to_string(),
        Key::RightBracket => "]".to_string(),
        Key::SemiColon => ";".to_string(),
        Key::Quote => "'".to_string(),
        Key::BackSlash | Key::IntlBackslash => "\\".to_string(),
        Key::Comma => ",".to_string(),
        Key::Dot => ".".to_string(),
        Key::Slash => "/".to_string(),
        Key::UpArrow => "Up".to_string(),
        Key::DownArrow => "Down".to_string(),
        Key::LeftArrow => "Left".to_string(),
        Key::RightArrow => "Right".to_string(),
        other => {
            let debug = format!("{other:?}");
            // KeyA -> A, Num1 -> 1
            match debug.strip_prefix("Key").or_else(|| debug.strip_prefix("Num")) {
                Some(rest) if rest.len() == 1 => rest.to_string(),
                _ => debug,
            }
        }
    };
    KeyCode::new(0, name)
}

/// Global source sharing the process-wide rdev listener.
#[derive(Debug, Default)]
pub struct GlobalSource {
    attached: bool,
}

impl GlobalSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RawSource for GlobalSource {
    fn scope(&self) -> Scope {
        Scope::Global
    }

    fn start(&mut self, sink: EventSink) -> HookResult<()> {
        if self.attached {
            return Err(PlatformError::AlreadyRunning.into());
        }
        let listener = listener();
        listener.ensure_running()?;
        listener.attach(sink)?;
        self.attached = true;
        info!("Global source attached to rdev listener");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.attached {
            return;
        }
        listener().detach();
        self.attached = false;
        info!("Global source detached from rdev listener");
    }

    fn is_running(&self) -> bool {
        self.attached && listener().is_alive()
    }
}

impl Drop for GlobalSource {
    fn drop(&mut self) {
        self.stop();
    }
}
