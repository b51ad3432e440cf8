//! Event model: raw primitives coming out of a source and the typed payloads
//! handed to subscribers.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

/// Which population of input events a subscription observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// No source is installed.
    #[default]
    None,
    /// Only events delivered to the hosting process.
    Application,
    /// Every event on the system, whichever process has focus.
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::None => f.write_str("none"),
            Scope::Application => f.write_str("application"),
            Scope::Global => f.write_str("global"),
        }
    }
}

/// Mouse buttons, ordered by declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    XButton1,
    XButton2,
}

/// Press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonAction {
    Down,
    Up,
}

/// Wheel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WheelAxis {
    Vertical,
    Horizontal,
}

/// A physical key: platform virtual-key code (0 where the platform exposes
/// none) plus a stable display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCode {
    pub code: u32,
    pub name: String,
}

impl KeyCode {
    pub fn new(code: u32, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A raw primitive as produced by a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEvent {
    /// Milliseconds since the source started. Never decreases.
    pub timestamp_ms: u64,
    pub kind: RawEventKind,
}

/// Raw primitive variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RawEventKind {
    KeyDown { key: KeyCode },
    KeyUp { key: KeyCode },
    /// A character produced by a key stroke.
    KeyPress { ch: char },
    MouseMove { x: i32, y: i32 },
    MouseButton {
        button: MouseButton,
        action: ButtonAction,
        x: i32,
        y: i32,
    },
    MouseWheel {
        delta: i32,
        axis: WheelAxis,
        x: i32,
        y: i32,
    },
}

impl RawEventKind {
    /// Whether a verdict for this primitive can be honored by a source.
    pub fn is_suppressible(&self) -> bool {
        matches!(
            self,
            RawEventKind::MouseButton {
                action: ButtonAction::Down,
                ..
            } | RawEventKind::MouseWheel { .. }
        )
    }
}

/// What the source should do with the physical event after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Verdict {
    /// Let the event continue through the normal input pipeline.
    #[default]
    Pass,
    /// Swallow the event.
    Suppress,
}

impl Verdict {
    pub fn from_handled(handled: bool) -> Self {
        if handled {
            Verdict::Suppress
        } else {
            Verdict::Pass
        }
    }

    pub fn is_suppress(self) -> bool {
        self == Verdict::Suppress
    }
}

/// Payload for `KeyDown` / `KeyUp`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub timestamp_ms: u64,
}

/// Payload for `KeyPress`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyPressEvent {
    pub ch: char,
    pub timestamp_ms: u64,
}

/// Payload for every plain mouse kind, primitive or synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MouseEvent {
    /// `None` for moves and wheel turns.
    pub button: Option<MouseButton>,
    pub x: i32,
    pub y: i32,
    /// Wheel delta, zero for everything else.
    pub delta: i32,
    pub timestamp_ms: u64,
}

impl MouseEvent {
    pub fn button(button: MouseButton, x: i32, y: i32, timestamp_ms: u64) -> Self {
        Self {
            button: Some(button),
            x,
            y,
            delta: 0,
            timestamp_ms,
        }
    }

    pub fn moved(x: i32, y: i32, timestamp_ms: u64) -> Self {
        Self {
            button: None,
            x,
            y,
            delta: 0,
            timestamp_ms,
        }
    }

    pub fn wheel(delta: i32, x: i32, y: i32, timestamp_ms: u64) -> Self {
        Self {
            button: None,
            x,
            y,
            delta,
            timestamp_ms,
        }
    }
}

/// Extended payload for suppressible kinds.
///
/// Every extended handler of one physical event sees the same instance; once
/// one of them calls [`MouseEventExt::set_handled`], the remaining ones are
/// skipped and the source swallows the event.
#[derive(Debug)]
pub struct MouseEventExt {
    pub mouse: MouseEvent,
    handled: Cell<bool>,
}

impl MouseEventExt {
    pub fn new(mouse: MouseEvent) -> Self {
        Self {
            mouse,
            handled: Cell::new(false),
        }
    }

    pub fn handled(&self) -> bool {
        self.handled.get()
    }

    pub fn set_handled(&self, handled: bool) {
        self.handled.set(handled);
    }
}

/// Keyboard kinds carrying a [`KeyEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Down,
    Up,
}

/// Plain mouse kinds carrying a [`MouseEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseKind {
    Move,
    Down,
    Up,
    Click,
    DoubleClick,
    DragStarted,
    DragFinished,
    Wheel,
    HWheel,
}

/// Kinds that can be delivered on the extended (vetoable) path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuppressibleKind {
    MouseDown,
    MouseWheel,
    MouseHWheel,
}

impl SuppressibleKind {
    pub const ALL: [SuppressibleKind; 3] = [
        SuppressibleKind::MouseDown,
        SuppressibleKind::MouseWheel,
        SuppressibleKind::MouseHWheel,
    ];

    /// The plain kind observing the same primitive.
    pub fn plain(self) -> MouseKind {
        match self {
            SuppressibleKind::MouseDown => MouseKind::Down,
            SuppressibleKind::MouseWheel => MouseKind::Wheel,
            SuppressibleKind::MouseHWheel => MouseKind::HWheel,
        }
    }
}

/// The stable, subscriber-facing event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    KeyPress,
    MouseMove,
    MouseDown,
    MouseUp,
    MouseClick,
    MouseDoubleClick,
    MouseDragStarted,
    MouseDragFinished,
    MouseWheel,
    MouseHWheel,
    MouseDownExt,
    MouseWheelExt,
    MouseHWheelExt,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::KeyDown => "KeyDown",
            EventKind::KeyUp => "KeyUp",
            EventKind::KeyPress => "KeyPress",
            EventKind::MouseMove => "MouseMove",
            EventKind::MouseDown => "MouseDown",
            EventKind::MouseUp => "MouseUp",
            EventKind::MouseClick => "MouseClick",
            EventKind::MouseDoubleClick => "MouseDoubleClick",
            EventKind::MouseDragStarted => "MouseDragStarted",
            EventKind::MouseDragFinished => "MouseDragFinished",
            EventKind::MouseWheel => "MouseWheel",
            EventKind::MouseHWheel => "MouseHWheel",
            EventKind::MouseDownExt => "MouseDownExt",
            EventKind::MouseWheelExt => "MouseWheelExt",
            EventKind::MouseHWheelExt => "MouseHWheelExt",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<KeyKind> for EventKind {
    fn from(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Down => EventKind::KeyDown,
            KeyKind::Up => EventKind::KeyUp,
        }
    }
}

impl From<MouseKind> for EventKind {
    fn from(kind: MouseKind) -> Self {
        match kind {
            MouseKind::Move => EventKind::MouseMove,
            MouseKind::Down => EventKind::MouseDown,
            MouseKind::Up => EventKind::MouseUp,
            MouseKind::Click => EventKind::MouseClick,
            MouseKind::DoubleClick => EventKind::MouseDoubleClick,
            MouseKind::DragStarted => EventKind::MouseDragStarted,
            MouseKind::DragFinished => EventKind::MouseDragFinished,
            MouseKind::Wheel => EventKind::MouseWheel,
            MouseKind::HWheel => EventKind::MouseHWheel,
        }
    }
}

impl From<SuppressibleKind> for EventKind {
    fn from(kind: SuppressibleKind) -> Self {
        match kind {
            SuppressibleKind::MouseDown => EventKind::MouseDownExt,
            SuppressibleKind::MouseWheel => EventKind::MouseWheelExt,
            SuppressibleKind::MouseHWheel => EventKind::MouseHWheelExt,
        }
    }
}
