//! Gesture synthesis: turns mouse down/move/up primitives into clicks,
//! double-clicks and drags.

use crate::event::{MouseButton, MouseEvent, MouseKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// Thresholds used to recognize gestures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Movement on either axis beyond this many pixels turns a press into a drag.
    pub drag_threshold_px: u32,
    /// Maximum time between two clicks forming a double-click (milliseconds).
    pub double_click_time_ms: u64,
    /// Maximum distance on either axis between two clicks forming a double-click.
    pub double_click_tolerance_px: u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: 4,
            double_click_time_ms: 500,
            double_click_tolerance_px: 4,
        }
    }
}

impl GestureConfig {
    /// Get double-click time as Duration
    pub fn double_click_time(&self) -> Duration {
        Duration::from_millis(self.double_click_time_ms)
    }
}

/// A synthesized gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Gesture {
    Click(MouseEvent),
    DoubleClick(MouseEvent),
    DragStarted(MouseEvent),
    DragFinished(MouseEvent),
}

impl Gesture {
    /// The subscriber kind this gesture is delivered as.
    pub fn kind(&self) -> MouseKind {
        match self {
            Gesture::Click(_) => MouseKind::Click,
            Gesture::DoubleClick(_) => MouseKind::DoubleClick,
            Gesture::DragStarted(_) => MouseKind::DragStarted,
            Gesture::DragFinished(_) => MouseKind::DragFinished,
        }
    }

    pub fn event(&self) -> &MouseEvent {
        match self {
            Gesture::Click(e)
            | Gesture::DoubleClick(e)
            | Gesture::DragStarted(e)
            | Gesture::DragFinished(e) => e,
        }
    }
}

/// Tracking record for one button.
#[derive(Debug, Clone, Default)]
struct GestureState {
    /// Set while the button is held.
    pressed_at: Option<u64>,
    pressed_at_pos: (i32, i32),
    last_click_at: Option<u64>,
    last_click_pos: (i32, i32),
    dragging: bool,
}

/// Recognizes gestures from a stream of mouse primitives.
#[derive(Debug, Default)]
pub struct GestureSynthesizer {
    config: GestureConfig,
    buttons: BTreeMap<MouseButton, GestureState>,
}

impl GestureSynthesizer {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            buttons: BTreeMap::new(),
        }
    }

    /// Forget every press, drag and pending click.
    pub fn reset(&mut self) {
        self.buttons.clear();
    }

    /// Record a press. Emits nothing.
    pub fn on_down(&mut self, button: MouseButton, x: i32, y: i32, timestamp_ms: u64) {
        let state = self.buttons.entry(button).or_default();
        state.pressed_at = Some(timestamp_ms);
        state.pressed_at_pos = (x, y);
        state.dragging = false;
    }

    /// Start a drag for every held button that moved past the threshold,
    /// in button order.
    pub fn on_move(&mut self, x: i32, y: i32, timestamp_ms: u64) -> Vec<Gesture> {
        let threshold = i64::from(self.config.drag_threshold_px);
        let mut gestures = Vec::new();

        for (button, state) in self.buttons.iter_mut() {
            if state.pressed_at.is_none() || state.dragging {
                continue;
            }
            let (px, py) = state.pressed_at_pos;
            let dx = (i64::from(x) - i64::from(px)).abs();
            let dy = (i64::from(y) - i64::from(py)).abs();
            if dx > threshold || dy > threshold {
                state.dragging = true;
                trace!(?button, dx, dy, "Drag started");
                gestures.push(Gesture::DragStarted(MouseEvent::button(
                    *button,
                    x,
                    y,
                    timestamp_ms,
                )));
            }
        }

        gestures
    }

    /// Resolve a release into a drag end, a click or a double-click.
    pub fn on_up(&mut self, button: MouseButton, x: i32, y: i32, timestamp_ms: u64) -> Option<Gesture> {
        let state = self.buttons.get_mut(&button)?;
        state.pressed_at?;
        let event = MouseEvent::button(button, x, y, timestamp_ms);

        if state.dragging {
            self.buttons.remove(&button);
            trace!(?button, "Drag finished");
            return Some(Gesture::DragFinished(event));
        }

        state.pressed_at = None;

        let paired = state.last_click_at.is_some_and(|last| {
            let tolerance = i64::from(self.config.double_click_tolerance_px);
            let (cx, cy) = state.last_click_pos;
            timestamp_ms.saturating_sub(last) <= self.config.double_click_time_ms
                && (i64::from(x) - i64::from(cx)).abs() <= tolerance
                && (i64::from(y) - i64::from(cy)).abs() <= tolerance
        });

        if paired {
            state.last_click_at = None;
            trace!(?button, "Double click");
            Some(Gesture::DoubleClick(event))
        } else {
            state.last_click_at = Some(timestamp_ms);
            state.last_click_pos = (x, y);
            trace!(?button, "Click");
            Some(Gesture::Click(event))
        }
    }
}
