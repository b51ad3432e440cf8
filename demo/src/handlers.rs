//! The demo's subscribers.

use crate::printer::{EventLine, LineSender};
use mkhook_core::{
    Dispatcher, EventKind, Handler, KeyEvent, KeyKind, KeyPressEvent, MouseButton, MouseEvent,
    MouseEventExt, MouseKind, SuppressibleKind,
};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Latest pointer position and wheel deltas, shown by `status`.
#[derive(Debug, Default)]
pub struct Readout {
    x: AtomicI32,
    y: AtomicI32,
    wheel: AtomicI32,
    hwheel: AtomicI32,
}

impl Readout {
    pub fn summary(&self) -> String {
        format!(
            "x={:04}; y={:04}  Wheel={:03}  HWheel={:03}",
            self.x.load(Ordering::Relaxed),
            self.y.load(Ordering::Relaxed),
            self.wheel.load(Ordering::Relaxed),
            self.hwheel.load(Ordering::Relaxed),
        )
    }
}

fn button_name(event: &MouseEvent) -> String {
    event
        .button
        .map(|b| format!("{b:?}"))
        .unwrap_or_else(|| "None".into())
}

fn line(kind: EventKind, detail: String, suppressed: bool, timestamp_ms: u64) -> EventLine {
    EventLine {
        event: kind.name(),
        detail,
        suppressed,
        timestamp_ms,
    }
}

/// Every handler the demo registers, kept so the same instances can be
/// unsubscribed when suppression is toggled.
pub struct DemoHandlers {
    key_down: Handler<KeyEvent>,
    key_up: Handler<KeyEvent>,
    key_press: Handler<KeyPressEvent>,
    /// Plain mouse handlers that stay registered regardless of suppression.
    mouse: Vec<(MouseKind, Handler<MouseEvent>)>,
    mouse_down: Handler<MouseEvent>,
    wheel: Handler<MouseEvent>,
    hwheel: Handler<MouseEvent>,
    mouse_down_ext: Handler<MouseEventExt>,
    wheel_ext: Handler<MouseEventExt>,
    hwheel_ext: Handler<MouseEventExt>,
}

impl DemoHandlers {
    pub fn new(out: LineSender, readout: Arc<Readout>) -> Self {
        let key = |kind: EventKind| {
            let out = out.clone();
            Handler::observe(move |e: &KeyEvent| {
                out.send(line(kind, e.key.to_string(), false, e.timestamp_ms));
            })
        };
        let mouse = |kind: EventKind, with_button: bool| {
            let out = out.clone();
            Handler::observe(move |e: &MouseEvent| {
                let detail = if with_button { button_name(e) } else { String::new() };
                out.send(line(kind, detail, false, e.timestamp_ms));
            })
        };

        let key_press = {
            let out = out.clone();
            Handler::observe(move |e: &KeyPressEvent| {
                out.send(line(EventKind::KeyPress, e.ch.to_string(), false, e.timestamp_ms));
            })
        };
        let mouse_move = {
            let readout = readout.clone();
            Handler::observe(move |e: &MouseEvent| {
                readout.x.store(e.x, Ordering::Relaxed);
                readout.y.store(e.y, Ordering::Relaxed);
            })
        };
        let wheel = {
            let readout = readout.clone();
            Handler::observe(move |e: &MouseEvent| readout.wheel.store(e.delta, Ordering::Relaxed))
        };
        let hwheel = {
            let readout = readout.clone();
            Handler::observe(move |e: &MouseEvent| readout.hwheel.store(e.delta, Ordering::Relaxed))
        };

        // Swallow right-button presses, log the rest.
        let mouse_down_ext = {
            let out = out.clone();
            Handler::observe(move |e: &MouseEventExt| {
                let suppress = e.mouse.button == Some(MouseButton::Right);
                out.send(line(
                    EventKind::MouseDown,
                    button_name(&e.mouse),
                    suppress,
                    e.mouse.timestamp_ms,
                ));
                if suppress {
                    e.set_handled(true);
                }
            })
        };
        let wheel_ext = {
            let out = out.clone();
            let readout = readout.clone();
            Handler::observe(move |e: &MouseEventExt| {
                readout.wheel.store(e.mouse.delta, Ordering::Relaxed);
                out.send(line(EventKind::MouseWheel, "move".into(), true, e.mouse.timestamp_ms));
                e.set_handled(true);
            })
        };
        let hwheel_ext = {
            let out = out.clone();
            Handler::observe(move |e: &MouseEventExt| {
                readout.hwheel.store(e.mouse.delta, Ordering::Relaxed);
                out.send(line(EventKind::MouseHWheel, "move".into(), true, e.mouse.timestamp_ms));
                e.set_handled(true);
            })
        };

        Self {
            key_down: key(EventKind::KeyDown),
            key_up: key(EventKind::KeyUp),
            key_press,
            mouse: vec![
                (MouseKind::Move, mouse_move),
                (MouseKind::Up, mouse(EventKind::MouseUp, true)),
                (MouseKind::Click, mouse(EventKind::MouseClick, true)),
                (MouseKind::DoubleClick, mouse(EventKind::MouseDoubleClick, true)),
                (MouseKind::DragStarted, mouse(EventKind::MouseDragStarted, false)),
                (MouseKind::DragFinished, mouse(EventKind::MouseDragFinished, false)),
            ],
            mouse_down: mouse(EventKind::MouseDown, true),
            wheel,
            hwheel,
            mouse_down_ext,
            wheel_ext,
            hwheel_ext,
        }
    }

    /// Register everything, picking the plain or extended handler of each
    /// suppressible kind from the dispatcher's current policy.
    pub fn subscribe(&self, dispatcher: &mut Dispatcher) {
        dispatcher.subscribe_key(KeyKind::Down, &self.key_down);
        dispatcher.subscribe_key(KeyKind::Up, &self.key_up);
        dispatcher.subscribe_key_press(&self.key_press);
        for (kind, handler) in &self.mouse {
            dispatcher.subscribe_mouse(*kind, handler);
        }
        for kind in SuppressibleKind::ALL {
            let on = dispatcher.is_suppressing(kind);
            self.set_suppression(dispatcher, kind, on);
        }
    }

    /// Swap the plain and extended handler of `kind` and flip the policy.
    pub fn set_suppression(&self, dispatcher: &mut Dispatcher, kind: SuppressibleKind, on: bool) {
        let (plain, ext) = match kind {
            SuppressibleKind::MouseDown => (&self.mouse_down, &self.mouse_down_ext),
            SuppressibleKind::MouseWheel => (&self.wheel, &self.wheel_ext),
            SuppressibleKind::MouseHWheel => (&self.hwheel, &self.hwheel_ext),
        };
        if on {
            dispatcher.unsubscribe_mouse(kind.plain(), plain);
            dispatcher.subscribe_mouse_ext(kind, ext);
            dispatcher.enable_suppression(kind);
        } else {
            dispatcher.unsubscribe_mouse_ext(kind, ext);
            dispatcher.subscribe_mouse(kind.plain(), plain);
            dispatcher.disable_suppression(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, Receiver};
    use mkhook_core::{
        ButtonAction, GestureConfig, KeyCode, RawEvent, RawEventKind, SuppressionPolicy, Verdict,
        WheelAxis,
    };

    fn setup(policy: SuppressionPolicy) -> (Dispatcher, DemoHandlers, Receiver<EventLine>, Arc<Readout>) {
        let (tx, rx) = bounded(64);
        let readout = Arc::new(Readout::default());
        let handlers = DemoHandlers::new(LineSender::new(tx), readout.clone());
        let mut dispatcher = Dispatcher::new(GestureConfig::default(), policy);
        handlers.subscribe(&mut dispatcher);
        (dispatcher, handlers, rx, readout)
    }

    fn press(button: MouseButton, action: ButtonAction, t: u64) -> RawEvent {
        RawEvent {
            timestamp_ms: t,
            kind: RawEventKind::MouseButton {
                button,
                action,
                x: 3,
                y: 4,
            },
        }
    }

    fn drain(rx: &Receiver<EventLine>) -> Vec<String> {
        rx.try_iter()
            .map(|l| format!("{} {}{}", l.event, l.detail, if l.suppressed { "!" } else { "" }))
            .collect()
    }

    #[test]
    fn test_plain_subscriptions() {
        let (mut dispatcher, _handlers, rx, _) = setup(SuppressionPolicy::default());
        assert_eq!(dispatcher.handler_count(EventKind::MouseDown), 1);
        assert_eq!(dispatcher.handler_count(EventKind::MouseDownExt), 0);

        dispatcher.handle_raw(&RawEvent {
            timestamp_ms: 0,
            kind: RawEventKind::KeyDown {
                key: KeyCode::new(0x41, "A"),
            },
        });
        dispatcher.handle_raw(&press(MouseButton::Left, ButtonAction::Down, 1));
        dispatcher.handle_raw(&press(MouseButton::Left, ButtonAction::Up, 2));

        assert_eq!(
            drain(&rx),
            vec!["KeyDown A", "MouseDown Left", "MouseUp Left", "MouseClick Left"]
        );
    }

    #[test]
    fn test_suppress_mouse_swallows_right_button_only() {
        let policy = SuppressionPolicy {
            mouse_down: true,
            ..SuppressionPolicy::default()
        };
        let (mut dispatcher, _handlers, rx, _) = setup(policy);
        assert_eq!(dispatcher.handler_count(EventKind::MouseDown), 0);
        assert_eq!(dispatcher.handler_count(EventKind::MouseDownExt), 1);

        let right = dispatcher.handle_raw(&press(MouseButton::Right, ButtonAction::Down, 0));
        let left = dispatcher.handle_raw(&press(MouseButton::Left, ButtonAction::Down, 1));

        assert_eq!(right, Verdict::Suppress);
        assert_eq!(left, Verdict::Pass);
        assert_eq!(drain(&rx), vec!["MouseDown Right!", "MouseDown Left"]);
    }

    #[test]
    fn test_toggle_wheel_suppression() {
        let (mut dispatcher, handlers, rx, readout) = setup(SuppressionPolicy::default());
        let wheel = RawEvent {
            timestamp_ms: 0,
            kind: RawEventKind::MouseWheel {
                delta: 120,
                axis: WheelAxis::Vertical,
                x: 0,
                y: 0,
            },
        };

        assert_eq!(dispatcher.handle_raw(&wheel), Verdict::Pass);
        assert!(drain(&rx).is_empty());
        assert!(readout.summary().contains("Wheel=120"));

        handlers.set_suppression(&mut dispatcher, SuppressibleKind::MouseWheel, true);
        assert_eq!(dispatcher.handler_count(EventKind::MouseWheel), 0);
        assert_eq!(dispatcher.handle_raw(&wheel), Verdict::Suppress);
        assert_eq!(drain(&rx), vec!["MouseWheel move!"]);

        handlers.set_suppression(&mut dispatcher, SuppressibleKind::MouseWheel, false);
        assert_eq!(dispatcher.handler_count(EventKind::MouseWheelExt), 0);
        assert_eq!(dispatcher.handle_raw(&wheel), Verdict::Pass);
    }

    #[test]
    fn test_move_updates_readout() {
        let (mut dispatcher, _handlers, rx, readout) = setup(SuppressionPolicy::default());
        dispatcher.handle_raw(&RawEvent {
            timestamp_ms: 0,
            kind: RawEventKind::MouseMove { x: 12, y: 345 },
        });
        assert!(readout.summary().starts_with("x=0012; y=0345"));
        assert!(drain(&rx).is_empty());
    }
}
