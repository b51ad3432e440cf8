//! The dispatcher: subscription table plus the raw-event entry point that
//! ties suppression routing and gesture synthesis together.

use crate::error::HandlerFault;
use crate::event::{
    ButtonAction, EventKind, KeyEvent, KeyKind, KeyPressEvent, MouseEvent, MouseEventExt,
    MouseKind, RawEvent, RawEventKind, Scope, SuppressibleKind, Verdict, WheelAxis,
};
use crate::gesture::{Gesture, GestureConfig, GestureSynthesizer};
use crate::handler::{DispatchReport, Handler, HandlerSet};
use crate::router::{SuppressionPolicy, SuppressionRouter};
use std::collections::HashMap;
use tracing::{debug, info, trace};

/// Handlers per event kind, grouped by payload type.
#[derive(Default)]
struct SubscriptionTable {
    keys: HashMap<KeyKind, HandlerSet<KeyEvent>>,
    key_press: HandlerSet<KeyPressEvent>,
    mouse: HashMap<MouseKind, HandlerSet<MouseEvent>>,
    mouse_ext: HashMap<SuppressibleKind, HandlerSet<MouseEventExt>>,
    faults: HandlerSet<HandlerFault>,
}

impl SubscriptionTable {
    fn count(&self, kind: EventKind) -> usize {
        let mouse = |k: MouseKind| self.mouse.get(&k).map_or(0, HandlerSet::len);
        let ext = |k: SuppressibleKind| self.mouse_ext.get(&k).map_or(0, HandlerSet::len);
        match kind {
            EventKind::KeyDown => self.keys.get(&KeyKind::Down).map_or(0, HandlerSet::len),
            EventKind::KeyUp => self.keys.get(&KeyKind::Up).map_or(0, HandlerSet::len),
            EventKind::KeyPress => self.key_press.len(),
            EventKind::MouseMove => mouse(MouseKind::Move),
            EventKind::MouseDown => mouse(MouseKind::Down),
            EventKind::MouseUp => mouse(MouseKind::Up),
            EventKind::MouseClick => mouse(MouseKind::Click),
            EventKind::MouseDoubleClick => mouse(MouseKind::DoubleClick),
            EventKind::MouseDragStarted => mouse(MouseKind::DragStarted),
            EventKind::MouseDragFinished => mouse(MouseKind::DragFinished),
            EventKind::MouseWheel => mouse(MouseKind::Wheel),
            EventKind::MouseHWheel => mouse(MouseKind::HWheel),
            EventKind::MouseDownExt => ext(SuppressibleKind::MouseDown),
            EventKind::MouseWheelExt => ext(SuppressibleKind::MouseWheel),
            EventKind::MouseHWheelExt => ext(SuppressibleKind::MouseHWheel),
        }
    }

    fn total(&self) -> usize {
        self.keys.values().map(HandlerSet::len).sum::<usize>()
            + self.key_press.len()
            + self.mouse.values().map(HandlerSet::len).sum::<usize>()
            + self.mouse_ext.values().map(HandlerSet::len).sum::<usize>()
    }
}

/// Delivers events to subscribers.
///
/// Handlers of one kind run in registration order. A failing handler never
/// keeps the next one from running, except on the extended path where the
/// first handler to mark the event handled ends delivery. After
/// [`Dispatcher::teardown`] every operation is a no-op.
pub struct Dispatcher {
    table: SubscriptionTable,
    router: SuppressionRouter,
    gestures: GestureSynthesizer,
    bound: Option<Scope>,
    torn_down: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(GestureConfig::default(), SuppressionPolicy::default())
    }
}

impl Dispatcher {
    pub fn new(gestures: GestureConfig, policy: SuppressionPolicy) -> Self {
        Self {
            table: SubscriptionTable::default(),
            router: SuppressionRouter::new(policy),
            gestures: GestureSynthesizer::new(gestures),
            bound: None,
            torn_down: false,
        }
    }

    // === Subscription ===

    pub fn subscribe_key(&mut self, kind: KeyKind, handler: &Handler<KeyEvent>) -> bool {
        !self.torn_down && self.table.keys.entry(kind).or_default().insert(handler)
    }

    pub fn unsubscribe_key(&mut self, kind: KeyKind, handler: &Handler<KeyEvent>) -> bool {
        self.table
            .keys
            .get_mut(&kind)
            .is_some_and(|set| set.remove(handler))
    }

    pub fn subscribe_key_press(&mut self, handler: &Handler<KeyPressEvent>) -> bool {
        !self.torn_down && self.table.key_press.insert(handler)
    }

    pub fn unsubscribe_key_press(&mut self, handler: &Handler<KeyPressEvent>) -> bool {
        self.table.key_press.remove(handler)
    }

    pub fn subscribe_mouse(&mut self, kind: MouseKind, handler: &Handler<MouseEvent>) -> bool {
        !self.torn_down && self.table.mouse.entry(kind).or_default().insert(handler)
    }

    pub fn unsubscribe_mouse(&mut self, kind: MouseKind, handler: &Handler<MouseEvent>) -> bool {
        self.table
            .mouse
            .get_mut(&kind)
            .is_some_and(|set| set.remove(handler))
    }

    pub fn subscribe_mouse_ext(
        &mut self,
        kind: SuppressibleKind,
        handler: &Handler<MouseEventExt>,
    ) -> bool {
        !self.torn_down && self.table.mouse_ext.entry(kind).or_default().insert(handler)
    }

    pub fn unsubscribe_mouse_ext(
        &mut self,
        kind: SuppressibleKind,
        handler: &Handler<MouseEventExt>,
    ) -> bool {
        self.table
            .mouse_ext
            .get_mut(&kind)
            .is_some_and(|set| set.remove(handler))
    }

    /// Be told about every handler fault.
    pub fn subscribe_faults(&mut self, handler: &Handler<HandlerFault>) -> bool {
        !self.torn_down && self.table.faults.insert(handler)
    }

    pub fn unsubscribe_faults(&mut self, handler: &Handler<HandlerFault>) -> bool {
        self.table.faults.remove(handler)
    }

    /// Handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.table.count(kind)
    }

    // === Suppression ===

    pub fn enable_suppression(&mut self, kind: SuppressibleKind) {
        self.router.enable_suppression(kind);
    }

    pub fn disable_suppression(&mut self, kind: SuppressibleKind) {
        self.router.disable_suppression(kind);
    }

    pub fn is_suppressing(&self, kind: SuppressibleKind) -> bool {
        self.router.is_suppressing(kind)
    }

    pub fn suppression_policy(&self) -> SuppressionPolicy {
        self.router.policy()
    }

    // === Dispatch ===

    pub fn dispatch_key(&self, kind: KeyKind, event: &KeyEvent) -> DispatchReport {
        if self.torn_down {
            return DispatchReport::default();
        }
        let report = match self.table.keys.get(&kind) {
            Some(set) => set.invoke(kind.into(), event),
            None => DispatchReport::default(),
        };
        self.report_faults(report)
    }

    pub fn dispatch_key_press(&self, event: &KeyPressEvent) -> DispatchReport {
        if self.torn_down {
            return DispatchReport::default();
        }
        let report = self.table.key_press.invoke(EventKind::KeyPress, event);
        self.report_faults(report)
    }

    pub fn dispatch_mouse(&self, kind: MouseKind, event: &MouseEvent) -> DispatchReport {
        if self.torn_down {
            return DispatchReport::default();
        }
        let report = match self.table.mouse.get(&kind) {
            Some(set) => set.invoke(kind.into(), event),
            None => DispatchReport::default(),
        };
        self.report_faults(report)
    }

    /// Deliver a suppressible primitive on whichever path its kind is set to
    /// and return the verdict for the source.
    pub fn dispatch_suppressible(&self, kind: SuppressibleKind, event: MouseEvent) -> Verdict {
        if self.torn_down {
            return Verdict::Pass;
        }
        let (verdict, report) = self.router.route(
            kind,
            event,
            self.table.mouse.get(&kind.plain()),
            self.table.mouse_ext.get(&kind),
        );
        self.report_faults(report);
        verdict
    }

    /// Entry point for sources: deliver one raw primitive and every gesture
    /// it completes, in that order.
    pub fn handle_raw(&mut self, raw: &RawEvent) -> Verdict {
        if self.torn_down {
            return Verdict::Pass;
        }
        let t = raw.timestamp_ms;
        trace!(?raw, "Raw event");

        match &raw.kind {
            RawEventKind::KeyDown { key } => {
                let event = KeyEvent {
                    key: key.clone(),
                    timestamp_ms: t,
                };
                self.dispatch_key(KeyKind::Down, &event);
                Verdict::Pass
            }
            RawEventKind::KeyUp { key } => {
                let event = KeyEvent {
                    key: key.clone(),
                    timestamp_ms: t,
                };
                self.dispatch_key(KeyKind::Up, &event);
                Verdict::Pass
            }
            RawEventKind::KeyPress { ch } => {
                self.dispatch_key_press(&KeyPressEvent {
                    ch: *ch,
                    timestamp_ms: t,
                });
                Verdict::Pass
            }
            RawEventKind::MouseMove { x, y } => {
                self.dispatch_mouse(MouseKind::Move, &MouseEvent::moved(*x, *y, t));
                for gesture in self.gestures.on_move(*x, *y, t) {
                    self.dispatch_gesture(&gesture);
                }
                Verdict::Pass
            }
            RawEventKind::MouseButton {
                button,
                action: ButtonAction::Down,
                x,
                y,
            } => {
                let event = MouseEvent::button(*button, *x, *y, t);
                let verdict = self.dispatch_suppressible(SuppressibleKind::MouseDown, event);
                if verdict.is_suppress() {
                    // The press never happened as far as the rest of the
                    // system is concerned, so it cannot start a gesture.
                    debug!(?button, "Mouse down suppressed");
                } else {
                    self.gestures.on_down(*button, *x, *y, t);
                }
                verdict
            }
            RawEventKind::MouseButton {
                button,
                action: ButtonAction::Up,
                x,
                y,
            } => {
                self.dispatch_mouse(MouseKind::Up, &MouseEvent::button(*button, *x, *y, t));
                if let Some(gesture) = self.gestures.on_up(*button, *x, *y, t) {
                    self.dispatch_gesture(&gesture);
                }
                Verdict::Pass
            }
            RawEventKind::MouseWheel { delta, axis, x, y } => {
                let kind = match axis {
                    WheelAxis::Vertical => SuppressibleKind::MouseWheel,
                    WheelAxis::Horizontal => SuppressibleKind::MouseHWheel,
                };
                self.dispatch_suppressible(kind, MouseEvent::wheel(*delta, *x, *y, t))
            }
        }
    }

    fn dispatch_gesture(&self, gesture: &Gesture) {
        self.dispatch_mouse(gesture.kind(), gesture.event());
    }

    fn report_faults(&self, report: DispatchReport) -> DispatchReport {
        if !report.faults.is_empty() && !self.table.faults.is_empty() {
            for fault in &report.faults {
                // Faults of fault handlers are logged and dropped.
                self.table.faults.invoke(fault.kind, fault);
            }
        }
        report
    }

    // === Lifecycle ===

    /// Record the scope of the source now feeding this dispatcher.
    pub fn bind(&mut self, scope: Scope) {
        if self.torn_down {
            return;
        }
        self.gestures.reset();
        self.bound = Some(scope);
        debug!(%scope, "Dispatcher bound");
    }

    /// Forget the current source. Pending gestures are dropped.
    pub fn unbind(&mut self) {
        if let Some(scope) = self.bound.take() {
            debug!(%scope, "Dispatcher unbound");
        }
        self.gestures.reset();
    }

    pub fn bound_scope(&self) -> Option<Scope> {
        self.bound
    }

    /// Drop every handler of every kind at once and stop delivering.
    ///
    /// A [`ScopeManager`](crate::ScopeManager) sharing this dispatcher counts
    /// as disposed from here on and releases its source on its next call.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        let released = self.table.total();
        self.table = SubscriptionTable::default();
        self.unbind();
        self.torn_down = true;
        info!(released, "Dispatcher torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.table.total())
            .field("router", &self.router)
            .field("bound", &self.bound)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeyCode, MouseButton};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn raw(timestamp_ms: u64, kind: RawEventKind) -> RawEvent {
        RawEvent { timestamp_ms, kind }
    }

    fn down(button: MouseButton, x: i32, y: i32) -> RawEventKind {
        RawEventKind::MouseButton {
            button,
            action: ButtonAction::Down,
            x,
            y,
        }
    }

    fn up(button: MouseButton, x: i32, y: i32) -> RawEventKind {
        RawEventKind::MouseButton {
            button,
            action: ButtonAction::Up,
            x,
            y,
        }
    }

    fn recorder(log: &Log, label: &'static str) -> Handler<MouseEvent> {
        let log = log.clone();
        Handler::observe(move |_: &MouseEvent| log.lock().unwrap().push(label.to_string()))
    }

    /// Dispatcher with a recorder on every plain mouse kind.
    fn observed() -> (Dispatcher, Log) {
        let log: Log = Arc::default();
        let mut dispatcher = Dispatcher::default();
        for (kind, label) in [
            (MouseKind::Move, "move"),
            (MouseKind::Down, "down"),
            (MouseKind::Up, "up"),
            (MouseKind::Click, "click"),
            (MouseKind::DoubleClick, "double"),
            (MouseKind::DragStarted, "drag-start"),
            (MouseKind::DragFinished, "drag-end"),
            (MouseKind::Wheel, "wheel"),
            (MouseKind::HWheel, "hwheel"),
        ] {
            dispatcher.subscribe_mouse(kind, &recorder(&log, label));
        }
        (dispatcher, log)
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn test_subscribe_unsubscribe_idempotent() {
        let mut dispatcher = Dispatcher::default();
        let handler = Handler::observe(|_: &KeyEvent| {});

        for _ in 0..3 {
            dispatcher.subscribe_key(KeyKind::Down, &handler);
        }
        assert_eq!(dispatcher.handler_count(EventKind::KeyDown), 1);

        assert!(dispatcher.unsubscribe_key(KeyKind::Down, &handler));
        assert!(!dispatcher.unsubscribe_key(KeyKind::Down, &handler));
        assert!(!dispatcher.unsubscribe_key(KeyKind::Up, &handler));
        assert_eq!(dispatcher.handler_count(EventKind::KeyDown), 0);

        // Interleaved sequences net out to at most one registration.
        dispatcher.subscribe_key(KeyKind::Down, &handler);
        dispatcher.unsubscribe_key(KeyKind::Down, &handler);
        dispatcher.subscribe_key(KeyKind::Down, &handler);
        dispatcher.subscribe_key(KeyKind::Down, &handler);
        assert_eq!(dispatcher.handler_count(EventKind::KeyDown), 1);
    }

    #[test]
    fn test_same_handler_on_two_kinds() {
        let mut dispatcher = Dispatcher::default();
        let handler = Handler::observe(|_: &MouseEvent| {});
        assert!(dispatcher.subscribe_mouse(MouseKind::Up, &handler));
        assert!(dispatcher.subscribe_mouse(MouseKind::Click, &handler));
        assert!(dispatcher.unsubscribe_mouse(MouseKind::Up, &handler));
        assert_eq!(dispatcher.handler_count(EventKind::MouseClick), 1);
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let mut dispatcher = Dispatcher::default();
        let seq = Arc::new(Mutex::new(Vec::new()));
        for n in 0..5 {
            let seq = seq.clone();
            dispatcher.subscribe_key_press(&Handler::observe(move |e: &KeyPressEvent| {
                seq.lock().unwrap().push((n, e.ch));
            }));
        }

        let report = dispatcher.dispatch_key_press(&KeyPressEvent {
            ch: 'q',
            timestamp_ms: 1,
        });

        assert_eq!(report.invoked, 5);
        assert_eq!(
            *seq.lock().unwrap(),
            vec![(0, 'q'), (1, 'q'), (2, 'q'), (3, 'q'), (4, 'q')]
        );
    }

    #[test]
    fn test_faults_reach_fault_handlers() {
        let mut dispatcher = Dispatcher::default();
        let faults = Arc::new(Mutex::new(Vec::new()));
        let f = faults.clone();
        dispatcher.subscribe_faults(&Handler::observe(move |fault: &HandlerFault| {
            f.lock().unwrap().push(fault.clone());
        }));
        dispatcher.subscribe_key(KeyKind::Up, &Handler::new(|_: &KeyEvent| Err("bad key".into())));
        let reached = Arc::new(Mutex::new(false));
        let r = reached.clone();
        dispatcher.subscribe_key(KeyKind::Up, &Handler::observe(move |_: &KeyEvent| {
            *r.lock().unwrap() = true;
        }));

        let verdict = dispatcher.handle_raw(&raw(
            3,
            RawEventKind::KeyUp {
                key: KeyCode::new(0x41, "a"),
            },
        ));

        assert_eq!(verdict, Verdict::Pass);
        assert!(*reached.lock().unwrap());
        let faults = faults.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, EventKind::KeyUp);
        assert_eq!(faults[0].index, 0);
    }

    #[test]
    fn test_click_follows_up() {
        let (mut dispatcher, log) = observed();

        dispatcher.handle_raw(&raw(0, down(MouseButton::Left, 10, 10)));
        dispatcher.handle_raw(&raw(40, up(MouseButton::Left, 10, 10)));

        assert_eq!(take(&log), vec!["down", "up", "click"]);
    }

    #[test]
    fn test_double_click_sequence() {
        let (mut dispatcher, log) = observed();

        dispatcher.handle_raw(&raw(0, down(MouseButton::Left, 10, 10)));
        dispatcher.handle_raw(&raw(30, up(MouseButton::Left, 10, 10)));
        dispatcher.handle_raw(&raw(120, down(MouseButton::Left, 10, 10)));
        dispatcher.handle_raw(&raw(150, up(MouseButton::Left, 10, 10)));

        assert_eq!(take(&log), vec!["down", "up", "click", "down", "up", "double"]);
    }

    #[test]
    fn test_drag_sequence() {
        let (mut dispatcher, log) = observed();

        dispatcher.handle_raw(&raw(0, down(MouseButton::Left, 10, 10)));
        dispatcher.handle_raw(&raw(10, RawEventKind::MouseMove { x: 30, y: 10 }));
        dispatcher.handle_raw(&raw(20, RawEventKind::MouseMove { x: 60, y: 10 }));
        dispatcher.handle_raw(&raw(30, up(MouseButton::Left, 60, 10)));

        assert_eq!(
            take(&log),
            vec!["down", "move", "drag-start", "move", "up", "drag-end"]
        );
    }

    #[test]
    fn test_suppressed_down_skips_plain_handlers() {
        let (mut dispatcher, log) = observed();
        dispatcher.enable_suppression(SuppressibleKind::MouseDown);
        let veto_right = Handler::observe(|e: &MouseEventExt| {
            if e.mouse.button == Some(MouseButton::Right) {
                e.set_handled(true);
            }
        });
        dispatcher.subscribe_mouse_ext(SuppressibleKind::MouseDown, &veto_right);

        let verdict = dispatcher.handle_raw(&raw(0, down(MouseButton::Right, 5, 5)));
        assert_eq!(verdict, Verdict::Suppress);
        // The swallowed press does not pair with the release.
        dispatcher.handle_raw(&raw(10, up(MouseButton::Right, 5, 5)));
        assert_eq!(take(&log), vec!["up"]);

        let verdict = dispatcher.handle_raw(&raw(20, down(MouseButton::Left, 5, 5)));
        assert_eq!(verdict, Verdict::Pass);
        dispatcher.handle_raw(&raw(30, up(MouseButton::Left, 5, 5)));
        assert_eq!(take(&log), vec!["up", "click"]);

        dispatcher.disable_suppression(SuppressibleKind::MouseDown);
        let verdict = dispatcher.handle_raw(&raw(1000, down(MouseButton::Right, 5, 5)));
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(take(&log), vec!["down"]);
    }

    #[test]
    fn test_wheel_axes_route_separately() {
        let (mut dispatcher, log) = observed();
        dispatcher.enable_suppression(SuppressibleKind::MouseHWheel);
        dispatcher.subscribe_mouse_ext(
            SuppressibleKind::MouseHWheel,
            &Handler::observe(|e: &MouseEventExt| e.set_handled(true)),
        );

        let vertical = dispatcher.handle_raw(&raw(
            0,
            RawEventKind::MouseWheel {
                delta: 120,
                axis: WheelAxis::Vertical,
                x: 0,
                y: 0,
            },
        ));
        let horizontal = dispatcher.handle_raw(&raw(
            1,
            RawEventKind::MouseWheel {
                delta: -120,
                axis: WheelAxis::Horizontal,
                x: 0,
                y: 0,
            },
        ));

        assert_eq!(vertical, Verdict::Pass);
        assert_eq!(horizontal, Verdict::Suppress);
        assert_eq!(take(&log), vec!["wheel"]);
    }

    #[test]
    fn test_teardown_is_final_and_idempotent() {
        let (mut dispatcher, log) = observed();
        dispatcher.bind(Scope::Global);
        dispatcher.teardown();
        dispatcher.teardown();

        assert!(dispatcher.is_torn_down());
        assert_eq!(dispatcher.bound_scope(), None);
        assert_eq!(dispatcher.handler_count(EventKind::MouseUp), 0);
        assert_eq!(
            dispatcher.handle_raw(&raw(0, down(MouseButton::Left, 0, 0))),
            Verdict::Pass
        );
        assert!(!dispatcher.subscribe_mouse(MouseKind::Up, &recorder(&log, "late")));
        dispatcher.handle_raw(&raw(5, up(MouseButton::Left, 0, 0)));
        assert!(take(&log).is_empty());
    }

    #[test]
    fn test_rebind_drops_pending_gestures() {
        let (mut dispatcher, log) = observed();
        dispatcher.bind(Scope::Global);
        dispatcher.handle_raw(&raw(0, down(MouseButton::Left, 0, 0)));
        dispatcher.unbind();
        dispatcher.bind(Scope::Application);
        dispatcher.handle_raw(&raw(10, up(MouseButton::Left, 0, 0)));

        assert_eq!(take(&log), vec!["down", "up"]);
    }
}
