//! Suppression routing for vetoable event kinds.
//!
//! Each suppressible kind is delivered on exactly one of two paths. On the
//! plain path handlers only observe and the source is always told to pass the
//! event on. On the extended path handlers receive a [`MouseEventExt`] and the
//! first one to mark it handled ends delivery and makes the source swallow the
//! event. Which button or wheel turn deserves a veto is up to the handlers.

use crate::event::{EventKind, MouseEvent, MouseEventExt, SuppressibleKind, Verdict};
use crate::handler::{DispatchReport, HandlerSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Initial suppression flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionPolicy {
    pub mouse_down: bool,
    pub mouse_wheel: bool,
    pub mouse_hwheel: bool,
}

impl SuppressionPolicy {
    pub fn get(&self, kind: SuppressibleKind) -> bool {
        match kind {
            SuppressibleKind::MouseDown => self.mouse_down,
            SuppressibleKind::MouseWheel => self.mouse_wheel,
            SuppressibleKind::MouseHWheel => self.mouse_hwheel,
        }
    }

    pub fn set(&mut self, kind: SuppressibleKind, suppressing: bool) {
        match kind {
            SuppressibleKind::MouseDown => self.mouse_down = suppressing,
            SuppressibleKind::MouseWheel => self.mouse_wheel = suppressing,
            SuppressibleKind::MouseHWheel => self.mouse_hwheel = suppressing,
        }
    }
}

/// Picks the delivery path per suppressible kind and computes the verdict.
#[derive(Debug, Default)]
pub struct SuppressionRouter {
    policy: SuppressionPolicy,
}

impl SuppressionRouter {
    pub fn new(policy: SuppressionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SuppressionPolicy {
        self.policy
    }

    /// Deliver future events of `kind` on the extended path.
    pub fn enable_suppression(&mut self, kind: SuppressibleKind) {
        if !self.policy.get(kind) {
            debug!(?kind, "Suppression enabled");
        }
        self.policy.set(kind, true);
    }

    /// Deliver future events of `kind` on the plain path.
    pub fn disable_suppression(&mut self, kind: SuppressibleKind) {
        if self.policy.get(kind) {
            debug!(?kind, "Suppression disabled");
        }
        self.policy.set(kind, false);
    }

    pub fn is_suppressing(&self, kind: SuppressibleKind) -> bool {
        self.policy.get(kind)
    }

    /// Deliver one suppressible event and compute what the source must do
    /// with it.
    pub(crate) fn route(
        &self,
        kind: SuppressibleKind,
        event: MouseEvent,
        plain: Option<&HandlerSet<MouseEvent>>,
        extended: Option<&HandlerSet<MouseEventExt>>,
    ) -> (Verdict, DispatchReport) {
        if self.policy.get(kind) {
            let ext = MouseEventExt::new(event);
            let report = match extended {
                Some(set) => set.invoke_until(EventKind::from(kind), &ext, MouseEventExt::handled),
                None => DispatchReport::default(),
            };
            let verdict = Verdict::from_handled(ext.handled());
            trace!(?kind, ?verdict, invoked = report.invoked, "Extended delivery");
            (verdict, report)
        } else {
            let report = match plain {
                Some(set) => set.invoke(EventKind::from(kind.plain()), &event),
                None => DispatchReport::default(),
            };
            (Verdict::Pass, report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MouseButton;
    use crate::handler::Handler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn right_click() -> MouseEvent {
        MouseEvent::button(MouseButton::Right, 5, 5, 0)
    }

    #[test]
    fn test_policy_flags() {
        let mut policy = SuppressionPolicy::default();
        assert!(!policy.get(SuppressibleKind::MouseWheel));
        policy.set(SuppressibleKind::MouseWheel, true);
        assert!(policy.mouse_wheel);
        assert!(!policy.mouse_hwheel);
    }

    #[test]
    fn test_plain_path_never_vetoes() {
        let router = SuppressionRouter::default();
        let plain_calls = Arc::new(AtomicUsize::new(0));
        let mut plain = HandlerSet::default();
        let c = plain_calls.clone();
        plain.insert(&Handler::observe(move |_: &MouseEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let mut extended = HandlerSet::default();
        extended.insert(&Handler::observe(|e: &MouseEventExt| e.set_handled(true)));

        let (verdict, report) =
            router.route(SuppressibleKind::MouseDown, right_click(), Some(&plain), Some(&extended));

        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(report.invoked, 1);
        assert_eq!(plain_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extended_path_short_circuits() {
        let mut router = SuppressionRouter::default();
        router.enable_suppression(SuppressibleKind::MouseDown);

        let after = Arc::new(AtomicUsize::new(0));
        let mut extended = HandlerSet::default();
        extended.insert(&Handler::observe(|e: &MouseEventExt| {
            if e.mouse.button == Some(MouseButton::Right) {
                e.set_handled(true);
            }
        }));
        let a = after.clone();
        extended.insert(&Handler::observe(move |_: &MouseEventExt| {
            a.fetch_add(1, Ordering::SeqCst);
        }));

        let (verdict, report) =
            router.route(SuppressibleKind::MouseDown, right_click(), None, Some(&extended));
        assert_eq!(verdict, Verdict::Suppress);
        assert_eq!(report.invoked, 1);
        assert_eq!(after.load(Ordering::SeqCst), 0);

        let left = MouseEvent::button(MouseButton::Left, 5, 5, 0);
        let (verdict, report) =
            router.route(SuppressibleKind::MouseDown, left, None, Some(&extended));
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(report.invoked, 2);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_toggle_switches_path_for_next_event() {
        let mut router = SuppressionRouter::default();
        let mut extended = HandlerSet::default();
        extended.insert(&Handler::observe(|e: &MouseEventExt| e.set_handled(true)));
        let wheel = MouseEvent::wheel(120, 0, 0, 0);

        let (verdict, _) = router.route(SuppressibleKind::MouseWheel, wheel, None, Some(&extended));
        assert_eq!(verdict, Verdict::Pass);

        router.enable_suppression(SuppressibleKind::MouseWheel);
        let (verdict, _) = router.route(SuppressibleKind::MouseWheel, wheel, None, Some(&extended));
        assert_eq!(verdict, Verdict::Suppress);

        // Horizontal wheel keeps its own flag.
        let (verdict, _) = router.route(SuppressibleKind::MouseHWheel, wheel, None, Some(&extended));
        assert_eq!(verdict, Verdict::Pass);

        router.disable_suppression(SuppressibleKind::MouseWheel);
        let (verdict, _) = router.route(SuppressibleKind::MouseWheel, wheel, None, Some(&extended));
        assert_eq!(verdict, Verdict::Pass);
    }

    #[test]
    fn test_extended_without_handlers_passes() {
        let router = SuppressionRouter::new(SuppressionPolicy {
            mouse_down: true,
            ..SuppressionPolicy::default()
        });
        let (verdict, report) = router.route(SuppressibleKind::MouseDown, right_click(), None, None);
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(report.invoked, 0);
    }
}
