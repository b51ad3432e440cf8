//! mkhook-core: event model, dispatch and scope management for input hooks.
//!
//! Design goal: keep this crate platform-agnostic. Native hooks live in
//! `mkhook-platform` behind the [`RawSource`] / [`SourceFactory`] seam.

mod dispatcher;
mod error;
mod event;
mod gesture;
mod handler;
mod router;
mod scope;
mod source;

pub use dispatcher::Dispatcher;
pub use error::{HandlerError, HandlerFault, HandlerResult, HookError, HookResult};
pub use event::{
    ButtonAction, EventKind, KeyCode, KeyEvent, KeyKind, KeyPressEvent, MouseButton, MouseEvent,
    MouseEventExt, MouseKind, RawEvent, RawEventKind, Scope, SuppressibleKind, Verdict, WheelAxis,
};
pub use gesture::{Gesture, GestureConfig, GestureSynthesizer};
pub use handler::{DispatchReport, Handler};
pub use router::{SuppressionPolicy, SuppressionRouter};
pub use scope::{lock_dispatcher, ScopeManager, SharedDispatcher};
pub use source::{AppInputPort, AppSource, EventSink, RawSource, SourceFactory};
