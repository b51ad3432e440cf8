//! Global scope sources.
//!
//! Platform implementations:
//! - Windows: low-level `WH_KEYBOARD_LL` / `WH_MOUSE_LL` hooks on a dedicated
//!   thread (`windows_native.rs`). Verdicts are honored.
//! - Elsewhere: a process-wide `rdev::listen` thread (`rdev_impl.rs`).
//!   Observe-only.

#[cfg(windows)]
mod windows_native;

#[cfg(not(windows))]
mod rdev_impl;

#[cfg(windows)]
pub use windows_native::GlobalSource;

#[cfg(not(windows))]
pub use rdev_impl::GlobalSource;

/// Whether the global source on this platform can swallow events.
pub const fn can_suppress() -> bool {
    cfg!(windows)
}
