//! mkhook-platform: native event sources for mkhook.
//!
//! This crate provides:
//! - A global source per platform (low-level hooks on Windows, `rdev` elsewhere)
//! - [`PlatformSourceFactory`], the [`mkhook_core::SourceFactory`] hosts hand to
//!   [`mkhook_core::ScopeManager`]

mod error;
mod factory;
mod global;

pub use error::{PlatformError, PlatformResult};
pub use factory::PlatformSourceFactory;
pub use global::{can_suppress, GlobalSource};
