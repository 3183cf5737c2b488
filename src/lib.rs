//! # Trellis
//!
//! A runtime for page-oriented web applications. Behaviour is declared
//! against CSS selectors and attached to whatever markup matches; a
//! client-side router swaps one region of the page per route.
//!
//! ## Feature Flags
//!
//! - `pages` (default) - the component runtime, store and router
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! let runtime = Runtime::builder()
//! 	.settings(RuntimeSettings::load("trellis.toml")?)
//! 	.body(r#"<main data-view></main>"#)
//! 	.build()?;
//!
//! runtime.router().add(RouteDefinition::new("home", "/")?.with_markup("<h1>Home</h1>"));
//! runtime.start().await?;
//! ```

#[cfg(feature = "pages")]
pub mod pages;

#[cfg(feature = "pages")]
pub use trellis_pages::{debug_log, error_log, info_log, warn_log};

/// Commonly used types.
#[cfg(feature = "pages")]
pub mod prelude {
	pub use crate::pages::{
		ActiveRoute, Component, EventContext, EventInit, GlobalPhase, HistoryMode, HookError,
		HookResult, Instance, RouteDefinition, Router, Runtime, RuntimeSettings, Store,
		Transition,
	};
}
