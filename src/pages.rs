//! Selector-driven page runtime
//!
//! This module provides access to trellis-pages: component declarations bound
//! to CSS selectors, delegated events, a state store and a client-side router.
//!
//! ## Architecture
//!
//! - **Components**: lifecycle pipelines run per (element, declaration) pair
//! - **Events**: one root listener per event name, scoped per instance
//! - **Store**: in-memory entries mirrored to a storage backend on request
//! - **Routing**: history or hash mode, guards, and an outlet region
//!
//! ## Example
//!
//! ```rust,ignore
//! use trellis::pages::{Component, HookResult, Instance, Runtime};
//!
//! struct Menu;
//!
//! #[async_trait::async_trait(?Send)]
//! impl Component for Menu {
//! 	async fn on_mount(&self, instance: &Instance) -> HookResult {
//! 		instance.on("click", Some("a"), |cx| async move {
//! 			tracing::debug!(target = ?cx.current, "menu link");
//! 			Ok(())
//! 		})?;
//! 		Ok(())
//! 	}
//! }
//!
//! let runtime = Runtime::builder().body("<nav data-menu></nav>").build()?;
//! runtime.component("[data-menu]", Menu)?;
//! runtime.start().await?;
//! ```

// Re-export all trellis-pages functionality
pub use trellis_pages::*;
