//! Component System for trellis-pages
//!
//! A component is a selector bound to behaviour. Registering it yields a
//! [`Declaration`]; mounting a subtree creates one [`Instance`] for every
//! (element, declaration) pair that does not have one yet and drives it
//! through its lifecycle.
//!
//! ## Lifecycle
//!
//! | Phase | Stages |
//! |-------|--------|
//! | construct | global before, `construct`, global after |
//! | mount | global before, `before_mount`, `on_mount`, `after_mount`, global after |
//! | render | `should_render`, global before, `before_render`, template, `on_render`, `after_render`, global after, mount descendants |
//! | destroy | global before, `before_destroy`, `on_destroy`, `after_destroy`, global after, `destruct` |
//!
//! ## Usage
//!
//! ```ignore
//! use trellis_pages::component::{Component, Instance};
//!
//! struct Menu;
//!
//! #[async_trait::async_trait(?Send)]
//! impl Component for Menu {
//! 	async fn on_mount(&self, instance: &Instance) -> HookResult {
//! 		instance.on("click", Some("a"), |cx| async move { Ok(()) })?;
//! 		Ok(())
//! 	}
//! }
//!
//! runtime.component("[data-menu]", Menu)?;
//! runtime.mount(runtime.body()).await;
//! ```

mod instance;
mod registry;
pub(crate) mod scheduler;
mod r#trait;

pub use instance::{Instance, InstanceId, InstanceTable, LifecycleState};
pub use registry::{
	Declaration, DeclarationId, GlobalHooks, GlobalPhase, Registry, namespace_for,
};
pub use scheduler::RenderOutcome;
pub use r#trait::{Component, Phase};
