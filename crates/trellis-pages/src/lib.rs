//! Trellis Pages - single-page application runtime
//!
//! A runtime for page-oriented applications: behaviour is declared against
//! CSS selectors, instances are created when matching markup appears and
//! destroyed when it goes away, events are delegated from the document root,
//! and a client-side router swaps one region of the page per route.
//!
//! ## Features
//!
//! - **Declaration Registry**: selector-bound components with idempotent mounting
//! - **Hook Pipeline**: ordered stages of concurrently awaited hooks with fault isolation
//! - **Event Delegation**: one root listener per event name, scoped per instance
//! - **State Store**: memory entries with an optional persistent mirror and named watchers
//! - **Router**: path templates, guards that may rewrite once, history and hash modes
//!
//! ## Architecture
//!
//! - [`dom`]: in-memory document and selector matching
//! - [`pipeline`]: hooks, stages and the pipeline runner
//! - [`component`]: declarations, instances and the mount/destroy scheduler
//! - [`events`]: delegated event registrations
//! - [`store`]: the state store and storage backends
//! - [`router`]: client-side routing, session guard and outlet
//! - [`settings`]: TOML and environment configuration
//! - [`runtime`]: the application root tying everything together
//!
//! ## Example
//!
//! ```ignore
//! use trellis_pages::{RouteDefinition, Runtime, RuntimeSettings};
//!
//! let runtime = Runtime::builder()
//! 	.settings(RuntimeSettings::load("trellis.toml")?)
//! 	.body(r#"<main data-view></main>"#)
//! 	.location("/login")
//! 	.build()?;
//!
//! runtime.router().add_all([
//! 	RouteDefinition::new("queue", "/")?.authenticated().with_markup("<div data-queue></div>"),
//! 	RouteDefinition::new("login", "/login")?.unauthenticated().with_markup("<form data-login></form>"),
//! ]);
//! runtime.component("[data-login]", LoginForm)?;
//! runtime.start().await?;
//! ```
#![warn(missing_debug_implementations)]

// Core modules
pub mod dom;
pub mod error;
pub mod logging;
pub mod pipeline;

// Component system
pub mod component;
pub mod events;

// State and navigation
pub mod router;
pub mod store;

pub mod runtime;
pub mod settings;

pub use component::{Component, Declaration, GlobalPhase, Instance, InstanceId, Phase};
pub use dom::{Document, NodeId, Selector};
pub use error::{
	EventError, HookError, HookResult, MarkupError, PipelineError, RouterError, RuntimeError,
	SelectorError, SettingsError, StoreError,
};
pub use events::{Event, EventContext, EventInit, Modifiers};
pub use pipeline::{Hook, Pipeline, Stage, hook};
pub use router::{
	ActiveRoute, ChangeOutcome, HistoryMode, RouteDefinition, Router, RouterOptions, RouterOutlet,
	SessionGuard, Transition,
};
pub use runtime::{Runtime, RuntimeBuilder, WeakRuntime};
pub use settings::RuntimeSettings;
pub use store::{FileBackend, MemoryBackend, StorageBackend, Store};
