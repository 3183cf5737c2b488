//! The application root.
//!
//! A [`Runtime`] owns the document, the component registry and instance
//! table, the delegated event registry, the store and the router. Everything
//! else reaches it through a cloned handle or a [`WeakRuntime`].
//!
//! ## Usage
//!
//! ```ignore
//! use trellis_pages::runtime::Runtime;
//! use trellis_pages::settings::RuntimeSettings;
//!
//! let runtime = Runtime::builder()
//! 	.settings(RuntimeSettings::load("trellis.toml")?)
//! 	.body(r#"<nav data-menu></nav><main data-view></main>"#)
//! 	.location("/queue")
//! 	.build()?;
//!
//! runtime.component("[data-menu]", Menu)?;
//! runtime.router().add(RouteDefinition::new("queue", "/queue")?.authenticated());
//! runtime.start().await?;
//! ```

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::component::{
	Component, Declaration, GlobalPhase, Instance, InstanceTable, Registry, scheduler,
};
use crate::dom::{Document, NodeId, Selector};
use crate::error::{EventError, HookResult, RuntimeError, SelectorError, SettingsError};
use crate::events::{Event, EventContext, EventInit, EventRegistry, RegistrationKey, handler};
use crate::pipeline::hook;
use crate::router::{Router, RouterOptions, RouterOutlet, SessionGuard, intercept_links};
use crate::settings::RuntimeSettings;
use crate::store::{FileBackend, MemoryBackend, StorageBackend, Store};
use crate::{debug_log, info_log, warn_log};

pub(crate) struct RuntimeInner {
	pub(crate) settings: RuntimeSettings,
	pub(crate) region: Selector,
	pub(crate) document: RefCell<Document>,
	pub(crate) registry: RefCell<Registry>,
	pub(crate) instances: RefCell<InstanceTable>,
	pub(crate) events: RefCell<EventRegistry>,
	pub(crate) store: Store,
	pub(crate) router: Router,
	navigation: Cell<bool>,
}

/// Handle to the application root. Clones share the same runtime.
#[derive(Clone)]
pub struct Runtime {
	pub(crate) inner: Rc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("declarations", &self.inner.registry.borrow().len())
			.field("instances", &self.inner.instances.borrow().len())
			.field("registrations", &self.inner.events.borrow().len())
			.field("router", &self.inner.router)
			.finish()
	}
}

/// Non-owning runtime handle held by instances and router hooks.
#[derive(Clone, Default)]
pub struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
	pub fn upgrade(&self) -> Option<Runtime> {
		self.0.upgrade().map(|inner| Runtime { inner })
	}
}

impl fmt::Debug for WeakRuntime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("WeakRuntime")
			.field(&(self.0.strong_count() > 0))
			.finish()
	}
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
	settings: Option<RuntimeSettings>,
	document: Option<Document>,
	backend: Option<Rc<dyn StorageBackend>>,
	location: Option<String>,
}

impl fmt::Debug for RuntimeBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RuntimeBuilder")
			.field("settings", &self.settings)
			.field("location", &self.location)
			.field("custom_backend", &self.backend.is_some())
			.finish()
	}
}

impl RuntimeBuilder {
	pub fn settings(mut self, settings: RuntimeSettings) -> Self {
		self.settings = Some(settings);
		self
	}

	pub fn document(mut self, document: Document) -> Self {
		self.document = Some(document);
		self
	}

	/// Starts from a document whose `<body>` holds `markup`.
	pub fn body(mut self, markup: &str) -> Self {
		self.document = Some(Document::with_body(markup));
		self
	}

	/// Persistent backend; by default a [`FileBackend`] when a storage path is
	/// configured, otherwise a [`MemoryBackend`].
	pub fn backend(mut self, backend: Rc<dyn StorageBackend>) -> Self {
		self.backend = Some(backend);
		self
	}

	/// Location of the initial history entry.
	pub fn location(mut self, location: impl Into<String>) -> Self {
		self.location = Some(location.into());
		self
	}

	pub fn build(self) -> Result<Runtime, SettingsError> {
		let settings = self.settings.unwrap_or_default();
		settings.validate()?;
		let region = settings.region_selector()?;

		let backend: Rc<dyn StorageBackend> = match (self.backend, &settings.storage_path) {
			(Some(backend), _) => backend,
			(None, Some(path)) => Rc::new(FileBackend::new(path.clone())),
			(None, None) => Rc::new(MemoryBackend::new()),
		};
		let router = Router::with_location(
			RouterOptions::from(&settings),
			self.location.as_deref().unwrap_or("/"),
		);

		Ok(Runtime {
			inner: Rc::new(RuntimeInner {
				region,
				document: RefCell::new(self.document.unwrap_or_default()),
				registry: RefCell::new(Registry::new()),
				instances: RefCell::new(InstanceTable::default()),
				events: RefCell::new(EventRegistry::new()),
				store: Store::new(backend),
				router,
				navigation: Cell::new(false),
				settings,
			}),
		})
	}
}

impl Runtime {
	pub fn builder() -> RuntimeBuilder {
		RuntimeBuilder::default()
	}

	/// Runtime over an empty document.
	pub fn new(settings: RuntimeSettings) -> Result<Self, SettingsError> {
		Self::builder().settings(settings).build()
	}

	pub fn downgrade(&self) -> WeakRuntime {
		WeakRuntime(Rc::downgrade(&self.inner))
	}

	pub fn settings(&self) -> &RuntimeSettings {
		&self.inner.settings
	}

	pub fn document(&self) -> Ref<'_, Document> {
		self.inner.document.borrow()
	}

	/// Mutable document access. Do not hold it across an `.await`.
	pub fn document_mut(&self) -> RefMut<'_, Document> {
		self.inner.document.borrow_mut()
	}

	pub fn body(&self) -> NodeId {
		self.inner.document.borrow().body()
	}

	pub fn store(&self) -> &Store {
		&self.inner.store
	}

	pub fn router(&self) -> Router {
		self.inner.router.clone()
	}

	pub fn events(&self) -> Ref<'_, EventRegistry> {
		self.inner.events.borrow()
	}

	pub fn registry(&self) -> Ref<'_, Registry> {
		self.inner.registry.borrow()
	}

	// Components

	/// Declares `component` for every element matching `selector`.
	///
	/// Existing elements are bound on the next [`mount`](Self::mount).
	pub fn component<C: Component>(
		&self,
		selector: &str,
		component: C,
	) -> Result<Rc<Declaration>, SelectorError> {
		let declaration = self
			.inner
			.registry
			.borrow_mut()
			.register(selector, Rc::new(component))?;
		debug_log!(selector = %declaration.selector(), "component declared");
		Ok(declaration)
	}

	/// Destroys the live instances of the latest declaration for `selector`
	/// and removes it. Returns `false` when no declaration matched.
	pub async fn remove_component(&self, selector: &str) -> bool {
		scheduler::unregister(self, selector).await
	}

	/// Adds a hook run for every instance at `phase`.
	pub fn on_lifecycle<F, Fut>(&self, phase: GlobalPhase, f: F)
	where
		F: Fn(Instance) -> Fut + 'static,
		Fut: Future<Output = HookResult> + 'static,
	{
		self.inner
			.registry
			.borrow_mut()
			.globals_mut()
			.add(phase, hook(f));
	}

	/// Binds and mounts instances for every unbound match below `subtree`.
	pub async fn mount(&self, subtree: NodeId) -> usize {
		scheduler::mount(self.clone(), subtree).await
	}

	/// Destroys every instance bound below `subtree`.
	pub async fn destroy(&self, subtree: NodeId) -> usize {
		scheduler::destroy(self, subtree).await
	}

	/// Every live instance, ordered by token.
	pub fn instances(&self) -> Vec<Instance> {
		self.inner.instances.borrow().all()
	}

	/// Live instances of the declarations registered for `selector`.
	pub fn instances_of(&self, selector: &str) -> Vec<Instance> {
		let selector = selector.trim();
		self.instances()
			.into_iter()
			.filter(|instance| instance.selector() == selector)
			.collect()
	}

	/// Drops the event registrations, store entries, watchers and record of
	/// `instance`.
	pub(crate) fn release(&self, instance: &Instance) {
		let id = instance.id();
		let registrations = self.inner.events.borrow_mut().release(id);
		let entries = self.inner.store.release(id);
		self.inner.instances.borrow_mut().remove(id);
		debug_log!(token = %id, registrations, entries, "instance released");
	}

	// Events

	/// Registers a handler for `event` not owned by any instance.
	pub fn on_document<F, Fut>(&self, event: &str, selector: Option<&str>, f: F) -> Result<(), EventError>
	where
		F: Fn(EventContext) -> Fut + 'static,
		Fut: Future<Output = HookResult> + 'static,
	{
		let scope = selector.map(Selector::parse).transpose()?;
		let key = RegistrationKey::new(None, event, selector);
		self.inner
			.events
			.borrow_mut()
			.register(key, scope, handler(f));
		Ok(())
	}

	pub fn off_document(&self, event: &str, selector: Option<&str>) -> bool {
		let key = RegistrationKey::new(None, event, selector);
		self.inner.events.borrow_mut().unregister(&key)
	}

	/// Dispatches an event at `target` and runs every handler it reaches.
	///
	/// Handlers closer to the target run first. A failing handler is logged
	/// and does not stop the others; [`Event::stop_propagation`] does.
	pub async fn dispatch(&self, target: NodeId, init: EventInit) -> Event {
		let event = Event::new(init, target);
		let reached = {
			let document = self.inner.document.borrow();
			let instances = self.inner.instances.borrow();
			let mut reached = self
				.inner
				.events
				.borrow()
				.resolve(&document, &instances, &event);
			reached.sort_by_key(|(_, cx)| std::cmp::Reverse(document.ancestors_inclusive(cx.current).count()));
			reached
		};

		for (handler, cx) in reached {
			if event.propagation_stopped() {
				break;
			}
			if cx.instance.as_ref().is_some_and(|instance| !instance.is_mounted()) {
				continue;
			}
			if let Err(error) = handler(cx).await {
				warn_log!(event = %event.name(), "event handler failed: {error}");
			}
		}
		event
	}

	// Navigation

	/// Installs the session guard, the outlet and link interception. Runs once.
	pub fn install_navigation(&self) -> Result<(), EventError> {
		if self.inner.navigation.replace(true) {
			return Ok(());
		}
		let router = &self.inner.router;
		router.before_hook(
			SessionGuard::from_settings(self.inner.store.clone(), &self.inner.settings).into_hook(),
		);
		router.after_hook(RouterOutlet::new(self, self.inner.region.clone()).into_hook());
		intercept_links(self)
	}

	/// Loads persisted keys, installs navigation, mounts the document and
	/// applies the initial location.
	pub async fn start(&self) -> Result<(), RuntimeError> {
		let loaded = self
			.inner
			.store
			.load(&self.inner.settings.persisted_keys)
			.await?;
		self.install_navigation()?;
		let root = self.inner.document.borrow().root();
		let mounted = self.mount(root).await;
		info_log!(loaded, mounted, "runtime started");
		self.inner.router.start().await?;
		Ok(())
	}
}
