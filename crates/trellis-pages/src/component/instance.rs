//! Component instances and the table that owns them.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use serde_json::Value;

use super::registry::{Declaration, DeclarationId};
use super::scheduler::{self, RenderOutcome};
use crate::dom::{Document, NodeId, Selector};
use crate::error::{EventError, HookResult, PipelineError};
use crate::events::{Event, EventContext, EventInit, MarkerIndex, RegistrationKey, handler};
use crate::runtime::{Runtime, WeakRuntime};
use crate::store::{FireReport, watcher};

/// Identity token of an instance, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
	pub fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	pub fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for InstanceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:08x}", self.0)
	}
}

/// Lifecycle position of an instance.
///
/// ```text
/// Unmounted -> Constructing -> Mounted -> Rendering -> Rendered
///                                             ^            |
///                                             +------------+  (explicit re-render)
/// any -> Destroying -> Unmounted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
	Unmounted,
	Constructing,
	Mounted,
	Rendering,
	Rendered,
	Destroying,
}

struct InstanceInner {
	id: InstanceId,
	element: NodeId,
	declaration: Rc<Declaration>,
	state: RefCell<BTreeMap<String, Value>>,
	lifecycle: Cell<LifecycleState>,
	runtime: WeakRuntime,
}

/// One declaration bound to one element.
///
/// Cloning yields another handle to the same instance.
#[derive(Clone)]
pub struct Instance {
	inner: Rc<InstanceInner>,
}

impl fmt::Debug for Instance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Instance")
			.field("id", &self.inner.id)
			.field("selector", &self.selector())
			.field("element", &self.inner.element)
			.field("lifecycle", &self.lifecycle())
			.finish()
	}
}

impl PartialEq for Instance {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Instance {
	pub(crate) fn new(
		id: InstanceId,
		element: NodeId,
		declaration: Rc<Declaration>,
		runtime: WeakRuntime,
	) -> Self {
		Self {
			inner: Rc::new(InstanceInner {
				id,
				element,
				declaration,
				state: RefCell::new(BTreeMap::new()),
				lifecycle: Cell::new(LifecycleState::Unmounted),
				runtime,
			}),
		}
	}

	pub fn id(&self) -> InstanceId {
		self.inner.id
	}

	/// Bound element.
	pub fn element(&self) -> NodeId {
		self.inner.element
	}

	pub fn declaration(&self) -> &Rc<Declaration> {
		&self.inner.declaration
	}

	pub fn selector(&self) -> &str {
		self.inner.declaration.selector()
	}

	pub fn namespace(&self) -> &str {
		self.inner.declaration.namespace()
	}

	pub fn lifecycle(&self) -> LifecycleState {
		self.inner.lifecycle.get()
	}

	pub(crate) fn set_lifecycle(&self, state: LifecycleState) {
		self.inner.lifecycle.set(state);
	}

	/// Returns `true` between the end of construction and the start of destruction.
	///
	/// Hooks that complete after their instance went away should check this and
	/// return without side effects.
	pub fn is_mounted(&self) -> bool {
		matches!(
			self.lifecycle(),
			LifecycleState::Mounted | LifecycleState::Rendering | LifecycleState::Rendered
		)
	}

	/// The owning runtime, while it is alive.
	pub fn runtime(&self) -> Option<Runtime> {
		self.inner.runtime.upgrade()
	}

	fn attached(&self) -> Result<Runtime, EventError> {
		self.runtime().ok_or(EventError::Detached)
	}

	// State

	pub fn get(&self, key: &str) -> Option<Value> {
		self.inner.state.borrow().get(key).cloned()
	}

	pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
		self.inner
			.state
			.borrow_mut()
			.insert(key.into(), value.into());
	}

	/// Merges several entries into the state map.
	pub fn update<K, I>(&self, entries: I)
	where
		K: Into<String>,
		I: IntoIterator<Item = (K, Value)>,
	{
		let mut state = self.inner.state.borrow_mut();
		for (key, value) in entries {
			state.insert(key.into(), value);
		}
	}

	pub fn remove(&self, key: &str) -> Option<Value> {
		self.inner.state.borrow_mut().remove(key)
	}

	/// Snapshot of the state map, as exposed to templates.
	pub fn state(&self) -> BTreeMap<String, Value> {
		self.inner.state.borrow().clone()
	}

	// Events

	/// Delegates `event` to this instance, optionally narrowed to `subselector`.
	///
	/// A second registration for the same event and subselector replaces the first.
	pub fn on<F, Fut>(&self, event: &str, subselector: Option<&str>, f: F) -> Result<(), EventError>
	where
		F: Fn(EventContext) -> Fut + 'static,
		Fut: Future<Output = HookResult> + 'static,
	{
		let runtime = self.attached()?;
		let scope = subselector
			.map(|sub| Selector::scoped(self.selector(), sub))
			.transpose()?;
		let key = RegistrationKey::new(Some(self.id()), event, subselector);
		runtime
			.inner
			.events
			.borrow_mut()
			.register(key, scope, handler(f));
		Ok(())
	}

	/// Removes the registration made by [`on`](Self::on) with the same arguments.
	pub fn off(&self, event: &str, subselector: Option<&str>) -> bool {
		let Some(runtime) = self.runtime() else {
			return false;
		};
		let key = RegistrationKey::new(Some(self.id()), event, subselector);
		runtime.inner.events.borrow_mut().unregister(&key)
	}

	/// Dispatches `event` with this instance's element as target.
	pub async fn trigger(&self, event: &str) -> Result<Event, EventError> {
		let runtime = self.attached()?;
		Ok(runtime
			.dispatch(self.element(), EventInit::new(event))
			.await)
	}

	/// Event registrations owned by this instance.
	pub fn registrations(&self) -> Vec<RegistrationKey> {
		self.runtime()
			.map(|runtime| runtime.inner.events.borrow().keys_for(self.id()))
			.unwrap_or_default()
	}

	// Store

	/// `event` qualified with this instance's namespace and token.
	pub fn qualify(&self, event: &str) -> String {
		format!("{}.{}.{}", event, self.namespace(), self.id())
	}

	/// Watches the store event `event` qualified for this instance.
	pub fn watch<F, Fut>(&self, event: &str, f: F) -> Result<(), EventError>
	where
		F: Fn(Value) -> Fut + 'static,
		Fut: Future<Output = HookResult> + 'static,
	{
		let runtime = self.attached()?;
		runtime
			.store()
			.watch_owned(self.id(), &self.qualify(event), None, watcher(f));
		Ok(())
	}

	/// Removes the watchers registered through [`watch`](Self::watch) for `event`.
	pub fn unwatch(&self, event: &str) -> usize {
		self.runtime()
			.map(|runtime| runtime.store().unwatch(&self.qualify(event), None))
			.unwrap_or(0)
	}

	/// Fires the store event `event` qualified for this instance.
	pub async fn fire(&self, event: &str, payload: impl Into<Value>) -> Result<FireReport, EventError> {
		let runtime = self.attached()?;
		Ok(runtime.store().fire(&self.qualify(event), payload).await)
	}

	/// Stores a value owned by this instance; it is released on destroy.
	pub fn set_entry(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), EventError> {
		let runtime = self.attached()?;
		runtime.store().set_owned(self.id(), key, value);
		Ok(())
	}

	// Rendering

	/// Runs the render chain again.
	pub async fn render(&self) -> Result<RenderOutcome, PipelineError> {
		let Some(runtime) = self.runtime() else {
			return Ok(RenderOutcome::Skipped);
		};
		scheduler::render(&runtime, self).await
	}

	/// Merges `entries` into the state map, then renders.
	pub async fn render_with<K, I>(&self, entries: I) -> Result<RenderOutcome, PipelineError>
	where
		K: Into<String>,
		I: IntoIterator<Item = (K, Value)>,
	{
		self.update(entries);
		self.render().await
	}
}

/// Live instances keyed by element and declaration.
#[derive(Default)]
pub struct InstanceTable {
	records: HashMap<(NodeId, DeclarationId), Instance>,
	ids: HashMap<InstanceId, (NodeId, DeclarationId)>,
	markers: MarkerIndex,
	next: u64,
}

impl fmt::Debug for InstanceTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InstanceTable")
			.field("instances", &self.records.len())
			.field("markers", &self.markers.len())
			.finish()
	}
}

impl InstanceTable {
	pub(crate) fn allocate_id(&mut self) -> InstanceId {
		self.next += 1;
		InstanceId(self.next)
	}

	pub fn contains(&self, element: NodeId, declaration: DeclarationId) -> bool {
		self.records.contains_key(&(element, declaration))
	}

	pub(crate) fn insert(&mut self, instance: Instance) {
		let key = (instance.element(), instance.declaration().id());
		self.markers.mark(instance.element(), instance.id());
		self.ids.insert(instance.id(), key);
		self.records.insert(key, instance);
	}

	pub(crate) fn remove(&mut self, id: InstanceId) -> Option<Instance> {
		let key = self.ids.remove(&id)?;
		self.markers.unmark(key.0, id);
		self.records.remove(&key)
	}

	pub fn get(&self, id: InstanceId) -> Option<&Instance> {
		self.ids.get(&id).and_then(|key| self.records.get(key))
	}

	pub fn find(&self, element: NodeId, declaration: DeclarationId) -> Option<&Instance> {
		self.records.get(&(element, declaration))
	}

	/// Instances bound to strict descendants of `subtree` that are not already
	/// being destroyed, ordered by token.
	pub fn under(&self, document: &Document, subtree: NodeId) -> Vec<Instance> {
		let mut found: Vec<Instance> = self
			.records
			.values()
			.filter(|i| i.lifecycle() != LifecycleState::Destroying)
			.filter(|i| document.is_descendant(subtree, i.element()))
			.cloned()
			.collect();
		found.sort_by_key(Instance::id);
		found
	}

	/// Instances of one declaration, ordered by token.
	pub fn of_declaration(&self, declaration: DeclarationId) -> Vec<Instance> {
		let mut found: Vec<Instance> = self
			.records
			.iter()
			.filter(|((_, d), _)| *d == declaration)
			.map(|(_, i)| i.clone())
			.collect();
		found.sort_by_key(Instance::id);
		found
	}

	/// Every instance, ordered by token.
	pub fn all(&self) -> Vec<Instance> {
		let mut found: Vec<Instance> = self.records.values().cloned().collect();
		found.sort_by_key(Instance::id);
		found
	}

	pub fn markers(&self) -> &MarkerIndex {
		&self.markers
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}
