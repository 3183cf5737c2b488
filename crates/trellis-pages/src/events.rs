//! Delegated event handling.
//!
//! Nothing is bound to individual elements. The registry keeps one root
//! listener per event name and, when an event is dispatched, resolves which
//! registrations apply by walking from the target towards the root:
//!
//! - an instance registration applies when one of the target's inclusive
//!   ancestors carries the instance marker (see [`MarkerIndex`]);
//! - with a subselector, the target's closest match of
//!   `declaration selector + ' ' + subselector` must lie inside the instance
//!   element and becomes the current target;
//! - document registrations (no owner) apply to every dispatch, optionally
//!   filtered by a selector.
//!
//! Sibling instances of one declaration never see each other's events because
//! their markers sit on disjoint subtrees.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use serde_json::Value;

use crate::component::{Instance, InstanceId, InstanceTable};
use crate::debug_log;
use crate::dom::{Document, NodeId, Selector};
use crate::error::HookResult;
use crate::pipeline::HookFuture;

/// Modifier keys held while the event fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
	pub meta: bool,
	pub ctrl: bool,
	pub shift: bool,
	pub alt: bool,
}

impl Modifiers {
	/// Returns `true` when any modifier is held.
	pub fn any(self) -> bool {
		self.meta || self.ctrl || self.shift || self.alt
	}
}

/// Description of an event before it is dispatched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventInit {
	name: String,
	modifiers: Modifiers,
	button: u16,
	detail: Option<Value>,
}

impl EventInit {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}

	pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
		self.modifiers = modifiers;
		self
	}

	/// Mouse button; `0` is the primary button.
	pub fn with_button(mut self, button: u16) -> Self {
		self.button = button;
		self
	}

	pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
		self.detail = Some(detail.into());
		self
	}
}

struct EventInner {
	init: EventInit,
	target: NodeId,
	default_prevented: Cell<bool>,
	propagation_stopped: Cell<bool>,
}

/// A dispatched event, shared by every handler it reaches.
#[derive(Clone)]
pub struct Event {
	inner: Rc<EventInner>,
}

impl fmt::Debug for Event {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event")
			.field("name", &self.inner.init.name)
			.field("target", &self.inner.target)
			.field("default_prevented", &self.default_prevented())
			.finish()
	}
}

impl Event {
	pub fn new(init: EventInit, target: NodeId) -> Self {
		Self {
			inner: Rc::new(EventInner {
				init,
				target,
				default_prevented: Cell::new(false),
				propagation_stopped: Cell::new(false),
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.inner.init.name
	}

	pub fn target(&self) -> NodeId {
		self.inner.target
	}

	pub fn modifiers(&self) -> Modifiers {
		self.inner.init.modifiers
	}

	pub fn button(&self) -> u16 {
		self.inner.init.button
	}

	pub fn detail(&self) -> Option<&Value> {
		self.inner.init.detail.as_ref()
	}

	pub fn prevent_default(&self) {
		self.inner.default_prevented.set(true);
	}

	pub fn default_prevented(&self) -> bool {
		self.inner.default_prevented.get()
	}

	/// Stops delivery to the registrations that have not run yet.
	pub fn stop_propagation(&self) {
		self.inner.propagation_stopped.set(true);
	}

	pub fn propagation_stopped(&self) -> bool {
		self.inner.propagation_stopped.get()
	}
}

/// What a handler receives.
#[derive(Debug, Clone)]
pub struct EventContext {
	pub event: Event,
	/// The instance element, the subselector match, or the document
	/// registration's selector match.
	pub current: NodeId,
	/// Owning instance; `None` for document registrations.
	pub instance: Option<Instance>,
}

/// Delegated event handler.
pub type EventHandler = Rc<dyn Fn(EventContext) -> HookFuture>;

/// Wraps an async closure into an [`EventHandler`].
pub fn handler<F, Fut>(f: F) -> EventHandler
where
	F: Fn(EventContext) -> Fut + 'static,
	Fut: Future<Output = HookResult> + 'static,
{
	Rc::new(move |cx: EventContext| -> HookFuture { Box::pin(f(cx)) })
}

/// Identity of a registration. Registering the same key twice replaces the
/// earlier handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationKey {
	pub owner: Option<InstanceId>,
	pub event: String,
	pub subselector: Option<String>,
}

impl RegistrationKey {
	pub fn new(owner: Option<InstanceId>, event: &str, subselector: Option<&str>) -> Self {
		Self {
			owner,
			event: event.to_string(),
			subselector: subselector.map(|s| s.trim().to_string()),
		}
	}
}

impl fmt::Display for RegistrationKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.event)?;
		if let Some(owner) = self.owner {
			write!(f, ".{owner}")?;
		}
		if let Some(sub) = &self.subselector {
			write!(f, " {sub}")?;
		}
		Ok(())
	}
}

struct Registration {
	key: RegistrationKey,
	scope: Option<Selector>,
	handler: EventHandler,
}

/// Element to instance-token index used to scope delegated events.
#[derive(Debug, Default)]
pub struct MarkerIndex {
	by_node: HashMap<NodeId, Vec<InstanceId>>,
}

impl MarkerIndex {
	pub fn mark(&mut self, node: NodeId, id: InstanceId) {
		let tokens = self.by_node.entry(node).or_default();
		if !tokens.contains(&id) {
			tokens.push(id);
		}
	}

	pub fn unmark(&mut self, node: NodeId, id: InstanceId) {
		if let Some(tokens) = self.by_node.get_mut(&node) {
			tokens.retain(|t| *t != id);
			if tokens.is_empty() {
				self.by_node.remove(&node);
			}
		}
	}

	/// Tokens of the instances bound to `node`.
	pub fn tokens(&self, node: NodeId) -> &[InstanceId] {
		self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn carries(&self, node: NodeId, id: InstanceId) -> bool {
		self.tokens(node).contains(&id)
	}

	/// Nearest inclusive ancestor of `node` carrying the marker of `id`.
	pub fn nearest(&self, document: &Document, node: NodeId, id: InstanceId) -> Option<NodeId> {
		document
			.ancestors_inclusive(node)
			.find(|n| self.carries(*n, id))
	}

	pub fn len(&self) -> usize {
		self.by_node.values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.by_node.is_empty()
	}
}

/// Every delegated registration plus the root listeners they require.
#[derive(Default)]
pub struct EventRegistry {
	registrations: Vec<Registration>,
	listeners: BTreeMap<String, usize>,
}

impl fmt::Debug for EventRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventRegistry")
			.field(
				"registrations",
				&self.registrations.iter().map(|r| &r.key).collect::<Vec<_>>(),
			)
			.field("listeners", &self.listeners)
			.finish()
	}
}

impl EventRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a registration, replacing an existing one with the same key.
	///
	/// Returns `true` when a previous registration was replaced.
	pub fn register(
		&mut self,
		key: RegistrationKey,
		scope: Option<Selector>,
		handler: EventHandler,
	) -> bool {
		if let Some(existing) = self.registrations.iter_mut().find(|r| r.key == key) {
			existing.scope = scope;
			existing.handler = handler;
			return true;
		}
		let count = self.listeners.entry(key.event.clone()).or_insert(0);
		if *count == 0 {
			debug_log!(event = %key.event, "root listener installed");
		}
		*count += 1;
		self.registrations.push(Registration {
			key,
			scope,
			handler,
		});
		false
	}

	/// Removes the registration with `key`.
	pub fn unregister(&mut self, key: &RegistrationKey) -> bool {
		let before = self.registrations.len();
		self.registrations.retain(|r| &r.key != key);
		let removed = before - self.registrations.len();
		self.release_listeners(&key.event, removed);
		removed > 0
	}

	/// Removes every registration owned by `owner`.
	pub fn release(&mut self, owner: InstanceId) -> usize {
		let mut released: Vec<String> = Vec::new();
		self.registrations.retain(|r| {
			if r.key.owner == Some(owner) {
				released.push(r.key.event.clone());
				false
			} else {
				true
			}
		});
		for event in &released {
			self.release_listeners(event, 1);
		}
		released.len()
	}

	fn release_listeners(&mut self, event: &str, removed: usize) {
		if removed == 0 {
			return;
		}
		if let Some(count) = self.listeners.get_mut(event) {
			*count = count.saturating_sub(removed);
			if *count == 0 {
				self.listeners.remove(event);
				debug_log!(event = %event, "root listener removed");
			}
		}
	}

	/// Keys owned by `owner`, in registration order.
	pub fn keys_for(&self, owner: InstanceId) -> Vec<RegistrationKey> {
		self.registrations
			.iter()
			.filter(|r| r.key.owner == Some(owner))
			.map(|r| r.key.clone())
			.collect()
	}

	/// Returns `true` while a root listener for `event` is installed.
	pub fn is_listening(&self, event: &str) -> bool {
		self.listeners.contains_key(event)
	}

	/// Number of installed root listeners (one per event name).
	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}

	pub fn len(&self) -> usize {
		self.registrations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.registrations.is_empty()
	}

	/// Handlers reached by `event`, in registration order.
	pub(crate) fn resolve(
		&self,
		document: &Document,
		instances: &InstanceTable,
		event: &Event,
	) -> Vec<(EventHandler, EventContext)> {
		let target = event.target();
		let mut reached = Vec::new();

		for registration in self
			.registrations
			.iter()
			.filter(|r| r.key.event == event.name())
		{
			let (current, instance) = match registration.key.owner {
				Some(owner) => {
					let Some(instance) = instances.get(owner) else {
						continue;
					};
					if instances.markers().nearest(document, target, owner).is_none() {
						continue;
					}
					let current = match &registration.scope {
						Some(scope) => match document.closest(target, scope) {
							Some(node) if document.is_inclusive_ancestor(instance.element(), node) => {
								node
							}
							_ => continue,
						},
						None => instance.element(),
					};
					(current, Some(instance.clone()))
				}
				None => match &registration.scope {
					Some(scope) => match document.closest(target, scope) {
						Some(node) => (node, None),
						None => continue,
					},
					None => (document.root(), None),
				},
			};
			reached.push((
				Rc::clone(&registration.handler),
				EventContext {
					event: event.clone(),
					current,
					instance,
				},
			));
		}
		reached
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn noop() -> EventHandler {
		handler(|_| async { Ok(()) })
	}

	fn id(raw: u64) -> InstanceId {
		InstanceId::from_raw(raw)
	}

	#[rstest]
	fn test_one_root_listener_per_event() {
		let mut registry = EventRegistry::new();
		registry.register(RegistrationKey::new(Some(id(1)), "click", None), None, noop());
		registry.register(
			RegistrationKey::new(Some(id(2)), "click", Some("a")),
			None,
			noop(),
		);
		registry.register(RegistrationKey::new(None, "keydown", None), None, noop());

		assert_eq!(registry.len(), 3);
		assert_eq!(registry.listener_count(), 2);
		assert!(registry.is_listening("click"));
	}

	#[rstest]
	fn test_same_key_replaces() {
		let mut registry = EventRegistry::new();
		let key = RegistrationKey::new(Some(id(1)), "click", Some(" li "));
		assert!(!registry.register(key.clone(), None, noop()));
		assert!(registry.register(key, None, noop()));
		assert_eq!(registry.len(), 1);
	}

	#[rstest]
	fn test_release_uninstalls_unused_listeners() {
		let mut registry = EventRegistry::new();
		registry.register(RegistrationKey::new(Some(id(1)), "click", None), None, noop());
		registry.register(RegistrationKey::new(Some(id(1)), "focus", None), None, noop());
		registry.register(RegistrationKey::new(Some(id(2)), "click", None), None, noop());

		assert_eq!(registry.release(id(1)), 2);

		assert!(registry.is_listening("click"));
		assert!(!registry.is_listening("focus"));
		assert!(registry.keys_for(id(1)).is_empty());
		assert_eq!(registry.keys_for(id(2)).len(), 1);
	}

	#[rstest]
	fn test_unregister_by_key() {
		let mut registry = EventRegistry::new();
		let key = RegistrationKey::new(None, "click", Some("a"));
		registry.register(key.clone(), None, noop());
		assert!(registry.unregister(&key));
		assert!(!registry.unregister(&key));
		assert_eq!(registry.listener_count(), 0);
	}

	#[rstest]
	fn test_marker_index_nearest() {
		let document = Document::with_body("<div><p><span>x</span></p></div>");
		let div = document.children(document.body())[0];
		let p = document.children(div)[0];
		let span = document.children(p)[0];
		let mut markers = MarkerIndex::default();
		markers.mark(div, id(1));
		markers.mark(p, id(2));

		assert_eq!(markers.nearest(&document, span, id(1)), Some(div));
		assert_eq!(markers.nearest(&document, span, id(2)), Some(p));
		assert_eq!(markers.nearest(&document, div, id(2)), None);

		markers.unmark(p, id(2));
		assert!(markers.tokens(p).is_empty());
		assert_eq!(markers.len(), 1);
	}

	#[rstest]
	fn test_event_flags() {
		let event = Event::new(
			EventInit::new("click")
				.with_modifiers(Modifiers {
					ctrl: true,
					..Modifiers::default()
				})
				.with_detail(serde_json::json!({"x": 1})),
			NodeId::from_raw(3),
		);
		assert!(event.modifiers().any());
		assert!(!event.default_prevented());
		event.clone().prevent_default();
		assert!(event.default_prevented());
		assert_eq!(event.detail().and_then(|d| d["x"].as_i64()), Some(1));
	}

	#[rstest]
	fn test_registration_key_display() {
		let key = RegistrationKey::new(Some(id(0x2a)), "click", Some("li"));
		assert_eq!(key.to_string(), "click.0000002a li");
	}
}
