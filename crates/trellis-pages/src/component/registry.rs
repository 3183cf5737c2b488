//! Declaration registry and global lifecycle hooks.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::instance::Instance;
use super::r#trait::Component;
use crate::dom::{Document, NodeId, Selector};
use crate::error::SelectorError;
use crate::pipeline::Hook;

/// Identity of a registered declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclarationId(u64);

/// A selector bound to component behaviour.
pub struct Declaration {
	id: DeclarationId,
	selector: Selector,
	namespace: String,
	component: Rc<dyn Component>,
}

impl fmt::Debug for Declaration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Declaration")
			.field("id", &self.id)
			.field("selector", &self.selector.as_str())
			.field("namespace", &self.namespace)
			.field("component", &self.component.name())
			.finish()
	}
}

impl Declaration {
	pub fn id(&self) -> DeclarationId {
		self.id
	}

	/// Selector text as registered.
	pub fn selector(&self) -> &str {
		self.selector.as_str()
	}

	/// Compiled selector.
	pub fn compiled(&self) -> &Selector {
		&self.selector
	}

	/// Identifier derived from the selector, used to qualify watch events.
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn component(&self) -> &Rc<dyn Component> {
		&self.component
	}
}

/// Derives the namespace of a selector: every run of characters other than
/// ASCII letters and digits collapses into a single `_`.
pub fn namespace_for(selector: &str) -> String {
	let mut namespace = String::with_capacity(selector.len());
	let mut in_run = false;
	for c in selector.chars() {
		if c.is_ascii_alphanumeric() {
			namespace.push(c);
			in_run = false;
		} else if !in_run {
			namespace.push('_');
			in_run = true;
		}
	}
	namespace
}

/// Points where application-wide hooks run for every instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalPhase {
	BeforeConstruct,
	AfterConstruct,
	BeforeMount,
	AfterMount,
	BeforeRender,
	AfterRender,
	BeforeDestroy,
	AfterDestroy,
}

/// Hooks registered for every instance of every declaration.
#[derive(Clone, Default)]
pub struct GlobalHooks {
	hooks: HashMap<GlobalPhase, Vec<Hook<Instance>>>,
}

impl fmt::Debug for GlobalHooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut counts: Vec<_> = self
			.hooks
			.iter()
			.map(|(phase, hooks)| (*phase, hooks.len()))
			.collect();
		counts.sort_by_key(|(phase, _)| format!("{phase:?}"));
		f.debug_struct("GlobalHooks").field("hooks", &counts).finish()
	}
}

impl GlobalHooks {
	pub fn add(&mut self, phase: GlobalPhase, hook: Hook<Instance>) {
		self.hooks.entry(phase).or_default().push(hook);
	}

	/// Hooks for `phase` in registration order.
	pub fn get(&self, phase: GlobalPhase) -> Vec<Hook<Instance>> {
		self.hooks.get(&phase).cloned().unwrap_or_default()
	}
}

/// Append-only list of component declarations.
#[derive(Debug, Default)]
pub struct Registry {
	declarations: Vec<Rc<Declaration>>,
	next_id: u64,
	globals: GlobalHooks,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a declaration. Duplicate selectors produce independent declarations.
	pub fn register(
		&mut self,
		selector: &str,
		component: Rc<dyn Component>,
	) -> Result<Rc<Declaration>, SelectorError> {
		let compiled = Selector::parse(selector)?;
		self.next_id += 1;
		let declaration = Rc::new(Declaration {
			id: DeclarationId(self.next_id),
			namespace: namespace_for(compiled.as_str()),
			selector: compiled,
			component,
		});
		self.declarations.push(Rc::clone(&declaration));
		Ok(declaration)
	}

	/// For each declaration, the descendants of `subtree` matching its selector.
	pub fn find_matching(
		&self,
		document: &Document,
		subtree: NodeId,
	) -> Vec<(Rc<Declaration>, Vec<NodeId>)> {
		self.declarations
			.iter()
			.map(|declaration| {
				(
					Rc::clone(declaration),
					document.query_all(subtree, declaration.compiled()),
				)
			})
			.filter(|(_, elements)| !elements.is_empty())
			.collect()
	}

	/// Most recently registered declaration for `selector`.
	pub fn latest(&self, selector: &str) -> Option<Rc<Declaration>> {
		let selector = selector.trim();
		self.declarations
			.iter()
			.rev()
			.find(|d| d.selector() == selector)
			.cloned()
	}

	/// Removes a declaration by id.
	pub fn remove(&mut self, id: DeclarationId) -> Option<Rc<Declaration>> {
		let index = self.declarations.iter().position(|d| d.id == id)?;
		Some(self.declarations.remove(index))
	}

	pub fn declarations(&self) -> &[Rc<Declaration>] {
		&self.declarations
	}

	pub fn len(&self) -> usize {
		self.declarations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.declarations.is_empty()
	}

	pub fn globals(&self) -> &GlobalHooks {
		&self.globals
	}

	pub fn globals_mut(&mut self) -> &mut GlobalHooks {
		&mut self.globals
	}
}
