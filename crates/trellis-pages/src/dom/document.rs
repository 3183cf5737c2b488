//! Arena-backed document tree.

use super::markup;
use super::selector::Selector;
use crate::error::MarkupError;

/// Handle to a node in a [`Document`].
///
/// Slots of removed nodes are recycled, but every reuse bumps the slot's
/// generation, so a stale handle never resolves to a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
	index: usize,
	generation: u32,
}

impl NodeId {
	/// Builds a first-generation handle from its raw index.
	pub fn from_raw(index: usize) -> Self {
		Self {
			index,
			generation: 0,
		}
	}

	/// Raw arena index.
	pub fn index(self) -> usize {
		self.index
	}

	/// How many times the slot had been recycled when this handle was issued.
	pub fn generation(self) -> u32 {
		self.generation
	}
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
	/// The single document root.
	Document,
	/// An element with its lowercase tag name and attributes in source order.
	Element {
		/// Tag name.
		tag: String,
		/// Attributes in source order.
		attrs: Vec<(String, String)>,
	},
	/// A text node.
	Text(String),
	/// A comment node.
	Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
	data: NodeData,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Slot {
	generation: u32,
	node: Option<Node>,
}

/// The single UI tree the runtime mutates in place.
///
/// A fresh document holds `<html><head></head><body></body></html>` under the
/// root node.
#[derive(Debug, Clone)]
pub struct Document {
	slots: Vec<Slot>,
	free: Vec<usize>,
	root: NodeId,
	head: NodeId,
	body: NodeId,
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl Document {
	/// Creates an empty document.
	pub fn new() -> Self {
		let root = NodeId::from_raw(0);
		let mut document = Self {
			slots: vec![Slot {
				generation: 0,
				node: Some(Node {
					data: NodeData::Document,
					parent: None,
					children: Vec::new(),
				}),
			}],
			free: Vec::new(),
			root,
			head: root,
			body: root,
		};
		let html = document.create_element("html");
		let head = document.create_element("head");
		let body = document.create_element("body");
		document.attach(document.root, html);
		document.attach(html, head);
		document.attach(html, body);
		document.head = head;
		document.body = body;
		document
	}

	/// Creates a document whose `<body>` holds `markup`.
	pub fn with_body(markup: &str) -> Self {
		let mut document = Self::new();
		let body = document.body;
		markup::parse_into(&mut document, body, markup);
		document
	}

	/// The document root (not an element).
	pub fn root(&self) -> NodeId {
		self.root
	}

	/// The `<head>` element.
	pub fn head(&self) -> NodeId {
		self.head
	}

	/// The `<body>` element.
	pub fn body(&self) -> NodeId {
		self.body
	}

	/// Returns `true` while the node is attached to the arena.
	pub fn contains(&self, node: NodeId) -> bool {
		self.node(node).is_some()
	}

	/// Returns `true` when `node` is reachable from the document root.
	pub fn is_connected(&self, node: NodeId) -> bool {
		self.contains(node) && self.is_inclusive_ancestor(self.root, node)
	}

	fn node(&self, id: NodeId) -> Option<&Node> {
		self.slots
			.get(id.index)
			.filter(|slot| slot.generation == id.generation)
			.and_then(|slot| slot.node.as_ref())
	}

	fn live_mut(&mut self, id: NodeId) -> Option<&mut Node> {
		self.slots
			.get_mut(id.index)
			.filter(|slot| slot.generation == id.generation)
			.and_then(|slot| slot.node.as_mut())
	}

	fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, MarkupError> {
		self.live_mut(id).ok_or(MarkupError::UnknownNode(id))
	}

	fn alloc(&mut self, data: NodeData) -> NodeId {
		let node = Node {
			data,
			parent: None,
			children: Vec::new(),
		};
		if let Some(index) = self.free.pop() {
			let slot = &mut self.slots[index];
			slot.node = Some(node);
			return NodeId {
				index,
				generation: slot.generation,
			};
		}
		self.slots.push(Slot {
			generation: 0,
			node: Some(node),
		});
		NodeId::from_raw(self.slots.len() - 1)
	}

	/// Number of arena slots, live or free.
	pub fn capacity(&self) -> usize {
		self.slots.len()
	}

	// Caller guarantees both ids are live and `child` is detached.
	fn attach(&mut self, parent: NodeId, child: NodeId) {
		if let Some(node) = self.live_mut(child) {
			node.parent = Some(parent);
		}
		if let Some(node) = self.live_mut(parent) {
			node.children.push(child);
		}
	}

	/// Creates a detached element.
	pub fn create_element(&mut self, tag: &str) -> NodeId {
		self.alloc(NodeData::Element {
			tag: tag.to_ascii_lowercase(),
			attrs: Vec::new(),
		})
	}

	pub(crate) fn create_element_with_attrs(
		&mut self,
		tag: &str,
		attrs: Vec<(String, String)>,
	) -> NodeId {
		self.alloc(NodeData::Element {
			tag: tag.to_ascii_lowercase(),
			attrs,
		})
	}

	/// Creates a detached text node.
	pub fn create_text(&mut self, text: &str) -> NodeId {
		self.alloc(NodeData::Text(text.to_string()))
	}

	/// Creates a detached comment node.
	pub fn create_comment(&mut self, text: &str) -> NodeId {
		self.alloc(NodeData::Comment(text.to_string()))
	}

	/// Appends `child` as the last child of `parent`, detaching it first.
	pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), MarkupError> {
		match self.node(parent).map(|n| &n.data) {
			Some(NodeData::Element { .. } | NodeData::Document) => {}
			Some(_) => return Err(MarkupError::NotAContainer(parent)),
			None => return Err(MarkupError::UnknownNode(parent)),
		}
		if !self.contains(child) {
			return Err(MarkupError::UnknownNode(child));
		}
		if self.is_inclusive_ancestor(child, parent) {
			return Err(MarkupError::Cycle { child, parent });
		}
		self.detach(child);
		self.attach(parent, child);
		Ok(())
	}

	fn detach(&mut self, child: NodeId) {
		let parent = self.node(child).and_then(|n| n.parent);
		if let Some(node) = parent.and_then(|parent| self.live_mut(parent)) {
			node.children.retain(|c| *c != child);
		}
		if let Some(node) = self.live_mut(child) {
			node.parent = None;
		}
	}

	/// Removes `node` and its whole subtree from the document.
	pub fn remove(&mut self, node: NodeId) -> Result<(), MarkupError> {
		if node == self.root {
			return Err(MarkupError::NotAContainer(node));
		}
		if !self.contains(node) {
			return Err(MarkupError::UnknownNode(node));
		}
		self.detach(node);
		self.free_subtree(node);
		Ok(())
	}

	fn free_subtree(&mut self, node: NodeId) {
		let mut stack = vec![node];
		while let Some(current) = stack.pop() {
			let Some(slot) = self
				.slots
				.get_mut(current.index)
				.filter(|slot| slot.generation == current.generation)
			else {
				continue;
			};
			if let Some(freed) = slot.node.take() {
				slot.generation = slot.generation.wrapping_add(1);
				self.free.push(current.index);
				stack.extend(freed.children);
			}
		}
	}

	/// Removes every child of `node`.
	pub fn clear_children(&mut self, node: NodeId) -> Result<(), MarkupError> {
		let children = std::mem::take(&mut self.node_mut(node)?.children);
		for child in children {
			self.free_subtree(child);
		}
		Ok(())
	}

	/// Payload of a node.
	pub fn data(&self, node: NodeId) -> Option<&NodeData> {
		self.node(node).map(|n| &n.data)
	}

	/// Tag name of an element.
	pub fn tag(&self, node: NodeId) -> Option<&str> {
		match self.data(node)? {
			NodeData::Element { tag, .. } => Some(tag),
			_ => None,
		}
	}

	/// Returns `true` when the node is an element.
	pub fn is_element(&self, node: NodeId) -> bool {
		self.tag(node).is_some()
	}

	/// Attributes of an element in source order.
	pub fn attrs(&self, node: NodeId) -> &[(String, String)] {
		match self.data(node) {
			Some(NodeData::Element { attrs, .. }) => attrs,
			_ => &[],
		}
	}

	/// Value of an attribute.
	pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
		self.attrs(node)
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}

	/// Sets (or replaces) an attribute.
	pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), MarkupError> {
		match &mut self.node_mut(node)?.data {
			NodeData::Element { attrs, .. } => {
				let name = name.to_ascii_lowercase();
				match attrs.iter_mut().find(|(key, _)| *key == name) {
					Some((_, existing)) => *existing = value.to_string(),
					None => attrs.push((name, value.to_string())),
				}
				Ok(())
			}
			_ => Err(MarkupError::NotAContainer(node)),
		}
	}

	/// Removes an attribute, returning its previous value.
	pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Result<Option<String>, MarkupError> {
		match &mut self.node_mut(node)?.data {
			NodeData::Element { attrs, .. } => {
				let position = attrs.iter().position(|(key, _)| key == name);
				Ok(position.map(|index| attrs.remove(index).1))
			}
			_ => Err(MarkupError::NotAContainer(node)),
		}
	}

	/// Whitespace-separated entries of the `class` attribute.
	pub fn classes(&self, node: NodeId) -> impl Iterator<Item = &str> {
		self.attr(node, "class")
			.unwrap_or_default()
			.split_ascii_whitespace()
	}

	/// Returns `true` when the element carries `class`.
	pub fn has_class(&self, node: NodeId, class: &str) -> bool {
		self.classes(node).any(|c| c == class)
	}

	/// Adds a class when missing.
	pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<(), MarkupError> {
		if self.has_class(node, class) {
			return Ok(());
		}
		let mut classes: Vec<&str> = self.classes(node).collect();
		classes.push(class);
		let joined = classes.join(" ");
		self.set_attr(node, "class", &joined)
	}

	/// Removes a class when present.
	pub fn remove_class(&mut self, node: NodeId, class: &str) -> Result<(), MarkupError> {
		if !self.has_class(node, class) {
			return Ok(());
		}
		let joined = self
			.classes(node)
			.filter(|c| *c != class)
			.collect::<Vec<_>>()
			.join(" ");
		self.set_attr(node, "class", &joined)
	}

	/// Parent of a node.
	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.node(node)?.parent
	}

	/// Parent when it is an element (the document root is skipped).
	pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
		self.parent(node).filter(|p| self.is_element(*p))
	}

	/// Children in order.
	pub fn children(&self, node: NodeId) -> &[NodeId] {
		self.node(node).map(|n| n.children.as_slice()).unwrap_or(&[])
	}

	/// `node` followed by each of its ancestors up to the root.
	pub fn ancestors_inclusive(&self, node: NodeId) -> Ancestors<'_> {
		Ancestors {
			document: self,
			next: self.contains(node).then_some(node),
		}
	}

	/// Returns `true` when `ancestor` is `node` or one of its ancestors.
	pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
		self.ancestors_inclusive(node).any(|n| n == ancestor)
	}

	/// Returns `true` when `node` lies strictly below `ancestor`.
	pub fn is_descendant(&self, ancestor: NodeId, node: NodeId) -> bool {
		node != ancestor && self.is_inclusive_ancestor(ancestor, node)
	}

	/// Descendants of `node` in document order (excluding `node`).
	pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
		while let Some(current) = stack.pop() {
			out.push(current);
			stack.extend(self.children(current).iter().rev().copied());
		}
		out
	}

	/// Concatenated text of every descendant text node.
	pub fn text_content(&self, node: NodeId) -> String {
		self.descendants(node)
			.into_iter()
			.filter_map(|n| match self.data(n) {
				Some(NodeData::Text(text)) => Some(text.as_str()),
				_ => None,
			})
			.collect()
	}

	/// Serialized markup of the children of `node`.
	pub fn inner_html(&self, node: NodeId) -> String {
		let mut out = String::new();
		for child in self.children(node) {
			markup::serialize(self, *child, &mut out);
		}
		out
	}

	/// Serialized markup of `node` itself.
	pub fn outer_html(&self, node: NodeId) -> String {
		let mut out = String::new();
		markup::serialize(self, node, &mut out);
		out
	}

	/// Replaces the children of `node` with the parsed `markup`.
	pub fn set_inner_html(&mut self, node: NodeId, markup: &str) -> Result<(), MarkupError> {
		match self.data(node) {
			Some(NodeData::Element { .. } | NodeData::Document) => {}
			Some(_) => return Err(MarkupError::NotAContainer(node)),
			None => return Err(MarkupError::UnknownNode(node)),
		}
		self.clear_children(node)?;
		markup::parse_into(self, node, markup);
		Ok(())
	}

	/// Replaces the children of `node` with a single text node.
	pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), MarkupError> {
		self.clear_children(node)?;
		let child = self.create_text(text);
		self.append_child(node, child)
	}

	/// Every descendant element of `scope` matching `selector`, in document order.
	pub fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
		self.descendants(scope)
			.into_iter()
			.filter(|n| selector.matches(self, *n))
			.collect()
	}

	/// First descendant element of `scope` matching `selector`.
	pub fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
		self.descendants(scope)
			.into_iter()
			.find(|n| selector.matches(self, *n))
	}

	/// Nearest inclusive ancestor of `node` matching `selector`.
	pub fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
		self.ancestors_inclusive(node)
			.find(|n| selector.matches(self, *n))
	}

	/// Returns `true` when the element matches `selector`.
	pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
		selector.matches(self, node)
	}
}

/// Iterator returned by [`Document::ancestors_inclusive`].
#[derive(Debug)]
pub struct Ancestors<'a> {
	document: &'a Document,
	next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
	type Item = NodeId;

	fn next(&mut self) -> Option<NodeId> {
		let current = self.next?;
		self.next = self.document.parent(current);
		Some(current)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn selector(text: &str) -> Selector {
		Selector::parse(text).unwrap()
	}

	#[rstest]
	fn test_new_document_has_body() {
		let document = Document::new();
		assert_eq!(document.tag(document.body()), Some("body"));
		assert_eq!(document.tag(document.head()), Some("head"));
		assert!(document.is_connected(document.body()));
	}

	#[rstest]
	fn test_set_and_read_inner_html() {
		let mut document = Document::new();
		let body = document.body();
		document
			.set_inner_html(body, r#"<div id="a" class="x y"><p>hi</p></div>"#)
			.unwrap();
		assert_eq!(
			document.inner_html(body),
			r#"<div class="x y" id="a"><p>hi</p></div>"#
		);
		assert_eq!(document.text_content(body), "hi");
	}

	#[rstest]
	fn test_stale_handles_never_alias_recycled_slots() {
		let mut document = Document::with_body("<span>one</span>");
		let body = document.body();
		let span = document.children(body)[0];
		document.set_inner_html(body, "<span>two</span>").unwrap();
		let replacement = document.children(body)[0];
		assert!(!document.contains(span));
		assert_ne!(replacement, span);
		assert_eq!(document.tag(span), None);
		assert_eq!(document.set_attr(span, "id", "x"), Err(MarkupError::UnknownNode(span)));
		assert_eq!(document.attr(replacement, "id"), None);
	}

	#[rstest]
	fn test_repeated_swaps_reuse_arena_slots() {
		let mut document = Document::with_body("<p>start</p>");
		let body = document.body();
		document.set_inner_html(body, "<p>warm</p>").unwrap();
		let capacity = document.capacity();

		for round in 0..64 {
			document
				.set_inner_html(body, &format!("<p>round {round}</p>"))
				.unwrap();
		}

		assert_eq!(document.capacity(), capacity);
		assert_eq!(document.text_content(body), "round 63");
	}

	#[rstest]
	fn test_class_helpers() {
		let mut document = Document::with_body(r#"<div class="a"></div>"#);
		let div = document.children(document.body())[0];
		document.add_class(div, "b").unwrap();
		document.add_class(div, "b").unwrap();
		assert_eq!(document.attr(div, "class"), Some("a b"));
		document.remove_class(div, "a").unwrap();
		assert_eq!(document.attr(div, "class"), Some("b"));
		assert!(document.has_class(div, "b"));
	}

	#[rstest]
	fn test_query_all_is_document_order_and_excludes_scope() {
		let document = Document::with_body(
			r#"<ul class="list"><li class="i">1</li><li class="i"><ul class="list"><li class="i">2</li></ul></li></ul>"#,
		);
		let lists = document.query_all(document.body(), &selector(".list"));
		assert_eq!(lists.len(), 2);
		let inner = lists[1];
		assert!(document.query_all(inner, &selector(".list")).is_empty());
		assert_eq!(document.query_all(document.root(), &selector("li")).len(), 3);
	}

	#[rstest]
	fn test_closest_walks_ancestors() {
		let document =
			Document::with_body(r#"<nav data-nav><a href="/x"><span>go</span></a></nav>"#);
		let span = document.query(document.body(), &selector("span")).unwrap();
		let anchor = document.closest(span, &selector("a")).unwrap();
		assert_eq!(document.attr(anchor, "href"), Some("/x"));
		assert!(document.closest(span, &selector("form")).is_none());
	}

	#[rstest]
	fn test_append_child_rejects_cycles() {
		let mut document = Document::with_body("<div><p></p></div>");
		let div = document.children(document.body())[0];
		let p = document.children(div)[0];
		assert_eq!(
			document.append_child(p, div),
			Err(MarkupError::Cycle {
				child: div,
				parent: p
			})
		);
	}

	#[rstest]
	fn test_remove_detaches_subtree() {
		let mut document = Document::with_body("<div><p></p></div>");
		let div = document.children(document.body())[0];
		let p = document.children(div)[0];
		document.remove(div).unwrap();
		assert!(!document.contains(p));
		assert!(document.children(document.body()).is_empty());
	}
}
