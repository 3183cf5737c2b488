//! CSS selectors for component declarations and event delegation.
//!
//! Parsing and matching are delegated to the `selectors` engine that
//! `scraper` is built on; [`Document`] nodes are adapted through
//! [`selectors::Element`]. Everything the engine understands is available
//! (combinators, attribute operators, `:not`, `:is`, `:where`, `:has`,
//! structural pseudo-classes) plus the form-state pseudo-classes
//! `:checked`, `:disabled` and `:enabled`. Pseudo-elements are rejected.

use std::fmt;
use std::str::FromStr;

use cssparser::{CowRcStr, ParseError, ParserInput, SourceLocation, ToCss};
use scraper::error::SelectorErrorKind;
use scraper::selector::{CssLocalName, CssString, Simple};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::bloom::BloomFilter;
use selectors::matching::{
	self, ElementSelectorFlags, MatchingContext, MatchingForInvalidation, MatchingMode,
	NeedsSelectorFlags, QuirksMode, SelectorCaches,
};
use selectors::parser::{self, ParseRelative, SelectorImpl, SelectorList, SelectorParseErrorKind};
use selectors::{Element, OpaqueElement};

use super::document::{Document, NodeData, NodeId};
use crate::error::SelectorError;

type Namespace = <Simple as SelectorImpl>::NamespaceUrl;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
	source: String,
	list: SelectorList<DomSelectors>,
}

impl Selector {
	/// Parses a selector list.
	pub fn parse(source: &str) -> Result<Self, SelectorError> {
		let trimmed = source.trim();
		if trimmed.is_empty() {
			return Err(SelectorError::Empty(source.to_string()));
		}
		let mut input = ParserInput::new(trimmed);
		let mut parser = cssparser::Parser::new(&mut input);
		let list = SelectorList::parse(&DomParser, &mut parser, ParseRelative::No).map_err(
			|error| SelectorError::Invalid {
				selector: trimmed.to_string(),
				reason: SelectorErrorKind::from(error).to_string(),
			},
		)?;
		Ok(Self {
			source: trimmed.to_string(),
			list,
		})
	}

	/// Builds `parent child` for every pair of alternatives of the two lists.
	///
	/// `scoped("a, b", "li")` matches like `a li, b li`.
	pub fn scoped(parent: &str, child: &str) -> Result<Self, SelectorError> {
		let parents = Self::parse(parent)?;
		let children = Self::parse(child)?;
		let combined = parents
			.alternatives()
			.flat_map(|p| {
				children
					.alternatives()
					.map(move |c| format!("{p} {c}"))
			})
			.collect::<Vec<_>>()
			.join(", ");
		Self::parse(&combined)
	}

	/// The selector text as written (trimmed).
	pub fn as_str(&self) -> &str {
		&self.source
	}

	fn alternatives(&self) -> impl Iterator<Item = String> + '_ {
		self.list.slice().iter().map(ToCss::to_css_string)
	}

	/// Returns `true` when `node` is an element matched by any alternative.
	pub fn matches(&self, document: &Document, node: NodeId) -> bool {
		if !document.is_element(node) {
			return false;
		}
		let element = DomElement { document, node };
		let mut caches = SelectorCaches::default();
		let mut context = MatchingContext::new(
			MatchingMode::Normal,
			None,
			&mut caches,
			QuirksMode::NoQuirks,
			NeedsSelectorFlags::No,
			MatchingForInvalidation::No,
		);
		matching::matches_selector_list(&self.list, &element, &mut context)
	}
}

impl FromStr for Selector {
	type Err = SelectorError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for Selector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.source)
	}
}

/// Selector vocabulary understood by the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomSelectors;

impl SelectorImpl for DomSelectors {
	type ExtraMatchingData<'a> = ();
	type AttrValue = CssString;
	type Identifier = CssLocalName;
	type LocalName = CssLocalName;
	type NamespacePrefix = CssLocalName;
	type NamespaceUrl = Namespace;
	type BorrowedNamespaceUrl = Namespace;
	type BorrowedLocalName = CssLocalName;
	type NonTSPseudoClass = PseudoClass;
	type PseudoElement = NoPseudoElement;
}

/// Form-state pseudo-classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoClass {
	/// `:checked`
	Checked,
	/// `:disabled`
	Disabled,
	/// `:enabled`
	Enabled,
}

impl parser::NonTSPseudoClass for PseudoClass {
	type Impl = DomSelectors;

	fn is_active_or_hover(&self) -> bool {
		false
	}

	fn is_user_action_state(&self) -> bool {
		false
	}
}

impl ToCss for PseudoClass {
	fn to_css<W>(&self, dest: &mut W) -> fmt::Result
	where
		W: fmt::Write,
	{
		dest.write_str(match self {
			Self::Checked => ":checked",
			Self::Disabled => ":disabled",
			Self::Enabled => ":enabled",
		})
	}
}

/// Pseudo-elements never parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoPseudoElement {}

impl parser::PseudoElement for NoPseudoElement {
	type Impl = DomSelectors;
}

impl ToCss for NoPseudoElement {
	fn to_css<W>(&self, _dest: &mut W) -> fmt::Result
	where
		W: fmt::Write,
	{
		match *self {}
	}
}

struct DomParser;

impl<'i> parser::Parser<'i> for DomParser {
	type Impl = DomSelectors;
	type Error = SelectorParseErrorKind<'i>;

	fn parse_is_and_where(&self) -> bool {
		true
	}

	fn parse_has(&self) -> bool {
		true
	}

	fn parse_non_ts_pseudo_class(
		&self,
		location: SourceLocation,
		name: CowRcStr<'i>,
	) -> Result<PseudoClass, ParseError<'i, SelectorParseErrorKind<'i>>> {
		match name.to_ascii_lowercase().as_str() {
			"checked" => Ok(PseudoClass::Checked),
			"disabled" => Ok(PseudoClass::Disabled),
			"enabled" => Ok(PseudoClass::Enabled),
			_ => Err(location.new_custom_error(
				SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name),
			)),
		}
	}
}

const FORM_CONTROLS: [&str; 6] = ["button", "fieldset", "input", "optgroup", "select", "textarea"];

/// A document node seen through the selector engine.
#[derive(Clone, Copy)]
struct DomElement<'a> {
	document: &'a Document,
	node: NodeId,
}

impl fmt::Debug for DomElement<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DomElement")
			.field("node", &self.node)
			.field("tag", &self.tag())
			.finish()
	}
}

impl<'a> DomElement<'a> {
	fn at(&self, node: NodeId) -> Self {
		Self {
			document: self.document,
			node,
		}
	}

	fn tag(&self) -> &'a str {
		self.document.tag(self.node).unwrap_or_default()
	}

	fn has_attr(&self, name: &str) -> bool {
		self.document.attr(self.node, name).is_some()
	}

	fn siblings(&self) -> &'a [NodeId] {
		self.document
			.parent(self.node)
			.map(|parent| self.document.children(parent))
			.unwrap_or_default()
	}

	fn position(&self) -> Option<usize> {
		self.siblings().iter().position(|sibling| *sibling == self.node)
	}
}

impl Element for DomElement<'_> {
	type Impl = DomSelectors;

	fn opaque(&self) -> OpaqueElement {
		match self.document.data(self.node) {
			Some(data) => OpaqueElement::new(data),
			None => OpaqueElement::new(self.document),
		}
	}

	fn parent_element(&self) -> Option<Self> {
		self.document
			.parent_element(self.node)
			.map(|parent| self.at(parent))
	}

	fn parent_node_is_shadow_root(&self) -> bool {
		false
	}

	fn containing_shadow_host(&self) -> Option<Self> {
		None
	}

	fn is_pseudo_element(&self) -> bool {
		false
	}

	fn prev_sibling_element(&self) -> Option<Self> {
		let position = self.position()?;
		self.siblings()[..position]
			.iter()
			.rev()
			.find(|sibling| self.document.is_element(**sibling))
			.map(|sibling| self.at(*sibling))
	}

	fn next_sibling_element(&self) -> Option<Self> {
		let position = self.position()?;
		self.siblings()[position + 1..]
			.iter()
			.find(|sibling| self.document.is_element(**sibling))
			.map(|sibling| self.at(*sibling))
	}

	fn first_element_child(&self) -> Option<Self> {
		self.document
			.children(self.node)
			.iter()
			.find(|child| self.document.is_element(**child))
			.map(|child| self.at(*child))
	}

	fn is_html_element_in_html_document(&self) -> bool {
		true
	}

	fn has_local_name(&self, name: &CssLocalName) -> bool {
		self.tag() == &*name.0
	}

	fn has_namespace(&self, ns: &Namespace) -> bool {
		&**ns == HTML_NAMESPACE
	}

	fn is_same_type(&self, other: &Self) -> bool {
		self.tag() == other.tag()
	}

	fn attr_matches(
		&self,
		ns: &NamespaceConstraint<&Namespace>,
		local_name: &CssLocalName,
		operation: &AttrSelectorOperation<&CssString>,
	) -> bool {
		if let NamespaceConstraint::Specific(url) = ns {
			if !url.is_empty() {
				return false;
			}
		}
		self.document
			.attrs(self.node)
			.iter()
			.any(|(key, value)| key.as_str() == &*local_name.0 && operation.eval_str(value))
	}

	fn match_non_ts_pseudo_class(
		&self,
		pc: &PseudoClass,
		_context: &mut MatchingContext<'_, DomSelectors>,
	) -> bool {
		match pc {
			PseudoClass::Checked => match self.tag() {
				"input" => self.has_attr("checked"),
				"option" => self.has_attr("selected"),
				_ => false,
			},
			PseudoClass::Disabled => FORM_CONTROLS.contains(&self.tag()) && self.has_attr("disabled"),
			PseudoClass::Enabled => FORM_CONTROLS.contains(&self.tag()) && !self.has_attr("disabled"),
		}
	}

	fn match_pseudo_element(
		&self,
		pe: &NoPseudoElement,
		_context: &mut MatchingContext<'_, DomSelectors>,
	) -> bool {
		match *pe {}
	}

	fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

	fn is_link(&self) -> bool {
		matches!(self.tag(), "a" | "area" | "link") && self.has_attr("href")
	}

	fn is_html_slot_element(&self) -> bool {
		self.tag() == "slot"
	}

	fn has_id(&self, id: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
		self.document
			.attr(self.node, "id")
			.is_some_and(|value| case_sensitivity.eq(id.0.as_bytes(), value.as_bytes()))
	}

	fn has_class(&self, name: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
		self.document
			.classes(self.node)
			.any(|class| case_sensitivity.eq(name.0.as_bytes(), class.as_bytes()))
	}

	fn has_custom_state(&self, _name: &CssLocalName) -> bool {
		false
	}

	fn imported_part(&self, _name: &CssLocalName) -> Option<CssLocalName> {
		None
	}

	fn is_part(&self, _name: &CssLocalName) -> bool {
		false
	}

	fn is_empty(&self) -> bool {
		self.document
			.children(self.node)
			.iter()
			.all(|child| match self.document.data(*child) {
				Some(NodeData::Element { .. }) => false,
				Some(NodeData::Text(text)) => text.is_empty(),
				_ => true,
			})
	}

	fn is_root(&self) -> bool {
		self.document.parent(self.node) == Some(self.document.root())
	}

	fn add_element_unique_hashes(&self, _filter: &mut BloomFilter) -> bool {
		false
	}
}
