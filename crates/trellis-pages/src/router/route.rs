//! Route definitions and the active route.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::params::QueryMap;
use super::pattern::PathPattern;
use crate::error::RouterError;

/// Builds route markup from the route being entered.
pub type ContentFactory = Rc<dyn Fn(&ActiveRoute) -> String>;

/// What a route puts into the outlet region.
#[derive(Clone, Default)]
pub enum RouteContent {
	/// The region is emptied.
	#[default]
	Empty,
	/// Static markup.
	Markup(String),
	/// Markup produced per transition.
	Factory(ContentFactory),
}

impl fmt::Debug for RouteContent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Empty => f.write_str("Empty"),
			Self::Markup(markup) => f.debug_tuple("Markup").field(markup).finish(),
			Self::Factory(_) => f.write_str("Factory(..)"),
		}
	}
}

/// A routable location.
///
/// Several definitions may share an id or overlap; the first one registered
/// wins when matching.
///
/// ```ignore
/// let serie = RouteDefinition::new("serie", "/serie/:serieId/:sort")?
/// 	.with_title("Serie")
/// 	.with_markup(r#"<div data-serie></div>"#)
/// 	.authenticated();
/// ```
#[derive(Debug, Clone)]
pub struct RouteDefinition {
	id: String,
	pattern: PathPattern,
	title: Option<String>,
	content: RouteContent,
	authenticated: bool,
	unauthenticated: bool,
}

impl RouteDefinition {
	pub fn new(id: impl Into<String>, path: &str) -> Result<Self, RouterError> {
		Ok(Self {
			id: id.into(),
			pattern: PathPattern::compile(path)?,
			title: None,
			content: RouteContent::Empty,
			authenticated: false,
			unauthenticated: false,
		})
	}

	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = Some(title.into());
		self
	}

	pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
		self.content = RouteContent::Markup(markup.into());
		self
	}

	pub fn with_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&ActiveRoute) -> String + 'static,
	{
		self.content = RouteContent::Factory(Rc::new(factory));
		self
	}

	/// Only reachable with a valid session.
	pub fn authenticated(mut self) -> Self {
		self.authenticated = true;
		self
	}

	/// Only reachable without a valid session.
	pub fn unauthenticated(mut self) -> Self {
		self.unauthenticated = true;
		self
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn pattern(&self) -> &PathPattern {
		&self.pattern
	}

	/// Normalized path template.
	pub fn template(&self) -> &str {
		self.pattern.template()
	}

	pub fn title(&self) -> Option<&str> {
		self.title.as_deref()
	}

	pub fn content(&self) -> &RouteContent {
		&self.content
	}

	pub fn is_authenticated(&self) -> bool {
		self.authenticated
	}

	pub fn is_unauthenticated(&self) -> bool {
		self.unauthenticated
	}

	/// Markup for the outlet when `active` is entered.
	pub fn render(&self, active: &ActiveRoute) -> String {
		match &self.content {
			RouteContent::Empty => String::new(),
			RouteContent::Markup(markup) => markup.clone(),
			RouteContent::Factory(factory) => factory(active),
		}
	}
}

/// The route currently applied, with everything extracted from its location.
#[derive(Debug, Clone)]
pub struct ActiveRoute {
	definition: Rc<RouteDefinition>,
	params: BTreeMap<String, String>,
	query: QueryMap,
	location: String,
}

impl ActiveRoute {
	pub(crate) fn new(
		definition: Rc<RouteDefinition>,
		params: BTreeMap<String, String>,
		query: QueryMap,
		location: String,
	) -> Self {
		Self {
			definition,
			params,
			query,
			location,
		}
	}

	pub fn definition(&self) -> &Rc<RouteDefinition> {
		&self.definition
	}

	pub fn id(&self) -> &str {
		self.definition.id()
	}

	pub fn title(&self) -> Option<&str> {
		self.definition.title()
	}

	/// Decoded path parameter.
	pub fn param(&self, name: &str) -> Option<&str> {
		self.params.get(name).map(String::as_str)
	}

	pub fn params(&self) -> &BTreeMap<String, String> {
		&self.params
	}

	/// Decoded query value; `None` for missing and valueless keys alike.
	pub fn query(&self, name: &str) -> Option<&str> {
		self.query.get(name).and_then(Option::as_deref)
	}

	pub fn queries(&self) -> &QueryMap {
		&self.query
	}

	/// Resolved location, query included.
	pub fn location(&self) -> &str {
		&self.location
	}

	/// The template with the extracted parameters substituted.
	pub fn path(&self) -> String {
		self.definition.pattern().substitute(&self.params)
	}
}

impl PartialEq for ActiveRoute {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.definition, &other.definition)
			&& self.params == other.params
			&& self.query == other.query
			&& self.location == other.location
	}
}
