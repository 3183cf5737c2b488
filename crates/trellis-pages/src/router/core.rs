//! Core Router Implementation.
//!
//! Route changes are queued and applied one at a time by whichever caller
//! started draining the queue. A change requested while another one is being
//! applied (from a guard, a mounted component or a history traversal) is
//! queued behind it and applied by the same drain.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use super::history::{History, HistoryMode};
use super::params::parse_query;
use super::pattern::{normalize_path, split_location};
use super::route::{ActiveRoute, RouteDefinition};
use super::transition::Transition;
use crate::error::{HookResult, RouterError};
use crate::pipeline::{Hook, Pipeline, Stage, hook};
use crate::settings::RuntimeSettings;
use crate::{debug_log, error_log, info_log, warn_log};

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
	pub mode: HistoryMode,
	/// Path prefix the application is served under.
	pub base: String,
	/// Origin stripped from absolute locations.
	pub origin: String,
	/// Consecutive queued changes applied by one drain before the rest are dropped.
	pub max_redirects: usize,
}

impl Default for RouterOptions {
	fn default() -> Self {
		Self {
			mode: HistoryMode::History,
			base: String::new(),
			origin: "http://localhost".to_string(),
			max_redirects: 8,
		}
	}
}

impl From<&RuntimeSettings> for RouterOptions {
	fn from(settings: &RuntimeSettings) -> Self {
		Self {
			mode: settings.mode,
			base: settings.base.clone(),
			origin: settings.origin.clone(),
			max_redirects: settings.max_redirects,
		}
	}
}

/// What [`Router::change`] did with the requested location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
	/// The change ran to completion before the call returned.
	Applied,
	/// Another change was being applied; this one waits in the queue and is
	/// applied by that drain. Its failure, if any, is reported there.
	Queued,
}

struct Pending {
	ticket: u64,
	location: String,
	redirect: bool,
}

pub(crate) struct RouterInner {
	options: RouterOptions,
	routes: RefCell<Vec<Rc<RouteDefinition>>>,
	before: RefCell<Vec<Hook<Transition>>>,
	after: RefCell<Vec<Hook<Transition>>>,
	active: RefCell<Option<ActiveRoute>>,
	history: History,
	prevent: Cell<bool>,
	pending: RefCell<VecDeque<Pending>>,
	draining: Cell<bool>,
	tickets: Cell<u64>,
}

/// Resets a flag when dropped, including on early return.
struct FlagGuard<'a>(&'a Cell<bool>);

impl<'a> FlagGuard<'a> {
	fn raise(flag: &'a Cell<bool>) -> Self {
		flag.set(true);
		Self(flag)
	}
}

impl Drop for FlagGuard<'_> {
	fn drop(&mut self) {
		self.0.set(false);
	}
}

/// The application router. Clones share the same routes and state.
#[derive(Clone)]
pub struct Router {
	inner: Rc<RouterInner>,
}

impl fmt::Debug for Router {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Router")
			.field("options", &self.inner.options)
			.field("routes_count", &self.inner.routes.borrow().len())
			.field("active", &self.active().map(|a| a.location().to_string()))
			.field("pending", &self.inner.pending.borrow().len())
			.finish()
	}
}

impl Default for Router {
	fn default() -> Self {
		Self::new(RouterOptions::default())
	}
}

impl Router {
	/// Creates a router whose history starts at `/`.
	pub fn new(options: RouterOptions) -> Self {
		Self::with_location(options, "/")
	}

	/// Creates a router whose history starts at `initial`, as loaded by the browser.
	pub fn with_location(options: RouterOptions, initial: &str) -> Self {
		let history = History::new(options.mode, initial);
		let inner = Rc::new(RouterInner {
			options,
			routes: RefCell::new(Vec::new()),
			before: RefCell::new(Vec::new()),
			after: RefCell::new(Vec::new()),
			active: RefCell::new(None),
			history,
			prevent: Cell::new(false),
			pending: RefCell::new(VecDeque::new()),
			draining: Cell::new(false),
			tickets: Cell::new(0),
		});

		let weak = Rc::downgrade(&inner);
		inner.history.listen(Rc::new(move |location: String| {
			let Some(inner) = weak.upgrade() else {
				return;
			};
			if inner.prevent.get() {
				return;
			}
			debug_log!(location = %location, "history traversal queued");
			Router::from_inner(inner).enqueue(location, false);
		}));

		Self { inner }
	}

	pub(crate) fn from_inner(inner: Rc<RouterInner>) -> Self {
		Self { inner }
	}

	pub fn options(&self) -> &RouterOptions {
		&self.inner.options
	}

	pub fn history(&self) -> &History {
		&self.inner.history
	}

	/// Normalizes `location` with the configured origin and base.
	pub fn normalize(&self, location: &str) -> String {
		normalize_path(location, &self.inner.options.origin, &self.inner.options.base)
	}

	/// Adds a definition. Earlier definitions win on overlapping matches.
	pub fn add(&self, definition: RouteDefinition) -> Rc<RouteDefinition> {
		let definition = Rc::new(definition);
		self.inner
			.routes
			.borrow_mut()
			.push(Rc::clone(&definition));
		definition
	}

	/// Adds several definitions in order.
	pub fn add_all(
		&self,
		definitions: impl IntoIterator<Item = RouteDefinition>,
	) -> Vec<Rc<RouteDefinition>> {
		definitions
			.into_iter()
			.map(|definition| self.add(definition))
			.collect()
	}

	pub fn routes(&self) -> Vec<Rc<RouteDefinition>> {
		self.inner.routes.borrow().clone()
	}

	/// First definition matching `location`.
	pub fn match_path(&self, location: &str) -> Option<Rc<RouteDefinition>> {
		let location = self.normalize(location);
		self.inner
			.routes
			.borrow()
			.iter()
			.find(|definition| definition.pattern().is_match(&location))
			.cloned()
	}

	/// Adds a guard run before a change is applied, in registration order.
	pub fn before_change<F, Fut>(&self, f: F)
	where
		F: Fn(Transition) -> Fut + 'static,
		Fut: Future<Output = HookResult> + 'static,
	{
		self.before_hook(hook(f));
	}

	/// Adds a hook run after a change was applied, in registration order.
	pub fn after_change<F, Fut>(&self, f: F)
	where
		F: Fn(Transition) -> Fut + 'static,
		Fut: Future<Output = HookResult> + 'static,
	{
		self.after_hook(hook(f));
	}

	pub fn before_hook(&self, hook: Hook<Transition>) {
		self.inner.before.borrow_mut().push(hook);
	}

	pub fn after_hook(&self, hook: Hook<Transition>) {
		self.inner.after.borrow_mut().push(hook);
	}

	pub fn active(&self) -> Option<ActiveRoute> {
		self.inner.active.borrow().clone()
	}

	/// Number of queued changes.
	pub fn pending(&self) -> usize {
		self.inner.pending.borrow().len()
	}

	/// Requests a change to `location`.
	///
	/// Returns [`ChangeOutcome::Applied`] once the change was applied, or
	/// [`ChangeOutcome::Queued`] immediately when another change is being
	/// applied and this one was queued behind it.
	pub async fn change(&self, location: &str, redirect: bool) -> Result<ChangeOutcome, RouterError> {
		let ticket = self.enqueue(location.to_string(), redirect);
		if self.inner.draining.get() {
			debug_log!(location, "route change queued behind the current one");
			return Ok(ChangeOutcome::Queued);
		}
		self.drain(Some(ticket)).await?;
		Ok(ChangeOutcome::Applied)
	}

	/// Navigates to `location`, adding a history entry.
	pub async fn redirect(&self, location: &str) -> Result<ChangeOutcome, RouterError> {
		self.change(location, true).await
	}

	/// Applies the location of the current history entry.
	pub async fn start(&self) -> Result<(), RouterError> {
		let location = self.inner.history.location();
		self.change(&location, false).await?;
		Ok(())
	}

	/// Traverses the history by `delta` entries and applies the entry reached.
	pub async fn go(&self, delta: isize) -> Result<(), RouterError> {
		if !self.inner.history.go(delta) {
			return Ok(());
		}
		self.drain(None).await
	}

	pub async fn back(&self) -> Result<(), RouterError> {
		self.go(-1).await
	}

	pub async fn forward(&self) -> Result<(), RouterError> {
		self.go(1).await
	}

	/// Applies every queued change.
	pub async fn flush(&self) -> Result<(), RouterError> {
		self.drain(None).await
	}

	fn enqueue(&self, location: String, redirect: bool) -> u64 {
		let ticket = self.inner.tickets.get() + 1;
		self.inner.tickets.set(ticket);
		self.inner.pending.borrow_mut().push_back(Pending {
			ticket,
			location,
			redirect,
		});
		ticket
	}

	// With a ticket, reports the outcome of that change; without one, the
	// first failure met.
	async fn drain(&self, ticket: Option<u64>) -> Result<(), RouterError> {
		if self.inner.draining.get() {
			return Ok(());
		}
		let _draining = FlagGuard::raise(&self.inner.draining);
		let limit = self.inner.options.max_redirects;
		let mut outcome = Ok(());
		let mut hops = 0usize;

		loop {
			let Some(pending) = self.inner.pending.borrow_mut().pop_front() else {
				break;
			};

			if hops > limit {
				let mut dropped = vec![pending];
				dropped.extend(self.inner.pending.borrow_mut().drain(..));
				error_log!(
					limit,
					dropped = dropped.len(),
					location = %dropped[0].location,
					"redirect chain limit reached"
				);
				let error = RouterError::RedirectLimit {
					limit,
					location: dropped[0].location.clone(),
				};
				let owned = match ticket {
					Some(ticket) => dropped.iter().any(|p| p.ticket == ticket),
					None => outcome.is_ok(),
				};
				if owned {
					outcome = Err(error);
				}
				break;
			}
			hops += 1;

			let result = self.apply(&pending.location, pending.redirect).await;
			match ticket {
				Some(ticket) if ticket == pending.ticket => outcome = result,
				None if outcome.is_ok() => outcome = result,
				_ => {}
			}
		}
		outcome
	}

	fn pipeline(hooks: &RefCell<Vec<Hook<Transition>>>, name: &'static str) -> Pipeline<Transition> {
		hooks
			.borrow()
			.iter()
			.fold(Pipeline::new(), |pipeline, hook| {
				pipeline.stage(Stage::new(name).hook(Rc::clone(hook)))
			})
	}

	fn entry_location(&self, location: &str) -> String {
		let base = self.inner.options.base.trim_matches('/');
		match self.inner.options.mode {
			HistoryMode::History if !base.is_empty() => format!("/{base}{location}"),
			_ => location.to_string(),
		}
	}

	fn sync_history(&self, location: &str, push: bool) {
		let entry = self.entry_location(location);
		let _prevent = FlagGuard::raise(&self.inner.prevent);
		if push {
			self.inner.history.push(&entry);
		} else {
			self.inner.history.replace(&entry);
		}
	}

	async fn apply(&self, location: &str, redirect: bool) -> Result<(), RouterError> {
		let location = self.normalize(location);
		let transition = Transition::new(
			self.active(),
			self.match_path(&location),
			location,
			redirect,
			Rc::downgrade(&self.inner),
		);

		let before = Self::pipeline(&self.inner.before, "before_change");
		if let Err(error) = before.run(transition.clone()).await {
			warn_log!(location = %transition.location(), "route change aborted: {error}");
			return Err(RouterError::Guard(error));
		}

		let location = transition.location();
		if redirect || transition.was_rewritten() {
			self.sync_history(&location, redirect);
		}

		let active = transition.next().map(|definition| {
			let (_, query) = split_location(&location);
			let params = definition.pattern().extract(&location);
			ActiveRoute::new(definition, params, parse_query(query), location.clone())
		});
		let route = active
			.as_ref()
			.map(|a| a.id().to_string())
			.unwrap_or_default();
		*self.inner.active.borrow_mut() = active.clone();
		transition.set_active(active);
		info_log!(location = %location, route = %route, "route changed");

		let after = Self::pipeline(&self.inner.after, "after_change");
		if let Err(error) = after.run(transition).await {
			warn_log!(location = %location, "route after-change hook failed: {error}");
			return Err(RouterError::Guard(error));
		}
		Ok(())
	}
}
