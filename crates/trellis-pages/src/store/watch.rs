//! Store watchers.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use serde_json::Value;

use crate::component::InstanceId;
use crate::error::{HookError, HookResult};
use crate::pipeline::HookFuture;

/// Callback invoked with the payload of a fired event.
pub type WatchHandler = Rc<dyn Fn(Value) -> HookFuture>;

/// Wraps an async closure into a [`WatchHandler`].
pub fn watcher<F, Fut>(f: F) -> WatchHandler
where
	F: Fn(Value) -> Fut + 'static,
	Fut: Future<Output = HookResult> + 'static,
{
	Rc::new(move |payload: Value| -> HookFuture { Box::pin(f(payload)) })
}

/// Outcome of [`Store::fire`](super::Store::fire).
///
/// Handler failures are collected here instead of failing the whole fire.
#[derive(Debug, Default)]
pub struct FireReport {
	pub invoked: usize,
	pub failures: Vec<HookError>,
}

impl FireReport {
	/// Returns `true` when every handler succeeded.
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty()
	}
}

struct Watcher {
	event: String,
	name: Option<String>,
	owner: Option<InstanceId>,
	handler: WatchHandler,
}

/// Watchers in registration order.
#[derive(Default)]
pub(crate) struct Watchers {
	list: Vec<Watcher>,
}

impl fmt::Debug for Watchers {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list()
			.entries(self.list.iter().map(|w| (&w.event, &w.name, w.owner)))
			.finish()
	}
}

impl Watchers {
	pub(crate) fn add(
		&mut self,
		event: &str,
		name: Option<&str>,
		owner: Option<InstanceId>,
		handler: WatchHandler,
	) {
		self.list.push(Watcher {
			event: event.to_string(),
			name: name.map(str::to_string),
			owner,
			handler,
		});
	}

	/// Removes the watchers of `event`; only the one called `name` when given.
	pub(crate) fn remove(&mut self, event: &str, name: Option<&str>) -> usize {
		let before = self.list.len();
		self.list.retain(|w| {
			w.event != event || name.is_some_and(|name| w.name.as_deref() != Some(name))
		});
		before - self.list.len()
	}

	pub(crate) fn release(&mut self, owner: InstanceId) -> usize {
		let before = self.list.len();
		self.list.retain(|w| w.owner != Some(owner));
		before - self.list.len()
	}

	pub(crate) fn handlers(&self, event: &str) -> Vec<WatchHandler> {
		self.list
			.iter()
			.filter(|w| w.event == event)
			.map(|w| Rc::clone(&w.handler))
			.collect()
	}

	pub(crate) fn owned_by(&self, owner: InstanceId) -> usize {
		self.list.iter().filter(|w| w.owner == Some(owner)).count()
	}

	pub(crate) fn len(&self) -> usize {
		self.list.len()
	}
}
