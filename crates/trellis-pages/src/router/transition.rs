//! The scope shared by the guards of one route change.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::core::{Router, RouterInner};
use super::route::{ActiveRoute, RouteDefinition};
use crate::error::RouterError;

struct TransitionInner {
	previous: Option<ActiveRoute>,
	next: RefCell<Option<Rc<RouteDefinition>>>,
	location: RefCell<String>,
	redirect: bool,
	rewrites: Cell<u8>,
	active: RefCell<Option<ActiveRoute>>,
	router: Weak<RouterInner>,
}

/// One route change in flight.
///
/// Before-guards see the route that is about to be left and the definition
/// matched for the requested location; one of them may rewrite the
/// destination once. After-guards additionally see the applied
/// [`ActiveRoute`].
#[derive(Clone)]
pub struct Transition {
	inner: Rc<TransitionInner>,
}

impl fmt::Debug for Transition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Transition")
			.field("previous", &self.previous().map(ActiveRoute::id))
			.field("next", &self.next().map(|d| d.id().to_string()))
			.field("location", &self.location())
			.field("redirect", &self.inner.redirect)
			.field("rewritten", &self.was_rewritten())
			.finish()
	}
}

impl Transition {
	pub(crate) fn new(
		previous: Option<ActiveRoute>,
		next: Option<Rc<RouteDefinition>>,
		location: String,
		redirect: bool,
		router: Weak<RouterInner>,
	) -> Self {
		Self {
			inner: Rc::new(TransitionInner {
				previous,
				next: RefCell::new(next),
				location: RefCell::new(location),
				redirect,
				rewrites: Cell::new(0),
				active: RefCell::new(None),
				router,
			}),
		}
	}

	/// Route active when the change started.
	pub fn previous(&self) -> Option<&ActiveRoute> {
		self.inner.previous.as_ref()
	}

	/// Destination definition; `None` when nothing matched.
	pub fn next(&self) -> Option<Rc<RouteDefinition>> {
		self.inner.next.borrow().clone()
	}

	/// Normalized destination location.
	pub fn location(&self) -> String {
		self.inner.location.borrow().clone()
	}

	/// Whether the change was requested by a redirect rather than a history traversal.
	pub fn is_redirect(&self) -> bool {
		self.inner.redirect
	}

	pub fn was_rewritten(&self) -> bool {
		self.inner.rewrites.get() > 0
	}

	/// The applied route; set once the before-guards passed.
	pub fn active(&self) -> Option<ActiveRoute> {
		self.inner.active.borrow().clone()
	}

	pub(crate) fn set_active(&self, active: Option<ActiveRoute>) {
		*self.inner.active.borrow_mut() = active;
	}

	pub fn router(&self) -> Option<Router> {
		self.inner.router.upgrade().map(Router::from_inner)
	}

	fn rewrite(&self) -> Result<(), RouterError> {
		if self.was_rewritten() {
			return Err(RouterError::RewriteLimit {
				location: self.location(),
			});
		}
		self.inner.rewrites.set(1);
		Ok(())
	}

	/// Replaces the destination definition, keeping the location.
	pub fn set_next(&self, next: Option<Rc<RouteDefinition>>) -> Result<(), RouterError> {
		self.rewrite()?;
		*self.inner.next.borrow_mut() = next;
		Ok(())
	}

	/// Sends the change to `location` instead, matched again.
	pub fn redirect_to(&self, location: &str) -> Result<(), RouterError> {
		let router = self.router().ok_or(RouterError::Detached)?;
		self.rewrite()?;
		let normalized = router.normalize(location);
		*self.inner.next.borrow_mut() = router.match_path(&normalized);
		*self.inner.location.borrow_mut() = normalized;
		Ok(())
	}
}
