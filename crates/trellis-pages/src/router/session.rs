//! Session-aware route guard.

use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::route::RouteDefinition;
use super::transition::Transition;
use crate::debug_log;
use crate::error::{HookResult, RouterError};
use crate::pipeline::{Hook, HookFuture};
use crate::settings::RuntimeSettings;
use crate::store::Store;

/// Returns `true` while `expires` lies after `now`.
///
/// Accepts an RFC 3339 timestamp or a number of milliseconds since the epoch.
pub fn session_valid(expires: Option<&Value>, now: DateTime<Utc>) -> bool {
	let expires = match expires {
		Some(Value::String(text)) => DateTime::parse_from_rfc3339(text.trim())
			.ok()
			.map(|at| at.with_timezone(&Utc)),
		Some(Value::Number(millis)) => millis
			.as_i64()
			.and_then(DateTime::<Utc>::from_timestamp_millis),
		_ => None,
	};
	expires.is_some_and(|at| at > now)
}

/// Before-guard redirecting by session state.
///
/// - no matching route: the default path;
/// - authenticated-only route while signed out: the login path;
/// - unauthenticated-only route while signed in: the default path.
///
/// The guard resolves the final destination first and rewrites at most once.
#[derive(Debug, Clone)]
pub struct SessionGuard {
	store: Store,
	session_key: String,
	login_path: String,
	default_path: String,
}

impl SessionGuard {
	pub fn new(store: Store) -> Self {
		Self {
			store,
			session_key: "expires".to_string(),
			login_path: "/login".to_string(),
			default_path: "/".to_string(),
		}
	}

	pub fn from_settings(store: Store, settings: &RuntimeSettings) -> Self {
		Self {
			store,
			session_key: settings.session_key.clone(),
			login_path: settings.login_path.clone(),
			default_path: settings.default_path.clone(),
		}
	}

	pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
		self.session_key = key.into();
		self
	}

	pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();
		self
	}

	pub fn with_default_path(mut self, path: impl Into<String>) -> Self {
		self.default_path = path.into();
		self
	}

	pub fn is_signed_in(&self) -> bool {
		session_valid(self.store.get(&self.session_key).as_ref(), Utc::now())
	}

	fn destination(&self, transition: &Transition) -> Result<Option<String>, RouterError> {
		let router = transition.router().ok_or(RouterError::Detached)?;
		let signed_in = self.is_signed_in();
		let mut location = transition.location();
		let mut definition: Option<Rc<RouteDefinition>> = transition.next();
		let mut target = None;

		// Three hops cover unmatched -> default -> login.
		for _ in 0..3 {
			let wanted = match &definition {
				None => &self.default_path,
				Some(d) if d.is_authenticated() && !signed_in => &self.login_path,
				Some(d) if d.is_unauthenticated() && signed_in => &self.default_path,
				Some(_) => break,
			};
			let wanted = router.normalize(wanted);
			if wanted == location {
				break;
			}
			definition = router.match_path(&wanted);
			location = wanted.clone();
			target = Some(wanted);
		}
		Ok(target)
	}

	async fn check(&self, transition: Transition) -> HookResult {
		if let Some(target) = self.destination(&transition)? {
			debug_log!(from = %transition.location(), to = %target, "session guard rewrite");
			transition.redirect_to(&target)?;
		}
		Ok(())
	}

	/// The guard as a before-change hook.
	pub fn into_hook(self) -> Hook<Transition> {
		let guard = Rc::new(self);
		Rc::new(move |transition: Transition| -> HookFuture {
			let guard = Rc::clone(&guard);
			Box::pin(async move { guard.check(transition).await })
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::router::{Router, RouteDefinition};
	use chrono::Duration;
	use rstest::{fixture, rstest};

	#[rstest]
	#[case(Some(Value::from("2099-01-01T00:00:00Z")), true)]
	#[case(Some(Value::from("2000-01-01T00:00:00+02:00")), false)]
	#[case(Some(Value::from(4_102_444_800_000i64)), true)]
	#[case(Some(Value::from("not a date")), false)]
	#[case(Some(Value::Bool(true)), false)]
	#[case(None, false)]
	fn test_session_valid(#[case] expires: Option<Value>, #[case] expected: bool) {
		let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
			.unwrap()
			.with_timezone(&Utc);
		assert_eq!(session_valid(expires.as_ref(), now), expected);
	}

	#[fixture]
	fn routes() -> (Router, Store) {
		let router = Router::default();
		router.add_all([
			RouteDefinition::new("queue", "/").unwrap().authenticated(),
			RouteDefinition::new("login", "/login").unwrap().unauthenticated(),
			RouteDefinition::new("about", "/about").unwrap(),
		]);
		let store = Store::in_memory();
		router.before_hook(SessionGuard::new(store.clone()).into_hook());
		(router, store)
	}

	async fn sign_in(store: &Store) {
		let expires = (Utc::now() + Duration::hours(1)).to_rfc3339();
		store.set("expires", expires, true).await.unwrap();
	}

	#[rstest]
	#[tokio::test]
	async fn test_signed_out_goes_to_login(routes: (Router, Store)) {
		let (router, _) = routes;

		router.redirect("/").await.unwrap();

		assert_eq!(router.active().unwrap().id(), "login");
	}

	#[rstest]
	#[tokio::test]
	async fn test_unmatched_while_signed_out_ends_at_login(routes: (Router, Store)) {
		let (router, _) = routes;

		router.redirect("/missing").await.unwrap();

		assert_eq!(router.active().unwrap().id(), "login");
		assert_eq!(router.history().current_entry(), "/login");
	}

	#[rstest]
	#[tokio::test]
	async fn test_signed_in_leaves_login(routes: (Router, Store)) {
		let (router, store) = routes;
		sign_in(&store).await;

		router.redirect("/login").await.unwrap();

		assert_eq!(router.active().unwrap().id(), "queue");
	}

	#[rstest]
	#[tokio::test]
	async fn test_public_route_untouched(routes: (Router, Store)) {
		let (router, _) = routes;

		router.redirect("/about").await.unwrap();

		let active = router.active().unwrap();
		assert_eq!(active.id(), "about");
		assert_eq!(active.location(), "/about");
	}
}
