//! Router components: the outlet region and link interception.

use std::rc::Rc;

use url::Url;

use super::history::HistoryMode;
use super::transition::Transition;
use crate::dom::Selector;
use crate::error::{EventError, HookError, HookResult};
use crate::events::{Event, EventContext};
use crate::pipeline::{Hook, HookFuture};
use crate::runtime::{Runtime, WeakRuntime};
use crate::{debug_log, warn_log};

/// After-change hook swapping the outlet region to the active route.
///
/// The region's instances are destroyed, its markup replaced with the route
/// content, the `page-{id}` class moved on `<body>`, and the region mounted.
#[derive(Debug, Clone)]
pub struct RouterOutlet {
	runtime: WeakRuntime,
	region: Selector,
}

impl RouterOutlet {
	pub fn new(runtime: &Runtime, region: Selector) -> Self {
		Self {
			runtime: runtime.downgrade(),
			region,
		}
	}

	pub fn region(&self) -> &Selector {
		&self.region
	}

	async fn swap(&self, transition: Transition) -> HookResult {
		let Some(runtime) = self.runtime.upgrade() else {
			return Ok(());
		};
		let region = {
			let document = runtime.document();
			document.query(document.root(), &self.region)
		};
		let Some(region) = region else {
			return Err(HookError::new(format!(
				"outlet region `{}` not found",
				self.region
			)));
		};

		runtime.destroy(region).await;

		let active = transition.active();
		let markup = active
			.as_ref()
			.map(|route| route.definition().render(route))
			.unwrap_or_default();
		{
			let mut document = runtime.document_mut();
			document.set_inner_html(region, &markup)?;
			let body = document.body();
			if let Some(previous) = transition.previous() {
				document.remove_class(body, &format!("page-{}", previous.id()))?;
			}
			if let Some(next) = &active {
				document.add_class(body, &format!("page-{}", next.id()))?;
			}
		}

		let mounted = runtime.mount(region).await;
		debug_log!(location = %transition.location(), mounted, "outlet swapped");
		Ok(())
	}

	/// The outlet as an after-change hook.
	pub fn into_hook(self) -> Hook<Transition> {
		let outlet = Rc::new(self);
		Rc::new(move |transition: Transition| -> HookFuture {
			let outlet = Rc::clone(&outlet);
			Box::pin(async move { outlet.swap(transition).await })
		})
	}
}

/// Attributes of an activated link.
#[derive(Debug, Clone, Copy)]
pub struct LinkAttributes<'a> {
	pub href: Option<&'a str>,
	pub target: Option<&'a str>,
}

/// Decides whether a link activation becomes a router redirect.
///
/// `current` is the current history entry. Returns the location to redirect
/// to, or `None` when the browser should handle the activation itself.
pub fn intercepted_location(
	event: &Event,
	link: LinkAttributes<'_>,
	origin: &str,
	mode: HistoryMode,
	current: &str,
) -> Option<String> {
	if event.modifiers().any() || event.button() != 0 || event.default_prevented() {
		return None;
	}
	if link
		.target
		.map(str::trim)
		.is_some_and(|target| !target.is_empty() && !target.eq_ignore_ascii_case("_self"))
	{
		return None;
	}
	let href = link.href.map(str::trim).filter(|href| !href.is_empty())?;

	let document = Url::parse(origin).ok()?.join(current).ok()?;
	let resolved = document.join(href).ok()?;
	if resolved.origin() != document.origin() {
		return None;
	}

	if mode == HistoryMode::Hash {
		if let Some(fragment) = resolved.fragment() {
			return Some(fragment.to_string());
		}
	} else if resolved.fragment().is_some() {
		let mut bare = resolved.clone();
		bare.set_fragment(None);
		let mut here = document.clone();
		here.set_fragment(None);
		if bare == here {
			return None;
		}
	}

	let mut location = resolved.path().to_string();
	if let Some(query) = resolved.query() {
		location.push('?');
		location.push_str(query);
	}
	Some(location)
}

/// Registers the document-level `click` handler turning link activations
/// into router redirects.
pub(crate) fn intercept_links(runtime: &Runtime) -> Result<(), EventError> {
	let weak = runtime.downgrade();
	runtime.on_document("click", Some("a"), move |cx: EventContext| {
		let weak = weak.clone();
		async move {
			let Some(runtime) = weak.upgrade() else {
				return Ok(());
			};
			let router = runtime.router();
			let location = {
				let document = runtime.document();
				let link = LinkAttributes {
					href: document.attr(cx.current, "href"),
					target: document.attr(cx.current, "target"),
				};
				intercepted_location(
					&cx.event,
					link,
					&runtime.settings().origin,
					router.options().mode,
					&router.history().current_entry(),
				)
			};
			let Some(location) = location else {
				return Ok(());
			};
			cx.event.prevent_default();
			if let Err(error) = router.redirect(&location).await {
				warn_log!(location = %location, "link navigation failed: {error}");
			}
			Ok(())
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::NodeId;
	use crate::events::{EventInit, Modifiers};
	use rstest::rstest;

	const ORIGIN: &str = "http://localhost";

	fn click() -> Event {
		Event::new(EventInit::new("click"), NodeId::from_raw(1))
	}

	fn link(href: &str) -> LinkAttributes<'_> {
		LinkAttributes {
			href: Some(href),
			target: None,
		}
	}

	#[rstest]
	#[case("/serie/42/asc", Some("/serie/42/asc"))]
	#[case("serie/42?sort=asc", Some("/serie/42?sort=asc"))]
	#[case("http://localhost/login", Some("/login"))]
	#[case("https://example.com/login", None)]
	#[case("http://localhost:8080/login", None)]
	#[case("#section", None)]
	#[case("/queue#section", None)]
	#[case("/login#section", Some("/login"))]
	fn test_history_mode(#[case] href: &str, #[case] expected: Option<&str>) {
		let location = intercepted_location(&click(), link(href), ORIGIN, HistoryMode::History, "/queue");
		assert_eq!(location.as_deref(), expected);
	}

	#[rstest]
	#[case("#/serie/42/asc", Some("/serie/42/asc"))]
	#[case("/login", Some("/login"))]
	fn test_hash_mode(#[case] href: &str, #[case] expected: Option<&str>) {
		let location = intercepted_location(&click(), link(href), ORIGIN, HistoryMode::Hash, "#/queue");
		assert_eq!(location.as_deref(), expected);
	}

	#[rstest]
	fn test_modifier_button_and_prevented_are_ignored() {
		let modified = Event::new(
			EventInit::new("click").with_modifiers(Modifiers {
				ctrl: true,
				..Modifiers::default()
			}),
			NodeId::from_raw(1),
		);
		let middle = Event::new(EventInit::new("click").with_button(1), NodeId::from_raw(1));
		let prevented = click();
		prevented.prevent_default();

		for event in [modified, middle, prevented] {
			assert_eq!(
				intercepted_location(&event, link("/login"), ORIGIN, HistoryMode::History, "/"),
				None
			);
		}
	}

	#[rstest]
	#[case(Some("_blank"), None)]
	#[case(Some("frame"), None)]
	#[case(Some("_self"), Some("/login"))]
	#[case(Some(""), Some("/login"))]
	fn test_target_attribute(#[case] target: Option<&str>, #[case] expected: Option<&str>) {
		let attrs = LinkAttributes {
			href: Some("/login"),
			target,
		};
		let location = intercepted_location(&click(), attrs, ORIGIN, HistoryMode::History, "/");
		assert_eq!(location.as_deref(), expected);
	}

	#[rstest]
	fn test_missing_href() {
		let attrs = LinkAttributes {
			href: None,
			target: None,
		};
		assert_eq!(
			intercepted_location(&click(), attrs, ORIGIN, HistoryMode::History, "/"),
			None
		);
	}
}
