//! Component lifecycle integration tests
//!
//! Success Criteria:
//! 1. Mounting the same subtree twice never binds an element twice
//! 2. Destroying a subtree releases everything its instances registered
//! 3. Delegated handlers stay scoped to the instance that registered them
//! 4. A failing hook never prevents its siblings from running
//! 5. Templates render instance state and mount nested declarations
//! 6. A failed render leaves the previous markup and nested instances in place
//! 7. Removing a declaration tears down every live instance it created

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use rstest::*;
use serde_json::json;
use trellis_pages::component::{LifecycleState, RenderOutcome};
use trellis_pages::{
	Component, EventInit, GlobalPhase, HookError, HookResult, Instance, NodeId, Runtime, Selector,
};

// ============================================================================
// Test Components
// ============================================================================

/// Registers a click handler on its list items and records which instance
/// received each click.
struct ItemList {
	clicks: Rc<RefCell<Vec<String>>>,
}

#[async_trait(?Send)]
impl Component for ItemList {
	async fn on_mount(&self, instance: &Instance) -> HookResult {
		let clicks = Rc::clone(&self.clicks);
		let runtime = instance.runtime().ok_or("runtime dropped")?;
		let name = runtime
			.document()
			.attr(instance.element(), "data-list")
			.unwrap_or_default()
			.to_string();
		instance.on("click", Some("li"), move |_| {
			let clicks = Rc::clone(&clicks);
			let name = name.clone();
			async move {
				clicks.borrow_mut().push(name);
				Ok(())
			}
		})?;
		instance.set_entry(format!("list.{}", instance.id()), true)?;
		instance.watch("refresh", |_| async { Ok(()) })?;
		Ok(())
	}
}

struct Broken;

#[async_trait(?Send)]
impl Component for Broken {
	async fn construct(&self, _instance: &Instance) -> HookResult {
		Err("construct refused".into())
	}
}

struct Counter;

#[async_trait(?Send)]
impl Component for Counter {
	async fn construct(&self, instance: &Instance) -> HookResult {
		instance.set("count", 0);
		Ok(())
	}

	async fn template(&self, _instance: &Instance) -> HookResult<Option<String>> {
		Ok(Some(r#"<span class="count">{{ count }}</span><em data-badge></em>"#.to_string()))
	}
}

struct Badge;

#[async_trait(?Send)]
impl Component for Badge {}

/// Renders `value`; its after-render hook fails while `fail` is set.
struct Flaky;

#[async_trait(?Send)]
impl Component for Flaky {
	async fn construct(&self, instance: &Instance) -> HookResult {
		instance.set("value", 1);
		Ok(())
	}

	async fn template(&self, _instance: &Instance) -> HookResult<Option<String>> {
		Ok(Some(r#"<b class="value">{{ value }}</b><em data-badge></em>"#.to_string()))
	}

	async fn after_render(&self, instance: &Instance) -> HookResult {
		if instance.get("fail") == Some(json!(true)) {
			return Err(HookError::new("after render refused"));
		}
		Ok(())
	}
}

/// Declines to render while `frozen` is set.
struct Frozen;

#[async_trait(?Send)]
impl Component for Frozen {
	async fn construct(&self, instance: &Instance) -> HookResult {
		instance.set("label", "first");
		Ok(())
	}

	async fn should_render(&self, instance: &Instance) -> HookResult<bool> {
		Ok(instance.get("frozen") != Some(json!(true)))
	}

	async fn template(&self, _instance: &Instance) -> HookResult<Option<String>> {
		Ok(Some("<i>{{ label }}</i>".to_string()))
	}
}

/// Records every teardown callback it receives.
struct Tracked {
	log: Rc<RefCell<Vec<&'static str>>>,
}

#[async_trait(?Send)]
impl Component for Tracked {
	async fn before_destroy(&self, _instance: &Instance) -> HookResult {
		self.log.borrow_mut().push("before_destroy");
		Ok(())
	}

	async fn on_destroy(&self, _instance: &Instance) -> HookResult {
		self.log.borrow_mut().push("on_destroy");
		Ok(())
	}

	async fn after_destroy(&self, _instance: &Instance) -> HookResult {
		self.log.borrow_mut().push("after_destroy");
		Ok(())
	}

	async fn destruct(&self, _instance: &Instance) -> HookResult {
		self.log.borrow_mut().push("destruct");
		Ok(())
	}
}

/// Flips `open` on every `toggle` event reaching its element.
struct Toggle;

#[async_trait(?Send)]
impl Component for Toggle {
	async fn on_mount(&self, instance: &Instance) -> HookResult {
		instance.on("toggle", None, |cx| async move {
			if let Some(instance) = &cx.instance {
				let open = instance.get("open") == Some(json!(true));
				instance.set("open", !open);
			}
			cx.event.prevent_default();
			Ok(())
		})?;
		Ok(())
	}
}

// ============================================================================
// Fixtures
// ============================================================================

#[fixture]
fn lists() -> (Runtime, Rc<RefCell<Vec<String>>>) {
	let runtime = Runtime::builder()
		.body(
			r#"<ul data-list="first"><li>a</li><li>b</li></ul>
			<ul data-list="second"><li>c</li></ul>"#,
		)
		.build()
		.unwrap();
	let clicks: Rc<RefCell<Vec<String>>> = Rc::default();
	runtime
		.component(
			"[data-list]",
			ItemList {
				clicks: Rc::clone(&clicks),
			},
		)
		.unwrap();
	(runtime, clicks)
}

fn first(runtime: &Runtime, selector: &str) -> NodeId {
	let document = runtime.document();
	document
		.query(document.root(), &Selector::parse(selector).unwrap())
		.unwrap()
}

// ============================================================================
// Happy Path
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_mount_is_idempotent(lists: (Runtime, Rc<RefCell<Vec<String>>>)) {
	let (runtime, _) = lists;
	let root = runtime.document().root();

	assert_eq!(runtime.mount(root).await, 2);
	assert_eq!(runtime.mount(root).await, 0);
	assert_eq!(runtime.mount(runtime.body()).await, 0);

	assert_eq!(runtime.instances().len(), 2);
	assert!(runtime.instances().iter().all(Instance::is_mounted));
}

#[rstest]
#[tokio::test]
async fn test_destroy_releases_registrations(lists: (Runtime, Rc<RefCell<Vec<String>>>)) {
	let (runtime, _) = lists;
	let events_before = runtime.events().len();
	let entries_before = runtime.store().items().len();
	let watchers_before = runtime.store().watcher_count();

	runtime.mount(runtime.body()).await;
	assert_eq!(runtime.events().len(), events_before + 2);
	assert_eq!(runtime.store().items().len(), entries_before + 2);
	assert_eq!(runtime.store().watcher_count(), watchers_before + 2);
	assert!(runtime.events().is_listening("click"));

	let destroyed = runtime.destroy(runtime.body()).await;

	assert_eq!(destroyed, 2);
	assert!(runtime.instances().is_empty());
	assert_eq!(runtime.events().len(), events_before);
	assert_eq!(runtime.store().items().len(), entries_before);
	assert_eq!(runtime.store().watcher_count(), watchers_before);
	assert!(!runtime.events().is_listening("click"));
}

#[rstest]
#[tokio::test]
async fn test_handlers_are_scoped_to_their_instance(lists: (Runtime, Rc<RefCell<Vec<String>>>)) {
	let (runtime, clicks) = lists;
	runtime.mount(runtime.body()).await;

	let item = first(&runtime, r#"[data-list="second"] li"#);
	runtime.dispatch(item, EventInit::new("click")).await;
	let item = first(&runtime, r#"[data-list="first"] li"#);
	runtime.dispatch(item, EventInit::new("click")).await;

	assert_eq!(*clicks.borrow(), vec!["second", "first"]);
}

#[rstest]
#[tokio::test]
async fn test_click_outside_subselector_is_ignored(lists: (Runtime, Rc<RefCell<Vec<String>>>)) {
	let (runtime, clicks) = lists;
	runtime.mount(runtime.body()).await;

	let list = first(&runtime, "[data-list]");
	runtime.dispatch(list, EventInit::new("click")).await;

	assert!(clicks.borrow().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_template_renders_state_and_mounts_nested() {
	let runtime = Runtime::builder()
		.body("<div data-counter></div>")
		.build()
		.unwrap();
	runtime.component("[data-counter]", Counter).unwrap();
	runtime.component("[data-badge]", Badge).unwrap();

	runtime.mount(runtime.body()).await;

	let counter = runtime.instances_of("[data-counter]").remove(0);
	assert_eq!(counter.lifecycle(), LifecycleState::Rendered);
	assert_eq!(runtime.instances_of("[data-badge]").len(), 1);
	let count = first(&runtime, ".count");
	assert_eq!(runtime.document().text_content(count), "0");

	counter.render_with([("count", json!(3))]).await.unwrap();

	let count = first(&runtime, ".count");
	assert_eq!(runtime.document().text_content(count), "3");
	assert_eq!(runtime.instances_of("[data-badge]").len(), 1);
}

#[rstest]
#[tokio::test]
async fn test_unchanged_markup_keeps_nodes() {
	let runtime = Runtime::builder()
		.body("<div data-counter></div>")
		.build()
		.unwrap();
	runtime.component("[data-counter]", Counter).unwrap();
	runtime.component("[data-badge]", Badge).unwrap();
	runtime.mount(runtime.body()).await;

	let counter = runtime.instances_of("[data-counter]").remove(0);
	let count = first(&runtime, ".count");
	let badge = runtime.instances_of("[data-badge]")[0].id();

	assert_eq!(counter.render().await.unwrap(), RenderOutcome::Unchanged);
	assert_eq!(first(&runtime, ".count"), count);
	assert_eq!(runtime.instances_of("[data-badge]")[0].id(), badge);

	assert_eq!(
		counter.render_with([("count", json!(5))]).await.unwrap(),
		RenderOutcome::Replaced
	);
	assert_ne!(first(&runtime, ".count"), count);
	assert_ne!(runtime.instances_of("[data-badge]")[0].id(), badge);
}

#[rstest]
#[tokio::test]
async fn test_should_render_false_skips_render() {
	let runtime = Runtime::builder()
		.body("<div data-frozen></div>")
		.build()
		.unwrap();
	runtime.component("[data-frozen]", Frozen).unwrap();
	runtime.mount(runtime.body()).await;
	let frozen = runtime.instances_of("[data-frozen]").remove(0);
	let label = first(&runtime, "i");

	let outcome = frozen
		.render_with([("label", json!("second")), ("frozen", json!(true))])
		.await
		.unwrap();

	assert_eq!(outcome, RenderOutcome::Skipped);
	assert_eq!(runtime.document().text_content(label), "first");
	assert_eq!(frozen.lifecycle(), LifecycleState::Rendered);

	let outcome = frozen.render_with([("frozen", json!(false))]).await.unwrap();
	assert_eq!(outcome, RenderOutcome::Replaced);
	let label = first(&runtime, "i");
	assert_eq!(runtime.document().text_content(label), "second");
}

#[rstest]
#[tokio::test]
async fn test_trigger_reaches_own_handlers() {
	let runtime = Runtime::builder()
		.body("<details data-toggle></details>")
		.build()
		.unwrap();
	runtime.component("[data-toggle]", Toggle).unwrap();
	runtime.mount(runtime.body()).await;
	let toggle = runtime.instances_of("[data-toggle]").remove(0);

	let event = toggle.trigger("toggle").await.unwrap();
	assert!(event.default_prevented());
	assert_eq!(toggle.get("open"), Some(json!(true)));

	toggle.trigger("toggle").await.unwrap();
	assert_eq!(toggle.get("open"), Some(json!(false)));

	runtime.destroy(runtime.body()).await;
	let event = toggle.trigger("toggle").await.unwrap();
	assert!(!event.default_prevented());
	assert_eq!(toggle.get("open"), Some(json!(false)));
}

// ============================================================================
// Error Path
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_failing_mount_hook_still_renders_template() {
	let runtime = Runtime::builder()
		.body("<div data-counter></div>")
		.build()
		.unwrap();
	runtime.component("[data-counter]", Counter).unwrap();
	runtime.component("[data-badge]", Badge).unwrap();
	runtime.on_lifecycle(GlobalPhase::AfterMount, |_instance: Instance| async {
		Err(HookError::new("analytics unavailable"))
	});

	runtime.mount(runtime.body()).await;

	let counter = runtime.instances_of("[data-counter]").remove(0);
	assert_eq!(counter.lifecycle(), LifecycleState::Rendered);
	let count = first(&runtime, ".count");
	assert_eq!(runtime.document().text_content(count), "0");
	let badges = runtime.instances_of("[data-badge]");
	assert_eq!(badges.len(), 1);
	assert!(badges[0].is_mounted());
}

#[rstest]
#[tokio::test]
async fn test_failed_render_restores_previous_markup() {
	let runtime = Runtime::builder()
		.body("<div data-flaky></div>")
		.build()
		.unwrap();
	runtime.component("[data-flaky]", Flaky).unwrap();
	runtime.component("[data-badge]", Badge).unwrap();
	runtime.mount(runtime.body()).await;

	let flaky = runtime.instances_of("[data-flaky]").remove(0);
	let before = runtime.document().inner_html(flaky.element());
	let badge = runtime.instances_of("[data-badge]")[0].id();

	let error = flaky
		.render_with([("value", json!(2)), ("fail", json!(true))])
		.await
		.unwrap_err();

	assert!(error.to_string().contains("after render refused"));
	assert_eq!(runtime.document().inner_html(flaky.element()), before);
	assert_eq!(flaky.lifecycle(), LifecycleState::Rendered);
	let value = first(&runtime, ".value");
	assert_eq!(runtime.document().text_content(value), "1");

	let badges = runtime.instances_of("[data-badge]");
	assert_eq!(badges.len(), 1);
	assert!(badges[0].is_mounted());
	assert_ne!(badges[0].id(), badge);
}

#[rstest]
#[tokio::test]
async fn test_failed_construct_does_not_affect_other_declarations() {
	let runtime = Runtime::builder()
		.body("<div data-widget></div>")
		.build()
		.unwrap();
	runtime.component("[data-widget]", Broken).unwrap();
	runtime.component("[data-widget]", Badge).unwrap();

	runtime.mount(runtime.body()).await;

	let live = runtime.instances();
	assert_eq!(live.len(), 1);
	assert!(live[0].is_mounted());
}

#[rstest]
#[tokio::test]
async fn test_failing_global_hook_does_not_cancel_siblings() {
	let runtime = Runtime::builder()
		.body("<p data-a></p><p data-b></p>")
		.build()
		.unwrap();
	runtime.component("[data-a]", Badge).unwrap();
	runtime.component("[data-b]", Badge).unwrap();

	let seen: Rc<RefCell<Vec<String>>> = Rc::default();
	runtime.on_lifecycle(GlobalPhase::AfterMount, |_instance: Instance| async {
		Err(HookError::new("after mount failed"))
	});
	let sink = Rc::clone(&seen);
	runtime.on_lifecycle(GlobalPhase::AfterMount, move |instance: Instance| {
		let sink = Rc::clone(&sink);
		async move {
			sink.borrow_mut().push(instance.selector().to_string());
			Ok(())
		}
	});

	runtime.mount(runtime.body()).await;

	let mut seen = seen.borrow().clone();
	seen.sort();
	assert_eq!(seen, vec!["[data-a]", "[data-b]"]);
	assert_eq!(runtime.instances().len(), 2);
}

// ============================================================================
// State Transitions
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_remount_after_destroy_creates_fresh_instances(
	lists: (Runtime, Rc<RefCell<Vec<String>>>),
) {
	let (runtime, _) = lists;
	runtime.mount(runtime.body()).await;
	let before: Vec<_> = runtime.instances().iter().map(Instance::id).collect();

	runtime.destroy(runtime.body()).await;
	runtime.mount(runtime.body()).await;

	let after: Vec<_> = runtime.instances().iter().map(Instance::id).collect();
	assert_eq!(after.len(), 2);
	assert!(after.iter().all(|id| !before.contains(id)));
}

#[rstest]
#[tokio::test]
async fn test_remove_component_destroys_live_instances() {
	let runtime = Runtime::builder()
		.body("<p data-tracked></p><p data-tracked></p>")
		.build()
		.unwrap();
	let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();
	runtime
		.component(
			"[data-tracked]",
			Tracked {
				log: Rc::clone(&log),
			},
		)
		.unwrap();
	runtime.mount(runtime.body()).await;
	assert_eq!(runtime.instances().len(), 2);

	assert!(runtime.remove_component("[data-tracked]").await);

	let entries = log.borrow().clone();
	for phase in ["before_destroy", "on_destroy", "after_destroy", "destruct"] {
		assert_eq!(entries.iter().filter(|entry| **entry == phase).count(), 2, "{phase}");
	}
	assert_eq!(entries.last(), Some(&"destruct"));
	assert!(runtime.instances().is_empty());
	assert!(runtime.registry().latest("[data-tracked]").is_none());
	assert_eq!(runtime.mount(runtime.body()).await, 0);
	assert!(!runtime.remove_component("[data-tracked]").await);
}
