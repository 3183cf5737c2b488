//! Component trait definition.

use std::rc::Rc;

use async_trait::async_trait;

use super::instance::Instance;
use crate::error::HookResult;
use crate::pipeline::{Hook, HookFuture};

/// Behaviour attached to every element matching a declaration's selector.
///
/// Every callback is optional: the defaults succeed without doing anything.
/// One value implementing this trait is shared by all instances of a
/// declaration, so per-instance data belongs in the [`Instance`] state map.
///
/// # Example
///
/// ```ignore
/// use trellis_pages::component::{Component, Instance};
/// use trellis_pages::error::HookResult;
///
/// struct Counter;
///
/// #[async_trait::async_trait(?Send)]
/// impl Component for Counter {
/// 	async fn construct(&self, instance: &Instance) -> HookResult {
/// 		instance.set("count", 0);
/// 		instance.on("click", Some("button"), |cx| async move {
/// 			if let Some(instance) = cx.instance {
/// 				let count = instance.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
/// 				instance.render_with([("count", (count + 1).into())]).await?;
/// 			}
/// 			Ok(())
/// 		})?;
/// 		Ok(())
/// 	}
///
/// 	async fn template(&self, _instance: &Instance) -> HookResult<Option<String>> {
/// 		Ok(Some("<button>{{ count }}</button>".into()))
/// 	}
/// }
/// ```
#[async_trait(?Send)]
pub trait Component: 'static {
	/// Name used in diagnostics.
	fn name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}

	/// Runs once when the instance is created.
	async fn construct(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	/// Runs last while the instance is destroyed.
	async fn destruct(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	async fn before_mount(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	async fn on_mount(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	async fn after_mount(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	/// Returning `false` skips the rest of the render chain.
	async fn should_render(&self, _instance: &Instance) -> HookResult<bool> {
		Ok(true)
	}

	async fn before_render(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	/// Template text interpolated with the instance state.
	///
	/// `None` keeps the element's current markup.
	async fn template(&self, _instance: &Instance) -> HookResult<Option<String>> {
		Ok(None)
	}

	async fn on_render(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	async fn after_render(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	async fn before_destroy(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	async fn on_destroy(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}

	async fn after_destroy(&self, _instance: &Instance) -> HookResult {
		Ok(())
	}
}

/// Lifecycle callbacks that can be lifted into a pipeline [`Hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	Construct,
	Destruct,
	BeforeMount,
	OnMount,
	AfterMount,
	BeforeRender,
	OnRender,
	AfterRender,
	BeforeDestroy,
	OnDestroy,
	AfterDestroy,
}

impl Phase {
	/// Stage name used in diagnostics.
	pub fn name(self) -> &'static str {
		match self {
			Self::Construct => "construct",
			Self::Destruct => "destruct",
			Self::BeforeMount => "before_mount",
			Self::OnMount => "on_mount",
			Self::AfterMount => "after_mount",
			Self::BeforeRender => "before_render",
			Self::OnRender => "on_render",
			Self::AfterRender => "after_render",
			Self::BeforeDestroy => "before_destroy",
			Self::OnDestroy => "on_destroy",
			Self::AfterDestroy => "after_destroy",
		}
	}

	async fn invoke(self, component: &dyn Component, instance: &Instance) -> HookResult {
		match self {
			Self::Construct => component.construct(instance).await,
			Self::Destruct => component.destruct(instance).await,
			Self::BeforeMount => component.before_mount(instance).await,
			Self::OnMount => component.on_mount(instance).await,
			Self::AfterMount => component.after_mount(instance).await,
			Self::BeforeRender => component.before_render(instance).await,
			Self::OnRender => component.on_render(instance).await,
			Self::AfterRender => component.after_render(instance).await,
			Self::BeforeDestroy => component.before_destroy(instance).await,
			Self::OnDestroy => component.on_destroy(instance).await,
			Self::AfterDestroy => component.after_destroy(instance).await,
		}
	}
}

/// Lifts one lifecycle callback of `component` into a pipeline hook.
pub(crate) fn lifecycle_hook(component: &Rc<dyn Component>, phase: Phase) -> Hook<Instance> {
	let component = Rc::clone(component);
	Rc::new(move |instance: Instance| -> HookFuture {
		let component = Rc::clone(&component);
		Box::pin(async move { phase.invoke(component.as_ref(), &instance).await })
	})
}
