//! Mount, render and destroy scheduling.
//!
//! Every lifecycle phase is an ordered [`Pipeline`]: global "before" hooks,
//! then the component callbacks one stage each, then global "after" hooks.
//! Distinct instances are processed concurrently with one another.

use std::rc::Rc;

use futures::future::{LocalBoxFuture, join_all};

use super::instance::{Instance, LifecycleState};
use super::registry::{GlobalHooks, GlobalPhase};
use super::r#trait::{Component, Phase, lifecycle_hook};
use crate::dom::{NodeId, markup};
use crate::error::{HookResult, PipelineError};
use crate::pipeline::{Pipeline, Stage};
use crate::runtime::Runtime;
use crate::{debug_log, warn_log};

/// Result of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
	/// `should_render` declined, or the instance was not in a renderable state.
	Skipped,
	/// The chain ran; the element's markup was already up to date.
	Unchanged,
	/// The chain ran and the element's markup was replaced.
	Replaced,
}

fn globals(runtime: &Runtime) -> GlobalHooks {
	runtime.inner.registry.borrow().globals().clone()
}

fn global_stage(globals: &GlobalHooks, phase: GlobalPhase, name: &'static str) -> Stage<Instance> {
	Stage::new(name).hooks(globals.get(phase))
}

fn own_stage(component: &Rc<dyn Component>, phase: Phase) -> Stage<Instance> {
	Stage::new(phase.name()).hook(lifecycle_hook(component, phase))
}

/// Creates and mounts an instance for every unbound match below `subtree`.
///
/// Returns the number of instances created. Boxed because rendering mounts
/// descendants recursively.
pub(crate) fn mount(runtime: Runtime, subtree: NodeId) -> LocalBoxFuture<'static, usize> {
	Box::pin(async move {
		let fresh = claim(&runtime, subtree);
		let count = fresh.len();
		if count > 0 {
			debug_log!(count, subtree = subtree.index(), "mounting instances");
		}
		join_all(
			fresh
				.into_iter()
				.map(|instance| mount_instance(&runtime, instance)),
		)
		.await;
		count
	})
}

// Records are inserted before any hook runs so overlapping mounts of the same
// subtree never bind an element twice.
fn claim(runtime: &Runtime, subtree: NodeId) -> Vec<Instance> {
	let candidates = {
		let registry = runtime.inner.registry.borrow();
		let document = runtime.inner.document.borrow();
		registry.find_matching(&document, subtree)
	};

	let mut table = runtime.inner.instances.borrow_mut();
	let mut fresh = Vec::new();
	for (declaration, elements) in candidates {
		for element in elements {
			if table.contains(element, declaration.id()) {
				continue;
			}
			let instance = Instance::new(
				table.allocate_id(),
				element,
				Rc::clone(&declaration),
				runtime.downgrade(),
			);
			table.insert(instance.clone());
			fresh.push(instance);
		}
	}
	fresh
}

async fn mount_instance(runtime: &Runtime, instance: Instance) {
	let globals = globals(runtime);
	let component = Rc::clone(instance.declaration().component());

	instance.set_lifecycle(LifecycleState::Constructing);
	let construct = Pipeline::new()
		.stage(global_stage(&globals, GlobalPhase::BeforeConstruct, "before_construct_hooks"))
		.stage(own_stage(&component, Phase::Construct))
		.stage(global_stage(&globals, GlobalPhase::AfterConstruct, "after_construct_hooks"));

	if let Err(error) = construct.run(instance.clone()).await {
		warn_log!(
			selector = instance.selector(),
			token = %instance.id(),
			"component construct failed: {error}"
		);
		runtime.release(&instance);
		instance.set_lifecycle(LifecycleState::Unmounted);
		return;
	}
	if instance.lifecycle() != LifecycleState::Constructing {
		return;
	}

	instance.set_lifecycle(LifecycleState::Mounted);
	let mounting = Pipeline::new()
		.stage(global_stage(&globals, GlobalPhase::BeforeMount, "before_mount_hooks"))
		.stage(own_stage(&component, Phase::BeforeMount))
		.stage(own_stage(&component, Phase::OnMount))
		.stage(own_stage(&component, Phase::AfterMount))
		.stage(global_stage(&globals, GlobalPhase::AfterMount, "after_mount_hooks"));

	// The render chain is a sibling of the mount hooks, so it runs even when
	// one of them failed.
	if let Err(error) = mounting.run(instance.clone()).await {
		warn_log!(
			selector = instance.selector(),
			token = %instance.id(),
			"component mount failed: {error}"
		);
	}

	if let Err(error) = render(runtime, &instance).await {
		debug_log!(token = %instance.id(), "initial render aborted: {error}");
	}
}

/// Runs the render chain of one instance.
///
/// On failure the instance returns to its prior state: when the markup had
/// already been replaced, the previous markup is restored and re-mounted.
pub(crate) async fn render(
	runtime: &Runtime,
	instance: &Instance,
) -> Result<RenderOutcome, PipelineError> {
	let prior = instance.lifecycle();
	if !matches!(prior, LifecycleState::Mounted | LifecycleState::Rendered) {
		return Ok(RenderOutcome::Skipped);
	}
	let component = Rc::clone(instance.declaration().component());

	match component.should_render(instance).await {
		Ok(true) => {}
		Ok(false) => return Ok(RenderOutcome::Skipped),
		Err(failure) => {
			let error = PipelineError::new("should_render", vec![failure]);
			warn_log!(
				selector = instance.selector(),
				token = %instance.id(),
				"component render failed: {error}"
			);
			return Err(error);
		}
	}
	if instance.lifecycle() != prior {
		return Ok(RenderOutcome::Skipped);
	}

	instance.set_lifecycle(LifecycleState::Rendering);
	let mut previous_markup = None;
	let result = render_pass(runtime, instance, &component, &mut previous_markup).await;

	match result {
		Ok(()) => {
			if instance.lifecycle() == LifecycleState::Rendering {
				instance.set_lifecycle(LifecycleState::Rendered);
			}
			if instance.is_mounted() {
				mount(runtime.clone(), instance.element()).await;
			}
			Ok(if previous_markup.is_some() {
				RenderOutcome::Replaced
			} else {
				RenderOutcome::Unchanged
			})
		}
		Err(error) => {
			warn_log!(
				selector = instance.selector(),
				token = %instance.id(),
				"component render failed: {error}"
			);
			let restored = previous_markup.is_some();
			if let Some(markup) = previous_markup {
				destroy(runtime, instance.element()).await;
				let outcome = runtime
					.inner
					.document
					.borrow_mut()
					.set_inner_html(instance.element(), &markup);
				if let Err(markup_error) = outcome {
					warn_log!(token = %instance.id(), "failed to restore markup: {markup_error}");
				}
			}
			if instance.lifecycle() == LifecycleState::Rendering {
				instance.set_lifecycle(prior);
			}
			if restored && instance.is_mounted() {
				mount(runtime.clone(), instance.element()).await;
			}
			Err(error)
		}
	}
}

async fn render_pass(
	runtime: &Runtime,
	instance: &Instance,
	component: &Rc<dyn Component>,
	previous_markup: &mut Option<String>,
) -> Result<(), PipelineError> {
	let globals = globals(runtime);

	Pipeline::new()
		.stage(global_stage(&globals, GlobalPhase::BeforeRender, "before_render_hooks"))
		.stage(own_stage(component, Phase::BeforeRender))
		.run(instance.clone())
		.await?;

	materialize(runtime, instance, component, previous_markup)
		.await
		.map_err(|failure| PipelineError::new("template", vec![failure]))?;

	Pipeline::new()
		.stage(own_stage(component, Phase::OnRender))
		.stage(own_stage(component, Phase::AfterRender))
		.stage(global_stage(&globals, GlobalPhase::AfterRender, "after_render_hooks"))
		.run(instance.clone())
		.await?;
	Ok(())
}

// Interpolates the template with the instance state and swaps the markup in
// only when it differs from what the element already holds.
async fn materialize(
	runtime: &Runtime,
	instance: &Instance,
	component: &Rc<dyn Component>,
	previous_markup: &mut Option<String>,
) -> HookResult {
	let Some(template) = component.template(instance).await? else {
		return Ok(());
	};
	let context = tera::Context::from_serialize(instance.state())?;
	let rendered = tera::Tera::one_off(&template, &context, true)?;
	let next = markup::normalize(&rendered);

	let element = instance.element();
	let current = runtime.inner.document.borrow().inner_html(element);
	if next == current {
		return Ok(());
	}

	destroy(runtime, element).await;
	runtime
		.inner
		.document
		.borrow_mut()
		.set_inner_html(element, &next)?;
	*previous_markup = Some(current);
	Ok(())
}

/// Destroys every live instance bound below `subtree`.
pub(crate) async fn destroy(runtime: &Runtime, subtree: NodeId) -> usize {
	let doomed = {
		let document = runtime.inner.document.borrow();
		runtime.inner.instances.borrow().under(&document, subtree)
	};
	for instance in &doomed {
		instance.set_lifecycle(LifecycleState::Destroying);
	}
	join_all(
		doomed
			.iter()
			.map(|instance| destroy_instance(runtime, instance.clone())),
	)
	.await;
	doomed.len()
}

async fn destroy_instance(runtime: &Runtime, instance: Instance) {
	let globals = globals(runtime);
	let component = Rc::clone(instance.declaration().component());
	instance.set_lifecycle(LifecycleState::Destroying);

	let teardown = Pipeline::new()
		.stage(global_stage(&globals, GlobalPhase::BeforeDestroy, "before_destroy_hooks"))
		.stage(own_stage(&component, Phase::BeforeDestroy))
		.stage(own_stage(&component, Phase::OnDestroy))
		.stage(own_stage(&component, Phase::AfterDestroy))
		.stage(global_stage(&globals, GlobalPhase::AfterDestroy, "after_destroy_hooks"));

	if let Err(error) = teardown.run(instance.clone()).await {
		warn_log!(
			selector = instance.selector(),
			token = %instance.id(),
			"component destroy failed: {error}"
		);
	}
	if let Err(error) = own_stage(&component, Phase::Destruct)
		.run(instance.clone())
		.await
	{
		warn_log!(
			selector = instance.selector(),
			token = %instance.id(),
			"component destruct failed: {error}"
		);
	}

	runtime.release(&instance);
	instance.set_lifecycle(LifecycleState::Unmounted);
}

/// Destroys every live instance of the most recent declaration for
/// `selector`, then removes the declaration.
pub(crate) async fn unregister(runtime: &Runtime, selector: &str) -> bool {
	let Some(declaration) = runtime.inner.registry.borrow().latest(selector) else {
		return false;
	};
	let live = runtime
		.inner
		.instances
		.borrow()
		.of_declaration(declaration.id());
	for instance in &live {
		instance.set_lifecycle(LifecycleState::Destroying);
	}
	join_all(
		live.into_iter()
			.map(|instance| destroy_instance(runtime, instance)),
	)
	.await;
	runtime
		.inner
		.registry
		.borrow_mut()
		.remove(declaration.id());
	true
}
