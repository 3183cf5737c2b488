//! Asynchronous hook composition.
//!
//! A [`Stage`] is one `run_pipeline` call: every hook it holds starts at once
//! and the stage settles after all of them finished. A [`Pipeline`] chains
//! stages strictly in order and stops at the first stage that failed.
//!
//! ```ignore
//! let pipeline = Pipeline::new()
//! 	.stage(Stage::new("before_mount").hooks(globals.before_mount.clone()).hook(own))
//! 	.stage(Stage::new("on_mount").hook(on_mount));
//! pipeline.run(instance).await?;
//! ```

use std::future::Future;
use std::rc::Rc;

use futures::future::{LocalBoxFuture, join_all};

use crate::error::{HookError, HookResult, PipelineError};

/// Future returned by a hook.
pub type HookFuture = LocalBoxFuture<'static, HookResult>;

/// A shareable asynchronous callback receiving the pipeline scope.
pub type Hook<S> = Rc<dyn Fn(S) -> HookFuture>;

/// Wraps an async closure into a [`Hook`].
pub fn hook<S, F, Fut>(f: F) -> Hook<S>
where
	F: Fn(S) -> Fut + 'static,
	Fut: Future<Output = HookResult> + 'static,
{
	Rc::new(move |scope: S| -> HookFuture { Box::pin(f(scope)) })
}

/// Runs every defined hook concurrently against clones of `scope`.
///
/// Unset slots count as succeeded. A failing hook never cancels its siblings;
/// the aggregate fails after all of them settled.
pub async fn run_pipeline<S>(scope: S, hooks: &[Option<Hook<S>>]) -> Result<S, Vec<HookError>>
where
	S: Clone,
{
	let pending = hooks.iter().flatten().map(|hook| hook(scope.clone()));
	let failures: Vec<HookError> = join_all(pending)
		.await
		.into_iter()
		.filter_map(Result::err)
		.collect();

	if failures.is_empty() {
		Ok(scope)
	} else {
		Err(failures)
	}
}

/// A named set of hooks that run concurrently.
pub struct Stage<S> {
	name: &'static str,
	hooks: Vec<Option<Hook<S>>>,
}

impl<S> Clone for Stage<S> {
	fn clone(&self) -> Self {
		Self {
			name: self.name,
			hooks: self.hooks.clone(),
		}
	}
}

impl<S> std::fmt::Debug for Stage<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Stage")
			.field("name", &self.name)
			.field("hooks", &self.hooks.iter().flatten().count())
			.finish()
	}
}

impl<S: Clone> Stage<S> {
	/// Creates an empty stage.
	pub fn new(name: &'static str) -> Self {
		Self {
			name,
			hooks: Vec::new(),
		}
	}

	/// Adds a hook.
	pub fn hook(mut self, hook: Hook<S>) -> Self {
		self.hooks.push(Some(hook));
		self
	}

	/// Adds an optional hook slot.
	pub fn slot(mut self, hook: Option<Hook<S>>) -> Self {
		self.hooks.push(hook);
		self
	}

	/// Adds several hooks.
	pub fn hooks(mut self, hooks: impl IntoIterator<Item = Hook<S>>) -> Self {
		self.hooks.extend(hooks.into_iter().map(Some));
		self
	}

	/// Stage name used in diagnostics.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Number of defined hooks.
	pub fn len(&self) -> usize {
		self.hooks.iter().flatten().count()
	}

	/// Returns `true` when the stage holds no defined hook.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Runs the stage.
	pub async fn run(&self, scope: S) -> Result<S, PipelineError> {
		run_pipeline(scope, &self.hooks)
			.await
			.map_err(|failures| PipelineError::new(self.name, failures))
	}
}

/// An ordered chain of stages.
pub struct Pipeline<S> {
	stages: Vec<Stage<S>>,
}

impl<S> Default for Pipeline<S> {
	fn default() -> Self {
		Self { stages: Vec::new() }
	}
}

impl<S: Clone> Pipeline<S> {
	/// Creates an empty pipeline.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a stage.
	pub fn stage(mut self, stage: Stage<S>) -> Self {
		self.stages.push(stage);
		self
	}

	/// Stage names in execution order.
	pub fn stage_names(&self) -> Vec<&'static str> {
		self.stages.iter().map(Stage::name).collect()
	}

	/// Runs every stage in order, stopping at the first failed stage.
	pub async fn run(&self, scope: S) -> Result<S, PipelineError> {
		let mut scope = scope;
		for stage in &self.stages {
			scope = stage.run(scope).await?;
		}
		Ok(scope)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::cell::RefCell;

	type Log = Rc<RefCell<Vec<String>>>;

	fn recorder(log: &Log, label: &'static str) -> Hook<u32> {
		let log = Rc::clone(log);
		hook(move |scope: u32| {
			let log = Rc::clone(&log);
			async move {
				log.borrow_mut().push(format!("{label}:{scope}"));
				Ok(())
			}
		})
	}

	fn failing(label: &'static str) -> Hook<u32> {
		hook(move |_: u32| async move { Err(HookError::new(label)) })
	}

	#[rstest]
	#[tokio::test]
	async fn test_unset_slots_count_as_success() {
		let result = run_pipeline(7u32, &[None, None]).await;
		assert_eq!(result.ok(), Some(7));
	}

	#[rstest]
	#[tokio::test]
	async fn test_failure_does_not_cancel_siblings() {
		let log: Log = Rc::default();
		let hooks = [
			Some(failing("first")),
			Some(recorder(&log, "sibling")),
			None,
			Some(failing("second")),
		];

		let failures = run_pipeline(1u32, &hooks).await.unwrap_err();

		assert_eq!(failures.len(), 2);
		assert_eq!(*log.borrow(), vec!["sibling:1"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_hooks_in_one_stage_start_before_any_finishes() {
		let log: Log = Rc::default();
		let slow = {
			let log = Rc::clone(&log);
			hook(move |_: u32| {
				let log = Rc::clone(&log);
				async move {
					log.borrow_mut().push("slow:start".into());
					tokio::task::yield_now().await;
					log.borrow_mut().push("slow:end".into());
					Ok(())
				}
			})
		};
		let stage = Stage::new("concurrent")
			.hook(slow)
			.hook(recorder(&log, "fast"));

		stage.run(3).await.unwrap();

		assert_eq!(*log.borrow(), vec!["slow:start", "fast:3", "slow:end"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_pipeline_stops_after_failed_stage() {
		let log: Log = Rc::default();
		let pipeline = Pipeline::new()
			.stage(Stage::new("a").hook(recorder(&log, "a")))
			.stage(Stage::new("b").hook(failing("b")).hook(recorder(&log, "b")))
			.stage(Stage::new("c").hook(recorder(&log, "c")));

		let error = pipeline.run(0).await.unwrap_err();

		assert_eq!(error.stage(), "b");
		assert_eq!(*log.borrow(), vec!["a:0", "b:0"]);
		assert_eq!(pipeline.stage_names(), vec!["a", "b", "c"]);
	}

	#[rstest]
	fn test_stage_len_ignores_unset_slots() {
		let stage: Stage<u32> = Stage::new("s").slot(None).hook(failing("x"));
		assert_eq!(stage.len(), 1);
		assert!(!stage.is_empty());
	}
}
