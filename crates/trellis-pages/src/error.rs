//! Error types for the runtime.
//!
//! Runtime-internal failures (a hook returning `Err`) are represented by
//! [`HookError`] and collected into a [`PipelineError`] at the pipeline
//! boundary. Every caller-facing operation returns one of the concern-specific
//! enums below.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use thiserror::Error;

use crate::dom::NodeId;

/// Failure reported by a single lifecycle hook, guard, watcher or event handler.
#[derive(Debug, Clone)]
pub struct HookError {
	message: String,
	source: Option<Rc<dyn StdError>>,
}

impl HookError {
	/// Creates an error carrying only a message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: None,
		}
	}

	/// Wraps another error, keeping it reachable through [`StdError::source`].
	pub fn with_source<E>(error: E) -> Self
	where
		E: StdError + 'static,
	{
		Self {
			message: error.to_string(),
			source: Some(Rc::new(error)),
		}
	}

	/// Returns the message.
	pub fn message(&self) -> &str {
		&self.message
	}
}

impl fmt::Display for HookError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.message)
	}
}

impl StdError for HookError {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		self.source.as_deref()
	}
}

impl From<&str> for HookError {
	fn from(message: &str) -> Self {
		Self::new(message)
	}
}

impl From<String> for HookError {
	fn from(message: String) -> Self {
		Self::new(message)
	}
}

macro_rules! hook_error_from {
	($($ty:ty),* $(,)?) => {
		$(
			impl From<$ty> for HookError {
				fn from(error: $ty) -> Self {
					Self::with_source(error)
				}
			}
		)*
	};
}

hook_error_from!(
	MarkupError,
	SelectorError,
	RouterError,
	StoreError,
	EventError,
	PipelineError,
	serde_json::Error,
	tera::Error,
	std::io::Error,
);

/// Result type returned by hooks.
pub type HookResult<T = ()> = Result<T, HookError>;

/// Aggregate failure of one pipeline stage.
///
/// Siblings of a failed hook always run to completion, so a stage can report
/// several failures at once.
#[derive(Debug, Clone)]
pub struct PipelineError {
	stage: String,
	failures: Vec<HookError>,
}

impl PipelineError {
	/// Creates an aggregate for `stage`.
	pub fn new(stage: impl Into<String>, failures: Vec<HookError>) -> Self {
		Self {
			stage: stage.into(),
			failures,
		}
	}

	/// Name of the stage that failed.
	pub fn stage(&self) -> &str {
		&self.stage
	}

	/// Every hook failure reported by the stage.
	pub fn failures(&self) -> &[HookError] {
		&self.failures
	}
}

impl fmt::Display for PipelineError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} hook(s) failed in stage `{}`",
			self.failures.len(),
			self.stage
		)?;
		if let Some(first) = self.failures.first() {
			write!(f, ": {}", first)?;
		}
		Ok(())
	}
}

impl StdError for PipelineError {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		self.failures.first().map(|e| e as &(dyn StdError + 'static))
	}
}

/// Errors raised by the in-memory document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
	/// The node was removed or never existed.
	#[error("unknown node {0:?}")]
	UnknownNode(NodeId),
	/// The operation requires an element or the document root.
	#[error("node {0:?} cannot hold children")]
	NotAContainer(NodeId),
	/// Appending would create a cycle.
	#[error("node {child:?} is an ancestor of {parent:?}")]
	Cycle {
		/// Node being inserted.
		child: NodeId,
		/// Intended parent.
		parent: NodeId,
	},
}

/// Errors raised while parsing a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
	/// The selector is blank.
	#[error("empty selector `{0}`")]
	Empty(String),
	/// The selector engine rejected the text.
	#[error("invalid selector `{selector}`: {reason}")]
	Invalid {
		/// Whole selector text.
		selector: String,
		/// Parser diagnostic.
		reason: String,
	},
}

/// Errors raised by event registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
	/// The combined delegation selector does not parse.
	#[error(transparent)]
	Selector(#[from] SelectorError),
	/// The owning runtime has been dropped.
	#[error("runtime is no longer available")]
	Detached,
}

/// Errors raised by the router.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
	/// A path template failed to compile.
	#[error("invalid route template `{template}`: {source}")]
	InvalidPattern {
		/// The template as written.
		template: String,
		/// Underlying regex error.
		#[source]
		source: regex::Error,
	},
	/// A guard tried to rewrite a transition that was already rewritten.
	#[error("transition to `{location}` was already rewritten")]
	RewriteLimit {
		/// Location after the first rewrite.
		location: String,
	},
	/// A guard stage failed; the transition was aborted.
	#[error("route guard failed: {0}")]
	Guard(#[from] PipelineError),
	/// Too many consecutive redirects were queued.
	#[error("redirect chain exceeded {limit} hops at `{location}`")]
	RedirectLimit {
		/// Configured limit.
		limit: usize,
		/// Location that was dropped.
		location: String,
	},
	/// The router was dropped while a transition still referenced it.
	#[error("router is no longer available")]
	Detached,
}

/// Errors raised by the store and its backends.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Backend I/O failed.
	#[error("storage I/O failed: {0}")]
	Io(#[from] std::io::Error),
	/// A value could not be encoded.
	#[error("storage serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),
	/// The backing file does not hold a JSON object of strings.
	#[error("storage file `{}` is corrupt: {reason}", path.display())]
	Corrupt {
		/// Backing file.
		path: PathBuf,
		/// What was wrong with it.
		reason: String,
	},
}

/// Errors raised while loading runtime settings.
#[derive(Debug, Error)]
pub enum SettingsError {
	/// The settings file could not be read.
	#[error("failed to read settings from `{}`: {source}", path.display())]
	Io {
		/// File that was read.
		path: PathBuf,
		/// Underlying I/O error.
		#[source]
		source: std::io::Error,
	},
	/// The TOML text is malformed or has mistyped fields.
	#[error("failed to parse settings: {0}")]
	Parse(#[from] toml::de::Error),
	/// An environment override holds an unusable value.
	#[error("invalid value `{value}` for {key}")]
	Env {
		/// Environment variable name.
		key: String,
		/// Raw value.
		value: String,
	},
	/// A setting is out of range.
	#[error("invalid setting `{field}`: {reason}")]
	Invalid {
		/// Field name.
		field: &'static str,
		/// Why it was rejected.
		reason: String,
	},
	/// The outlet region is not a valid selector.
	#[error("invalid region selector: {0}")]
	Selector(#[from] SelectorError),
}

/// Errors raised while starting the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
	/// Persisted keys could not be loaded.
	#[error(transparent)]
	Store(#[from] StoreError),
	/// Link interception could not be installed.
	#[error(transparent)]
	Event(#[from] EventError),
	/// The initial route change failed.
	#[error(transparent)]
	Router(#[from] RouterError),
	/// Settings are invalid.
	#[error(transparent)]
	Settings(#[from] SettingsError),
}
