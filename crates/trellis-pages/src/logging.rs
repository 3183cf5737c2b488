//! Logging abstraction layer for trellis-pages
//!
//! Every diagnostic produced by the runtime goes through the macros below. They
//! forward to [`tracing`] under the `trellis` target so applications decide where
//! the output ends up by installing a subscriber (see [`init`]).
//!
//! ## Macro Overview
//!
//! | Macro | Level | Typical use |
//! |-------|-------|-------------|
//! | `debug_log!` | `DEBUG` | lifecycle tracing, listener bookkeeping |
//! | `info_log!` | `INFO` | route transitions, runtime start |
//! | `warn_log!` | `WARN` | contained hook failures (construct, render, guard, watcher) |
//! | `error_log!` | `ERROR` | failures that leave the runtime in a degraded state |
//!
//! ## Example
//!
//! ```ignore
//! use trellis_pages::{debug_log, warn_log};
//!
//! debug_log!(selector = "[data-nav]", "mounting instance");
//! warn_log!(token = %instance.id(), "render failed: {error}");
//! ```
//!
//! The macros accept the same field and format syntax as the `tracing` macros.

use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub mod __private {
	pub use tracing;
}

/// Target every runtime diagnostic is emitted under.
pub const TARGET: &str = "trellis";

/// Logs a debug message under the `trellis` target.
///
/// # Example
///
/// ```ignore
/// debug_log!("listener installed for {}", event);
/// ```
#[macro_export]
macro_rules! debug_log {
	($($arg:tt)*) => {{
		$crate::logging::__private::tracing::debug!(target: "trellis", $($arg)*);
	}};
}

/// Logs an info message under the `trellis` target.
#[macro_export]
macro_rules! info_log {
	($($arg:tt)*) => {{
		$crate::logging::__private::tracing::info!(target: "trellis", $($arg)*);
	}};
}

/// Logs a warning under the `trellis` target.
///
/// Used for every failure the runtime contains instead of propagating.
#[macro_export]
macro_rules! warn_log {
	($($arg:tt)*) => {{
		$crate::logging::__private::tracing::warn!(target: "trellis", $($arg)*);
	}};
}

/// Logs an error under the `trellis` target.
#[macro_export]
macro_rules! error_log {
	($($arg:tt)*) => {{
		$crate::logging::__private::tracing::error!(target: "trellis", $($arg)*);
	}};
}

/// Installs a `tracing-subscriber` fmt subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns `false` when a
/// global subscriber was already installed, which makes repeated calls harmless.
pub fn init(default_filter: &str) -> bool {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.try_init()
		.is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_macros_expand_with_fields_and_format_args() {
		let token = "0000002a";
		debug_log!("plain message");
		info_log!(token, "with field");
		warn_log!(selector = "[data-nav]", "formatted {}", 42);
		error_log!("error {token}");
	}

	#[test]
	fn test_init_is_idempotent() {
		let _first = init("trellis=debug");
		assert!(!init("trellis=debug"));
	}
}
