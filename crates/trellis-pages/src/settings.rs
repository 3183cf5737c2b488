//! Runtime settings.
//!
//! Settings come from TOML (text or file) with every field optional, then
//! `TRELLIS_*` environment variables are applied on top, then the result is
//! validated.
//!
//! ```toml
//! mode = "hash"
//! base = "/app"
//! region = "[data-view]"
//! persisted_keys = ["expires", "auth"]
//! storage_path = "storage.json"
//! ```
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TRELLIS_MODE` | `mode` (`history` or `hash`) |
//! | `TRELLIS_BASE` | `base` |
//! | `TRELLIS_ORIGIN` | `origin` |
//! | `TRELLIS_REGION` | `region` |
//! | `TRELLIS_SESSION_KEY` | `session_key` |
//! | `TRELLIS_LOGIN_PATH` | `login_path` |
//! | `TRELLIS_DEFAULT_PATH` | `default_path` |
//! | `TRELLIS_PERSISTED_KEYS` | `persisted_keys` (comma-separated) |
//! | `TRELLIS_STORAGE_PATH` | `storage_path` |
//! | `TRELLIS_MAX_REDIRECTS` | `max_redirects` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dom::Selector;
use crate::error::SettingsError;
use crate::router::HistoryMode;

/// Prefix of the environment variables read by [`RuntimeSettings::apply_env`].
pub const ENV_PREFIX: &str = "TRELLIS_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
	pub mode: HistoryMode,
	pub base: String,
	pub origin: String,
	/// Selector of the outlet region.
	pub region: String,
	/// Store key holding the session expiry.
	pub session_key: String,
	pub login_path: String,
	pub default_path: String,
	/// Keys loaded from the persistent backend at start.
	pub persisted_keys: Vec<String>,
	/// File backend location; the store stays in memory when unset.
	pub storage_path: Option<PathBuf>,
	pub max_redirects: usize,
}

impl Default for RuntimeSettings {
	fn default() -> Self {
		Self {
			mode: HistoryMode::History,
			base: String::new(),
			origin: "http://localhost".to_string(),
			region: "[data-view]".to_string(),
			session_key: "expires".to_string(),
			login_path: "/login".to_string(),
			default_path: "/".to_string(),
			persisted_keys: Vec::new(),
			storage_path: None,
			max_redirects: 8,
		}
	}
}

impl RuntimeSettings {
	pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
		Ok(toml::from_str(text)?)
	}

	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&text)
	}

	/// Reads `path`, applies the process environment and validates.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let mut settings = Self::from_file(path)?;
		settings.apply_env()?;
		settings.validate()?;
		Ok(settings)
	}

	/// Applies `TRELLIS_*` variables of the process environment.
	pub fn apply_env(&mut self) -> Result<(), SettingsError> {
		self.apply_env_from(std::env::vars())
	}

	/// Applies overrides from `vars`; keys without the prefix are ignored.
	pub fn apply_env_from<I, K, V>(&mut self, vars: I) -> Result<(), SettingsError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		for (key, value) in vars {
			let key = key.as_ref();
			let Some(field) = key.strip_prefix(ENV_PREFIX) else {
				continue;
			};
			let value: String = value.into();
			let invalid = || SettingsError::Env {
				key: key.to_string(),
				value: value.clone(),
			};

			match field.to_lowercase().as_str() {
				"mode" => self.mode = value.parse().map_err(|_| invalid())?,
				"base" => self.base = value.trim().to_string(),
				"origin" => self.origin = value.trim().to_string(),
				"region" => self.region = value.trim().to_string(),
				"session_key" => self.session_key = value.trim().to_string(),
				"login_path" => self.login_path = value.trim().to_string(),
				"default_path" => self.default_path = value.trim().to_string(),
				"persisted_keys" => {
					self.persisted_keys = value
						.split(',')
						.map(str::trim)
						.filter(|key| !key.is_empty())
						.map(str::to_string)
						.collect();
				}
				"storage_path" => {
					let trimmed = value.trim();
					self.storage_path = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
				}
				"max_redirects" => {
					self.max_redirects = value.trim().parse().map_err(|_| invalid())?;
				}
				_ => {}
			}
		}
		Ok(())
	}

	/// Rejects settings the runtime cannot work with.
	pub fn validate(&self) -> Result<(), SettingsError> {
		if self.region.trim().is_empty() {
			return Err(SettingsError::Invalid {
				field: "region",
				reason: "must not be empty".to_string(),
			});
		}
		Selector::parse(&self.region)?;

		if self.max_redirects == 0 {
			return Err(SettingsError::Invalid {
				field: "max_redirects",
				reason: "must be at least 1".to_string(),
			});
		}
		if let Err(error) = Url::parse(&self.origin) {
			return Err(SettingsError::Invalid {
				field: "origin",
				reason: error.to_string(),
			});
		}
		if self.session_key.trim().is_empty() {
			return Err(SettingsError::Invalid {
				field: "session_key",
				reason: "must not be empty".to_string(),
			});
		}
		for (field, path) in [
			("login_path", &self.login_path),
			("default_path", &self.default_path),
		] {
			if !path.starts_with('/') {
				return Err(SettingsError::Invalid {
					field,
					reason: format!("`{path}` must start with `/`"),
				});
			}
		}
		Ok(())
	}

	/// Compiled outlet region selector.
	pub fn region_selector(&self) -> Result<Selector, SettingsError> {
		Ok(Selector::parse(&self.region)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::io::Write;

	#[rstest]
	fn test_defaults_are_valid() {
		let settings = RuntimeSettings::default();
		assert!(settings.validate().is_ok());
		assert_eq!(settings.region, "[data-view]");
		assert_eq!(settings.max_redirects, 8);
	}

	#[rstest]
	fn test_partial_toml_keeps_defaults() {
		let settings = RuntimeSettings::from_toml_str(
			r#"
			mode = "hash"
			persisted_keys = ["expires", "auth"]
			"#,
		)
		.unwrap();

		assert_eq!(settings.mode, HistoryMode::Hash);
		assert_eq!(settings.persisted_keys, vec!["expires", "auth"]);
		assert_eq!(settings.login_path, "/login");
	}

	#[rstest]
	fn test_unknown_mode_is_a_parse_error() {
		let error = RuntimeSettings::from_toml_str(r#"mode = "pushstate""#).unwrap_err();
		assert!(matches!(error, SettingsError::Parse(_)));
	}

	#[rstest]
	fn test_env_overrides() {
		let mut settings = RuntimeSettings::default();
		settings
			.apply_env_from([
				("TRELLIS_MODE", "hash"),
				("TRELLIS_PERSISTED_KEYS", "expires, auth,,"),
				("TRELLIS_MAX_REDIRECTS", "3"),
				("TRELLIS_STORAGE_PATH", "/tmp/trellis.json"),
				("HOME", "/root"),
			])
			.unwrap();

		assert_eq!(settings.mode, HistoryMode::Hash);
		assert_eq!(settings.persisted_keys, vec!["expires", "auth"]);
		assert_eq!(settings.max_redirects, 3);
		assert_eq!(settings.storage_path, Some(PathBuf::from("/tmp/trellis.json")));
	}

	#[rstest]
	#[case("TRELLIS_MODE", "pushstate")]
	#[case("TRELLIS_MAX_REDIRECTS", "many")]
	fn test_env_rejects_bad_values(#[case] key: &str, #[case] value: &str) {
		let mut settings = RuntimeSettings::default();
		let error = settings.apply_env_from([(key, value)]).unwrap_err();
		assert!(matches!(error, SettingsError::Env { .. }));
	}

	#[rstest]
	#[case("region", "", "region")]
	#[case("region", "[data-view", "selector")]
	#[case("max_redirects", "0", "max_redirects")]
	#[case("origin", "not a url", "origin")]
	#[case("login_path", "login", "login_path")]
	fn test_validate_rejects(#[case] field: &str, #[case] value: &str, #[case] expected: &str) {
		let mut settings = RuntimeSettings::default();
		match field {
			"region" => settings.region = value.to_string(),
			"max_redirects" => settings.max_redirects = value.parse().unwrap(),
			"origin" => settings.origin = value.to_string(),
			"login_path" => settings.login_path = value.to_string(),
			_ => unreachable!(),
		}

		let error = settings.validate().unwrap_err();

		match error {
			SettingsError::Invalid { field, .. } => assert_eq!(field, expected),
			SettingsError::Selector(_) => assert_eq!("selector", expected),
			other => panic!("unexpected error: {other}"),
		}
	}

	#[rstest]
	fn test_load_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "region = \"#outlet\"\nmax_redirects = 4").unwrap();

		let settings = RuntimeSettings::from_file(file.path()).unwrap();

		assert_eq!(settings.region, "#outlet");
		assert_eq!(settings.max_redirects, 4);
	}

	#[rstest]
	fn test_missing_file() {
		let error = RuntimeSettings::from_file("/nonexistent/trellis.toml").unwrap_err();
		assert!(matches!(error, SettingsError::Io { .. }));
	}
}
