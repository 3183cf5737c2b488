//! Persistent storage backends.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Flat key/value text storage mirrored by the store.
#[async_trait(?Send)]
pub trait StorageBackend {
	async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

	async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

	async fn delete(&self, key: &str) -> Result<(), StoreError>;

	/// Every stored entry.
	async fn entries(&self) -> Result<BTreeMap<String, String>, StoreError>;
}

/// Encodes a value as JSON text.
pub fn encode(value: &Value) -> Result<String, StoreError> {
	Ok(serde_json::to_string(value)?)
}

/// Decodes stored text, keeping text that is not JSON as a string value.
pub fn decode(text: &str) -> Value {
	serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Volatile backend, used when no storage path is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
	entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a backend pre-filled with raw text entries.
	pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			entries: RefCell::new(
				entries
					.into_iter()
					.map(|(k, v)| (k.into(), v.into()))
					.collect(),
			),
		}
	}
}

#[async_trait(?Send)]
impl StorageBackend for MemoryBackend {
	async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.entries.borrow().get(key).cloned())
	}

	async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.entries
			.borrow_mut()
			.insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StoreError> {
		self.entries.borrow_mut().remove(key);
		Ok(())
	}

	async fn entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
		Ok(self.entries.borrow().clone())
	}
}

/// Backend keeping every entry in one JSON object file.
///
/// Each operation reads and rewrites the whole file; operations are
/// serialized so overlapping writes never lose updates. Writes go to a
/// staging file in the same directory which is then renamed over the
/// target, so the file on disk is always either the old or the new version.
#[derive(Debug)]
pub struct FileBackend {
	path: PathBuf,
	lock: Mutex<()>,
}

impl FileBackend {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
		let text = match tokio::fs::read_to_string(&self.path).await {
			Ok(text) => text,
			Err(error) if error.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
			Err(error) => return Err(error.into()),
		};
		if text.trim().is_empty() {
			return Ok(BTreeMap::new());
		}
		serde_json::from_str(&text).map_err(|error| StoreError::Corrupt {
			path: self.path.clone(),
			reason: error.to_string(),
		})
	}

	async fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
		let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			Some(parent) => {
				tokio::fs::create_dir_all(parent).await?;
				parent.to_path_buf()
			}
			None => PathBuf::from("."),
		};
		let text = serde_json::to_string_pretty(entries)?;

		// Dropping the staged path on an early return removes it.
		let staged = tempfile::Builder::new()
			.prefix(".trellis-store-")
			.suffix(".tmp")
			.tempfile_in(&dir)?
			.into_temp_path();
		tokio::fs::write(&staged, text).await?;
		staged.persist(&self.path).map_err(|failure| failure.error)?;
		Ok(())
	}
}

#[async_trait(?Send)]
impl StorageBackend for FileBackend {
	async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
		let _guard = self.lock.lock().await;
		Ok(self.load().await?.remove(key))
	}

	async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let _guard = self.lock.lock().await;
		let mut entries = self.load().await?;
		entries.insert(key.to_string(), value.to_string());
		self.save(&entries).await
	}

	async fn delete(&self, key: &str) -> Result<(), StoreError> {
		let _guard = self.lock.lock().await;
		let mut entries = self.load().await?;
		if entries.remove(key).is_some() {
			self.save(&entries).await?;
		}
		Ok(())
	}

	async fn entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
		let _guard = self.lock.lock().await;
		self.load().await
	}
}
