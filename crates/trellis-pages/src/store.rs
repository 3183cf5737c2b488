//! Reactive key/value store
//!
//! An in-memory map of JSON values with an optional persistent mirror and
//! named publish/subscribe events. Global events are fired by their plain
//! name; component events are qualified as `event.namespace.token` (see
//! [`Instance::qualify`](crate::component::Instance::qualify)).
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::in_memory();
//! store.set("expires", "2099-01-01T00:00:00Z", true).await?;
//! store.watch("queueChange", Some("menu"), watcher(|payload| async move { Ok(()) }));
//! let report = store.fire("queueChange", json!({"count": 3})).await;
//! assert!(report.is_clean());
//! ```

mod backend;
mod watch;

use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

pub use backend::{FileBackend, MemoryBackend, StorageBackend, decode, encode};
pub use watch::{FireReport, WatchHandler, watcher};

use crate::component::InstanceId;
use crate::error::{HookError, StoreError};
use crate::pipeline::{Hook, HookFuture, run_pipeline};
use crate::warn_log;
use watch::Watchers;

/// One stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
	pub value: Value,
	/// Mirrored in the persistent backend.
	pub persisted: bool,
	/// Instance whose destruction releases the entry.
	pub owner: Option<InstanceId>,
}

struct StoreInner {
	entries: RefCell<BTreeMap<String, StoreEntry>>,
	watchers: RefCell<Watchers>,
	backend: Rc<dyn StorageBackend>,
}

/// Handle to the application store. Clones share the same data.
#[derive(Clone)]
pub struct Store {
	inner: Rc<StoreInner>,
}

impl fmt::Debug for Store {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Store")
			.field("entries", &self.inner.entries.borrow().len())
			.field("watchers", &self.inner.watchers.borrow().len())
			.finish()
	}
}

impl Store {
	pub fn new(backend: Rc<dyn StorageBackend>) -> Self {
		Self {
			inner: Rc::new(StoreInner {
				entries: RefCell::new(BTreeMap::new()),
				watchers: RefCell::new(Watchers::default()),
				backend,
			}),
		}
	}

	/// Store mirrored into a [`MemoryBackend`].
	pub fn in_memory() -> Self {
		Self::new(Rc::new(MemoryBackend::new()))
	}

	pub fn backend(&self) -> &Rc<dyn StorageBackend> {
		&self.inner.backend
	}

	fn entries_mut(&self) -> RefMut<'_, BTreeMap<String, StoreEntry>> {
		self.inner.entries.borrow_mut()
	}

	/// Sets `key`; with `persist` the value is also written to the backend.
	///
	/// The in-memory value is updated even when the backend write fails.
	pub async fn set(
		&self,
		key: impl Into<String>,
		value: impl Into<Value>,
		persist: bool,
	) -> Result<(), StoreError> {
		let key = key.into();
		let value = value.into();
		let encoded = if persist { Some(encode(&value)?) } else { None };
		self.entries_mut().insert(
			key.clone(),
			StoreEntry {
				value,
				persisted: persist,
				owner: None,
			},
		);
		if let Some(encoded) = encoded {
			self.inner.backend.write(&key, &encoded).await?;
		}
		Ok(())
	}

	/// Sets several keys at once.
	pub async fn set_all<K>(
		&self,
		entries: impl IntoIterator<Item = (K, Value)>,
		persist: bool,
	) -> Result<(), StoreError>
	where
		K: Into<String>,
	{
		for (key, value) in entries {
			self.set(key, value, persist).await?;
		}
		Ok(())
	}

	/// Sets an in-memory entry released when `owner` is destroyed.
	pub fn set_owned(&self, owner: InstanceId, key: impl Into<String>, value: impl Into<Value>) {
		self.entries_mut().insert(
			key.into(),
			StoreEntry {
				value: value.into(),
				persisted: false,
				owner: Some(owner),
			},
		);
	}

	pub fn get(&self, key: &str) -> Option<Value> {
		self.inner.entries.borrow().get(key).map(|e| e.value.clone())
	}

	/// Value of `key`, or `default` when missing.
	pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
		self.get(key).unwrap_or_else(|| default.into())
	}

	pub fn entry(&self, key: &str) -> Option<StoreEntry> {
		self.inner.entries.borrow().get(key).cloned()
	}

	pub fn contains(&self, key: &str) -> bool {
		self.inner.entries.borrow().contains_key(key)
	}

	/// Snapshot of every value.
	pub fn items(&self) -> BTreeMap<String, Value> {
		self.inner
			.entries
			.borrow()
			.iter()
			.map(|(k, e)| (k.clone(), e.value.clone()))
			.collect()
	}

	/// Entries owned by `owner`.
	pub fn owned_by(&self, owner: InstanceId) -> Vec<String> {
		self.inner
			.entries
			.borrow()
			.iter()
			.filter(|(_, e)| e.owner == Some(owner))
			.map(|(k, _)| k.clone())
			.collect()
	}

	/// Removes keys from memory and from the backend.
	pub async fn remove<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<usize, StoreError>
	where
		K: AsRef<str>,
	{
		let mut removed = 0;
		for key in keys {
			let key = key.as_ref();
			if self.entries_mut().remove(key).is_some() {
				removed += 1;
			}
			self.inner.backend.delete(key).await?;
		}
		Ok(removed)
	}

	/// Loads keys from the backend into memory, skipping missing ones.
	pub async fn load<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<usize, StoreError>
	where
		K: AsRef<str>,
	{
		let mut loaded = 0;
		for key in keys {
			let key = key.as_ref();
			let Some(text) = self.inner.backend.read(key).await? else {
				continue;
			};
			self.entries_mut().insert(
				key.to_string(),
				StoreEntry {
					value: decode(&text),
					persisted: true,
					owner: None,
				},
			);
			loaded += 1;
		}
		Ok(loaded)
	}

	/// Direct access to the persistent backend with the store's encoding.
	pub fn local(&self) -> LocalMirror {
		LocalMirror {
			backend: Rc::clone(&self.inner.backend),
		}
	}

	/// Adds a watcher for `event`. Several watchers may share a name.
	pub fn watch(&self, event: &str, name: Option<&str>, handler: WatchHandler) {
		self.inner
			.watchers
			.borrow_mut()
			.add(event, name, None, handler);
	}

	pub(crate) fn watch_owned(
		&self,
		owner: InstanceId,
		event: &str,
		name: Option<&str>,
		handler: WatchHandler,
	) {
		self.inner
			.watchers
			.borrow_mut()
			.add(event, name, Some(owner), handler);
	}

	/// Removes the watchers of `event`, or only the ones called `name`.
	pub fn unwatch(&self, event: &str, name: Option<&str>) -> usize {
		self.inner.watchers.borrow_mut().remove(event, name)
	}

	pub fn watcher_count(&self) -> usize {
		self.inner.watchers.borrow().len()
	}

	/// Watchers owned by `owner`.
	pub fn watchers_owned_by(&self, owner: InstanceId) -> usize {
		self.inner.watchers.borrow().owned_by(owner)
	}

	/// Runs every watcher of `event` concurrently with `payload`.
	///
	/// Each failure is caught per handler and reported in the returned
	/// [`FireReport`]; siblings always run to completion.
	pub async fn fire(&self, event: &str, payload: impl Into<Value>) -> FireReport {
		let handlers = self.inner.watchers.borrow().handlers(event);
		let failures: Rc<RefCell<Vec<HookError>>> = Rc::default();

		let guarded: Vec<Option<Hook<Value>>> = handlers
			.into_iter()
			.map(|handler| {
				let failures = Rc::clone(&failures);
				let hook: Hook<Value> = Rc::new(move |payload: Value| -> HookFuture {
					let handler = Rc::clone(&handler);
					let failures = Rc::clone(&failures);
					Box::pin(async move {
						if let Err(error) = handler(payload).await {
							failures.borrow_mut().push(error);
						}
						Ok(())
					})
				});
				Some(hook)
			})
			.collect();

		let invoked = guarded.len();
		if let Err(unexpected) = run_pipeline(payload.into(), &guarded).await {
			failures.borrow_mut().extend(unexpected);
		}

		let failures = failures.take();
		for failure in &failures {
			warn_log!(event = %event, "store watcher failed: {failure}");
		}
		FireReport { invoked, failures }
	}

	/// Drops every entry and watcher owned by `owner`.
	pub fn release(&self, owner: InstanceId) -> usize {
		let mut entries = self.entries_mut();
		let before = entries.len();
		entries.retain(|_, e| e.owner != Some(owner));
		let released = before - entries.len();
		drop(entries);
		released + self.inner.watchers.borrow_mut().release(owner)
	}
}

/// The persistent mirror: same shape as the store, straight on the backend.
#[derive(Clone)]
pub struct LocalMirror {
	backend: Rc<dyn StorageBackend>,
}

impl fmt::Debug for LocalMirror {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LocalMirror").finish_non_exhaustive()
	}
}

impl LocalMirror {
	pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
		Ok(self.backend.read(key).await?.map(|text| decode(&text)))
	}

	pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
		let encoded = encode(&value.into())?;
		self.backend.write(key, &encoded).await
	}

	pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.backend.delete(key).await
	}

	pub async fn items(&self) -> Result<BTreeMap<String, Value>, StoreError> {
		Ok(self
			.backend
			.entries()
			.await?
			.into_iter()
			.map(|(key, text)| {
				let value = decode(&text);
				(key, value)
			})
			.collect())
	}
}
