//! Store integration tests
//!
//! Covers the file backend behind a runtime, persisted keys across restarts
//! and watcher fault isolation.

use std::cell::Cell;
use std::rc::Rc;

use rstest::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use trellis_pages::store::watcher;
use trellis_pages::{
	FileBackend, HookError, Runtime, RuntimeSettings, StorageBackend, Store, StoreError,
};

#[fixture]
fn storage() -> TempDir {
	tempfile::tempdir().unwrap()
}

fn settings_for(dir: &TempDir) -> RuntimeSettings {
	RuntimeSettings {
		storage_path: Some(dir.path().join("state").join("storage.json")),
		persisted_keys: vec!["auth".to_string(), "theme".to_string()],
		..RuntimeSettings::default()
	}
}

#[rstest]
#[tokio::test]
async fn test_persisted_keys_survive_restart(storage: TempDir) {
	let runtime = Runtime::new(settings_for(&storage)).unwrap();
	runtime
		.store()
		.set("auth", json!({ "user": "ada", "roles": ["admin"] }), true)
		.await
		.unwrap();
	runtime.store().set("draft", "unsaved", false).await.unwrap();
	drop(runtime);

	let restarted = Runtime::builder()
		.settings(settings_for(&storage))
		.body("<main data-view></main>")
		.build()
		.unwrap();
	assert!(restarted.store().get("auth").is_none());
	restarted.start().await.unwrap();

	let auth = restarted.store().entry("auth").unwrap();
	assert!(auth.persisted);
	assert_eq!(auth.value["user"], "ada");
	assert!(!restarted.store().contains("theme"));
	assert!(!restarted.store().contains("draft"));
}

#[rstest]
#[tokio::test]
async fn test_remove_deletes_from_file(storage: TempDir) {
	let path = storage.path().join("storage.json");
	let store = Store::new(Rc::new(FileBackend::new(&path)));
	store
		.set_all([("a", json!(1)), ("b", json!("two"))], true)
		.await
		.unwrap();

	let removed = store.remove(["a", "missing"]).await.unwrap();

	assert_eq!(removed, 1);
	let on_disk = store.local().items().await.unwrap();
	assert_eq!(on_disk.len(), 1);
	assert_eq!(on_disk["b"], Value::from("two"));
	let text = std::fs::read_to_string(&path).unwrap();
	assert!(text.contains("\"b\""));
	assert!(!text.contains("\"a\""));
}

#[rstest]
#[tokio::test]
async fn test_corrupt_file_is_reported(storage: TempDir) {
	let path = storage.path().join("storage.json");
	std::fs::write(&path, "[1, 2, 3]").unwrap();
	let backend = FileBackend::new(&path);

	let error = backend.read("auth").await.unwrap_err();

	assert!(matches!(error, StoreError::Corrupt { .. }));
}

#[rstest]
#[tokio::test]
async fn test_failing_watcher_does_not_stop_others() {
	let store = Store::in_memory();
	let calls = Rc::new(Cell::new(0));
	store.watch(
		"saved",
		Some("broken"),
		watcher(|_| async { Err(HookError::new("watcher failed")) }),
	);
	for name in ["first", "second"] {
		let calls = Rc::clone(&calls);
		store.watch(
			"saved",
			Some(name),
			watcher(move |payload: Value| {
				let calls = Rc::clone(&calls);
				async move {
					assert_eq!(payload["id"], 7);
					calls.set(calls.get() + 1);
					Ok(())
				}
			}),
		);
	}

	let report = store.fire("saved", json!({ "id": 7 })).await;

	assert_eq!(report.invoked, 3);
	assert_eq!(report.failures.len(), 1);
	assert_eq!(calls.get(), 2);
	assert_eq!(store.unwatch("saved", Some("broken")), 1);
	assert_eq!(store.watcher_count(), 2);
}
