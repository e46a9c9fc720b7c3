//! Persisted key-value storage the tag store mirrors.
//!
//! Reads happen once, at startup. Writes are fire-and-forget: a backend that
//! fails to persist logs the failure and the in-memory store stays authoritative.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

use crate::{write_atomic, StoreError};

#[async_trait]
pub trait Backend: Send + Sync {
    /// Read the whole value stored under `key`. `Ok(None)` when nothing was ever stored.
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Merge `entries` into the object stored under `key`.
    fn patch(&self, key: &str, entries: Map<String, Value>);

    /// Remove `subkey` from the object stored under `key`.
    fn delete_path(&self, key: &str, subkey: &str);
}

/// Merge one level deep: object entries are merged field by field, anything else replaces.
fn merge_entries(target: &mut Map<String, Value>, entries: Map<String, Value>) {
    for (subkey, value) in entries {
        match value {
            Value::Object(fields) => {
                if let Some(Value::Object(existing)) = target.get_mut(&subkey) {
                    existing.extend(fields);
                } else {
                    target.insert(subkey, Value::Object(fields));
                }
            }
            other => {
                target.insert(subkey, other);
            }
        }
    }
}

// --- JSON files ---

#[derive(Debug)]
enum FileWrite {
    Patch {
        key: String,
        entries: Map<String, Value>,
    },
    Delete {
        key: String,
        subkey: String,
    },
    Flush(oneshot::Sender<()>),
}

/// One `<key>.json` file per storage key inside a directory.
///
/// Inside a tokio runtime, writes are queued to a single blocking writer so
/// they stay in call order and never block the caller. Outside one they run inline.
#[derive(Debug)]
pub struct JsonFileBackend {
    dir: PathBuf,
    writer: Mutex<Option<mpsc::UnboundedSender<FileWrite>>>,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: Mutex::new(None),
        }
    }

    /// Backend rooted at [`crate::data_dir`].
    pub fn in_data_dir() -> Self {
        Self::new(crate::data_dir())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        path_for(&self.dir, key)
    }

    /// Wait until every write queued so far has reached disk.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.submit(FileWrite::Flush(done));
        // A dropped sender means the writer is gone, so there is nothing left to wait for.
        let _ = wait.await;
    }

    fn submit(&self, write: FileWrite) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            apply(&self.dir, write);
            return;
        };
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = writer.get_or_insert_with(|| {
            let (queue, mut pending) = mpsc::unbounded_channel();
            let dir = self.dir.clone();
            handle.spawn_blocking(move || {
                while let Some(write) = pending.blocking_recv() {
                    apply(&dir, write);
                }
            });
            queue
        });
        if let Err(mpsc::error::SendError(write)) = queue.send(write) {
            tracing::debug!("file writer stopped; writing inline");
            *writer = None;
            apply(&self.dir, write);
        }
    }
}

fn path_for(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", key))
}

fn read_object(dir: &Path, key: &str) -> Result<Map<String, Value>, StoreError> {
    let path = path_for(dir, key);
    if !path.exists() {
        return Ok(Map::new());
    }
    let raw = fs::read_to_string(&path)?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => Err(StoreError::Unreadable(path)),
    }
}

fn write_object(dir: &Path, key: &str, map: Map<String, Value>) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(&Value::Object(map))?;
    write_atomic(&path_for(dir, key), &json)
}

fn apply(dir: &Path, write: FileWrite) {
    match write {
        FileWrite::Patch { key, entries } => {
            let result = read_object(dir, &key).and_then(|mut map| {
                merge_entries(&mut map, entries);
                write_object(dir, &key, map)
            });
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "failed to persist patch");
            }
        }
        FileWrite::Delete { key, subkey } => {
            let result = read_object(dir, &key).and_then(|mut map| match map.remove(&subkey) {
                Some(_) => write_object(dir, &key, map),
                None => Ok(()),
            });
            if let Err(e) = result {
                tracing::warn!(key = %key, subkey = %subkey, error = %e, "failed to persist delete");
            }
        }
        FileWrite::Flush(done) => {
            let _ = done.send(());
        }
    }
}

#[async_trait]
impl Backend for JsonFileBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.flush().await;
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn patch(&self, key: &str, entries: Map<String, Value>) {
        self.submit(FileWrite::Patch {
            key: key.to_string(),
            entries,
        });
    }

    fn delete_path(&self, key: &str, subkey: &str) {
        self.submit(FileWrite::Delete {
            key: key.to_string(),
            subkey: subkey.to_string(),
        });
    }
}

// --- In memory ---

/// A write observed by [`MemoryBackend`], in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOp {
    Patch {
        key: String,
        entries: Map<String, Value>,
    },
    DeletePath {
        key: String,
        subkey: String,
    },
}

/// Backend that keeps everything in memory and records every write.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Mutex<BTreeMap<String, Value>>,
    ops: Mutex<Vec<BackendOp>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: Value) -> Self {
        let backend = Self::default();
        backend
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        backend
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn ops(&self) -> Vec<BackendOp> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.value(key))
    }

    fn patch(&self, key: &str, entries: Map<String, Value>) {
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BackendOp::Patch {
                key: key.to_string(),
                entries: entries.clone(),
            });
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = data
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            merge_entries(map, entries);
        }
    }

    fn delete_path(&self, key: &str, subkey: &str) {
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BackendOp::DeletePath {
                key: key.to_string(),
                subkey: subkey.to_string(),
            });
        if let Some(Value::Object(map)) = self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(key)
        {
            map.remove(subkey);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn merge_is_one_level_deep() {
        let mut target = entries(json!({"bob": {"tag": "a", "votes": 1}, "amy": {"tag": "b"}}));
        merge_entries(&mut target, entries(json!({"bob": {"votes": 4}, "amy": 3})));
        assert_eq!(
            Value::Object(target),
            json!({"bob": {"tag": "a", "votes": 4}, "amy": 3})
        );
    }

    #[tokio::test]
    async fn file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());

        assert!(backend.read("tags").await.unwrap().is_none());

        backend.patch("tags", entries(json!({"bob": {"tag": "friend"}})));
        backend.patch("tags", entries(json!({"amy": {"votes": 2}})));
        backend.delete_path("tags", "bob");

        let stored = backend.read("tags").await.unwrap().unwrap();
        assert_eq!(stored, json!({"amy": {"votes": 2}}));
        assert!(!dir.path().join(".tags.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_backend_never_overwrites_an_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());
        fs::write(backend.path_for("tags"), "{ nope").unwrap();
        assert!(backend.read("tags").await.is_err());

        backend.patch("tags", entries(json!({"amy": {"tag": "x"}})));
        backend.delete_path("tags", "amy");
        backend.flush().await;
        assert_eq!(fs::read_to_string(backend.path_for("tags")).unwrap(), "{ nope");

        fs::write(backend.path_for("list"), "[1, 2]").unwrap();
        backend.patch("list", entries(json!({"amy": {"tag": "x"}})));
        backend.flush().await;
        assert_eq!(fs::read_to_string(backend.path_for("list")).unwrap(), "[1, 2]");
    }

    #[test]
    fn file_backend_writes_inline_without_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());
        backend.patch("tags", entries(json!({"bob": {"tag": "friend"}})));
        backend.delete_path("tags", "bob");
        backend.patch("tags", entries(json!({"amy": {"votes": 2}})));
        let raw = fs::read_to_string(backend.path_for("tags")).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&raw).unwrap(),
            json!({"amy": {"votes": 2}})
        );
    }

    #[tokio::test]
    async fn memory_backend_records_ops_in_order() {
        let backend = MemoryBackend::new();
        backend.delete_path("tags", "bob");
        backend.patch("tags", entries(json!({"bob": {"tag": "t"}})));
        assert_eq!(
            backend.ops(),
            vec![
                BackendOp::DeletePath {
                    key: "tags".into(),
                    subkey: "bob".into()
                },
                BackendOp::Patch {
                    key: "tags".into(),
                    entries: entries(json!({"bob": {"tag": "t"}}))
                },
            ]
        );
        assert_eq!(
            backend.read("tags").await.unwrap(),
            Some(json!({"bob": {"tag": "t"}}))
        );
    }
}
