//! In-memory tag map mirrored to a persisted [`Backend`].
//!
//! The map is loaded once and is the only source of truth for the session.
//! Every mutation is applied in memory first, then written to the backend
//! without waiting for it.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{AuthorKey, Backend, TagEdit, TagPatch, TagRecord, IGNORED_SENTINEL};

/// Storage key the tag map lives under.
pub const TAGS_STORAGE_KEY: &str = "RESmodules.userTagger.tags";

pub struct TagStore {
    tags: BTreeMap<AuthorKey, TagRecord>,
    backend: Arc<dyn Backend>,
    storage_key: String,
}

impl std::fmt::Debug for TagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagStore")
            .field("storage_key", &self.storage_key)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl TagStore {
    /// Load the tag map from `backend`. Missing or malformed data gives an empty store.
    pub async fn load(backend: Arc<dyn Backend>) -> Self {
        Self::load_key(backend, TAGS_STORAGE_KEY).await
    }

    pub async fn load_key(backend: Arc<dyn Backend>, storage_key: &str) -> Self {
        let (tags, stray) = match backend.read(storage_key).await {
            Ok(Some(value)) => decode(value),
            Ok(None) => (BTreeMap::new(), Vec::new()),
            Err(e) => {
                tracing::warn!(key = storage_key, error = %e, "could not read tags; starting empty");
                (BTreeMap::new(), Vec::new())
            }
        };
        tracing::debug!(key = storage_key, count = tags.len(), "tags loaded");
        let mut store = Self {
            tags,
            backend,
            storage_key: storage_key.to_string(),
        };
        store.rekey(stray);
        store
    }

    /// Move entries persisted under a mixed-case name to their lowercased key,
    /// so later deletes and rewrites reach the persisted copy.
    fn rekey(&mut self, stray: Vec<(String, AuthorKey)>) {
        if stray.is_empty() {
            return;
        }
        let mut moved = Vec::new();
        for (name, key) in stray {
            self.backend.delete_path(&self.storage_key, &name);
            if !moved.contains(&key) {
                moved.push(key);
            }
        }
        for key in moved {
            if let Some(record) = self.tags.remove(&key) {
                self.commit(&key, record);
            }
        }
        tracing::info!(key = %self.storage_key, "mixed-case author names rewritten");
    }

    pub fn get(&self, key: &AuthorKey) -> Option<&TagRecord> {
        self.tags.get(key)
    }

    pub fn contains(&self, key: &AuthorKey) -> bool {
        self.tags.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AuthorKey, &TagRecord)> {
        self.tags.iter()
    }

    /// Merge `patch` into the record for `key`, creating it if needed.
    ///
    /// Returns the record as stored, or `None` when the result was empty and got removed.
    pub fn upsert_fields(&mut self, key: &AuthorKey, patch: &TagPatch) -> Option<&TagRecord> {
        let mut record = self.tags.remove(key).unwrap_or_default();
        patch.apply(&mut record);
        self.commit(key, record)
    }

    /// Delete the record for `key` and its persisted copy.
    pub fn remove(&mut self, key: &AuthorKey) -> Option<TagRecord> {
        let removed = self.tags.remove(key);
        self.backend.delete_path(&self.storage_key, key.as_str());
        removed
    }

    /// Apply a full tag edit.
    ///
    /// A non-empty label or the ignore flag tags the author (an empty label
    /// becomes the `"ignored"` sentinel). Otherwise label, color, link and
    /// ignore are all cleared. The vote weight is written whenever a record
    /// exists after that step.
    pub fn set_tag(&mut self, key: &AuthorKey, edit: &TagEdit) -> Option<&TagRecord> {
        let tagged = !edit.tag.is_empty() || edit.ignore;
        let mut patch = if tagged {
            let tag = if edit.tag.is_empty() {
                IGNORED_SENTINEL.to_string()
            } else {
                edit.tag.clone()
            };
            TagPatch {
                tag: Some(Some(tag)),
                color: Some(Some(edit.color.clone())),
                link: Some(Some(edit.link.clone())),
                ignore: Some(edit.ignore),
                votes: None,
            }
        } else {
            TagPatch::clear_tag()
        };
        if tagged || self.tags.contains_key(key) {
            patch.votes = Some(edit.votes);
        }
        self.upsert_fields(key, &patch)
    }

    /// Ignore or stop ignoring `name`.
    ///
    /// Ignoring an untagged author labels them `"ignored"`; un-ignoring drops
    /// that sentinel label but keeps one the user chose. Color, link and vote
    /// weight survive both directions.
    pub fn ignore_user(&mut self, name: &str, ignore: bool) -> Option<&TagRecord> {
        let key = AuthorKey::new(name);
        let current = self.tags.get(&key).cloned().unwrap_or_default();
        let mut tag = current.tag.unwrap_or_default();
        if ignore && tag.is_empty() {
            tag = IGNORED_SENTINEL.to_string();
        } else if !ignore && tag == IGNORED_SENTINEL {
            tag.clear();
        }
        let edit = TagEdit {
            tag,
            color: current.color.unwrap_or_else(|| "none".to_string()),
            ignore,
            link: current.link.unwrap_or_default(),
            votes: current.votes,
        };
        self.set_tag(&key, &edit)
    }

    /// Add `delta` to the vote weight of `key` and return the new total.
    pub fn adjust_votes(&mut self, key: &AuthorKey, delta: i64) -> i64 {
        let votes = self
            .tags
            .get(key)
            .map_or(0, |r| r.votes)
            .saturating_add(delta);
        self.upsert_fields(key, &TagPatch::votes(votes));
        votes
    }

    /// Drop the in-memory map. Persisted data is untouched.
    pub fn dispose(self) {
        tracing::debug!(key = %self.storage_key, count = self.tags.len(), "tag store disposed");
    }

    fn commit(&mut self, key: &AuthorKey, record: TagRecord) -> Option<&TagRecord> {
        // Removed fields must not linger in the persisted copy, so always delete first.
        self.backend.delete_path(&self.storage_key, key.as_str());
        if record.is_empty() {
            tracing::debug!(author = %key, "record emptied; removed");
            return None;
        }
        match serde_json::to_value(&record) {
            Ok(value) => {
                let mut entries = Map::new();
                entries.insert(key.as_str().to_string(), value);
                self.backend.patch(&self.storage_key, entries);
            }
            Err(e) => tracing::warn!(author = %key, error = %e, "could not encode record"),
        }
        self.tags.insert(key.clone(), record);
        self.tags.get(key)
    }
}

type Decoded = (BTreeMap<AuthorKey, TagRecord>, Vec<(String, AuthorKey)>);

/// Decode the persisted map. Also returns every persisted name that is not
/// already in lowercased form, paired with its key.
fn decode(value: Value) -> Decoded {
    let Value::Object(entries) = value else {
        tracing::warn!("stored tags are not an object; starting empty");
        return (BTreeMap::new(), Vec::new());
    };
    // An exact lowercase name beats its case variants; variants go in name order.
    let (exact, mut variants): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|(name, _)| AuthorKey::new(name).as_str() == name.as_str());
    variants.sort_by(|a, b| a.0.cmp(&b.0));

    let mut tags = BTreeMap::new();
    let mut stray = Vec::new();
    for (name, raw) in exact.into_iter().chain(variants) {
        let record = match serde_json::from_value::<TagRecord>(raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(author = %name, error = %e, "skipping malformed tag entry");
                continue;
            }
        };
        let key = AuthorKey::new(&name);
        if key.as_str() != name {
            stray.push((name, key.clone()));
        }
        if !record.is_empty() {
            tags.entry(key).or_insert(record);
        }
    }
    (tags, stray)
}
