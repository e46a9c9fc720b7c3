use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use usertag_core::{AuthorKey, MemoryBackend, TagPatch, TagStore, TAGS_STORAGE_KEY};

fn field() -> impl Strategy<Value = Option<Option<String>>> {
    prop_oneof![
        Just(None),
        Just(Some(None)),
        Just(Some(Some(String::new()))),
        "[a-z]{1,6}".prop_map(|s| Some(Some(s))),
    ]
}

fn patch() -> impl Strategy<Value = TagPatch> {
    (
        field(),
        field(),
        field(),
        proptest::option::of(any::<bool>()),
        proptest::option::of(-3i64..3),
    )
        .prop_map(|(tag, color, link, ignore, votes)| TagPatch {
            tag,
            color,
            link,
            ignore,
            votes,
        })
}

fn load(backend: Arc<MemoryBackend>) -> TagStore {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(TagStore::load(backend))
}

proptest! {
    #[test]
    fn empty_records_never_survive(patches in proptest::collection::vec(patch(), 1..12)) {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = load(backend.clone());
        let key = AuthorKey::new("subject");

        for p in &patches {
            store.upsert_fields(&key, p);

            match store.get(&key) {
                Some(record) => {
                    prop_assert!(!record.is_empty());
                    let persisted = backend
                        .value(TAGS_STORAGE_KEY)
                        .and_then(|v| v.get("subject").cloned());
                    prop_assert_eq!(persisted, Some(serde_json::to_value(record).unwrap()));
                }
                None => {
                    let persisted = backend
                        .value(TAGS_STORAGE_KEY)
                        .and_then(|v| v.get("subject").cloned());
                    prop_assert_eq!(persisted, None);
                }
            }
        }
    }
}

#[test]
fn mixed_case_entry_stays_deleted_after_reload() {
    let backend = Arc::new(MemoryBackend::with_value(
        TAGS_STORAGE_KEY,
        json!({"Alice": {"tag": "x"}}),
    ));
    let mut store = load(backend.clone());
    assert_eq!(
        backend.value(TAGS_STORAGE_KEY),
        Some(json!({"alice": {"tag": "x"}}))
    );

    store.remove(&AuthorKey::new("alice"));
    assert_eq!(backend.value(TAGS_STORAGE_KEY), Some(json!({})));
    assert!(load(backend).is_empty());
}

#[test]
fn mixed_case_entry_is_rewritten_in_place() {
    let backend = Arc::new(MemoryBackend::with_value(
        TAGS_STORAGE_KEY,
        json!({"Alice": {"tag": "x", "color": "red"}}),
    ));
    let mut store = load(backend.clone());
    store.upsert_fields(&AuthorKey::new("alice"), &TagPatch::clear_tag());
    assert!(store.is_empty());
    assert!(load(backend).is_empty());
}

#[test]
fn lowercase_name_wins_over_case_variants() {
    let backend = Arc::new(MemoryBackend::with_value(
        TAGS_STORAGE_KEY,
        json!({"ALICE": {"tag": "shout"}, "Alice": {"tag": "title"}, "alice": {"tag": "plain"}, "Bob": {"votes": 2}}),
    ));
    let store = load(backend.clone());
    assert_eq!(
        store.get(&AuthorKey::new("alice")).unwrap().tag.as_deref(),
        Some("plain")
    );
    assert_eq!(
        backend.value(TAGS_STORAGE_KEY),
        Some(json!({"alice": {"tag": "plain"}, "bob": {"votes": 2}}))
    );

    let backend = Arc::new(MemoryBackend::with_value(
        TAGS_STORAGE_KEY,
        json!({"aLICE": {"tag": "second"}, "Alice": {"tag": "first"}}),
    ));
    let store = load(backend);
    assert_eq!(
        store.get(&AuthorKey::new("alice")).unwrap().tag.as_deref(),
        Some("first")
    );
}
