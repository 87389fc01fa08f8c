use std::sync::atomic::Ordering;

use tempfile::TempDir;

use crate::engine::BlobEngine;
use crate::error::StorageError;
use crate::sled::SledStore;

#[test]
fn sled_store_put_then_get() {
    let tmp_dir = TempDir::new().unwrap();
    let store = SledStore::open(tmp_dir.path()).unwrap();

    let id = store.put("hello".to_string()).unwrap();
    let other = store.put("hello".to_string()).unwrap();
    assert!(id >= 1);
    assert_ne!(id, other);
    assert_eq!(store.get(id).unwrap(), Some("hello".to_string()));
    assert_eq!(store.get(id + 1_000_000).unwrap(), None);
}

#[test]
fn sled_store_survives_reopen() {
    let tmp_dir = TempDir::new().unwrap();
    let id = {
        let store = SledStore::open(tmp_dir.path()).unwrap();
        store.put("durable".to_string()).unwrap()
    };

    let store = SledStore::open(tmp_dir.path()).unwrap();
    assert_eq!(store.get(id).unwrap(), Some("durable".to_string()));
    assert_ne!(store.put("next".to_string()).unwrap(), id);
}

#[test]
fn sled_store_rejects_oversized_value() {
    let tmp_dir = TempDir::new().unwrap();
    let store = SledStore::with_limit(tmp_dir.path(), 4).unwrap();

    assert!(matches!(
        store.put("too long".to_string()),
        Err(StorageError::ValueTooLarge { len: 8, max: 4 })
    ));
    assert_eq!(store.db.len(), 0);
}

#[test]
fn sled_store_failed_flush_hides_entry() {
    let tmp_dir = TempDir::new().unwrap();
    let store = SledStore::open(tmp_dir.path()).unwrap();

    store.fail_flush.store(true, Ordering::SeqCst);
    assert!(matches!(
        store.put("lost".to_string()),
        Err(StorageError::Io(_))
    ));
    assert_eq!(store.db.len(), 0);
    assert_eq!(store.get(1).unwrap(), None);

    store.fail_flush.store(false, Ordering::SeqCst);
    let id = store.put("kept".to_string()).unwrap();
    assert_eq!(store.get(id).unwrap(), Some("kept".to_string()));
    assert_eq!(store.db.len(), 1);
}
