// SPDX-License-Identifier: PMPL-1.0-or-later
//! Database lifecycle and point operation tests

use std::time::Duration;

use tempfile::tempdir;
use verisim_kv::options::from_json;
use verisim_kv::{
    CursorOptions, Database, Datum, GetOptions, KvError, LifecycleError, OpenOptions, RedbEngine,
    Status, WriteOptions,
};

async fn open_memory() -> Database {
    let db: Database = Database::new().unwrap();
    db.open("memory", OpenOptions::default()).await.unwrap();
    db
}

#[tokio::test]
async fn test_put_get_round_trip() {
    let db = open_memory().await;

    db.put("hello", "world", WriteOptions::default()).await.unwrap();
    let value = db.get("hello", GetOptions::default()).await.unwrap();
    assert_eq!(value, Datum::Buffer(b"world".to_vec()));

    // Overwrite
    db.put("hello", "again", WriteOptions::sync()).await.unwrap();
    let value = db.get("hello", GetOptions::default()).await.unwrap();
    assert_eq!(value.as_bytes(), b"again");

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_binary_keys_and_values() {
    let db = open_memory().await;
    let key = vec![0u8, 0xff, 0x10];
    let value = vec![0xde, 0xad, 0xbe, 0xef];

    db.put(key.clone(), value.clone(), WriteOptions::default())
        .await
        .unwrap();
    let got = db.get(key, GetOptions::default()).await.unwrap();
    assert_eq!(got.into_bytes(), value);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let db = open_memory().await;

    db.put("k", "v", WriteOptions::default()).await.unwrap();
    db.delete("k", WriteOptions::default()).await.unwrap();

    let err = db.get("k", GetOptions::default()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().starts_with("NotFound"));

    // Deleting a missing key succeeds.
    db.delete("never-there", WriteOptions::default()).await.unwrap();
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_get_as_text() {
    let db = open_memory().await;
    db.put("greeting", "héllo", WriteOptions::default())
        .await
        .unwrap();

    let value = db.get("greeting", GetOptions::as_text()).await.unwrap();
    assert_eq!(value, Datum::Text("héllo".to_string()));

    let value = db.get("greeting", GetOptions::default()).await.unwrap();
    assert!(value.is_buffer());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_get_options_from_host_object() {
    let db = open_memory().await;
    db.put("k", "v", WriteOptions::default()).await.unwrap();

    let options: GetOptions = from_json(serde_json::json!({ "asBuffer": false })).unwrap();
    let value = db.get("k", options).await.unwrap();
    assert_eq!(value, Datum::Text("v".to_string()));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let db: Database = Database::new().unwrap();

    // Never opened.
    let err = db.close().await.unwrap_err();
    assert!(matches!(err, KvError::Lifecycle(LifecycleError::NotOpen)));
    let err = db.get("k", GetOptions::default()).await.unwrap_err();
    assert!(matches!(err, KvError::Lifecycle(LifecycleError::NotOpen)));

    db.open("memory", OpenOptions::default()).await.unwrap();
    let err = db.open("memory", OpenOptions::default()).await.unwrap_err();
    assert!(matches!(err, KvError::Lifecycle(LifecycleError::AlreadyOpen)));

    let first = db.close();
    let err = db.close().await.unwrap_err();
    assert!(matches!(err, KvError::Lifecycle(LifecycleError::Closing)));
    first.await.unwrap();

    // Closed again: operations fail, a second close fails.
    let err = db.put("k", "v", WriteOptions::default()).await.unwrap_err();
    assert!(matches!(err, KvError::Lifecycle(LifecycleError::NotOpen)));
    let err = db.close().await.unwrap_err();
    assert!(matches!(err, KvError::Lifecycle(LifecycleError::NotOpen)));
}

#[tokio::test]
async fn test_close_without_cursors_is_immediate() {
    let db = open_memory().await;
    tokio::time::timeout(Duration::from_secs(5), db.close())
        .await
        .expect("close should not wait")
        .unwrap();
    assert_eq!(db.status(), Status::Closed);
}

#[tokio::test]
async fn test_close_waits_for_open_cursors() {
    let db = open_memory().await;
    db.put("a", "1", WriteOptions::default()).await.unwrap();

    let first = db.cursor(CursorOptions::new()).unwrap();
    let second = db.cursor(CursorOptions::new()).unwrap();
    assert_eq!(db.open_cursors(), 2);

    let mut close = db.close();
    assert_eq!(db.status(), Status::Closing);

    // Still waiting: both cursors are live.
    let pending = tokio::time::timeout(Duration::from_millis(50), &mut close).await;
    assert!(pending.is_err());
    assert!(db.engine().is_some());

    first.end().await.unwrap();
    let pending = tokio::time::timeout(Duration::from_millis(50), &mut close).await;
    assert!(pending.is_err());

    // Cursors can still be read while the close is pending.
    let batch = second.advance().await.unwrap();
    assert_eq!(batch.keys(), vec![b"a".to_vec()]);

    second.end().await.unwrap();
    close.await.unwrap();
    assert_eq!(db.status(), Status::Closed);
    assert_eq!(db.open_cursors(), 0);
    assert!(db.engine().is_none());
}

#[tokio::test]
async fn test_end_cursors_releases_pending_close() {
    let db = open_memory().await;
    db.put("a", "1", WriteOptions::default()).await.unwrap();

    let idle = db.cursor(CursorOptions::new()).unwrap();
    let busy = db.cursor(CursorOptions::new()).unwrap();
    let advance = busy.advance();
    let close = db.close();

    assert_eq!(db.end_cursors(), 2);
    assert_eq!(db.end_cursors(), 0);

    // The in-flight advance still delivers before its cursor ends.
    let batch = advance.await.unwrap();
    assert_eq!(batch.keys(), vec![b"a".to_vec()]);
    close.await.unwrap();

    assert!(idle.is_ended() && busy.is_ended());
    let err = idle.advance().await.unwrap_err();
    assert!(matches!(err, KvError::Lifecycle(LifecycleError::CursorEnded)));
}

#[tokio::test]
async fn test_no_cursor_while_closing() {
    let db = open_memory().await;
    let cursor = db.cursor(CursorOptions::new()).unwrap();
    let close = db.close();

    let err = db.cursor(CursorOptions::new()).unwrap_err();
    assert!(matches!(err, KvError::Lifecycle(LifecycleError::Closing)));

    cursor.end().await.unwrap();
    close.await.unwrap();
}

#[tokio::test]
async fn test_resources_released_after_close() {
    let db = open_memory().await;
    assert!(db.resources().is_some());
    db.close().await.unwrap();
    assert!(db.resources().is_none());
}

#[tokio::test]
async fn test_memory_store_is_ephemeral() {
    let db = open_memory().await;
    db.put("k", "v", WriteOptions::default()).await.unwrap();
    db.close().await.unwrap();

    db.open("memory", OpenOptions::default()).await.unwrap();
    let err = db.get("k", GetOptions::default()).await.unwrap_err();
    assert!(err.is_not_found());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_redb_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("store");

    let db = Database::<RedbEngine>::new().unwrap();
    db.open(&location, OpenOptions::default()).await.unwrap();
    db.put("alpha", "1", WriteOptions::sync()).await.unwrap();
    db.put("beta", "2", WriteOptions::default()).await.unwrap();
    db.delete("beta", WriteOptions::default()).await.unwrap();
    db.close().await.unwrap();

    db.open(&location, OpenOptions::default()).await.unwrap();
    assert_eq!(
        db.get("alpha", GetOptions::default()).await.unwrap().as_bytes(),
        b"1"
    );
    assert!(db
        .get("beta", GetOptions::default())
        .await
        .unwrap_err()
        .is_not_found());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_open_can_be_retried() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("missing");

    let db = Database::<RedbEngine>::new().unwrap();
    let err = db
        .open(&location, OpenOptions::default().create_if_missing(false))
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::Open(ref msg) if msg.contains("does not exist")));
    assert_eq!(db.status(), Status::Closed);
    assert!(db.resources().is_none());

    db.open(&location, OpenOptions::default()).await.unwrap();
    assert_eq!(db.status(), Status::Open);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_error_if_exists() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("store");

    let db = Database::<RedbEngine>::new().unwrap();
    db.open(&location, OpenOptions::default()).await.unwrap();
    db.close().await.unwrap();

    let err = db
        .open(&location, OpenOptions::default().error_if_exists(true))
        .await
        .unwrap_err();
    assert!(matches!(err, KvError::Open(ref msg) if msg.contains("exists")));
    assert_eq!(db.status(), Status::Closed);
}

#[tokio::test]
async fn test_open_options_from_host_object() {
    let dir = tempdir().unwrap();
    let options: OpenOptions = from_json(serde_json::json!({
        "createIfMissing": true,
        "cacheSize": 1048576,
    }))
    .unwrap();

    let db = Database::<RedbEngine>::new().unwrap();
    db.open(dir.path().join("store"), options).await.unwrap();
    assert_eq!(db.resources().unwrap().cache.capacity(), 1 << 20);
    db.close().await.unwrap();
}
