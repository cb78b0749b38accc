use super::*;

#[tokio::test]
async fn set_if_absent_grants_only_first_writer() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(30);

    assert!(store.set_if_absent("task:lock:t1", "alice", ttl).await.expect("first write"));
    assert!(!store.set_if_absent("task:lock:t1", "bob", ttl).await.expect("second write"));
    assert_eq!(
        store.get("task:lock:t1").await.expect("get"),
        Some("alice".to_string())
    );
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let store = MemoryStore::new();
    let ttl = Duration::from_millis(40);

    assert!(store.set_if_absent("task:lock:t1", "alice", ttl).await.expect("write"));
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(store.get("task:lock:t1").await.expect("get"), None);
    assert!(
        store.set_if_absent("task:lock:t1", "bob", ttl).await.expect("rewrite"),
        "expired key should be writable again"
    );
}

#[tokio::test]
async fn set_overwrites_existing_value() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(30);

    store.set("user:online:alice", "conn-1", ttl).await.expect("set");
    store.set("user:online:alice", "conn-2", ttl).await.expect("set");
    assert_eq!(
        store.get("user:online:alice").await.expect("get"),
        Some("conn-2".to_string())
    );
}

#[tokio::test]
async fn delete_removes_key() {
    let store = MemoryStore::new();
    store
        .set("user:online:alice", "conn-1", Duration::from_secs(30))
        .await
        .expect("set");
    store.delete("user:online:alice").await.expect("delete");
    assert_eq!(store.get("user:online:alice").await.expect("get"), None);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let store = MemoryStore::new();
    store.delete("user:online:missing").await.expect("delete");
}

#[tokio::test]
async fn connect_selects_memory_backend() {
    let store = connect("memory:").await.expect("connect");
    store.ping().await.expect("ping");
}

#[tokio::test]
async fn connect_rejects_unknown_scheme() {
    let err = connect("postgres://localhost").await.expect_err("should fail");
    assert!(matches!(err, StoreError::UnsupportedUrl(_)));
}
