//! In-memory backend: a single ordered map behind an async mutex.
//!
//! Batches are checked in full against committed state before anything
//! mutates, which gives the same all-or-nothing outcome as a rolled-back
//! SQL transaction. Suitable for tests and single-process deployments.

use crate::record::{utc_today, KeyVersion, Record, GLOBAL_VERSION_KEY, INITIAL_VERSION};
use crate::store::{RecordStore, StorageError, WriteOp};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::Mutex;

/// `(user_token, store_id, key)`, the primary key. Tuple ordering gives
/// an ascending key scan within each `(user, store)` slice for free.
type RecordKey = (String, String, String);

type RecordMap = BTreeMap<RecordKey, Record>;

/// In-memory [`RecordStore`].
pub struct MemoryStore {
    records: Mutex<RecordMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn record_key(user_token: &str, store_id: &str, key: &str) -> RecordKey {
    (user_token.to_string(), store_id.to_string(), key.to_string())
}

/// Check one op's precondition against committed state.
fn check(records: &RecordMap, user_token: &str, store_id: &str, op: &WriteOp) -> Result<(), StorageError> {
    let stored = records.get(&record_key(user_token, store_id, op.key()));
    match op {
        WriteOp::Upsert { .. } | WriteOp::DeleteAny { .. } => Ok(()),
        WriteOp::Insert { key, .. } => match stored {
            None => Ok(()),
            Some(_) => Err(StorageError::Conflict(format!(
                "key {} already exists for conditional insert",
                key
            ))),
        },
        WriteOp::Update { key, expect, .. } | WriteOp::Delete { key, expect } => match stored {
            Some(record) if record.version == *expect => Ok(()),
            Some(record) => Err(StorageError::Conflict(format!(
                "version mismatch for key {}: expected {}, stored {}",
                key, expect, record.version
            ))),
            None => Err(StorageError::Conflict(format!(
                "key {} does not exist for conditional write",
                key
            ))),
        },
    }
}

/// Apply one pre-checked op. Panics are impossible here because every
/// conditional variant was validated against the same (still locked)
/// map.
fn apply_one(records: &mut RecordMap, user_token: &str, store_id: &str, op: &WriteOp) {
    let now = utc_today();
    match op {
        WriteOp::Insert { key, value } => {
            records.insert(
                record_key(user_token, store_id, key),
                Record {
                    key: key.clone(),
                    value: value.clone(),
                    version: INITIAL_VERSION,
                    created_at: now,
                    last_updated_at: now,
                },
            );
        }
        WriteOp::Update { key, value, expect } => {
            if let Some(record) = records.get_mut(&record_key(user_token, store_id, key)) {
                record.value = value.clone();
                record.version = expect + 1;
                record.last_updated_at = now;
            }
        }
        WriteOp::Upsert { key, value } => {
            records
                .entry(record_key(user_token, store_id, key))
                .and_modify(|record| {
                    record.value = value.clone();
                    record.version = INITIAL_VERSION;
                    record.last_updated_at = now;
                })
                .or_insert_with(|| Record {
                    key: key.clone(),
                    value: value.clone(),
                    version: INITIAL_VERSION,
                    created_at: now,
                    last_updated_at: now,
                });
        }
        WriteOp::Delete { key, .. } | WriteOp::DeleteAny { key } => {
            records.remove(&record_key(user_token, store_id, key));
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(
        &self,
        user_token: &str,
        store_id: &str,
        key: &str,
    ) -> Result<Option<Record>, StorageError> {
        let records = self.records.lock().await;
        Ok(records.get(&record_key(user_token, store_id, key)).cloned())
    }

    async fn apply(
        &self,
        user_token: &str,
        store_id: &str,
        ops: &[WriteOp],
    ) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;

        // Validate everything first: a conflict must leave the map
        // untouched, like a rolled-back transaction.
        for op in ops {
            check(&records, user_token, store_id, op)?;
        }
        for op in ops {
            apply_one(&mut records, user_token, store_id, op);
        }
        Ok(())
    }

    async fn scan_keys(
        &self,
        user_token: &str,
        store_id: &str,
        prefix: &str,
        after: &str,
        limit: usize,
    ) -> Result<Vec<KeyVersion>, StorageError> {
        let records = self.records.lock().await;
        let lower = record_key(user_token, store_id, after);
        let page = records
            .range((Bound::Excluded(lower), Bound::Unbounded))
            .take_while(|((user, store, _), _)| user == user_token && store == store_id)
            .filter(|((_, _, key), _)| key.starts_with(prefix) && key != GLOBAL_VERSION_KEY)
            .take(limit)
            .map(|((_, _, key), record)| KeyVersion {
                key: key.clone(),
                version: record.version,
            })
            .collect();
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn insert(key: &str, value: &str) -> WriteOp {
        WriteOp::Insert {
            key: key.to_string(),
            value: Bytes::from(value.to_string()),
        }
    }

    fn update(key: &str, value: &str, expect: i64) -> WriteOp {
        WriteOp::Update {
            key: key.to_string(),
            value: Bytes::from(value.to_string()),
            expect,
        }
    }

    #[tokio::test]
    async fn test_insert_then_fetch() {
        let store = MemoryStore::new();
        store.apply("u", "s", &[insert("k1", "v1")]).await.unwrap();

        let record = store.fetch("u", "s", "k1").await.unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.value, Bytes::from("v1"));
        assert_eq!(record.created_at, record.last_updated_at);
    }

    #[tokio::test]
    async fn test_insert_conflicts_on_existing_key() {
        let store = MemoryStore::new();
        store.apply("u", "s", &[insert("k1", "v1")]).await.unwrap();

        let result = store.apply("u", "s", &[insert("k1", "v2")]).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        let record = store.fetch("u", "s", "k1").await.unwrap().unwrap();
        assert_eq!(record.value, Bytes::from("v1"));
    }

    #[tokio::test]
    async fn test_update_advances_version_by_one() {
        let store = MemoryStore::new();
        store.apply("u", "s", &[insert("k1", "v1")]).await.unwrap();
        store
            .apply("u", "s", &[update("k1", "v2", 1)])
            .await
            .unwrap();
        store
            .apply("u", "s", &[update("k1", "v3", 2)])
            .await
            .unwrap();

        let record = store.fetch("u", "s", "k1").await.unwrap().unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(record.value, Bytes::from("v3"));
    }

    #[tokio::test]
    async fn test_update_conflicts_on_stale_version() {
        let store = MemoryStore::new();
        store.apply("u", "s", &[insert("k1", "v1")]).await.unwrap();

        let result = store.apply("u", "s", &[update("k1", "v2", 7)]).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_conflicts_on_missing_key() {
        let store = MemoryStore::new();
        let result = store.apply("u", "s", &[update("ghost", "v", 1)]).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_upsert_resets_version() {
        let store = MemoryStore::new();
        store.apply("u", "s", &[insert("k1", "v1")]).await.unwrap();
        store
            .apply("u", "s", &[update("k1", "v2", 1)])
            .await
            .unwrap();

        store
            .apply(
                "u",
                "s",
                &[WriteOp::Upsert {
                    key: "k1".to_string(),
                    value: Bytes::from("v3"),
                }],
            )
            .await
            .unwrap();

        let record = store.fetch("u", "s", "k1").await.unwrap().unwrap();
        assert_eq!(record.version, 1, "upsert resets the stored version");
        assert_eq!(record.value, Bytes::from("v3"));
    }

    #[tokio::test]
    async fn test_conditional_delete() {
        let store = MemoryStore::new();
        store.apply("u", "s", &[insert("k1", "v1")]).await.unwrap();

        let stale = store
            .apply(
                "u",
                "s",
                &[WriteOp::Delete {
                    key: "k1".to_string(),
                    expect: 9,
                }],
            )
            .await;
        assert!(matches!(stale, Err(StorageError::Conflict(_))));

        store
            .apply(
                "u",
                "s",
                &[WriteOp::Delete {
                    key: "k1".to_string(),
                    expect: 1,
                }],
            )
            .await
            .unwrap();
        assert!(store.fetch("u", "s", "k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unconditional_delete_of_absent_key_succeeds() {
        let store = MemoryStore::new();
        store
            .apply(
                "u",
                "s",
                &[WriteOp::DeleteAny {
                    key: "ghost".to_string(),
                }],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_partial_state() {
        let store = MemoryStore::new();
        store.apply("u", "s", &[insert("k1", "v1")]).await.unwrap();

        // k2 insert would succeed; the stale k1 update must drag it down.
        let result = store
            .apply("u", "s", &[insert("k2", "v"), update("k1", "x", 5)])
            .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        assert!(store.fetch("u", "s", "k2").await.unwrap().is_none());
        let record = store.fetch("u", "s", "k1").await.unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.value, Bytes::from("v1"));
    }

    #[tokio::test]
    async fn test_scan_orders_seeks_and_limits() {
        let store = MemoryStore::new();
        for key in ["b", "a", "d", "c", "e"] {
            store.apply("u", "s", &[insert(key, "v")]).await.unwrap();
        }

        let page = store.scan_keys("u", "s", "", "", 3).await.unwrap();
        let keys: Vec<&str> = page.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        let rest = store.scan_keys("u", "s", "", "c", 10).await.unwrap();
        let keys: Vec<&str> = rest.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["d", "e"]);
    }

    #[tokio::test]
    async fn test_scan_applies_prefix() {
        let store = MemoryStore::new();
        for key in ["user:1", "user:2", "order:1"] {
            store.apply("u", "s", &[insert(key, "v")]).await.unwrap();
        }

        let page = store.scan_keys("u", "s", "user:", "", 10).await.unwrap();
        let keys: Vec<&str> = page.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["user:1", "user:2"]);
    }

    #[tokio::test]
    async fn test_scan_hides_reserved_key() {
        let store = MemoryStore::new();
        store.apply("u", "s", &[insert("k1", "v")]).await.unwrap();
        store
            .apply("u", "s", &[insert(GLOBAL_VERSION_KEY, "")])
            .await
            .unwrap();

        let page = store.scan_keys("u", "s", "", "", 10).await.unwrap();
        let keys: Vec<&str> = page.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["k1"]);

        // Still addressable directly.
        assert!(store
            .fetch("u", "s", GLOBAL_VERSION_KEY)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_tenants_and_stores_are_isolated() {
        let store = MemoryStore::new();
        store.apply("u1", "s", &[insert("k", "u1v")]).await.unwrap();
        store.apply("u2", "s", &[insert("k", "u2v")]).await.unwrap();
        store
            .apply("u1", "other", &[insert("k2", "v")])
            .await
            .unwrap();

        let record = store.fetch("u2", "s", "k").await.unwrap().unwrap();
        assert_eq!(record.value, Bytes::from("u2v"));

        let page = store.scan_keys("u1", "s", "", "", 10).await.unwrap();
        let keys: Vec<&str> = page.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["k"]);

        assert!(store.scan_keys("u2", "other", "", "", 10).await.unwrap().is_empty());
    }
}
