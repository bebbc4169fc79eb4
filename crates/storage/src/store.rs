//! Backend-adapter capability: conditional writes, atomic batches,
//! ordered scans.

use crate::record::{KeyVersion, Record};
use async_trait::async_trait;
use bytes::Bytes;

/// One conditional operation inside a write batch.
///
/// Every variant translates to a single statement whose rows-affected
/// count decides success: a conditional op that matches zero rows aborts
/// the whole batch as a conflict. [`WriteOp::Upsert`] and
/// [`WriteOp::DeleteAny`] are unconditional and can never conflict.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert a new record at version 1; zero rows if the key exists.
    Insert { key: String, value: Bytes },
    /// Overwrite where the stored version equals `expect`; the stored
    /// version advances to `expect + 1`.
    Update {
        key: String,
        value: Bytes,
        expect: i64,
    },
    /// Write regardless of current state; the stored version resets
    /// to 1.
    Upsert { key: String, value: Bytes },
    /// Remove where the stored version equals `expect`.
    Delete { key: String, expect: i64 },
    /// Remove regardless of version; an absent key is a no-op.
    DeleteAny { key: String },
}

impl WriteOp {
    /// The key this operation targets.
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Insert { key, .. }
            | WriteOp::Update { key, .. }
            | WriteOp::Upsert { key, .. }
            | WriteOp::Delete { key, .. }
            | WriteOp::DeleteAny { key } => key,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A conditional operation matched zero rows; the batch rolled back.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Connection, I/O or any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Capability a storage backend must provide to the versioning engine.
///
/// Implementations must guarantee read-committed isolation and exact
/// rows-affected semantics per operation; the engine's correctness
/// depends on both.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one record. Reads reflect all writes committed before the
    /// read began.
    async fn fetch(
        &self,
        user_token: &str,
        store_id: &str,
        key: &str,
    ) -> Result<Option<Record>, StorageError>;

    /// Apply a batch in one transaction, all-or-nothing. If any
    /// conditional op affects zero rows the transaction is rolled back
    /// and [`StorageError::Conflict`] is returned; no partial state is
    /// ever visible.
    async fn apply(
        &self,
        user_token: &str,
        store_id: &str,
        ops: &[WriteOp],
    ) -> Result<(), StorageError>;

    /// Keys strictly greater than `after` within `(user_token,
    /// store_id)`, restricted to `prefix`, ascending, at most `limit`
    /// entries. The reserved [`GLOBAL_VERSION_KEY`] row is excluded so
    /// pagination tokens always advance over user-visible keys.
    ///
    /// [`GLOBAL_VERSION_KEY`]: crate::record::GLOBAL_VERSION_KEY
    async fn scan_keys(
        &self,
        user_token: &str,
        store_id: &str,
        prefix: &str,
        after: &str,
        limit: usize,
    ) -> Result<Vec<KeyVersion>, StorageError>;
}
