//! The engine: request validation, conditional-op selection, the
//! global-version guard and paginated listing.

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use vss_proto::{
    ApiError, DeleteObjectRequest, DeleteObjectResponse, GetObjectRequest, GetObjectResponse,
    KeyValue, ListKeyVersionsRequest, ListKeyVersionsResponse, PutObjectRequest, PutObjectResponse,
};
use vss_storage::{RecordStore, StorageError, WriteOp, GLOBAL_VERSION_KEY};

/// Hard cap on `page_size`; requests asking for more are clamped.
pub const MAX_PAGE_SIZE: i32 = 100;

/// Maximum combined number of transaction and delete items per put.
pub const MAX_PUT_ITEMS: usize = 1024;

/// Widths enforced by the backing schema.
const MAX_STORE_ID_LENGTH: usize = 120;
const MAX_KEY_LENGTH: usize = 600;

/// Stateless per-request engine over a pluggable [`RecordStore`].
///
/// Collaborators are injected at construction; nothing here holds a
/// connection or any other state across requests.
pub struct KvEngine {
    store: Arc<dyn RecordStore>,
}

impl KvEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Read a single record.
    ///
    /// A miss on the reserved global-version key is answered with a
    /// synthetic `version = 0` record so clients can always read the
    /// store version; any other miss is `NoSuchKey`.
    pub async fn get(
        &self,
        user_token: &str,
        request: GetObjectRequest,
    ) -> Result<GetObjectResponse, ApiError> {
        validate_store_id(&request.store_id)?;

        let record = self
            .store
            .fetch(user_token, &request.store_id, &request.key)
            .await
            .map_err(storage_to_api)?;

        match record {
            Some(record) => Ok(GetObjectResponse {
                value: Some(KeyValue {
                    key: record.key,
                    version: record.version,
                    value: record.value,
                }),
            }),
            None if request.key == GLOBAL_VERSION_KEY => Ok(GetObjectResponse {
                value: Some(KeyValue {
                    key: GLOBAL_VERSION_KEY.to_string(),
                    version: 0,
                    value: Bytes::new(),
                }),
            }),
            None => Err(ApiError::NoSuchKey("requested key not found".to_string())),
        }
    }

    /// Execute all writes and deletes of the request in one atomic
    /// transaction.
    ///
    /// When `global_version` is present, a conditional write against the
    /// reserved key joins the batch, so a store-level conflict and a
    /// key-level conflict abort each other symmetrically.
    pub async fn put(
        &self,
        user_token: &str,
        request: PutObjectRequest,
    ) -> Result<PutObjectResponse, ApiError> {
        validate_store_id(&request.store_id)?;

        let total = request.transaction_items.len() + request.delete_items.len();
        if total > MAX_PUT_ITEMS {
            return Err(ApiError::InvalidRequest(format!(
                "put request carries {} items, limit is {}",
                total, MAX_PUT_ITEMS
            )));
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(total);
        for item in request
            .transaction_items
            .iter()
            .chain(request.delete_items.iter())
        {
            validate_item_key(&item.key)?;
            if !seen.insert(item.key.as_str()) {
                return Err(ApiError::InvalidRequest(format!(
                    "duplicate key {} in put request",
                    item.key
                )));
            }
        }

        let mut ops = Vec::with_capacity(total + 1);
        for item in &request.transaction_items {
            ops.push(put_op(item)?);
        }
        if let Some(global_version) = request.global_version {
            ops.push(global_version_op(global_version)?);
        }
        for item in &request.delete_items {
            ops.push(delete_op(item)?);
        }

        match self.store.apply(user_token, &request.store_id, &ops).await {
            Ok(()) => Ok(PutObjectResponse {}),
            Err(StorageError::Conflict(msg)) => {
                // An ordinary outcome of optimistic concurrency, not a fault.
                tracing::debug!(store_id = %request.store_id, "put conflict: {}", msg);
                Err(ApiError::Conflict(msg))
            }
            Err(err) => Err(storage_to_api(err)),
        }
    }

    /// Delete a single item, best-effort.
    ///
    /// The version condition is applied, but a zero-row outcome (absent
    /// key or stale version) is not surfaced: the operation is
    /// idempotent by contract. Strict deletes go through
    /// [`PutObjectRequest::delete_items`].
    pub async fn delete(
        &self,
        user_token: &str,
        request: DeleteObjectRequest,
    ) -> Result<DeleteObjectResponse, ApiError> {
        validate_store_id(&request.store_id)?;
        let key_value = request.key_value.ok_or_else(|| {
            ApiError::InvalidRequest("key_value is required in a delete request".to_string())
        })?;
        validate_item_key(&key_value.key)?;
        let op = delete_op(&key_value)?;

        match self
            .store
            .apply(user_token, &request.store_id, std::slice::from_ref(&op))
            .await
        {
            Ok(()) | Err(StorageError::Conflict(_)) => Ok(DeleteObjectResponse {}),
            Err(err) => Err(storage_to_api(err)),
        }
    }

    /// Page through `(key, version)` pairs in ascending key order.
    ///
    /// The store-wide version is read *before* the first page's scan, so
    /// the value attached to the response can only under-report the
    /// version at which the returned keys existed. A client that applies
    /// it after consuming every page can never end up ahead of its own
    /// key state.
    pub async fn list_key_versions(
        &self,
        user_token: &str,
        request: ListKeyVersionsRequest,
    ) -> Result<ListKeyVersionsResponse, ApiError> {
        validate_store_id(&request.store_id)?;

        let limit = match request.page_size {
            None | Some(0) => MAX_PAGE_SIZE,
            Some(n) if n < 0 => {
                return Err(ApiError::InvalidRequest(format!(
                    "page_size must not be negative, got {}",
                    n
                )))
            }
            Some(n) => n.min(MAX_PAGE_SIZE),
        } as usize;

        let global_version = match request.page_token {
            // First page only, and strictly before the key scan.
            None => Some(
                self.store
                    .fetch(user_token, &request.store_id, GLOBAL_VERSION_KEY)
                    .await
                    .map_err(storage_to_api)?
                    .map(|record| record.version)
                    .unwrap_or(0),
            ),
            Some(_) => None,
        };

        let prefix = request.key_prefix.as_deref().unwrap_or("");
        let after = request.page_token.as_deref().unwrap_or("");
        let page = self
            .store
            .scan_keys(user_token, &request.store_id, prefix, after, limit)
            .await
            .map_err(storage_to_api)?;

        let next_page_token = page.last().map(|kv| kv.key.clone()).unwrap_or_default();
        let key_versions = page
            .into_iter()
            .map(|kv| KeyValue {
                key: kv.key,
                version: kv.version,
                value: Bytes::new(),
            })
            .collect();

        Ok(ListKeyVersionsResponse {
            key_versions,
            next_page_token: Some(next_page_token),
            global_version,
        })
    }
}

/// Select the conditional write for a transaction item.
fn put_op(item: &KeyValue) -> Result<WriteOp, ApiError> {
    match item.version {
        -1 => Ok(WriteOp::Upsert {
            key: item.key.clone(),
            value: item.value.clone(),
        }),
        0 => Ok(WriteOp::Insert {
            key: item.key.clone(),
            value: item.value.clone(),
        }),
        expect if expect > 0 => Ok(WriteOp::Update {
            key: item.key.clone(),
            value: item.value.clone(),
            expect,
        }),
        other => Err(ApiError::InvalidRequest(format!(
            "unsupported version {} for key {}",
            other, item.key
        ))),
    }
}

/// Select the conditional delete for a delete item.
fn delete_op(item: &KeyValue) -> Result<WriteOp, ApiError> {
    match item.version {
        -1 => Ok(WriteOp::DeleteAny {
            key: item.key.clone(),
        }),
        expect if expect >= 0 => Ok(WriteOp::Delete {
            key: item.key.clone(),
            expect,
        }),
        other => Err(ApiError::InvalidRequest(format!(
            "unsupported version {} for delete of key {}",
            other, item.key
        ))),
    }
}

/// The guard write: same rule as a user item with the supplied version,
/// so the very first use (`0`) is an insert-if-absent and every later
/// use is an update-if-matches.
fn global_version_op(global_version: i64) -> Result<WriteOp, ApiError> {
    match global_version {
        0 => Ok(WriteOp::Insert {
            key: GLOBAL_VERSION_KEY.to_string(),
            value: Bytes::new(),
        }),
        expect if expect > 0 => Ok(WriteOp::Update {
            key: GLOBAL_VERSION_KEY.to_string(),
            value: Bytes::new(),
            expect,
        }),
        other => Err(ApiError::InvalidRequest(format!(
            "global_version must not be negative, got {}",
            other
        ))),
    }
}

fn validate_store_id(store_id: &str) -> Result<(), ApiError> {
    if store_id.is_empty() {
        return Err(ApiError::InvalidRequest(
            "store_id must not be empty".to_string(),
        ));
    }
    if store_id.len() > MAX_STORE_ID_LENGTH {
        return Err(ApiError::InvalidRequest(format!(
            "store_id exceeds {} characters",
            MAX_STORE_ID_LENGTH
        )));
    }
    Ok(())
}

fn validate_item_key(key: &str) -> Result<(), ApiError> {
    if key.is_empty() {
        return Err(ApiError::InvalidRequest(
            "item key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ApiError::InvalidRequest(format!(
            "item key exceeds {} characters",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

fn storage_to_api(err: StorageError) -> ApiError {
    match err {
        StorageError::Conflict(msg) => ApiError::Conflict(msg),
        StorageError::Backend(msg) => ApiError::Internal(msg),
    }
}
