//! Request/response messages, proto3-compatible.

/// A key with its per-key version and (for put/get) its value bytes.
///
/// `version` drives conditional writes: `0` means insert-if-absent,
/// a positive value means update-if-stored-version-matches, and `-1`
/// skips the version check entirely. List responses reuse this type
/// with `value` unset.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub version: i64,
    /// Opaque value bytes; the server never parses them. Clients are
    /// expected to encrypt sensitive contents before upload.
    #[prost(bytes = "bytes", tag = "3")]
    pub value: ::prost::bytes::Bytes,
}

/// Fetch a single key within a store.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetObjectRequest {
    /// Keyspace label; all operations are scoped to one `store_id`.
    #[prost(string, tag = "1")]
    pub store_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub key: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetObjectResponse {
    #[prost(message, optional, tag = "2")]
    pub value: ::core::option::Option<KeyValue>,
}

/// Write (and optionally delete) a batch of items in one atomic
/// transaction.
///
/// If `global_version` is set, the write additionally requires the
/// store-wide version to match; success advances it by one. All items in
/// a single request must have distinct keys.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutObjectRequest {
    #[prost(string, tag = "1")]
    pub store_id: ::prost::alloc::string::String,
    #[prost(int64, optional, tag = "2")]
    pub global_version: ::core::option::Option<i64>,
    #[prost(message, repeated, tag = "3")]
    pub transaction_items: ::prost::alloc::vec::Vec<KeyValue>,
    #[prost(message, repeated, tag = "4")]
    pub delete_items: ::prost::alloc::vec::Vec<KeyValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutObjectResponse {}

/// Delete a single item, best-effort.
///
/// The version in `key_value` is checked like a batched delete, but a
/// miss (absent key or stale version) is not an error: the operation is
/// idempotent. Use `PutObjectRequest.delete_items` for strict checks.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteObjectRequest {
    #[prost(string, tag = "1")]
    pub store_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub key_value: ::core::option::Option<KeyValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteObjectResponse {}

/// Page through the `(key, version)` pairs of a store in ascending key
/// order.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListKeyVersionsRequest {
    #[prost(string, tag = "1")]
    pub store_id: ::prost::alloc::string::String,
    /// When non-empty, restricts results to keys starting with this
    /// prefix.
    #[prost(string, optional, tag = "2")]
    pub key_prefix: ::core::option::Option<::prost::alloc::string::String>,
    /// Upper bound on results per page; the server clamps it further.
    #[prost(int32, optional, tag = "3")]
    pub page_size: ::core::option::Option<i32>,
    /// Omit for the first page; afterwards echo back the previous
    /// response's `next_page_token`.
    #[prost(string, optional, tag = "4")]
    pub page_token: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListKeyVersionsResponse {
    /// `value` is never set on these entries.
    #[prost(message, repeated, tag = "1")]
    pub key_versions: ::prost::alloc::vec::Vec<KeyValue>,
    /// Empty string means pagination is complete. A non-empty token does
    /// not imply more data exists; keep paging until a page comes back
    /// empty.
    #[prost(string, optional, tag = "2")]
    pub next_page_token: ::core::option::Option<::prost::alloc::string::String>,
    /// Store-wide version, set on the first page only and read *before*
    /// any keys are scanned. Apply it locally only after consuming every
    /// page.
    #[prost(int64, optional, tag = "3")]
    pub global_version: ::core::option::Option<i64>,
}

/// Body returned alongside any non-2xx HTTP status.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub error_code: i32,
    /// Human-readable description; not meant for programmatic use.
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

/// Machine-readable failure classes, see [`ErrorResponse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorCode {
    /// Default protobuf value; never produced by the server.
    Unknown = 0,
    /// A conditional write or delete matched zero rows: the client's view
    /// is stale. Re-read and retry.
    Conflict = 1,
    /// Undecodable payload, missing required field, or illegal argument.
    InvalidRequest = 2,
    /// Server-side fault; safe to retry with exponential backoff.
    Internal = 3,
    /// `getObject` miss for a non-reserved key.
    NoSuchKey = 4,
    /// Authentication or authorization failure.
    Auth = 5,
}
