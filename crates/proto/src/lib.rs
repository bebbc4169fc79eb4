//! Wire contract for the versioned storage service.
//!
//! The message structs are hand-written [`prost::Message`] derives that
//! match the published proto3 schema field-for-field (tags included), so
//! they are byte-compatible with generated clients without requiring a
//! protoc step at build time.

pub mod error;
mod wire;

pub use error::ApiError;
pub use wire::{
    DeleteObjectRequest, DeleteObjectResponse, ErrorCode, ErrorResponse, GetObjectRequest,
    GetObjectResponse, KeyValue, ListKeyVersionsRequest, ListKeyVersionsResponse,
    PutObjectRequest, PutObjectResponse,
};
