//! Storage layer for the versioned storage service.
//!
//! Records are `{key, value, version, created_at, last_updated_at}`,
//! addressed by `(user_token, store_id, key)`. Backends implement the
//! [`RecordStore`] adapter trait; the in-memory backend lives here, the
//! PostgreSQL backend in the `vss-postgres` crate.

pub mod memory;
pub mod record;
pub mod store;

pub use memory::MemoryStore;
pub use record::{KeyVersion, Record, GLOBAL_VERSION_KEY, INITIAL_VERSION};
pub use store::{RecordStore, StorageError, WriteOp};
