//! Versioning engine for the versioned storage service.
//!
//! Interprets per-item version fields into conditional storage
//! operations, joins the store-wide version guard into the same atomic
//! batch, and implements the snapshot-safe listing protocol. All
//! concurrency control is delegated to the transactional backend; the
//! engine itself is stateless between requests.

pub mod engine;

pub use engine::{KvEngine, MAX_PAGE_SIZE, MAX_PUT_ITEMS};
