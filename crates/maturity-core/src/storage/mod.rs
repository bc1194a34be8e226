//! # Storage Backends
//!
//! Two interchangeable implementations of the repository traits:
//! - [`MemoryStore`]: process-local, for tests and embedding
//! - [`RedbStore`]: disk-backed, ACID, on redb

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;
