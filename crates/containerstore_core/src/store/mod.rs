//! Keyed container store with in-memory and cache-aside persistent modes.
//!
//! # Responsibility
//! - Own record lifetime according to the handle type.
//! - Keep the recency cache and the SQLite backing store coherent.
//! - Report storage failures as advisory events instead of errors.
//!
//! # Invariants
//! - The mode is chosen once at construction and never changes.
//! - Both modes answer queries with the same predicate semantics.

mod config;
mod container_store;
mod memory;
mod mode;
mod persistent;
pub mod signals;

pub use config::StoreConfig;
pub use container_store::{BatchError, ContainerStore, RecordGuard};
pub use memory::InMemoryStore;
pub use mode::{ClearScope, RecordStore, StoreMode};
pub use persistent::CachedPersistentStore;
pub use signals::{StoreEvent, StoreSignals};
