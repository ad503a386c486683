//! Storage-mode contract behind `ContainerStore`.
//!
//! # Responsibility
//! - Define the operations both storage modes provide.
//!
//! # Invariants
//! - Implementations are not synchronized; the owning `ContainerStore`
//!   serializes every call through its mutex.
//! - Missing keys are a normal outcome (`None` / `false`), never an error.
//! - Backing-store failures are reported through `StoreSignals`, never
//!   returned or raised.

use crate::model::container::Container;
use crate::model::handle::RecordHandle;
use crate::query::RecordFilter;

/// Storage mode fixed at store construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Unbounded ordered mapping; nothing survives the process.
    InMemory,
    /// Recency cache in front of a SQLite file, written through on every add.
    Persistent,
}

impl StoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InMemory => "memory",
            Self::Persistent => "persistent",
        }
    }
}

/// How much state `clear` discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Forget resident records only (the in-memory map or the cache).
    Resident,
    /// Also delete every persisted row.
    Persisted,
}

/// Operations shared by the in-memory and the cache-aside mode.
pub trait RecordStore<H: RecordHandle>: Send {
    fn mode(&self) -> StoreMode;

    /// Stores `handle` under `key`, replacing (and releasing) any prior handle.
    fn insert(&mut self, key: String, handle: H);

    /// Live access to the record under `key`, hydrating it if needed.
    fn get(&mut self, key: &str) -> Option<&mut H>;

    fn contains(&mut self, key: &str) -> bool;

    /// Writes the resident record under `key` through to durable storage.
    fn persist(&mut self, key: &str);

    /// Removes `key` everywhere and hands back the resident handle, if any.
    fn remove(&mut self, key: &str) -> Option<H>;

    /// Every key the mode knows about, hydrated or not.
    fn keys(&mut self) -> Vec<String>;

    fn len(&mut self) -> usize;

    /// Snapshots of every known record.
    fn all_records(&mut self) -> Vec<(String, Container)>;

    /// Snapshots of the records currently held in memory.
    fn resident_records(&self) -> Vec<(String, Container)>;

    fn clear(&mut self, scope: ClearScope);

    fn matching_keys(&mut self, filter: &RecordFilter) -> Vec<String>;

    fn count_matching(&mut self, filter: &RecordFilter) -> usize;
}
