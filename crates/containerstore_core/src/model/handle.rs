//! Record handles: the compile-time ownership policy of a store.
//!
//! # Responsibility
//! - Abstract over how a store holds a [`Container`].
//! - Decide, by type, whether releasing a handle frees the record.
//!
//! # Invariants
//! - [`OwnedRecord`]: the store is the exclusive owner. Dropping the handle on
//!   eviction, removal, clear or teardown frees the record.
//! - [`SharedRecord`]: ownership is shared with an external party. The store
//!   only releases its own reference; a record is freed when the last holder
//!   lets go, never earlier.

use crate::model::container::Container;
use parking_lot::Mutex;
use std::sync::Arc;

/// Handle type a `ContainerStore` is instantiated with.
pub trait RecordHandle: Send + 'static {
    /// Wraps a record the store produced itself (backing-store load, deep copy).
    fn from_record(record: Container) -> Self;

    fn with_record<R>(&self, f: impl FnOnce(&Container) -> R) -> R;

    fn with_record_mut<R>(&mut self, f: impl FnOnce(&mut Container) -> R) -> R;

    /// Deep copy of the current record state.
    fn snapshot(&self) -> Container {
        self.with_record(Container::clone)
    }
}

/// Exclusively owned record.
pub type OwnedRecord = Box<Container>;

/// Record shared with an external owner.
pub type SharedRecord = Arc<Mutex<Container>>;

impl RecordHandle for Box<Container> {
    fn from_record(record: Container) -> Self {
        Box::new(record)
    }

    fn with_record<R>(&self, f: impl FnOnce(&Container) -> R) -> R {
        f(&**self)
    }

    fn with_record_mut<R>(&mut self, f: impl FnOnce(&mut Container) -> R) -> R {
        f(&mut **self)
    }
}

impl RecordHandle for Arc<Mutex<Container>> {
    fn from_record(record: Container) -> Self {
        Arc::new(Mutex::new(record))
    }

    fn with_record<R>(&self, f: impl FnOnce(&Container) -> R) -> R {
        f(&*self.lock())
    }

    fn with_record_mut<R>(&mut self, f: impl FnOnce(&mut Container) -> R) -> R {
        f(&mut *self.lock())
    }
}
