//! Repository layer over the SQLite backing store.
//!
//! # Responsibility
//! - Define the data-access contract the persistent store mode relies on.
//! - Keep SQL text out of the store and cache code.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`InvalidData`,
//!   `CascadeIncomplete`) in addition to DB transport errors.

pub mod container_repo;
