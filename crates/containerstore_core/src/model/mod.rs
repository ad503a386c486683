//! Container domain model.
//!
//! # Responsibility
//! - Define the container record and its opaque sub-items.
//! - Define record handles, which fix a store's ownership policy by type.
//!
//! # Invariants
//! - A record's store key is fixed when it is added; renaming `id` later does
//!   not move the record.

pub mod container;
pub mod handle;
