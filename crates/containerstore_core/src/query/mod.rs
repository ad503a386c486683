//! Condition-based selection over container records.
//!
//! # Responsibility
//! - Own the comparison semantics used by query, dequeue and count.
//!
//! # Invariants
//! - In-memory and persistent modes evaluate filters through the same code.

pub mod condition;

pub use condition::{Comparison, InvalidCondition, RecordFilter, TimeField};
