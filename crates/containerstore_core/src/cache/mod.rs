//! In-process caching used by the persistent store mode.
//!
//! # Responsibility
//! - Provide the bounded recency cache fronting the SQLite backing store.

pub mod recency;

pub use recency::{RecencyCache, DEFAULT_CACHE_CAPACITY};
