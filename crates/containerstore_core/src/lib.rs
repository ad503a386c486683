//! Core of the container record store.
//! Records live in memory or in a recency cache written through to SQLite.

pub mod cache;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod store;

pub use cache::{RecencyCache, DEFAULT_CACHE_CAPACITY};
pub use db::{DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::container::{
    Container, ContainerId, ContainerSize, CustomVariables, HaulerType, Package,
};
pub use model::handle::{OwnedRecord, RecordHandle, SharedRecord};
pub use query::{Comparison, InvalidCondition, RecordFilter, TimeField};
pub use repo::container_repo::{
    ContainerRepository, RepoError, RepoResult, SqliteContainerRepository, TableFailure,
};
pub use store::{
    BatchError, ClearScope, ContainerStore, RecordGuard, StoreConfig, StoreEvent, StoreMode,
    StoreSignals,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
