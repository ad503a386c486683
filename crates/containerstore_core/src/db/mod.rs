//! SQLite backing-store bootstrap and schema entry points.
//!
//! # Responsibility
//! - Open one dedicated SQLite connection per store instance.
//! - Ensure the five container tables exist before any read or write.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - Schema DDL is idempotent; re-running it on a populated file is a no-op.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use migrations::ensure_schema;
pub use open::{open_db, open_db_in_memory};

/// Table names in the order a delete visits them.
///
/// Child tables come before `Containers` so the parent row goes last; files
/// created without `ON DELETE CASCADE` reject a parent delete while children
/// still reference it.
pub const CONTAINER_TABLES: [&str; 5] = [
    "Packages",
    "CustomVariables",
    "NextDestinations",
    "MovementHistory",
    "Containers",
];

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "container database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
