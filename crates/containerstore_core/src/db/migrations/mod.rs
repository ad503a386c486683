//! Versioned layout of the container tables.
//!
//! The file's `PRAGMA user_version` records which [`SchemaStep`] ran last.
//! Opening a file runs the steps above that number in one transaction, so a
//! store never sees half of a layout change.
//!
//! Files written before the version was tracked report 0 but may already hold
//! the five tables, possibly without `ON DELETE CASCADE`. Every step uses
//! `IF NOT EXISTS`, which leaves those tables as they are; the repository
//! therefore deletes child rows itself instead of relying on the cascade.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// One change to the container table layout.
#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    summary: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    // Containers plus its four child tables keyed by container_id.
    SchemaStep {
        version: 1,
        summary: "container tables",
        sql: include_str!("0001_containers.sql"),
    },
    // Child-table container_id lookups, destination search and time filters.
    SchemaStep {
        version: 2,
        summary: "lookup indexes",
        sql: include_str!("0002_lookup_indexes.sql"),
    },
];

/// Highest layout version this build can read and write.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Brings the container tables of `conn` up to [`latest_version`].
///
/// Fails with [`DbError::UnsupportedSchemaVersion`] for a file written by a
/// newer build; such a file is left untouched.
pub fn ensure_schema(conn: &mut Connection) -> DbResult<()> {
    let on_disk = stored_version(conn)?;
    let latest = latest_version();

    if on_disk > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: on_disk,
            latest_supported: latest,
        });
    }
    if on_disk == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in SCHEMA_STEPS.iter().filter(|step| step.version > on_disk) {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        info!(
            "event=schema_step module=db status=ok version={} summary=\"{}\"",
            step.version, step.summary
        );
    }
    tx.commit()?;

    info!("event=schema_upgrade module=db status=ok from_version={on_disk} to_version={latest}");
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
