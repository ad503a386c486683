//! Container repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist one container across the five container tables.
//! - Provide the key, count and predicate lookups the persistent store needs.
//!
//! # Invariants
//! - `save_container` is one transaction: either every table write lands or
//!   none does. Each save replaces the container's auxiliary rows.
//! - `load_container` never returns a partially hydrated container.
//! - `delete_container` / `clear_all` attempt every table even after a
//!   failure and report the failed tables together.
//! - `NaN` timestamps are stored as `NULL` and read back as `NaN`.

use crate::db::{DbError, CONTAINER_TABLES};
use crate::model::container::{Container, ContainerSize, CustomVariables, HaulerType, Package};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// One table a best-effort delete could not clear.
#[derive(Debug)]
pub struct TableFailure {
    pub table: &'static str,
    pub error: DbError,
}

impl Display for TableFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.table, self.error)
    }
}

/// Repository error for container persistence and lookups.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
    /// Best-effort delete finished with some tables left untouched.
    CascadeIncomplete {
        key: Option<String>,
        failures: Vec<TableFailure>,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted container data: {message}"),
            Self::CascadeIncomplete { key, failures } => {
                match key {
                    Some(key) => write!(f, "failed to delete container `{key}` from")?,
                    None => write!(f, "failed to clear")?,
                }
                for (index, failure) in failures.iter().enumerate() {
                    let separator = if index == 0 { " " } else { "; " };
                    write!(f, "{separator}{failure}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::CascadeIncomplete { failures, .. } => failures
                .first()
                .map(|failure| &failure.error as &(dyn Error + 'static)),
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Timestamps of one persisted container, read without hydrating it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerTimes {
    pub id: String,
    pub added_time: f64,
    pub leaving_time: f64,
}

/// Repository interface for the container backing store.
pub trait ContainerRepository {
    /// Writes `container` under `key` as one atomic unit.
    fn save_container(&mut self, key: &str, container: &Container) -> RepoResult<()>;
    /// Hydrates the container stored under `key`, if any.
    fn load_container(&self, key: &str) -> RepoResult<Option<Container>>;
    /// Deletes every auxiliary row for `key`, then the main row.
    fn delete_container(&self, key: &str) -> RepoResult<()>;
    /// Deletes every row of every container table.
    fn clear_all(&self) -> RepoResult<()>;
    fn container_exists(&self, key: &str) -> RepoResult<bool>;
    fn list_container_ids(&self) -> RepoResult<Vec<String>>;
    fn count_containers(&self) -> RepoResult<usize>;
    fn container_times(&self) -> RepoResult<Vec<ContainerTimes>>;
    fn ids_with_destination(&self, destination: &str) -> RepoResult<Vec<String>>;
    fn count_with_destination(&self, destination: &str) -> RepoResult<usize>;
}

/// SQLite-backed container repository.
pub struct SqliteContainerRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteContainerRepository<'conn> {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }
}

impl ContainerRepository for SqliteContainerRepository<'_> {
    fn save_container(&mut self, key: &str, container: &Container) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO Containers (id, size, currentLocation, addedTime, leavingTime)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                size = excluded.size,
                currentLocation = excluded.currentLocation,
                addedTime = excluded.addedTime,
                leavingTime = excluded.leavingTime;",
            params![
                key,
                container.size.code(),
                container.current_location.as_str(),
                time_to_db(container.added_time),
                time_to_db(container.leaving_time),
            ],
        )?;

        // Package ids are unique across containers: saving a package moves it here.
        tx.execute("DELETE FROM Packages WHERE container_id = ?1;", [key])?;
        for package in &container.packages {
            tx.execute(
                "INSERT INTO Packages (id, container_id) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET container_id = excluded.container_id;",
                params![package.package_id.as_str(), key],
            )?;
        }

        tx.execute("DELETE FROM CustomVariables WHERE container_id = ?1;", [key])?;
        for (hauler, variables) in &container.custom_variables {
            for (name, value) in variables {
                let encoded = serde_json::to_string(value).map_err(|err| {
                    RepoError::InvalidData(format!(
                        "custom variable `{name}` is not encodable: {err}"
                    ))
                })?;
                tx.execute(
                    "INSERT INTO CustomVariables (hauler_type, container_id, key, value)
                     VALUES (?1, ?2, ?3, ?4);",
                    params![hauler.code(), key, name.as_str(), encoded],
                )?;
            }
        }

        tx.execute(
            "DELETE FROM NextDestinations WHERE container_id = ?1;",
            [key],
        )?;
        for destination in &container.next_destinations {
            tx.execute(
                "INSERT INTO NextDestinations (container_id, destination) VALUES (?1, ?2);",
                params![key, destination.as_str()],
            )?;
        }

        tx.execute("DELETE FROM MovementHistory WHERE container_id = ?1;", [key])?;
        for entry in &container.movement_history {
            tx.execute(
                "INSERT INTO MovementHistory (container_id, history) VALUES (?1, ?2);",
                params![key, entry.as_str()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn load_container(&self, key: &str) -> RepoResult<Option<Container>> {
        let main_row = self
            .conn
            .query_row(
                "SELECT size, currentLocation, addedTime, leavingTime
                 FROM Containers
                 WHERE id = ?1;",
                [key],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((size_code, location, added_time, leaving_time)) = main_row else {
            return Ok(None);
        };

        let size = match size_code {
            Some(code) => ContainerSize::from_code(code).ok_or_else(|| {
                RepoError::InvalidData(format!("invalid size code `{code}` in Containers.size"))
            })?,
            None => ContainerSize::default(),
        };

        let mut container = Container::new(key, size);
        container.current_location = location.unwrap_or_default();
        container.added_time = time_from_db(added_time);
        container.leaving_time = time_from_db(leaving_time);
        container.packages = load_packages(&*self.conn, key)?;
        container.custom_variables = load_custom_variables(&*self.conn, key)?;
        container.next_destinations = load_strings(
            &*self.conn,
            "SELECT destination FROM NextDestinations WHERE container_id = ?1 ORDER BY rowid;",
            key,
        )?;
        container.movement_history = load_strings(
            &*self.conn,
            "SELECT history FROM MovementHistory WHERE container_id = ?1 ORDER BY rowid;",
            key,
        )?;

        Ok(Some(container))
    }

    fn delete_container(&self, key: &str) -> RepoResult<()> {
        let failures = for_each_table(|table| {
            let column = if table == "Containers" {
                "id"
            } else {
                "container_id"
            };
            self.conn
                .execute(&format!("DELETE FROM {table} WHERE {column} = ?1;"), [key])
        });

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RepoError::CascadeIncomplete {
                key: Some(key.to_string()),
                failures,
            })
        }
    }

    fn clear_all(&self) -> RepoResult<()> {
        let failures = for_each_table(|table| self.conn.execute(&format!("DELETE FROM {table};"), []));

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RepoError::CascadeIncomplete {
                key: None,
                failures,
            })
        }
    }

    fn container_exists(&self, key: &str) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM Containers WHERE id = ?1;", [key], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn list_container_ids(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM Containers ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    fn count_containers(&self) -> RepoResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM Containers;", [], |row| row.get(0))?;
        count_to_usize(count)
    }

    fn container_times(&self) -> RepoResult<Vec<ContainerTimes>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, addedTime, leavingTime
             FROM Containers
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut times = Vec::new();
        while let Some(row) = rows.next()? {
            times.push(ContainerTimes {
                id: row.get(0)?,
                added_time: time_from_db(row.get(1)?),
                leaving_time: time_from_db(row.get(2)?),
            });
        }
        Ok(times)
    }

    fn ids_with_destination(&self, destination: &str) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id
             FROM Containers
             WHERE id IN (
                SELECT container_id
                FROM NextDestinations
                WHERE destination = ?1
             )
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([destination])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    fn count_with_destination(&self, destination: &str) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM Containers
             WHERE id IN (
                SELECT container_id
                FROM NextDestinations
                WHERE destination = ?1
             );",
            [destination],
            |row| row.get(0),
        )?;
        count_to_usize(count)
    }
}

fn for_each_table(
    mut delete: impl FnMut(&'static str) -> rusqlite::Result<usize>,
) -> Vec<TableFailure> {
    CONTAINER_TABLES
        .into_iter()
        .filter_map(|table| {
            delete(table).err().map(|err| TableFailure {
                table,
                error: DbError::Sqlite(err),
            })
        })
        .collect()
}

fn load_packages(conn: &Connection, key: &str) -> RepoResult<Vec<Package>> {
    let mut stmt =
        conn.prepare("SELECT id FROM Packages WHERE container_id = ?1 ORDER BY rowid;")?;
    let mut rows = stmt.query([key])?;
    let mut packages = Vec::new();
    while let Some(row) = rows.next()? {
        packages.push(Package::new(row.get::<_, String>(0)?));
    }
    Ok(packages)
}

fn load_custom_variables(conn: &Connection, key: &str) -> RepoResult<CustomVariables> {
    let mut stmt = conn.prepare(
        "SELECT hauler_type, key, value
         FROM CustomVariables
         WHERE container_id = ?1;",
    )?;
    let mut rows = stmt.query([key])?;
    let mut variables = CustomVariables::new();
    while let Some(row) = rows.next()? {
        let code: i64 = row.get(0)?;
        let hauler = HaulerType::from_code(code).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid hauler type `{code}` in CustomVariables.hauler_type"
            ))
        })?;
        let name: String = row.get(1)?;
        let raw: Option<String> = row.get(2)?;
        let value = match raw {
            Some(text) => serde_json::from_str(&text).map_err(|err| {
                RepoError::InvalidData(format!(
                    "invalid json in CustomVariables.value for `{name}`: {err}"
                ))
            })?,
            None => serde_json::Value::Null,
        };
        variables.entry(hauler).or_default().insert(name, value);
    }
    Ok(variables)
}

fn load_strings(conn: &Connection, sql: &str, key: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([key])?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        values.push(row.get::<_, Option<String>>(0)?.unwrap_or_default());
    }
    Ok(values)
}

fn time_to_db(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

fn time_from_db(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

fn count_to_usize(count: i64) -> RepoResult<usize> {
    usize::try_from(count)
        .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
}
