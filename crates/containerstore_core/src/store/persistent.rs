//! Cache-aside storage mode over SQLite.
//!
//! # Responsibility
//! - Keep recently used records resident in a bounded `RecencyCache`.
//! - Write every added record through to the backing store.
//! - Hydrate records from the backing store on cache misses.
//!
//! # Invariants
//! - The backing store is the system of record; eviction never deletes rows.
//! - A failed write leaves the resident record in place and is reported as a
//!   storage error. Memory and disk may diverge until the next successful save.
//! - Queries see every persisted record, not only resident ones.

use super::mode::{ClearScope, RecordStore, StoreMode};
use super::signals::StoreSignals;
use crate::cache::RecencyCache;
use crate::model::container::Container;
use crate::model::handle::RecordHandle;
use crate::query::RecordFilter;
use crate::repo::container_repo::{
    ContainerRepository, RepoError, RepoResult, SqliteContainerRepository,
};
use log::debug;
use rusqlite::Connection;

pub struct CachedPersistentStore<H> {
    conn: Connection,
    cache: RecencyCache<H>,
    signals: StoreSignals,
}

impl<H: RecordHandle> CachedPersistentStore<H> {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    pub fn new(conn: Connection, cache_capacity: usize, signals: StoreSignals) -> Self {
        Self {
            conn,
            cache: RecencyCache::new(cache_capacity),
            signals,
        }
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn resident_len(&self) -> usize {
        self.cache.len()
    }

    fn cache_insert(&mut self, key: String, handle: H) {
        if let Some((evicted, _released)) = self.cache.insert(key, handle) {
            debug!("event=cache_evict module=store status=ok key={evicted}");
        }
    }

    fn save_resident(&mut self, key: &str) {
        let Some(handle) = self.cache.peek(key) else {
            return;
        };
        let conn = &mut self.conn;
        let result = handle.with_record(|record| {
            SqliteContainerRepository::new(conn).save_container(key, record)
        });
        match result {
            Ok(()) => debug!("event=container_save module=store status=ok key={key}"),
            Err(err) => self.signals.storage_error(format!(
                "failed to save container `{key}` and related data: {err}"
            )),
        }
    }

    fn hydrate(&mut self, key: &str) -> bool {
        let result = SqliteContainerRepository::new(&mut self.conn).load_container(key);
        match result {
            Ok(Some(record)) => {
                debug!("event=cache_hydrate module=store status=ok key={key}");
                self.cache_insert(key.to_string(), H::from_record(record));
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.signals
                    .storage_error(format!("failed to load container `{key}`: {err}"));
                false
            }
        }
    }

    fn report(&self, context: &str, err: RepoError) {
        match err {
            RepoError::CascadeIncomplete { failures, .. } => {
                for failure in failures {
                    self.signals.storage_error(format!(
                        "{context} from {}: {}",
                        failure.table, failure.error
                    ));
                }
            }
            other => self.signals.storage_error(format!("{context}: {other}")),
        }
    }
}

impl<H: RecordHandle> RecordStore<H> for CachedPersistentStore<H> {
    fn mode(&self) -> StoreMode {
        StoreMode::Persistent
    }

    fn insert(&mut self, key: String, handle: H) {
        self.cache_insert(key.clone(), handle);
        self.save_resident(&key);
    }

    fn get(&mut self, key: &str) -> Option<&mut H> {
        if !self.cache.contains(key) && !self.hydrate(key) {
            return None;
        }
        self.cache.get(key)
    }

    fn contains(&mut self, key: &str) -> bool {
        if self.cache.contains(key) {
            return true;
        }
        let result = SqliteContainerRepository::new(&mut self.conn).container_exists(key);
        result.unwrap_or_else(|err| {
            self.report(&format!("failed to look up container `{key}`"), err);
            false
        })
    }

    fn persist(&mut self, key: &str) {
        self.save_resident(key);
    }

    fn remove(&mut self, key: &str) -> Option<H> {
        let result = SqliteContainerRepository::new(&mut self.conn).delete_container(key);
        if let Err(err) = result {
            self.report(&format!("failed to delete container `{key}`"), err);
        }
        self.cache.remove(key)
    }

    fn keys(&mut self) -> Vec<String> {
        let result = SqliteContainerRepository::new(&mut self.conn).list_container_ids();
        result.unwrap_or_else(|err| {
            self.report("failed to list container ids", err);
            self.cache.keys()
        })
    }

    fn len(&mut self) -> usize {
        let result = SqliteContainerRepository::new(&mut self.conn).count_containers();
        result.unwrap_or_else(|err| {
            self.report("failed to count containers", err);
            0
        })
    }

    fn all_records(&mut self) -> Vec<(String, Container)> {
        let keys = self.keys();
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(handle) = self.cache.peek(&key) {
                let record = handle.snapshot();
                records.push((key, record));
                continue;
            }
            let result = SqliteContainerRepository::new(&mut self.conn).load_container(&key);
            match result {
                Ok(Some(record)) => records.push((key, record)),
                Ok(None) => {}
                Err(err) => self.report(&format!("failed to load container `{key}`"), err),
            }
        }
        records
    }

    fn resident_records(&self) -> Vec<(String, Container)> {
        self.cache
            .iter()
            .map(|(key, handle)| (key.to_string(), handle.snapshot()))
            .collect()
    }

    fn clear(&mut self, scope: ClearScope) {
        if scope == ClearScope::Persisted {
            let result = SqliteContainerRepository::new(&mut self.conn).clear_all();
            if let Err(err) = result {
                self.report("failed to clear", err);
            }
        }
        self.cache.clear();
    }

    fn matching_keys(&mut self, filter: &RecordFilter) -> Vec<String> {
        let repo = SqliteContainerRepository::new(&mut self.conn);
        let result: RepoResult<Vec<String>> = match filter {
            RecordFilter::Time { .. } => repo.container_times().map(|rows| {
                rows.into_iter()
                    .filter(|row| {
                        filter
                            .matches_times(row.added_time, row.leaving_time)
                            .unwrap_or(false)
                    })
                    .map(|row| row.id)
                    .collect()
            }),
            RecordFilter::Destination(destination) => repo.ids_with_destination(destination),
        };
        result.unwrap_or_else(|err| {
            self.report(&format!("failed to query containers where {filter}"), err);
            Vec::new()
        })
    }

    fn count_matching(&mut self, filter: &RecordFilter) -> usize {
        let result = match filter {
            RecordFilter::Time { .. } => {
                return self.matching_keys(filter).len();
            }
            RecordFilter::Destination(destination) => {
                SqliteContainerRepository::new(&mut self.conn).count_with_destination(destination)
            }
        };
        result.unwrap_or_else(|err| {
            self.report(&format!("failed to count containers where {filter}"), err);
            0
        })
    }
}
