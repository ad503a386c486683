//! Thread-safe container store façade.
//!
//! # Responsibility
//! - Select the storage mode once at construction.
//! - Serialize every operation through one mutex.
//! - Expose the query, dequeue and count families.
//!
//! # Invariants
//! - Each public method takes the store lock at most once; helpers suffixed
//!   `_locked` run under it and never lock again.
//! - No two store locks are held at the same time (`copy_from` snapshots the
//!   source before locking the destination).
//! - `Changed` is emitted after the lock is released.

use super::config::StoreConfig;
use super::memory::InMemoryStore;
use super::mode::{ClearScope, RecordStore, StoreMode};
use super::persistent::CachedPersistentStore;
use super::signals::{StoreEvent, StoreSignals};
use crate::db::{open_db, DbResult};
use crate::model::container::Container;
use crate::model::handle::{OwnedRecord, RecordHandle};
use crate::query::{RecordFilter, TimeField};
use log::{debug, info, warn};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use uuid::Uuid;

/// Live access to a stored handle. The store stays locked while it is held.
pub type RecordGuard<'a, H> = MappedMutexGuard<'a, H>;

type ModeBox<H> = Box<dyn RecordStore<H>>;

/// Rejected `add_from_batch` payload.
#[derive(Debug)]
pub enum BatchError {
    Malformed(serde_json::Error),
    MissingContainers,
}

impl Display for BatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "batch is not valid json: {err}"),
            Self::MissingContainers => write!(f, "batch has no `containers` array"),
        }
    }
}

impl Error for BatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::MissingContainers => None,
        }
    }
}

/// Keyed container store running in memory or in front of SQLite.
///
/// `H` fixes the ownership policy: [`OwnedRecord`] lets the store free
/// records it releases, `SharedRecord` leaves that to the last holder.
pub struct ContainerStore<H: RecordHandle = OwnedRecord> {
    instance_id: Uuid,
    inner: Mutex<ModeBox<H>>,
    signals: StoreSignals,
    degraded_reason: Option<String>,
    database_location: Option<PathBuf>,
}

impl<H: RecordHandle> ContainerStore<H> {
    pub fn in_memory() -> Self {
        Self::with_config(StoreConfig::in_memory())
    }

    /// Opens a persistent store at `path`, falling back to memory on failure.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_config(StoreConfig::persistent(path))
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_signals(config, StoreSignals::new())
    }

    /// Builds a store that reports through `signals`.
    ///
    /// An unopenable database is reported as one storage error and the store
    /// runs in memory; see [`ContainerStore::degraded_reason`].
    pub fn with_signals(config: StoreConfig, signals: StoreSignals) -> Self {
        let Some(path) = config.database_path.as_deref() else {
            return Self::assemble(Box::new(InMemoryStore::new()), signals, None, None);
        };

        match open_db(path) {
            Ok(conn) => {
                let mode = CachedPersistentStore::new(conn, config.cache_capacity, signals.clone());
                Self::assemble(Box::new(mode), signals, None, Some(path.to_path_buf()))
            }
            Err(err) => {
                let reason = format!(
                    "failed to open or create database `{}`: {err}",
                    path.display()
                );
                warn!("event=store_degraded module=store status=fallback mode=memory");
                signals.storage_error(reason.clone());
                Self::assemble(Box::new(InMemoryStore::new()), signals, Some(reason), None)
            }
        }
    }

    /// Strict constructor: database failures are returned instead of degrading.
    pub fn try_open(config: StoreConfig) -> DbResult<Self> {
        let signals = StoreSignals::new();
        let mode: ModeBox<H> = match config.database_path.as_deref() {
            Some(path) => Box::new(CachedPersistentStore::new(
                open_db(path)?,
                config.cache_capacity,
                signals.clone(),
            )),
            None => Box::new(InMemoryStore::new()),
        };
        Ok(Self::assemble(mode, signals, None, config.database_path))
    }

    /// Rebuilds a store from the document [`Self::to_json`] writes.
    ///
    /// A string `databaseLocation` opens that file (degrading to memory on
    /// failure). Otherwise every decodable entry of `containers` is added under
    /// its own id with the timestamps it carries; the rest are skipped.
    pub fn from_json(document: &Value) -> Self {
        if let Some(location) = document.get("databaseLocation").and_then(Value::as_str) {
            return Self::open(location);
        }

        let store = Self::in_memory();
        let items = document
            .get("containers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut restored = 0;
        {
            let mut inner = store.inner.lock();
            for (index, item) in items.iter().enumerate() {
                match serde_json::from_value::<Container>(item.clone()) {
                    Ok(record) => {
                        let key = record.id.clone();
                        let (added_time, leaving_time) = (record.added_time, record.leaving_time);
                        Self::add_locked(
                            &mut **inner,
                            key,
                            H::from_record(record),
                            added_time,
                            leaving_time,
                        );
                        restored += 1;
                    }
                    Err(err) => warn!(
                        "event=restore_item_skipped module=store status=warn index={index} error={err}"
                    ),
                }
            }
        }
        info!(
            "event=store_restore module=store status=ok store_id={} restored={restored}",
            store.instance_id
        );
        store
    }

    /// Describes the store as JSON.
    ///
    /// A persistent store writes `{"databaseLocation": path}`. An in-memory
    /// store, including a degraded one, writes `{"containers": [...]}`.
    pub fn to_json(&self) -> Value {
        if let Some(location) = &self.database_location {
            return json!({ "databaseLocation": location.to_string_lossy() });
        }

        let records = self.inner.lock().all_records();
        let containers: Vec<Value> = records
            .into_iter()
            .filter_map(|(key, record)| match serde_json::to_value(&record) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("event=export_item_skipped module=store status=warn key={key} error={err}");
                    None
                }
            })
            .collect();
        json!({ "containers": containers })
    }

    fn assemble(
        mode: ModeBox<H>,
        signals: StoreSignals,
        degraded_reason: Option<String>,
        database_location: Option<PathBuf>,
    ) -> Self {
        let instance_id = Uuid::new_v4();
        info!(
            "event=store_open module=store status=ok store_id={instance_id} mode={}",
            mode.mode().as_str()
        );
        Self {
            instance_id,
            inner: Mutex::new(mode),
            signals,
            degraded_reason,
            database_location,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn mode(&self) -> StoreMode {
        self.inner.lock().mode()
    }

    /// Why a persistent store is running in memory, if it is.
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }

    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.signals.subscribe()
    }

    pub fn signals(&self) -> &StoreSignals {
        &self.signals
    }

    /// Stamps both timestamps on the record and stores it under `key`.
    pub fn add(&self, key: impl Into<String>, handle: H, added_time: f64, leaving_time: f64) {
        {
            let mut inner = self.inner.lock();
            Self::add_locked(&mut **inner, key.into(), handle, added_time, leaving_time);
        }
        self.signals.changed();
    }

    /// Adds each record under its own id.
    pub fn add_many(&self, handles: impl IntoIterator<Item = H>, added_time: f64, leaving_time: f64) {
        for handle in handles {
            let key = handle.with_record(|record| record.id.clone());
            self.add(key, handle, added_time, leaving_time);
        }
    }

    /// Adds every decodable record of a `{"containers": [...]}` payload.
    ///
    /// Returns the number of records added.
    pub fn add_from_batch(
        &self,
        batch: &str,
        added_time: f64,
        leaving_time: f64,
    ) -> Result<usize, BatchError> {
        let envelope: Value = serde_json::from_str(batch).map_err(BatchError::Malformed)?;
        let Some(items) = envelope.get("containers").and_then(Value::as_array) else {
            return Err(BatchError::MissingContainers);
        };

        let mut added = 0;
        for (index, item) in items.iter().enumerate() {
            match serde_json::from_value::<Container>(item.clone()) {
                Ok(record) => {
                    let key = record.id.clone();
                    self.add(key, H::from_record(record), added_time, leaving_time);
                    added += 1;
                }
                Err(err) => warn!(
                    "event=batch_item_skipped module=store status=warn index={index} error={err}"
                ),
            }
        }
        info!(
            "event=batch_add module=store status=ok added={added} skipped={}",
            items.len() - added
        );
        Ok(added)
    }

    /// Live access to the record under `key`.
    ///
    /// In persistent mode a miss hydrates the record into the cache. Changes
    /// made through the guard are not written back; use [`Self::update`].
    pub fn get(&self, key: &str) -> Option<RecordGuard<'_, H>> {
        MutexGuard::try_map(self.inner.lock(), |inner| inner.get(key)).ok()
    }

    pub fn get_snapshot(&self, key: &str) -> Option<Container> {
        self.get(key).map(|handle| handle.snapshot())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    /// Mutates the record under `key` in place and writes it through.
    ///
    /// Returns `false` when no such record exists.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut Container)) -> bool {
        {
            let mut inner = self.inner.lock();
            let Some(handle) = inner.get(key) else {
                return false;
            };
            handle.with_record_mut(f);
            inner.persist(key);
        }
        self.signals.changed();
        true
    }

    pub fn remove(&self, key: &str) {
        let released = self.inner.lock().remove(key);
        debug!(
            "event=container_remove module=store status=ok key={key} resident={}",
            released.is_some()
        );
        drop(released);
        self.signals.changed();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys()
    }

    /// Snapshots of every record the store knows about.
    pub fn all_containers(&self) -> BTreeMap<String, Container> {
        self.inner.lock().all_records().into_iter().collect()
    }

    /// Snapshots of the records currently resident in memory.
    pub fn latest_containers(&self) -> BTreeMap<String, Container> {
        self.inner.lock().resident_records().into_iter().collect()
    }

    /// Deep-copies every record of `other` into this store.
    pub fn copy_from<O: RecordHandle>(&self, other: &ContainerStore<O>) {
        let snapshot = other.snapshot_all();
        let copied = snapshot.len();
        {
            let mut inner = self.inner.lock();
            for (key, record) in snapshot {
                let (added_time, leaving_time) = (record.added_time, record.leaving_time);
                Self::add_locked(
                    &mut **inner,
                    key,
                    H::from_record(record),
                    added_time,
                    leaving_time,
                );
            }
        }
        info!(
            "event=store_copy module=store status=ok from={} to={} copied={copied}",
            other.instance_id, self.instance_id
        );
        self.signals.changed();
    }

    pub fn clear(&self, scope: ClearScope) {
        self.inner.lock().clear(scope);
        info!("event=store_clear module=store status=ok scope={scope:?}");
        self.signals.changed();
    }

    pub fn query(&self, filter: &RecordFilter) -> Vec<Container> {
        let mut inner = self.inner.lock();
        Self::query_locked(&mut **inner, filter)
    }

    /// Removes and returns every record matching `filter`.
    pub fn dequeue(&self, filter: &RecordFilter) -> Vec<H> {
        let released = {
            let mut inner = self.inner.lock();
            Self::dequeue_locked(&mut **inner, filter)
        };
        info!(
            "event=dequeue module=store status=ok filter=\"{filter}\" count={}",
            released.len()
        );
        self.signals.changed();
        released
    }

    pub fn count(&self, filter: &RecordFilter) -> usize {
        self.inner.lock().count_matching(filter)
    }

    pub fn containers_by_added_time(&self, condition: &str, reference: f64) -> Vec<Container> {
        self.time_filter(TimeField::Added, condition, reference)
            .map(|filter| self.query(&filter))
            .unwrap_or_default()
    }

    pub fn dequeue_by_added_time(&self, condition: &str, reference: f64) -> Vec<H> {
        self.time_filter(TimeField::Added, condition, reference)
            .map(|filter| self.dequeue(&filter))
            .unwrap_or_default()
    }

    pub fn count_by_added_time(&self, condition: &str, reference: f64) -> usize {
        self.time_filter(TimeField::Added, condition, reference)
            .map_or(0, |filter| self.count(&filter))
    }

    pub fn containers_by_leaving_time(&self, condition: &str, reference: f64) -> Vec<Container> {
        self.time_filter(TimeField::Leaving, condition, reference)
            .map(|filter| self.query(&filter))
            .unwrap_or_default()
    }

    pub fn dequeue_by_leaving_time(&self, condition: &str, reference: f64) -> Vec<H> {
        self.time_filter(TimeField::Leaving, condition, reference)
            .map(|filter| self.dequeue(&filter))
            .unwrap_or_default()
    }

    pub fn count_by_leaving_time(&self, condition: &str, reference: f64) -> usize {
        self.time_filter(TimeField::Leaving, condition, reference)
            .map_or(0, |filter| self.count(&filter))
    }

    pub fn containers_by_next_destination(&self, destination: &str) -> Vec<Container> {
        self.query(&RecordFilter::destination(destination))
    }

    pub fn dequeue_by_next_destination(&self, destination: &str) -> Vec<H> {
        self.dequeue(&RecordFilter::destination(destination))
    }

    pub fn count_by_next_destination(&self, destination: &str) -> usize {
        self.count(&RecordFilter::destination(destination))
    }

    fn time_filter(&self, field: TimeField, condition: &str, reference: f64) -> Option<RecordFilter> {
        match RecordFilter::time(field, condition, reference) {
            Ok(filter) => Some(filter),
            Err(err) => {
                warn!(
                    "event=condition_rejected module=store status=warn field={} error={err}",
                    field.as_str()
                );
                None
            }
        }
    }

    /// Reads every record without touching the source's cache recency.
    fn snapshot_all(&self) -> Vec<(String, Container)> {
        self.inner.lock().all_records()
    }

    fn add_locked(
        inner: &mut dyn RecordStore<H>,
        key: String,
        mut handle: H,
        added_time: f64,
        leaving_time: f64,
    ) {
        handle.with_record_mut(|record| {
            record.added_time = added_time;
            record.leaving_time = leaving_time;
        });
        inner.insert(key, handle);
    }

    fn query_locked(inner: &mut dyn RecordStore<H>, filter: &RecordFilter) -> Vec<Container> {
        let keys = inner.matching_keys(filter);
        keys.iter()
            .filter_map(|key| inner.get(key).map(|handle| handle.snapshot()))
            .collect()
    }

    fn dequeue_locked(inner: &mut dyn RecordStore<H>, filter: &RecordFilter) -> Vec<H> {
        let keys = inner.matching_keys(filter);
        let mut released = Vec::with_capacity(keys.len());
        for key in keys {
            if inner.get(&key).is_none() {
                continue;
            }
            if let Some(handle) = inner.remove(&key) {
                released.push(handle);
            }
        }
        released
    }
}

impl<H: RecordHandle> Default for ContainerStore<H> {
    fn default() -> Self {
        Self::in_memory()
    }
}
