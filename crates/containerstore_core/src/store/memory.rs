//! In-memory storage mode.

use super::mode::{ClearScope, RecordStore, StoreMode};
use crate::model::container::Container;
use crate::model::handle::RecordHandle;
use crate::query::RecordFilter;
use log::debug;
use std::collections::BTreeMap;

/// Unbounded key-ordered mapping of record handles.
#[derive(Debug)]
pub struct InMemoryStore<H> {
    records: BTreeMap<String, H>,
}

impl<H> InMemoryStore<H> {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<H> Default for InMemoryStore<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: RecordHandle> RecordStore<H> for InMemoryStore<H> {
    fn mode(&self) -> StoreMode {
        StoreMode::InMemory
    }

    fn insert(&mut self, key: String, handle: H) {
        if self.records.insert(key, handle).is_some() {
            debug!("event=record_replace module=store status=ok mode=memory");
        }
    }

    fn get(&mut self, key: &str) -> Option<&mut H> {
        self.records.get_mut(key)
    }

    fn contains(&mut self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    fn persist(&mut self, _key: &str) {}

    fn remove(&mut self, key: &str) -> Option<H> {
        self.records.remove(key)
    }

    fn keys(&mut self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    fn len(&mut self) -> usize {
        self.records.len()
    }

    fn all_records(&mut self) -> Vec<(String, Container)> {
        self.resident_records()
    }

    fn resident_records(&self) -> Vec<(String, Container)> {
        self.records
            .iter()
            .map(|(key, handle)| (key.clone(), handle.snapshot()))
            .collect()
    }

    fn clear(&mut self, _scope: ClearScope) {
        self.records.clear();
    }

    fn matching_keys(&mut self, filter: &RecordFilter) -> Vec<String> {
        self.records
            .iter()
            .filter(|(_, handle)| handle.with_record(|record| filter.matches(record)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn count_matching(&mut self, filter: &RecordFilter) -> usize {
        self.records
            .values()
            .filter(|handle| handle.with_record(|record| filter.matches(record)))
            .count()
    }
}
