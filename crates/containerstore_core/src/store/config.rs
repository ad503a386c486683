use crate::cache::DEFAULT_CACHE_CAPACITY;
use std::path::{Path, PathBuf};

/// Construction options for a `ContainerStore`.
///
/// No database path selects the in-memory mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_path: Option<PathBuf>,
    pub cache_capacity: usize,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Overrides the number of records kept resident in persistent mode.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}
