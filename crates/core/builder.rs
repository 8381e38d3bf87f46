//! Store builder
//!
//! Chooses between an in-memory store and an append-only log on disk.

use crate::error::Result;
use crate::storage::Store;
use std::path::PathBuf;

/// Builder for a [`Store`] backed by memory or by a log file.
#[derive(Debug)]
pub struct StoreBuilder {
    path: Option<PathBuf>,
}

impl StoreBuilder {
    /// Create a new builder with in-memory storage.
    pub fn new() -> Self {
        Self { path: None }
    }

    /// Persist to an append-only log at `path`.
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Configure for in-memory storage with no persistence.
    pub fn in_memory(mut self) -> Self {
        self.path = None;
        self
    }

    pub fn build(self) -> Result<Store> {
        match self.path {
            Some(path) => Store::open(path),
            None => Ok(Store::memory()),
        }
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoband_types::Period;

    #[test]
    fn test_builder_default_is_memory() {
        let store = StoreBuilder::new().build().unwrap();
        assert_eq!(store.stats().unwrap().area_count, 0);
    }

    #[test]
    fn test_builder_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.log");
        let period: Period = "2023-11".parse().unwrap();

        let store = StoreBuilder::new().path(&path).build().unwrap();
        let mut session = store.session().unwrap();
        session.insert_area_if_absent("k", 42, period).unwrap();
        session.close().unwrap();
        store.close().unwrap();

        let reopened = StoreBuilder::new().path(&path).build().unwrap();
        assert_eq!(reopened.period_stats(period).unwrap().total_events, 42);
    }

    #[test]
    fn test_in_memory_overrides_path() {
        let store = StoreBuilder::new()
            .path("/nonexistent/cache.log")
            .in_memory()
            .build()
            .unwrap();
        assert!(!store.is_closed());
    }
}
