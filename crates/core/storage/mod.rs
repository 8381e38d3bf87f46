//! Cache store abstraction for settled areas, events and the error log.
//!
//! Backends implement [`CacheStore`]; runs never touch a backend directly but
//! go through a [`Session`] opened on a shared [`Store`] handle, one session
//! per top-level run.

use crate::error::Result;
use geoband_types::{AreaId, AreaRecord, ErrorLogEntry, EventRecord, FetchedEvent, Period};

mod log_store;
mod memory;
mod session;

pub use log_store::LogStore;
pub use memory::MemoryStore;
pub use session::{Session, SessionStats, Store};

/// Trait for cache store implementations
///
/// The contract is idempotent: settling the same `(polygon_key, period)`
/// twice returns the first row's id, and an event whose external identifier
/// is already stored anywhere is skipped rather than rejected.
pub trait CacheStore: Send {
    /// Get the stored event count of an area
    fn lookup(&self, polygon_key: &str, period: Period) -> Result<Option<u64>> {
        Ok(self
            .find_area(polygon_key, period)?
            .map(|area| area.event_count))
    }

    /// Get the stored row of an area
    fn find_area(&self, polygon_key: &str, period: Period) -> Result<Option<AreaRecord>>;

    /// Insert an area row unless `(polygon_key, period)` exists; returns the
    /// id of the new or existing row
    fn insert_area_if_absent(
        &mut self,
        polygon_key: &str,
        event_count: u64,
        period: Period,
    ) -> Result<AreaId>;

    /// Attribute events to an area; returns how many were actually stored
    fn insert_events(&mut self, area_id: AreaId, events: &[FetchedEvent]) -> Result<usize>;

    /// Check whether any event is attributed to an area
    fn has_events(&self, area_id: AreaId) -> Result<bool>;

    /// Events attributed to an area, in insertion order
    fn events_for_area(&self, area_id: AreaId) -> Result<Vec<EventRecord>>;

    /// Record that a box was split because the service could not settle it
    fn mark_split(&mut self, polygon_key: &str, period: Period) -> Result<()>;

    /// Check whether a box was recorded as split for a period
    fn is_split(&self, polygon_key: &str, period: Period) -> Result<bool>;

    /// Append an entry to the error log
    fn append_error(&mut self, entry: &ErrorLogEntry) -> Result<()>;

    /// Every error-log entry, oldest first
    fn errors(&self) -> Result<Vec<ErrorLogEntry>>;

    /// Areas of one period, or one row per distinct polygon (its first
    /// occurrence) when `period` is `None`; ordered by id
    fn areas(&self, period: Option<Period>) -> Result<Vec<AreaRecord>>;

    /// Area count and summed event counts for a period
    fn period_stats(&self, period: Period) -> Result<PeriodStats>;

    /// Flush any pending writes to persistent storage
    fn sync(&mut self) -> Result<()>;

    /// Get store statistics
    fn stats(&self) -> Result<StoreStats>;
}

/// Per-period summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodStats {
    pub areas: usize,
    pub total_events: u64,
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub area_count: usize,
    pub event_count: usize,
    pub error_count: usize,
    pub split_count: usize,
    /// Events skipped because their external id was already stored
    pub duplicate_events: u64,
    /// Events dropped because they had no external id
    pub events_without_id: u64,
    /// Number of write operations performed
    pub operations_count: u64,
}
