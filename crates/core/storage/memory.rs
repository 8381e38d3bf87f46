//! In-memory cache store implementation.

use super::{CacheStore, PeriodStats, StoreStats};
use crate::error::{GeobandError, Result};
use geoband_types::{AreaId, AreaRecord, ErrorLogEntry, EventRecord, FetchedEvent, Period};
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::SystemTime;

/// Outcome of [`MemoryStore::pending_events`]
#[derive(Debug, Default)]
pub(crate) struct PendingEvents {
    pub(crate) records: Vec<EventRecord>,
    without_id: u64,
    duplicates: u64,
}

/// In-memory cache store using hash maps
///
/// Area ids are assigned sequentially from 1 in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    /// Rows indexed by `id - 1`
    areas: Vec<AreaRecord>,
    area_index: FxHashMap<(String, Period), AreaId>,
    /// Every stored external id, across all areas
    event_ids: FxHashSet<String>,
    events_by_area: FxHashMap<AreaId, Vec<EventRecord>>,
    event_count: usize,
    splits: FxHashSet<(String, Period)>,
    errors: Vec<ErrorLogEntry>,
    stats: StoreStats,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an area row; the record is returned only when it is new.
    pub(crate) fn insert_area_record(
        &mut self,
        polygon_key: &str,
        event_count: u64,
        period: Period,
    ) -> (AreaId, Option<AreaRecord>) {
        match self.pending_area(polygon_key, event_count, period) {
            Err(id) => (id, None),
            Ok(record) => {
                self.commit_area(record.clone());
                (record.id, Some(record))
            }
        }
    }

    /// The row an insert would create, or the id of the row already there.
    /// Nothing is stored.
    pub(crate) fn pending_area(
        &self,
        polygon_key: &str,
        event_count: u64,
        period: Period,
    ) -> std::result::Result<AreaRecord, AreaId> {
        if let Some(id) = self.area_index.get(&(polygon_key.to_string(), period)) {
            return Err(*id);
        }
        Ok(AreaRecord {
            id: AreaId(self.areas.len() as u64 + 1),
            polygon_key: polygon_key.to_string(),
            event_count,
            period,
            created_at: SystemTime::now(),
        })
    }

    /// Store a row produced by [`MemoryStore::pending_area`].
    pub(crate) fn commit_area(&mut self, record: AreaRecord) {
        self.area_index
            .insert((record.polygon_key.clone(), record.period), record.id);
        self.areas.push(record);
        self.stats.operations_count += 1;
    }

    /// Attribute events to an area; returns the records actually stored.
    pub(crate) fn insert_event_records(
        &mut self,
        area_id: AreaId,
        events: &[FetchedEvent],
    ) -> Result<Vec<EventRecord>> {
        let pending = self.pending_events(area_id, events)?;
        let inserted = pending.records.clone();
        self.commit_events(area_id, pending);
        Ok(inserted)
    }

    /// Events an insert would store, after dropping id-less events and ids
    /// already stored or repeated within `events`. Nothing is stored.
    pub(crate) fn pending_events(
        &self,
        area_id: AreaId,
        events: &[FetchedEvent],
    ) -> Result<PendingEvents> {
        if self.area(area_id).is_none() {
            return Err(GeobandError::UnknownArea(area_id.0));
        }

        let mut pending = PendingEvents::default();
        let mut seen = FxHashSet::default();
        for event in events {
            let Some(record) = EventRecord::attribute(area_id, event) else {
                pending.without_id += 1;
                continue;
            };
            if self.event_ids.contains(&record.external_id)
                || !seen.insert(record.external_id.clone())
            {
                pending.duplicates += 1;
                continue;
            }
            pending.records.push(record);
        }
        Ok(pending)
    }

    /// Store events produced by [`MemoryStore::pending_events`].
    pub(crate) fn commit_events(&mut self, area_id: AreaId, pending: PendingEvents) {
        self.stats.events_without_id += pending.without_id;
        self.stats.duplicate_events += pending.duplicates;
        if pending.records.is_empty() {
            return;
        }

        self.event_count += pending.records.len();
        self.event_ids
            .extend(pending.records.iter().map(|r| r.external_id.clone()));
        self.events_by_area
            .entry(area_id)
            .or_default()
            .extend(pending.records);
        self.stats.operations_count += 1;
    }

    /// Re-insert a row read back from a log, keeping its id.
    pub(crate) fn restore_area(&mut self, record: AreaRecord) -> Result<()> {
        let expected = self.areas.len() as u64 + 1;
        if record.id.0 != expected {
            return Err(GeobandError::Other(format!(
                "area id {} out of sequence, expected {}",
                record.id, expected
            )));
        }
        self.area_index
            .insert((record.polygon_key.clone(), record.period), record.id);
        self.areas.push(record);
        Ok(())
    }

    /// Re-insert an event read back from a log. Duplicates are ignored.
    pub(crate) fn restore_event(&mut self, record: EventRecord) -> Result<()> {
        if self.area(record.area_id).is_none() {
            return Err(GeobandError::UnknownArea(record.area_id.0));
        }
        if self.event_ids.insert(record.external_id.clone()) {
            self.event_count += 1;
            self.events_by_area
                .entry(record.area_id)
                .or_default()
                .push(record);
        }
        Ok(())
    }

    /// Record a split; returns whether it was not already recorded.
    pub(crate) fn insert_split(&mut self, polygon_key: &str, period: Period) -> bool {
        let inserted = self.splits.insert((polygon_key.to_string(), period));
        if inserted {
            self.stats.operations_count += 1;
        }
        inserted
    }

    pub(crate) fn restore_error(&mut self, entry: ErrorLogEntry) {
        self.errors.push(entry);
    }

    fn area(&self, id: AreaId) -> Option<&AreaRecord> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.areas.get(index)
    }
}

impl CacheStore for MemoryStore {
    fn find_area(&self, polygon_key: &str, period: Period) -> Result<Option<AreaRecord>> {
        Ok(self
            .area_index
            .get(&(polygon_key.to_string(), period))
            .and_then(|id| self.area(*id))
            .cloned())
    }

    fn insert_area_if_absent(
        &mut self,
        polygon_key: &str,
        event_count: u64,
        period: Period,
    ) -> Result<AreaId> {
        Ok(self.insert_area_record(polygon_key, event_count, period).0)
    }

    fn insert_events(&mut self, area_id: AreaId, events: &[FetchedEvent]) -> Result<usize> {
        Ok(self.insert_event_records(area_id, events)?.len())
    }

    fn has_events(&self, area_id: AreaId) -> Result<bool> {
        Ok(self
            .events_by_area
            .get(&area_id)
            .is_some_and(|events| !events.is_empty()))
    }

    fn events_for_area(&self, area_id: AreaId) -> Result<Vec<EventRecord>> {
        Ok(self
            .events_by_area
            .get(&area_id)
            .cloned()
            .unwrap_or_default())
    }

    fn mark_split(&mut self, polygon_key: &str, period: Period) -> Result<()> {
        self.insert_split(polygon_key, period);
        Ok(())
    }

    fn is_split(&self, polygon_key: &str, period: Period) -> Result<bool> {
        Ok(self.splits.contains(&(polygon_key.to_string(), period)))
    }

    fn append_error(&mut self, entry: &ErrorLogEntry) -> Result<()> {
        self.errors.push(entry.clone());
        self.stats.operations_count += 1;
        Ok(())
    }

    fn errors(&self) -> Result<Vec<ErrorLogEntry>> {
        Ok(self.errors.clone())
    }

    fn areas(&self, period: Option<Period>) -> Result<Vec<AreaRecord>> {
        let rows = match period {
            Some(period) => self
                .areas
                .iter()
                .filter(|area| area.period == period)
                .cloned()
                .collect(),
            None => {
                let mut seen = FxHashSet::default();
                self.areas
                    .iter()
                    .filter(|area| seen.insert(area.polygon_key.as_str()))
                    .cloned()
                    .collect()
            }
        };
        Ok(rows)
    }

    fn period_stats(&self, period: Period) -> Result<PeriodStats> {
        let mut stats = PeriodStats::default();
        for area in self.areas.iter().filter(|area| area.period == period) {
            stats.areas += 1;
            stats.total_events += area.event_count;
        }
        Ok(stats)
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        let mut stats = self.stats.clone();
        stats.area_count = self.areas.len();
        stats.event_count = self.event_count;
        stats.error_count = self.errors.len();
        stats.split_count = self.splits.len();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoband_types::ErrorKind;

    fn period(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn event(id: Option<&str>) -> FetchedEvent {
        FetchedEvent {
            external_id: id.map(str::to_string),
            category: "anti-social-behaviour".into(),
            latitude: Some(51.5),
            longitude: Some(-0.12),
            location_label: "On or near Parking Area".into(),
            period: "2024-01".into(),
        }
    }

    #[test]
    fn test_insert_area_if_absent_is_idempotent() {
        let mut store = MemoryStore::new();
        let jan = period("2024-01");

        let first = store.insert_area_if_absent("k1", 6000, jan).unwrap();
        let second = store.insert_area_if_absent("k1", 1234, jan).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.lookup("k1", jan).unwrap(), Some(6000));

        let feb = store.insert_area_if_absent("k1", 10, period("2024-02")).unwrap();
        assert_ne!(first, feb);
        assert_eq!(store.stats().unwrap().area_count, 2);
    }

    #[test]
    fn test_lookup_absent() {
        let store = MemoryStore::new();
        assert_eq!(store.lookup("missing", period("2024-01")).unwrap(), None);
        assert!(store.find_area("missing", period("2024-01")).unwrap().is_none());
    }

    #[test]
    fn test_insert_events_drops_missing_ids_and_dedups_globally() {
        let mut store = MemoryStore::new();
        let jan = period("2024-01");
        let a = store.insert_area_if_absent("a", 3, jan).unwrap();
        let b = store.insert_area_if_absent("b", 2, jan).unwrap();

        let inserted = store
            .insert_events(a, &[event(Some("1")), event(None), event(Some("2")), event(Some("1"))])
            .unwrap();
        assert_eq!(inserted, 2);

        // same id through a different area is still a duplicate
        let inserted = store.insert_events(b, &[event(Some("2")), event(Some("3"))]).unwrap();
        assert_eq!(inserted, 1);

        let stats = store.stats().unwrap();
        assert_eq!(stats.event_count, 3);
        assert_eq!(stats.duplicate_events, 2);
        assert_eq!(stats.events_without_id, 1);
        assert_eq!(store.events_for_area(b).unwrap()[0].external_id, "3");
    }

    #[test]
    fn test_insert_events_unknown_area() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.insert_events(AreaId(9), &[event(Some("1"))]),
            Err(GeobandError::UnknownArea(9))
        ));
    }

    #[test]
    fn test_has_events() {
        let mut store = MemoryStore::new();
        let jan = period("2024-01");
        let id = store.insert_area_if_absent("a", 1, jan).unwrap();
        assert!(!store.has_events(id).unwrap());

        store.insert_events(id, &[event(None)]).unwrap();
        assert!(!store.has_events(id).unwrap());

        store.insert_events(id, &[event(Some("x"))]).unwrap();
        assert!(store.has_events(id).unwrap());
    }

    #[test]
    fn test_areas_by_period_and_distinct() {
        let mut store = MemoryStore::new();
        store.insert_area_if_absent("a", 1, period("2024-01")).unwrap();
        store.insert_area_if_absent("b", 2, period("2024-01")).unwrap();
        store.insert_area_if_absent("a", 3, period("2024-02")).unwrap();

        let jan = store.areas(Some(period("2024-01"))).unwrap();
        assert_eq!(jan.len(), 2);

        let distinct = store.areas(None).unwrap();
        let keys: Vec<_> = distinct.iter().map(|a| a.polygon_key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(distinct[0].period, period("2024-01"));

        let stats = store.period_stats(period("2024-01")).unwrap();
        assert_eq!(stats, PeriodStats { areas: 2, total_events: 3 });
    }

    #[test]
    fn test_split_markers() {
        let mut store = MemoryStore::new();
        let jan = period("2024-01");
        assert!(!store.is_split("k", jan).unwrap());

        store.mark_split("k", jan).unwrap();
        store.mark_split("k", jan).unwrap();
        assert!(store.is_split("k", jan).unwrap());
        assert!(!store.is_split("k", period("2024-02")).unwrap());
        assert_eq!(store.stats().unwrap().split_count, 1);
        // a split box is not a settled area
        assert_eq!(store.lookup("k", jan).unwrap(), None);
    }

    #[test]
    fn test_error_log_is_append_only() {
        let mut store = MemoryStore::new();
        let jan = period("2024-01");
        store
            .append_error(&ErrorLogEntry::new(ErrorKind::DepthExceeded, jan, 16, "first"))
            .unwrap();
        store
            .append_error(&ErrorLogEntry::new(ErrorKind::TransientFailure, jan, 2, "second"))
            .unwrap();

        let errors = store.errors().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "first");
        assert_eq!(errors[1].kind, ErrorKind::TransientFailure);
    }
}
