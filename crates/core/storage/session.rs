//! Shared store handle and per-run sessions.

use super::{CacheStore, LogStore, MemoryStore, PeriodStats, StoreStats};
use crate::builder::StoreBuilder;
use crate::error::{GeobandError, Result};
use geoband_types::{AreaId, AreaRecord, ErrorLogEntry, EventRecord, FetchedEvent, Period};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

type SharedBackend = Arc<Mutex<Box<dyn CacheStore>>>;

/// Thread-safe handle to a cache store.
///
/// Cloning is cheap and every clone refers to the same backend. Runs do not
/// use the handle directly: each opens its own [`Session`].
#[derive(Clone)]
pub struct Store {
    backend: SharedBackend,
    closed: Arc<AtomicBool>,
    sessions_opened: Arc<AtomicU64>,
}

impl Store {
    pub fn new(backend: impl CacheStore + 'static) -> Self {
        Self {
            backend: Arc::new(Mutex::new(Box::new(backend))),
            closed: Arc::new(AtomicBool::new(false)),
            sessions_opened: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create an in-memory store.
    pub fn memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Open or create a file-backed store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(LogStore::open(path)?))
    }

    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Open a session for one top-level run.
    pub fn session(&self) -> Result<Session> {
        self.ensure_open()?;
        let id = self.sessions_opened.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Opened store session {}", id);
        Ok(Session {
            id,
            backend: Arc::clone(&self.backend),
            closed: Arc::clone(&self.closed),
            stats: SessionStats::default(),
            finished: false,
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.ensure_open()?;
        self.backend.lock().stats()
    }

    pub fn areas(&self, period: Option<Period>) -> Result<Vec<AreaRecord>> {
        self.ensure_open()?;
        self.backend.lock().areas(period)
    }

    pub fn errors(&self) -> Result<Vec<ErrorLogEntry>> {
        self.ensure_open()?;
        self.backend.lock().errors()
    }

    pub fn period_stats(&self, period: Period) -> Result<PeriodStats> {
        self.ensure_open()?;
        self.backend.lock().period_stats(period)
    }

    /// Sync and close the store. Open sessions fail on their next operation.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.backend.lock().sync()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(GeobandError::StoreClosed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("closed", &self.is_closed())
            .field("sessions_opened", &self.sessions_opened.load(Ordering::Relaxed))
            .finish()
    }
}

/// Writes performed through one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub areas_inserted: u64,
    pub events_inserted: u64,
    pub errors_logged: u64,
    pub operations: u64,
}

/// Scoped access to the store for exactly one run.
///
/// Sessions are never shared between runs. A session that is dropped
/// without [`Session::close`] still syncs the backend.
pub struct Session {
    id: u64,
    backend: SharedBackend,
    closed: Arc<AtomicBool>,
    stats: SessionStats,
    finished: bool,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn lookup(&mut self, polygon_key: &str, period: Period) -> Result<Option<u64>> {
        self.begin()?;
        self.backend.lock().lookup(polygon_key, period)
    }

    pub fn find_area(&mut self, polygon_key: &str, period: Period) -> Result<Option<AreaRecord>> {
        self.begin()?;
        self.backend.lock().find_area(polygon_key, period)
    }

    pub fn has_events(&mut self, area_id: AreaId) -> Result<bool> {
        self.begin()?;
        self.backend.lock().has_events(area_id)
    }

    pub fn events_for_area(&mut self, area_id: AreaId) -> Result<Vec<EventRecord>> {
        self.begin()?;
        self.backend.lock().events_for_area(area_id)
    }

    pub fn areas(&mut self, period: Option<Period>) -> Result<Vec<AreaRecord>> {
        self.begin()?;
        self.backend.lock().areas(period)
    }

    pub fn insert_area_if_absent(
        &mut self,
        polygon_key: &str,
        event_count: u64,
        period: Period,
    ) -> Result<AreaId> {
        self.begin()?;
        let mut backend = self.backend.lock();
        let before = backend.stats()?.area_count;
        let id = backend.insert_area_if_absent(polygon_key, event_count, period)?;
        if backend.stats()?.area_count > before {
            self.stats.areas_inserted += 1;
        }
        Ok(id)
    }

    pub fn insert_events(&mut self, area_id: AreaId, events: &[FetchedEvent]) -> Result<usize> {
        self.begin()?;
        let inserted = self.backend.lock().insert_events(area_id, events)?;
        self.stats.events_inserted += inserted as u64;
        Ok(inserted)
    }

    /// Insert the area row and its events under a single lock acquisition.
    ///
    /// Returns the area id and the number of events actually stored.
    pub fn settle(
        &mut self,
        polygon_key: &str,
        event_count: u64,
        period: Period,
        events: &[FetchedEvent],
    ) -> Result<(AreaId, usize)> {
        self.begin()?;
        let mut backend = self.backend.lock();
        let before = backend.stats()?.area_count;
        let id = backend.insert_area_if_absent(polygon_key, event_count, period)?;
        if backend.stats()?.area_count > before {
            self.stats.areas_inserted += 1;
        }
        let inserted = backend.insert_events(id, events)?;
        self.stats.events_inserted += inserted as u64;
        Ok((id, inserted))
    }

    pub fn mark_split(&mut self, polygon_key: &str, period: Period) -> Result<()> {
        self.begin()?;
        self.backend.lock().mark_split(polygon_key, period)
    }

    pub fn is_split(&mut self, polygon_key: &str, period: Period) -> Result<bool> {
        self.begin()?;
        self.backend.lock().is_split(polygon_key, period)
    }

    pub fn append_error(&mut self, entry: &ErrorLogEntry) -> Result<()> {
        self.begin()?;
        self.backend.lock().append_error(entry)?;
        self.stats.errors_logged += 1;
        Ok(())
    }

    /// Sync the backend and end the session.
    pub fn close(mut self) -> Result<SessionStats> {
        self.finished = true;
        if !self.closed.load(Ordering::Acquire) {
            self.backend.lock().sync()?;
        }
        log::debug!("Closed store session {}: {:?}", self.id, self.stats);
        Ok(self.stats)
    }

    fn begin(&mut self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GeobandError::StoreClosed);
        }
        self.stats.operations += 1;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.finished || self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.backend.lock().sync() {
            log::warn!("Failed to sync store session {} on drop: {}", self.id, e);
        }
    }
}
