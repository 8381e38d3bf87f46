//! Batch replay of known areas against a new period.
//!
//! A replay takes the flat list of areas settled by an earlier partition
//! run and fetches each one for another period. Areas already populated for
//! that period are skipped up front; the rest run as concurrent tasks behind
//! one shared admission gate.

mod observer;

pub use observer::{NoopObserver, ReplayObserver, ReplayProgress, ReplayStatus};

use crate::config::FetchConfig;
use crate::error::Result;
use crate::fetch::{FetchStatus, Fetcher, Outcome, QueryService};
use crate::storage::{Session, Store};
use geoband_types::{AreaId, AreaPolygon, AreaRecord, ErrorKind, ErrorLogEntry, Period};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Result for one submitted area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaReplay {
    pub index: usize,
    pub polygon_key: String,
    pub area_id: Option<AreaId>,
    pub base_area_id: Option<AreaId>,
    pub event_count: u64,
    pub inserted: usize,
    pub status: ReplayStatus,
}

/// Summary of one replay, produced after every task has been joined
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub period: Period,
    pub total: usize,
    pub cached: usize,
    pub successful: usize,
    pub failed: usize,
    pub events_inserted: usize,
    pub external_calls: u64,
    /// One entry per submitted area, in submission order
    pub areas: Vec<AreaReplay>,
    pub errors: Vec<ErrorLogEntry>,
}

impl ReplayReport {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Replays areas concurrently under a shared admission gate.
pub struct BatchReplayer<S> {
    store: Store,
    fetcher: Fetcher<S>,
}

impl<S> BatchReplayer<S>
where
    S: QueryService + 'static,
{
    /// Replayer with its own gate sized from `config`.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_calls_per_second` is zero.
    pub fn new(store: Store, service: Arc<S>, config: &FetchConfig) -> Self {
        Self::with_fetcher(store, Fetcher::concurrent(service, config))
    }

    pub fn with_fetcher(store: Store, fetcher: Fetcher<S>) -> Self {
        Self { store, fetcher }
    }

    pub fn fetcher(&self) -> &Fetcher<S> {
        &self.fetcher
    }

    /// Fetch every area in `polygon_keys` for `period`.
    ///
    /// Opens a session for the duration of the batch. Individual areas can
    /// fail without affecting the rest; only store-level problems (a closed
    /// store, a failed final sync) are returned as errors.
    pub async fn replay<O>(
        &self,
        polygon_keys: &[String],
        period: Period,
        observer: &mut O,
    ) -> Result<ReplayReport>
    where
        O: ReplayObserver + ?Sized,
    {
        let sources: Vec<Source<'_>> = polygon_keys
            .iter()
            .map(|key| Source {
                key,
                base_area_id: None,
            })
            .collect();
        self.replay_sources(&sources, period, observer).await
    }

    /// Fetch every area settled in another period for `period`.
    ///
    /// Same as [`BatchReplayer::replay`], except that every result and
    /// notification carries the id of the base row it was derived from,
    /// failures included.
    pub async fn replay_areas<O>(
        &self,
        areas: &[AreaRecord],
        period: Period,
        observer: &mut O,
    ) -> Result<ReplayReport>
    where
        O: ReplayObserver + ?Sized,
    {
        let sources: Vec<Source<'_>> = areas
            .iter()
            .map(|area| Source {
                key: &area.polygon_key,
                base_area_id: Some(area.id),
            })
            .collect();
        self.replay_sources(&sources, period, observer).await
    }

    async fn replay_sources<O>(
        &self,
        sources: &[Source<'_>],
        period: Period,
        observer: &mut O,
    ) -> Result<ReplayReport>
    where
        O: ReplayObserver + ?Sized,
    {
        let mut session = self.store.session()?;
        let total = sources.len();
        log::info!("Replaying {} areas for {}", total, period);

        let mut batch = Batch {
            period,
            total,
            slots: vec![None; total],
            errors: Vec::new(),
        };
        let mut tasks = JoinSet::new();

        for (index, source) in sources.iter().enumerate() {
            let key = source.key;
            if let Some(area) = session.find_area(key, period)? {
                if session.has_events(area.id)? {
                    batch.complete(
                        AreaReplay {
                            index,
                            polygon_key: key.to_string(),
                            area_id: Some(area.id),
                            base_area_id: source.base_area_id,
                            event_count: area.event_count,
                            inserted: 0,
                            status: ReplayStatus::Cached,
                        },
                        observer,
                    );
                    continue;
                }
            }

            let polygon: AreaPolygon = match key.parse() {
                Ok(polygon) => polygon,
                Err(e) => {
                    let entry = ErrorLogEntry::new(
                        ErrorKind::TransientFailure,
                        period,
                        0,
                        format!("Invalid polygon key: {}", e),
                    )
                    .with_polygon(key);
                    batch.log_error(&mut session, entry);
                    batch.complete(failed(index, source, None), observer);
                    continue;
                }
            };

            let fetcher = self.fetcher.clone();
            tasks.spawn(async move {
                let outcome = fetcher.fetch(&polygon, period).await;
                (index, outcome)
            });
        }

        let external_calls = tasks.len() as u64;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    let area = batch.settle(&mut session, index, &sources[index], outcome);
                    batch.complete(area, observer);
                }
                Err(e) => log::warn!("Replay task for {} failed: {}", period, e),
            }
        }

        // slots still empty belong to tasks that panicked or were cancelled
        for index in 0..total {
            if batch.slots[index].is_none() {
                let source = &sources[index];
                let entry = ErrorLogEntry::new(
                    ErrorKind::TransientFailure,
                    period,
                    0,
                    "Replay task did not complete",
                )
                .with_polygon(source.key);
                batch.log_error(&mut session, entry);
                batch.complete(failed(index, source, None), observer);
            }
        }

        let stats = session.close()?;
        let report = batch.into_report(external_calls);
        log::info!(
            "Replay for {} finished: {} cached, {} fetched, {} failed, {} events inserted ({} writes)",
            period,
            report.cached,
            report.successful,
            report.failed,
            report.events_inserted,
            stats.operations
        );
        Ok(report)
    }

    /// Replay the areas settled for `base` against every month from `start`
    /// through `end`, one batch per month.
    pub async fn replay_months<O>(
        &self,
        base: Period,
        start: Period,
        end: Period,
        observer: &mut O,
    ) -> Result<Vec<ReplayReport>>
    where
        O: ReplayObserver + ?Sized,
    {
        let areas = self.store.areas(Some(base))?;
        if areas.is_empty() {
            log::warn!("No areas settled for {}; nothing to replay", base);
        }

        let mut reports = Vec::new();
        for period in Period::range(start, end) {
            reports.push(self.replay_areas(&areas, period, observer).await?);
        }
        Ok(reports)
    }
}

/// One submitted area
struct Source<'a> {
    key: &'a str,
    base_area_id: Option<AreaId>,
}

fn failed(index: usize, source: &Source<'_>, code: Option<u16>) -> AreaReplay {
    AreaReplay {
        index,
        polygon_key: source.key.to_string(),
        area_id: None,
        base_area_id: source.base_area_id,
        event_count: 0,
        inserted: 0,
        status: ReplayStatus::Failed { code },
    }
}

/// Aggregation state of one replay
struct Batch {
    period: Period,
    total: usize,
    slots: Vec<Option<AreaReplay>>,
    errors: Vec<ErrorLogEntry>,
}

impl Batch {
    fn settle(
        &mut self,
        session: &mut Session,
        index: usize,
        source: &Source<'_>,
        outcome: Outcome,
    ) -> AreaReplay {
        let period = self.period;
        let key = source.key;
        match outcome.status {
            FetchStatus::Success => {
                match session.settle(key, outcome.count, period, &outcome.records) {
                    Ok((area_id, inserted)) => AreaReplay {
                        index,
                        polygon_key: key.to_string(),
                        area_id: Some(area_id),
                        base_area_id: source.base_area_id,
                        event_count: outcome.count,
                        inserted,
                        status: ReplayStatus::Fetched,
                    },
                    Err(e) => {
                        log::warn!("Failed to persist replayed area {}: {}", key, e);
                        let entry = ErrorLogEntry::new(
                            ErrorKind::PersistenceFailure,
                            period,
                            0,
                            e.to_string(),
                        )
                        .with_polygon(key);
                        self.log_error(session, entry);
                        failed(index, source, None)
                    }
                }
            }
            FetchStatus::CapacityExceeded => {
                let entry = ErrorLogEntry::new(
                    ErrorKind::CapacityExceeded,
                    period,
                    0,
                    "Area exceeds the result cap for this period",
                )
                .with_polygon(key);
                self.log_error(session, entry);
                failed(index, source, None)
            }
            FetchStatus::Failure { code, reason } => {
                let entry = ErrorLogEntry::new(ErrorKind::TransientFailure, period, 0, reason)
                    .with_status(code)
                    .with_polygon(key);
                self.log_error(session, entry);
                failed(index, source, code)
            }
        }
    }

    fn complete<O>(&mut self, area: AreaReplay, observer: &mut O)
    where
        O: ReplayObserver + ?Sized,
    {
        observer.on_area(&ReplayProgress {
            index: area.index,
            total: self.total,
            area_id: area.area_id,
            base_area_id: area.base_area_id,
            event_count: area.event_count,
            inserted: area.inserted,
            status: area.status.clone(),
        });
        let index = area.index;
        self.slots[index] = Some(area);
    }

    fn log_error(&mut self, session: &mut Session, entry: ErrorLogEntry) {
        if let Err(e) = session.append_error(&entry) {
            log::warn!("Failed to append {} to the error log: {}", entry.kind, e);
        }
        self.errors.push(entry);
    }

    fn into_report(self, external_calls: u64) -> ReplayReport {
        let areas: Vec<AreaReplay> = self.slots.into_iter().flatten().collect();
        let mut report = ReplayReport {
            period: self.period,
            total: self.total,
            cached: 0,
            successful: 0,
            failed: 0,
            events_inserted: 0,
            external_calls,
            areas: Vec::new(),
            errors: self.errors,
        };
        for area in &areas {
            match area.status {
                ReplayStatus::Cached => report.cached += 1,
                ReplayStatus::Fetched => report.successful += 1,
                ReplayStatus::Failed { .. } => report.failed += 1,
            }
            report.events_inserted += area.inserted;
        }
        report.areas = areas;
        report
    }
}
