//! Adaptive quadrant partitioning.
//!
//! A box is queried once. Boxes the service refuses or that hold more events
//! than the target band allows are split into four quadrants and each
//! quadrant is handled the same way, depth first in NE, NW, SE, SW order.
//! Boxes at or under the band are settled: the area row and its events are
//! stored. Forced splits are recorded too, so a later run over the same box
//! and period is answered from the store without calling the service.

mod context;

pub use context::{Disposition, PartitionReport, SettledArea, TraversalContext};

use crate::config::{Config, FailurePolicy};
use crate::fetch::{FetchStatus, Fetcher, Outcome, QueryService};
use crate::land::LandBoundary;
use crate::storage::Session;
use futures::future::BoxFuture;
use geoband_types::{AreaPolygon, BoundingBox, ErrorKind, ErrorLogEntry, FetchedEvent, Period};

/// Partitions a territory into areas whose event counts fit the target band.
pub struct AreaPartitioner<S, L> {
    config: Config,
    fetcher: Fetcher<S>,
    land: L,
}

impl<S, L> AreaPartitioner<S, L>
where
    S: QueryService,
    L: LandBoundary,
{
    pub fn new(config: Config, fetcher: Fetcher<S>, land: L) -> Self {
        Self {
            config,
            fetcher,
            land,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher<S> {
        &self.fetcher
    }

    /// Partition `bbox` for one period, writing through `session`.
    ///
    /// Never fails: per-box problems end up in the report's error list and
    /// in the store's error log.
    pub async fn run(
        &self,
        session: &mut Session,
        bbox: BoundingBox,
        period: Period,
    ) -> PartitionReport {
        log::info!("Partitioning {} for {}", bbox, period);

        let mut ctx = TraversalContext::new(period);
        let settled = self.partition(session, &mut ctx, bbox, 0).await;
        ctx.settled = settled;
        let report = ctx.into_report();

        log::info!(
            "Partition of {} for {} finished: {} areas settled, {} calls, {} cache hits ({:.1}%), {} errors",
            bbox,
            period,
            report.settled_count(),
            report.external_calls,
            report.cache_hits,
            report.cache_hit_rate() * 100.0,
            report.error_count()
        );
        report
    }

    /// Resolve one box at `depth`, returning the areas settled beneath it.
    pub fn partition<'a>(
        &'a self,
        session: &'a mut Session,
        ctx: &'a mut TraversalContext,
        bbox: BoundingBox,
        depth: u32,
    ) -> BoxFuture<'a, Vec<SettledArea>> {
        Box::pin(async move {
            ctx.visit(depth);
            let period = ctx.period();
            let polygon = bbox.polygon();
            let key = polygon.key();

            if depth > self.config.max_depth {
                log::debug!("Depth {}: {} exceeds max depth", depth, bbox);
                ctx.record(Disposition::DepthExceeded);
                let entry = ErrorLogEntry::new(
                    ErrorKind::DepthExceeded,
                    period,
                    depth,
                    format!("Max depth {} exceeded", self.config.max_depth),
                )
                .with_polygon(key);
                self.log_error(session, ctx, entry);
                return Vec::new();
            }

            if !self.land.intersects_land(&bbox) {
                log::debug!("Depth {}: {} has no land, skipping", depth, bbox);
                ctx.record(Disposition::Pruned);
                return Vec::new();
            }

            match session.find_area(&key, period) {
                Ok(Some(area)) => {
                    log::debug!(
                        "Depth {}: {} cached with {} events",
                        depth,
                        bbox,
                        area.event_count
                    );
                    ctx.record(Disposition::CacheHit);
                    return vec![SettledArea {
                        polygon,
                        area_id: area.id,
                        event_count: area.event_count,
                        disposition: Disposition::CacheHit,
                    }];
                }
                Ok(None) => {}
                Err(e) => log::warn!("Cache lookup for {} failed, fetching: {}", key, e),
            }

            match session.is_split(&key, period) {
                Ok(true) => {
                    log::debug!("Depth {}: {} split by an earlier run", depth, bbox);
                    ctx.record(Disposition::CacheHit);
                    return self.split(session, ctx, bbox, depth).await;
                }
                Ok(false) => {}
                Err(e) => log::warn!("Split lookup for {} failed, fetching: {}", key, e),
            }

            let Outcome {
                status,
                records,
                count,
            } = self.fetcher.fetch(&polygon, period).await;
            ctx.external_calls += 1;

            match status {
                FetchStatus::CapacityExceeded => {
                    log::debug!("Depth {}: {} over capacity, splitting", depth, bbox);
                    ctx.record(Disposition::CapacityExceeded);
                    self.remember_split(session, &key, period);
                    self.split(session, ctx, bbox, depth).await
                }
                FetchStatus::Success if count > self.config.target_max => {
                    log::debug!(
                        "Depth {}: {} has {} events, above {}, splitting",
                        depth,
                        bbox,
                        count,
                        self.config.target_max
                    );
                    ctx.record(Disposition::OverDense);
                    self.remember_split(session, &key, period);
                    self.split(session, ctx, bbox, depth).await
                }
                FetchStatus::Success => {
                    let disposition = if count >= self.config.target_min {
                        Disposition::SettledDense
                    } else {
                        Disposition::SettledSparse
                    };
                    self.settle(session, ctx, polygon, count, &records, disposition, depth)
                }
                FetchStatus::Failure { code, reason } => {
                    log::warn!(
                        "Depth {}: query for {} failed ({}), policy {:?}",
                        depth,
                        bbox,
                        reason,
                        self.config.failure_policy
                    );
                    ctx.record(Disposition::TransientFailure);
                    let entry = ErrorLogEntry::new(ErrorKind::TransientFailure, period, depth, reason)
                        .with_status(code)
                        .with_polygon(key);
                    self.log_error(session, ctx, entry);

                    match self.config.failure_policy {
                        FailurePolicy::SplitAndRetry => self.split(session, ctx, bbox, depth).await,
                        FailurePolicy::Abandon => Vec::new(),
                    }
                }
            }
        })
    }

    async fn split(
        &self,
        session: &mut Session,
        ctx: &mut TraversalContext,
        bbox: BoundingBox,
        depth: u32,
    ) -> Vec<SettledArea> {
        ctx.splits += 1;
        let mut settled = Vec::new();
        for quadrant in bbox.quadrants() {
            settled.extend(self.partition(session, ctx, quadrant, depth + 1).await);
        }
        settled
    }

    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        session: &mut Session,
        ctx: &mut TraversalContext,
        polygon: AreaPolygon,
        count: u64,
        records: &[FetchedEvent],
        disposition: Disposition,
        depth: u32,
    ) -> Vec<SettledArea> {
        let period = ctx.period();
        let key = polygon.key();

        match session.settle(&key, count, period, records) {
            Ok((area_id, inserted)) => {
                log::debug!(
                    "Depth {}: settled area {} ({:?}) with {} events, {} stored",
                    depth,
                    area_id,
                    disposition,
                    count,
                    inserted
                );
                ctx.record(disposition);
                vec![SettledArea {
                    polygon,
                    area_id,
                    event_count: count,
                    disposition,
                }]
            }
            Err(e) => {
                log::warn!("Failed to persist area {}: {}", key, e);
                ctx.record(Disposition::PersistenceFailure);
                let entry =
                    ErrorLogEntry::new(ErrorKind::PersistenceFailure, period, depth, e.to_string())
                        .with_polygon(key);
                self.log_error(session, ctx, entry);
                Vec::new()
            }
        }
    }

    /// Record a split the service forced, so repeat runs skip the call.
    /// Failure-driven splits are not recorded.
    fn remember_split(&self, session: &mut Session, key: &str, period: Period) {
        if let Err(e) = session.mark_split(key, period) {
            log::warn!("Failed to record split of {}: {}", key, e);
        }
    }

    fn log_error(&self, session: &mut Session, ctx: &mut TraversalContext, entry: ErrorLogEntry) {
        if let Err(e) = session.append_error(&entry) {
            log::warn!("Failed to append {} to the error log: {}", entry.kind, e);
        }
        ctx.errors.push(entry);
    }
}
