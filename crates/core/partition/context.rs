//! Per-run traversal state and the report a run produces.

use geoband_types::{AreaId, AreaPolygon, ErrorLogEntry, Period};
use rustc_hash::FxHashMap;

/// What happened to one box during traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// No land in the box; no call made
    Pruned,
    CacheHit,
    CapacityExceeded,
    OverDense,
    SettledDense,
    SettledSparse,
    TransientFailure,
    DepthExceeded,
    PersistenceFailure,
}

impl Disposition {
    /// Whether this outcome is recorded in the error log.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::TransientFailure | Self::DepthExceeded | Self::PersistenceFailure
        )
    }
}

/// A box whose count was accepted, either now or by an earlier run
#[derive(Debug, Clone, PartialEq)]
pub struct SettledArea {
    pub polygon: AreaPolygon,
    pub area_id: AreaId,
    pub event_count: u64,
    pub disposition: Disposition,
}

/// Accumulator owned by one top-level run and threaded through the
/// recursion by `&mut`.
#[derive(Debug)]
pub struct TraversalContext {
    period: Period,
    pub(crate) settled: Vec<SettledArea>,
    pub(crate) external_calls: u64,
    pub(crate) cache_hits: u64,
    pub(crate) splits: u64,
    pub(crate) pruned: u64,
    pub(crate) max_depth_reached: u32,
    pub(crate) dispositions: FxHashMap<Disposition, u64>,
    pub(crate) errors: Vec<ErrorLogEntry>,
}

impl TraversalContext {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            settled: Vec::new(),
            external_calls: 0,
            cache_hits: 0,
            splits: 0,
            pruned: 0,
            max_depth_reached: 0,
            dispositions: FxHashMap::default(),
            errors: Vec::new(),
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub(crate) fn record(&mut self, disposition: Disposition) {
        *self.dispositions.entry(disposition).or_default() += 1;
        match disposition {
            Disposition::Pruned => self.pruned += 1,
            Disposition::CacheHit => self.cache_hits += 1,
            _ => {}
        }
    }

    pub(crate) fn visit(&mut self, depth: u32) {
        self.max_depth_reached = self.max_depth_reached.max(depth);
    }

    pub fn into_report(self) -> PartitionReport {
        PartitionReport {
            period: self.period,
            settled: self.settled,
            external_calls: self.external_calls,
            cache_hits: self.cache_hits,
            splits: self.splits,
            pruned: self.pruned,
            max_depth_reached: self.max_depth_reached,
            dispositions: self.dispositions,
            errors: self.errors,
        }
    }
}

/// Summary of one partition run.
///
/// A non-zero error count does not mean the run failed, only that coverage
/// may be incomplete where the errors were logged.
#[derive(Debug, Clone)]
pub struct PartitionReport {
    pub period: Period,
    /// Settled areas in traversal order (NE, NW, SE, SW at every level)
    pub settled: Vec<SettledArea>,
    pub external_calls: u64,
    pub cache_hits: u64,
    pub splits: u64,
    pub pruned: u64,
    pub max_depth_reached: u32,
    pub dispositions: FxHashMap<Disposition, u64>,
    pub errors: Vec<ErrorLogEntry>,
}

impl PartitionReport {
    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn total_events(&self) -> u64 {
        self.settled.iter().map(|area| area.event_count).sum()
    }

    /// How many boxes ended with this disposition.
    pub fn count(&self, disposition: Disposition) -> u64 {
        self.dispositions.get(&disposition).copied().unwrap_or(0)
    }

    /// Cache hits as a share of cache hits plus external calls.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.external_calls;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tallies() {
        let mut ctx = TraversalContext::new("2024-01".parse().unwrap());
        ctx.record(Disposition::Pruned);
        ctx.record(Disposition::CacheHit);
        ctx.record(Disposition::CacheHit);
        ctx.record(Disposition::DepthExceeded);
        ctx.external_calls = 2;

        let report = ctx.into_report();
        assert_eq!(report.pruned, 1);
        assert_eq!(report.cache_hits, 2);
        assert_eq!(report.count(Disposition::CacheHit), 2);
        assert_eq!(report.count(Disposition::OverDense), 0);
        assert!((report.cache_hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_report_hit_rate() {
        let report = TraversalContext::new("2024-01".parse().unwrap()).into_report();
        assert_eq!(report.cache_hit_rate(), 0.0);
        assert_eq!(report.settled_count(), 0);
    }

    #[test]
    fn test_error_dispositions() {
        assert!(Disposition::DepthExceeded.is_error());
        assert!(!Disposition::CapacityExceeded.is_error());
        assert!(!Disposition::Pruned.is_error());
    }
}
