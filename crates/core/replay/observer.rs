//! Progress notifications for batch replays.

use geoband_types::AreaId;

/// How one area of a replay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStatus {
    /// Already populated for the period; no call made
    Cached,
    Fetched,
    Failed { code: Option<u16> },
}

/// One completed area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayProgress {
    /// Position of the area in the submitted list
    pub index: usize,
    pub total: usize,
    /// Row written or found for the replayed period
    pub area_id: Option<AreaId>,
    /// Row of the same polygon in the base period, when replaying known areas
    pub base_area_id: Option<AreaId>,
    pub event_count: u64,
    pub inserted: usize,
    pub status: ReplayStatus,
}

impl ReplayProgress {
    pub fn is_cached(&self) -> bool {
        self.status == ReplayStatus::Cached
    }
}

/// Receives one notification per completed area. Notifications are
/// informational only and cannot influence the replay.
pub trait ReplayObserver {
    fn on_area(&mut self, progress: &ReplayProgress);
}

impl<F: FnMut(&ReplayProgress)> ReplayObserver for F {
    fn on_area(&mut self, progress: &ReplayProgress) {
        self(progress)
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ReplayObserver for NoopObserver {
    fn on_area(&mut self, _progress: &ReplayProgress) {}
}
