//! Rate limiting primitives for the two fetch modes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Fixed pause before every call, for sequential traversals.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sleep for the minimum interval.
    pub async fn wait(&self) {
        if !self.min_interval.is_zero() {
            tokio::time::sleep(self.min_interval).await;
        }
    }
}

/// Counting admission control shared by every task of a concurrent run.
///
/// At most `capacity` calls are in flight at once. A task that cannot be
/// admitted is suspended until a slot frees up; it is never dropped.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
    release_delay: Duration,
}

impl AdmissionGate {
    /// # Panics
    ///
    /// Panics if `capacity` is zero; such a gate would admit nothing.
    pub fn new(capacity: usize, release_delay: Duration) -> Self {
        assert!(capacity > 0, "Admission gate capacity must be greater than zero");
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            release_delay,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot.
    pub async fn admit(&self) -> Result<AdmissionSlot, AcquireError> {
        let permit = Arc::clone(&self.permits).acquire_owned().await?;
        Ok(AdmissionSlot {
            _permit: permit,
            release_delay: self.release_delay,
        })
    }
}

/// A held admission slot. Dropping it frees the slot immediately;
/// [`AdmissionSlot::release`] holds it for the release delay first.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
    release_delay: Duration,
}

impl AdmissionSlot {
    pub async fn release(self) {
        if !self.release_delay.is_zero() {
            tokio::time::sleep(self.release_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_waits_min_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than zero")]
    fn test_gate_rejects_zero_capacity() {
        AdmissionGate::new(0, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_holds_slot_through_release_delay() {
        let gate = AdmissionGate::new(2, Duration::from_millis(100));
        let first = gate.admit().await.unwrap();
        let _second = gate.admit().await.unwrap();
        assert_eq!(gate.available(), 0);

        let start = Instant::now();
        let releasing = tokio::spawn(first.release());
        let _third = gate.admit().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        releasing.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_slot_frees_immediately() {
        let gate = AdmissionGate::new(1, Duration::from_secs(60));
        let slot = gate.admit().await.unwrap();
        assert_eq!(gate.available(), 0);
        drop(slot);
        assert_eq!(gate.available(), 1);
    }
}
