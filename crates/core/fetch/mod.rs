//! Rate-limited access to the external event query service.
//!
//! [`Fetcher::fetch`] never fails: every service error, timeout or decode
//! problem is folded into an [`Outcome`] whose [`FetchStatus`] the caller
//! branches on.

use crate::config::FetchConfig;
use geoband_types::{AreaPolygon, FetchedEvent, Period};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[cfg(feature = "http")]
mod http;
mod limiter;
pub mod wire;

#[cfg(feature = "http")]
pub use http::HttpQueryService;
pub use limiter::{AdmissionGate, AdmissionSlot, RateLimiter};

/// One query against the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub period: Period,
    /// Polygon key of the area, `"lat,lon:lat,lon:..."`
    pub polygon: String,
}

/// Errors reported by a query service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service refused the area as too large to answer
    #[error("Result cap exceeded")]
    CapacityExceeded,

    #[error("Unexpected status {code}")]
    Status { code: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code } => Some(*code),
            _ => None,
        }
    }
}

/// An external event query service.
pub trait QueryService: Send + Sync {
    fn query(
        &self,
        request: QueryRequest,
    ) -> impl Future<Output = Result<Vec<FetchedEvent>, ServiceError>> + Send;
}

impl<T: QueryService> QueryService for Arc<T> {
    fn query(
        &self,
        request: QueryRequest,
    ) -> impl Future<Output = Result<Vec<FetchedEvent>, ServiceError>> + Send {
        T::query(self, request)
    }
}

/// Classified result of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    CapacityExceeded,
    Failure { code: Option<u16>, reason: String },
}

/// What a fetch produced. `records` and `count` are only meaningful on success.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: FetchStatus,
    pub records: Vec<FetchedEvent>,
    pub count: u64,
}

impl Outcome {
    fn success(records: Vec<FetchedEvent>) -> Self {
        Self {
            status: FetchStatus::Success,
            count: records.len() as u64,
            records,
        }
    }

    fn capacity_exceeded() -> Self {
        Self {
            status: FetchStatus::CapacityExceeded,
            records: Vec::new(),
            count: 0,
        }
    }

    fn failure(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status: FetchStatus::Failure {
                code,
                reason: reason.into(),
            },
            records: Vec::new(),
            count: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}

/// How calls are paced
#[derive(Debug, Clone)]
pub enum FetchMode {
    /// One call at a time with a fixed delay before each
    Sequential(RateLimiter),
    /// Many calls in flight, bounded by a shared gate
    Concurrent(AdmissionGate),
}

/// Rate-limited fetcher over a query service.
///
/// Clones share the service, the admission gate and the call counter.
pub struct Fetcher<S> {
    service: Arc<S>,
    mode: FetchMode,
    max_results: usize,
    calls: Arc<AtomicU64>,
}

impl<S> Clone for Fetcher<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            mode: self.mode.clone(),
            max_results: self.max_results,
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<S: QueryService> Fetcher<S> {
    pub fn new(service: Arc<S>, mode: FetchMode, max_results: usize) -> Self {
        Self {
            service,
            mode,
            max_results,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sequential fetcher paced by `config.sequential_delay`.
    pub fn sequential(service: Arc<S>, config: &FetchConfig) -> Self {
        Self::new(
            service,
            FetchMode::Sequential(RateLimiter::new(config.sequential_delay())),
            config.max_results_per_request,
        )
    }

    /// Concurrent fetcher with a gate sized at the rate ceiling.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_calls_per_second` is zero.
    pub fn concurrent(service: Arc<S>, config: &FetchConfig) -> Self {
        let gate = AdmissionGate::new(config.max_calls_per_second, config.release_delay());
        Self::with_gate(service, gate, config.max_results_per_request)
    }

    /// Concurrent fetcher sharing an existing gate.
    pub fn with_gate(service: Arc<S>, gate: AdmissionGate, max_results: usize) -> Self {
        Self::new(service, FetchMode::Concurrent(gate), max_results)
    }

    pub fn mode(&self) -> &FetchMode {
        &self.mode
    }

    /// External calls made through this fetcher and its clones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Query the service for one area and period.
    pub async fn fetch(&self, polygon: &AreaPolygon, period: Period) -> Outcome {
        let request = QueryRequest {
            period,
            polygon: polygon.key(),
        };

        let result = match &self.mode {
            FetchMode::Sequential(limiter) => {
                limiter.wait().await;
                self.call(request).await
            }
            FetchMode::Concurrent(gate) => {
                let slot = match gate.admit().await {
                    Ok(slot) => slot,
                    Err(e) => return Outcome::failure(None, e.to_string()),
                };
                let result = self.call(request).await;
                slot.release().await;
                result
            }
        };

        self.classify(result)
    }

    async fn call(&self, request: QueryRequest) -> Result<Vec<FetchedEvent>, ServiceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.service.query(request).await
    }

    fn classify(&self, result: Result<Vec<FetchedEvent>, ServiceError>) -> Outcome {
        match result {
            Ok(records) if records.len() > self.max_results => {
                log::debug!(
                    "Response of {} records exceeds the cap of {}",
                    records.len(),
                    self.max_results
                );
                Outcome::capacity_exceeded()
            }
            Ok(records) => Outcome::success(records),
            Err(ServiceError::CapacityExceeded) => Outcome::capacity_exceeded(),
            Err(e) => Outcome::failure(e.status_code(), e.to_string()),
        }
    }
}
