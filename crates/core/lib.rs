//! Adaptive spatial partitioning against a capacity-limited, rate-limited
//! event query service.
//!
//! ## Features
//! - **Quadrant partitioning**: boxes are split until their event count fits a
//!   target band, with sea-only boxes pruned before any call
//! - **Rate limiting**: a fixed delay for sequential traversals, a shared
//!   admission gate for concurrent batches
//! - **Idempotent cache**: settled areas and their events are stored once, so
//!   repeating a run is answered from the store
//! - **Batch replay**: areas found for one month are fetched concurrently for
//!   other months
//!
//! ```rust
//! use geoband::{
//!     AnyLand, AreaPartitioner, BoundingBox, Config, FetchConfig, FetchedEvent, Fetcher,
//!     QueryRequest, QueryService, ServiceError, Store,
//! };
//! use std::sync::Arc;
//!
//! struct Quiet;
//!
//! impl QueryService for Quiet {
//!     async fn query(&self, _request: QueryRequest) -> Result<Vec<FetchedEvent>, ServiceError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> geoband::Result<()> {
//! let config = Config::default().with_fetch(FetchConfig::unpaced());
//! let fetcher = Fetcher::sequential(Arc::new(Quiet), &config.fetch);
//! let partitioner = AreaPartitioner::new(config, fetcher, AnyLand);
//!
//! let store = Store::memory();
//! let mut session = store.session()?;
//! let london = BoundingBox::new(51.7, 51.3, 0.3, -0.5)?;
//! let report = partitioner.run(&mut session, london, "2024-01".parse()?).await;
//! session.close()?;
//!
//! assert_eq!(report.settled_count(), 1);
//! assert_eq!(report.external_calls, 1);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod fetch;
pub mod land;
pub mod partition;
pub mod replay;
pub mod storage;

pub use builder::StoreBuilder;
pub use config::{Config, FailurePolicy, FetchConfig};
pub use error::{GeobandError, Result};

pub use fetch::{
    AdmissionGate, FetchMode, FetchStatus, Fetcher, Outcome, QueryRequest, QueryService,
    RateLimiter, ServiceError,
};
#[cfg(feature = "http")]
pub use fetch::HttpQueryService;

pub use land::{AnyLand, GeometryBoundary, LandBoundary};
pub use partition::{AreaPartitioner, Disposition, PartitionReport, SettledArea, TraversalContext};
pub use replay::{
    AreaReplay, BatchReplayer, NoopObserver, ReplayObserver, ReplayProgress, ReplayReport,
    ReplayStatus,
};
pub use storage::{
    CacheStore, LogStore, MemoryStore, PeriodStats, Session, SessionStats, Store, StoreStats,
};

pub use geoband_types::{
    AreaId, AreaPolygon, AreaRecord, BoundingBox, ErrorKind, ErrorLogEntry, EventRecord,
    FetchedEvent, LatLon, Period,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{GeobandError, Result, Store, StoreBuilder};

    pub use crate::{AreaPartitioner, BatchReplayer, Fetcher, QueryService};

    pub use crate::{AnyLand, GeometryBoundary, LandBoundary};

    pub use crate::{Config, FailurePolicy, FetchConfig};

    pub use crate::{AreaPolygon, BoundingBox, Period};
}
