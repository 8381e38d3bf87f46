//! # geoband-types
//!
//! Core data types for adaptive area partitioning.
//!
//! This crate provides the plain data model shared by the partitioner, the
//! cache store and the query service adapters:
//!
//! - **Geometry**: `BoundingBox`, `LatLon`, `AreaPolygon`
//! - **Time keys**: `Period` (`"YYYY-MM"`)
//! - **Records**: `AreaRecord`, `EventRecord`, `FetchedEvent`, `ErrorLogEntry`
//!
//! All types are serializable with Serde. Bounding boxes convert to the `geo`
//! crate's `Rect` for intersection tests.
//!
//! ## Examples
//!
//! ```rust
//! use geoband_types::bbox::BoundingBox;
//! use geoband_types::period::Period;
//!
//! let london = BoundingBox::new(51.7, 51.3, 0.3, -0.5).unwrap();
//! let period: Period = "2024-01".parse().unwrap();
//!
//! assert_eq!(
//!     london.polygon().key(),
//!     "51.7,-0.5:51.7,0.3:51.3,0.3:51.3,-0.5"
//! );
//! assert_eq!(period.to_string(), "2024-01");
//! ```

pub mod bbox;
pub mod period;
pub mod polygon;
pub mod record;

pub use bbox::{BoundingBox, BoundsError};
pub use period::{Period, PeriodError};
pub use polygon::{AreaPolygon, LatLon, PolygonKeyError};
pub use record::{AreaId, AreaRecord, ErrorKind, ErrorLogEntry, EventRecord, FetchedEvent};
