//! Stored records: settled areas, attributed events and error-log entries.

use crate::period::Period;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Identifier of a stored area row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(pub u64);

impl std::fmt::Display for AreaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A settled area for one period.
///
/// `(polygon_key, period)` is unique within a store. Rows are written once
/// and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    pub id: AreaId,
    pub polygon_key: String,
    pub event_count: u64,
    pub period: Period,
    pub created_at: SystemTime,
}

/// An event as returned by the query service, not yet attributed to an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedEvent {
    /// Service identifier; events without one cannot be stored
    pub external_id: Option<String>,
    pub category: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_label: String,
    pub period: String,
}

/// A stored event, owned by exactly one area row.
///
/// `external_id` is unique across the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub external_id: String,
    pub area_id: AreaId,
    pub category: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_label: String,
    pub period: String,
}

impl EventRecord {
    /// Attribute a fetched event to an area. Returns `None` when the event
    /// carries no external identifier.
    pub fn attribute(area_id: AreaId, event: &FetchedEvent) -> Option<Self> {
        let external_id = event.external_id.clone()?;
        Some(Self {
            external_id,
            area_id,
            category: event.category.clone(),
            latitude: event.latitude,
            longitude: event.longitude,
            location_label: event.location_label.clone(),
            period: event.period.clone(),
        })
    }
}

/// Kind of abnormal outcome recorded in the error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Recursion stopped at the depth bound; the branch is a coverage gap
    DepthExceeded,
    /// The service failed for a reason other than capacity
    TransientFailure,
    /// The service refused an area that could not be split further
    CapacityExceeded,
    /// Settling an area failed; its result was dropped
    PersistenceFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DepthExceeded => "DEPTH_EXCEEDED",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::PersistenceFailure => "PERSISTENCE_FAILURE",
        };
        f.write_str(name)
    }
}

/// Append-only audit entry for an abnormal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: SystemTime,
    pub kind: ErrorKind,
    pub status_code: Option<u16>,
    pub period: Period,
    pub polygon_key: Option<String>,
    pub message: String,
    pub depth: u32,
}

impl ErrorLogEntry {
    pub fn new(kind: ErrorKind, period: Period, depth: u32, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            kind,
            status_code: None,
            period,
            polygon_key: None,
            message: message.into(),
            depth,
        }
    }

    pub fn with_status(mut self, status_code: Option<u16>) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_polygon(mut self, polygon_key: impl Into<String>) -> Self {
        self.polygon_key = Some(polygon_key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(id: Option<&str>) -> FetchedEvent {
        FetchedEvent {
            external_id: id.map(str::to_string),
            category: "burglary".into(),
            latitude: Some(51.5),
            longitude: Some(-0.1),
            location_label: "On or near High Street".into(),
            period: "2024-01".into(),
        }
    }

    #[test]
    fn test_attribute_requires_external_id() {
        assert!(EventRecord::attribute(AreaId(1), &fetched(None)).is_none());

        let record = EventRecord::attribute(AreaId(7), &fetched(Some("abc"))).unwrap();
        assert_eq!(record.external_id, "abc");
        assert_eq!(record.area_id, AreaId(7));
        assert_eq!(record.category, "burglary");
    }

    #[test]
    fn test_error_kind_serializes_as_tag() {
        let json = serde_json::to_string(&ErrorKind::DepthExceeded).unwrap();
        assert_eq!(json, "\"DEPTH_EXCEEDED\"");
        assert_eq!(ErrorKind::TransientFailure.to_string(), "TRANSIENT_FAILURE");
    }

    #[test]
    fn test_error_entry_builders() {
        let period: Period = "2024-01".parse().unwrap();
        let entry = ErrorLogEntry::new(ErrorKind::TransientFailure, period, 3, "timeout")
            .with_status(Some(500))
            .with_polygon("1.0,1.0:1.0,2.0:0.0,2.0:0.0,1.0");
        assert_eq!(entry.status_code, Some(500));
        assert_eq!(entry.depth, 3);
        assert!(entry.polygon_key.is_some());
    }
}
