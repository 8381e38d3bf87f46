//! Decoding of the street-level crime response format.
//!
//! ```json
//! [{"category": "burglary", "id": 116208998, "month": "2024-01",
//!   "location": {"latitude": "51.5", "longitude": "-0.1",
//!                "street": {"id": 1, "name": "On or near High Street"}}}]
//! ```

use geoband_types::FetchedEvent;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct WireStreet {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct WireLocation {
    #[serde(default)]
    latitude: Option<WireCoordinate>,
    #[serde(default)]
    longitude: Option<WireCoordinate>,
    #[serde(default)]
    street: Option<WireStreet>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireCoordinate {
    Number(f64),
    Text(String),
}

impl WireCoordinate {
    fn value(&self) -> Option<f64> {
        let value = match self {
            Self::Number(v) => *v,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    location: Option<WireLocation>,
    #[serde(default)]
    month: Option<String>,
}

impl From<WireEvent> for FetchedEvent {
    fn from(event: WireEvent) -> Self {
        let external_id = event.id.and_then(|id| match id {
            WireId::Number(n) => Some(n.to_string()),
            WireId::Text(s) if !s.is_empty() => Some(s),
            WireId::Text(_) => None,
        });
        let (latitude, longitude, location_label) = match event.location {
            Some(location) => (
                location.latitude.as_ref().and_then(WireCoordinate::value),
                location.longitude.as_ref().and_then(WireCoordinate::value),
                location
                    .street
                    .and_then(|street| street.name)
                    .unwrap_or_default(),
            ),
            None => (None, None, String::new()),
        };

        FetchedEvent {
            external_id,
            category: event.category.unwrap_or_default(),
            latitude,
            longitude,
            location_label,
            period: event.month.unwrap_or_default(),
        }
    }
}

/// Decode a JSON array of events.
pub fn decode_events(body: &str) -> Result<Vec<FetchedEvent>, serde_json::Error> {
    let events: Vec<WireEvent> = serde_json::from_str(body)?;
    Ok(events.into_iter().map(FetchedEvent::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_police_format() {
        let body = r#"[
            {"category":"anti-social-behaviour","location_type":"Force",
             "location":{"latitude":"51.513170","street":{"id":1738842,"name":"On or near Parking Area"},"longitude":"-0.135390"},
             "context":"","outcome_status":null,"persistent_id":"","id":116208998,"location_subtype":"","month":"2024-01"},
            {"category":"burglary","location":{"latitude":"51.5","longitude":"-0.1","street":{"name":"On or near High Street"}},
             "id":"abc","month":"2024-01"}
        ]"#;

        let events = decode_events(body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].external_id.as_deref(), Some("116208998"));
        assert_eq!(events[0].latitude, Some(51.51317));
        assert_eq!(events[0].longitude, Some(-0.13539));
        assert_eq!(events[0].location_label, "On or near Parking Area");
        assert_eq!(events[0].period, "2024-01");
        assert_eq!(events[1].external_id.as_deref(), Some("abc"));
        assert_eq!(events[1].category, "burglary");
    }

    #[test]
    fn test_decode_missing_fields() {
        let body = r#"[{"category":"drugs","location":{"latitude":"n/a","longitude":null},"month":"2024-02"}, {}]"#;
        let events = decode_events(body).unwrap();
        assert_eq!(events[0].external_id, None);
        assert_eq!(events[0].latitude, None);
        assert_eq!(events[0].longitude, None);
        assert_eq!(events[0].location_label, "");
        assert_eq!(events[1].category, "");
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(decode_events(r#"{"error":"too many"}"#).is_err());
        assert!(decode_events("").is_err());
    }
}
