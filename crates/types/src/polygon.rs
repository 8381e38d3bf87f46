use crate::bbox::{BoundingBox, BoundsError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Error returned when a polygon key cannot be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum PolygonKeyError {
    /// The key does not hold exactly four `lat,lon` pairs
    VertexCount(usize),
    /// A vertex is not a `lat,lon` pair of numbers
    InvalidVertex(String),
    /// The vertices do not describe a valid box
    Bounds(BoundsError),
}

impl std::fmt::Display for PolygonKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VertexCount(n) => write!(f, "polygon key must have 4 vertices, got {}", n),
            Self::InvalidVertex(v) => write!(f, "invalid polygon vertex: '{}'", v),
            Self::Bounds(e) => write!(f, "invalid polygon bounds: {}", e),
        }
    }
}

impl std::error::Error for PolygonKeyError {}

/// A single polygon vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A four-vertex ring derived from a [`BoundingBox`], corners ordered NW, NE,
/// SE, SW.
///
/// The ring serializes to the canonical key `"lat,lon:lat,lon:lat,lon:lat,lon"`
/// which is both the query-service polygon parameter and the cache identity
/// of an area. Two boxes with identical edges always produce identical keys.
///
/// # Examples
///
/// ```
/// use geoband_types::polygon::AreaPolygon;
///
/// let polygon: AreaPolygon = "52.0,-1.0:52.0,1.0:51.0,1.0:51.0,-1.0".parse().unwrap();
/// assert_eq!(polygon.key(), "52.0,-1.0:52.0,1.0:51.0,1.0:51.0,-1.0");
/// assert_eq!(polygon.bounds().unwrap().north, 52.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaPolygon {
    vertices: [LatLon; 4],
}

impl AreaPolygon {
    pub fn new(vertices: [LatLon; 4]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[LatLon; 4] {
        &self.vertices
    }

    /// Canonical string key of the ring.
    pub fn key(&self) -> String {
        let mut key = String::with_capacity(80);
        for (i, vertex) in self.vertices.iter().enumerate() {
            if i > 0 {
                key.push(':');
            }
            push_coordinate(&mut key, vertex.lat);
            key.push(',');
            push_coordinate(&mut key, vertex.lon);
        }
        key
    }

    /// Recover the bounding box spanned by the ring.
    pub fn bounds(&self) -> Result<BoundingBox, BoundsError> {
        let lats = self.vertices.iter().map(|v| v.lat);
        let lons = self.vertices.iter().map(|v| v.lon);

        let north = lats.clone().fold(f64::MIN, f64::max);
        let south = lats.fold(f64::MAX, f64::min);
        let east = lons.clone().fold(f64::MIN, f64::max);
        let west = lons.fold(f64::MAX, f64::min);

        BoundingBox::new(north, south, east, west)
    }
}

impl std::fmt::Display for AreaPolygon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for AreaPolygon {
    type Err = PolygonKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pairs: Vec<&str> = s.trim().split(':').collect();
        if pairs.len() != 4 {
            return Err(PolygonKeyError::VertexCount(pairs.len()));
        }

        let mut vertices = [LatLon::new(0.0, 0.0); 4];
        for (slot, pair) in vertices.iter_mut().zip(pairs) {
            let (lat, lon) = pair
                .split_once(',')
                .ok_or_else(|| PolygonKeyError::InvalidVertex(pair.to_string()))?;
            let lat: f64 = lat
                .trim()
                .parse()
                .map_err(|_| PolygonKeyError::InvalidVertex(pair.to_string()))?;
            let lon: f64 = lon
                .trim()
                .parse()
                .map_err(|_| PolygonKeyError::InvalidVertex(pair.to_string()))?;
            *slot = LatLon::new(lat, lon);
        }

        let polygon = Self::new(vertices);
        polygon.bounds().map_err(PolygonKeyError::Bounds)?;
        Ok(polygon)
    }
}

/// Shortest round-trip decimal; integral values keep a `.0` suffix so keys
/// stay stable against stores written before this formatter existed.
/// Magnitudes below 1e-4 use an exponent of at least two digits
/// (`3.0517578125e-05`), the same spelling those stores used.
fn push_coordinate(buf: &mut String, value: f64) {
    use std::fmt::Write;

    if value != 0.0 && value.abs() < 1e-4 {
        let scientific = format!("{:e}", value);
        if let Some((mantissa, exponent)) = scientific.split_once('e') {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            let _ = write!(buf, "{}e{}{:0>2}", mantissa, sign, digits);
            return;
        }
    }

    let start = buf.len();
    let _ = write!(buf, "{}", value);
    let written = &buf[start..];
    if value.is_finite() && !written.contains('.') {
        buf.push_str(".0");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_matches_service_format() {
        let bbox = BoundingBox::new(51.7, 51.3, 0.3, -0.5).unwrap();
        assert_eq!(
            bbox.polygon().key(),
            "51.7,-0.5:51.7,0.3:51.3,0.3:51.3,-0.5"
        );
    }

    #[test]
    fn test_integral_coordinates_keep_fraction() {
        let bbox = BoundingBox::new(52.0, 50.0, 1.0, -1.0).unwrap();
        assert_eq!(bbox.polygon().key(), "52.0,-1.0:52.0,1.0:50.0,1.0:50.0,-1.0");

        let zero = BoundingBox::new(1.0, -1.0, 0.0, -2.0).unwrap();
        assert!(zero.polygon().key().contains("1.0,0.0"));
    }

    #[test]
    fn test_tiny_coordinates_use_two_digit_exponents() {
        let bbox = BoundingBox::new(0.001, 0.000030517578125, 1.0, 0.00001).unwrap();
        let key = bbox.polygon().key();
        assert_eq!(
            key,
            "0.001,1e-05:0.001,1.0:3.0517578125e-05,1.0:3.0517578125e-05,1e-05"
        );

        let parsed: AreaPolygon = key.parse().unwrap();
        assert_eq!(parsed.bounds().unwrap(), bbox);

        // 1e-4 itself is still written in positional form
        let edge = BoundingBox::new(0.5, 0.0001, 1.0, -0.00002).unwrap();
        assert_eq!(edge.polygon().key(), "0.5,-2e-05:0.5,1.0:0.0001,1.0:0.0001,-2e-05");
    }

    #[test]
    fn test_key_is_deterministic_for_identical_boxes() {
        let a = BoundingBox::new(51.7, 51.3, 0.3, -0.5).unwrap().quadrants()[2];
        let b = BoundingBox::new(51.7, 51.3, 0.3, -0.5).unwrap().quadrants()[2];
        assert_eq!(a.polygon().key(), b.polygon().key());
    }

    #[test]
    fn test_parse_recovers_child_box_exactly() {
        let parent = BoundingBox::new(55.8, 49.0, 1.8, -5.7).unwrap();
        for child in parent.quadrants() {
            for grandchild in child.quadrants() {
                let key = grandchild.polygon().key();
                let parsed: AreaPolygon = key.parse().unwrap();
                assert_eq!(parsed.bounds().unwrap(), grandchild);
                assert_eq!(parsed.key(), key);
            }
        }
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert_eq!(
            "51.7,-0.5:51.7,0.3:51.3,0.3".parse::<AreaPolygon>(),
            Err(PolygonKeyError::VertexCount(3))
        );
        assert!(matches!(
            "51.7,-0.5:51.7;0.3:51.3,0.3:51.3,-0.5".parse::<AreaPolygon>(),
            Err(PolygonKeyError::InvalidVertex(_))
        ));
        assert!(matches!(
            "51.7,x:51.7,0.3:51.3,0.3:51.3,-0.5".parse::<AreaPolygon>(),
            Err(PolygonKeyError::InvalidVertex(_))
        ));
        assert!(matches!(
            "51.7,0.3:51.7,0.3:51.7,0.3:51.7,0.3".parse::<AreaPolygon>(),
            Err(PolygonKeyError::Bounds(_))
        ));
    }
}
