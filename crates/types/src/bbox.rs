use crate::polygon::{AreaPolygon, LatLon};
use geo::Rect;
use serde::{Deserialize, Serialize};

/// Error returned when bounding box edges are inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundsError {
    /// An edge is NaN or infinite
    NonFinite,
    /// `south` is not strictly below `north`
    InvertedLatitude { north: f64, south: f64 },
    /// `west` is not strictly west of `east`
    InvertedLongitude { east: f64, west: f64 },
    /// An edge lies outside the geographic range
    OutOfRange(f64),
}

impl std::fmt::Display for BoundsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite => write!(f, "bounding box edges must be finite"),
            Self::InvertedLatitude { north, south } => {
                write!(f, "south ({}) must be below north ({})", south, north)
            }
            Self::InvertedLongitude { east, west } => {
                write!(f, "west ({}) must be west of east ({})", west, east)
            }
            Self::OutOfRange(value) => write!(f, "coordinate out of range: {}", value),
        }
    }
}

impl std::error::Error for BoundsError {}

/// A latitude/longitude aligned box, edges in degrees.
///
/// Boxes are created per partition step and never persisted directly; the
/// persisted identity of an area is the key of its [`AreaPolygon`].
///
/// # Examples
///
/// ```
/// use geoband_types::bbox::BoundingBox;
///
/// let bbox = BoundingBox::new(51.7, 51.3, 0.3, -0.5).unwrap();
/// let [ne, nw, se, sw] = bbox.quadrants();
/// assert_eq!(ne.south, nw.south);
/// assert_eq!(se.north, ne.south);
/// assert_eq!(sw.west, bbox.west);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Create a validated bounding box.
    ///
    /// Argument order follows the `(north, south, east, west)` convention used
    /// throughout the partitioner.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self, BoundsError> {
        if ![north, south, east, west].iter().all(|v| v.is_finite()) {
            return Err(BoundsError::NonFinite);
        }

        for lat in [north, south] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(BoundsError::OutOfRange(lat));
            }
        }
        for lon in [east, west] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(BoundsError::OutOfRange(lon));
            }
        }

        if south >= north {
            return Err(BoundsError::InvertedLatitude { north, south });
        }
        if west >= east {
            return Err(BoundsError::InvertedLongitude { east, west });
        }

        Ok(Self {
            north,
            south,
            east,
            west,
        })
    }

    /// Midpoint latitude.
    #[inline]
    pub fn mid_lat(&self) -> f64 {
        (self.north + self.south) / 2.0
    }

    /// Midpoint longitude.
    #[inline]
    pub fn mid_lon(&self) -> f64 {
        (self.east + self.west) / 2.0
    }

    /// Split into four quadrants, ordered NE, NW, SE, SW.
    ///
    /// The children share the parent's midlines exactly, so together they
    /// cover the parent with no gap and overlap only along those lines.
    pub fn quadrants(&self) -> [BoundingBox; 4] {
        let mid_lat = self.mid_lat();
        let mid_lon = self.mid_lon();

        [
            Self::from_edges(self.north, mid_lat, self.east, mid_lon),
            Self::from_edges(self.north, mid_lat, mid_lon, self.west),
            Self::from_edges(mid_lat, self.south, self.east, mid_lon),
            Self::from_edges(mid_lat, self.south, mid_lon, self.west),
        ]
    }

    /// Corner ring in NW, NE, SE, SW order.
    pub fn polygon(&self) -> AreaPolygon {
        AreaPolygon::new([
            LatLon::new(self.north, self.west),
            LatLon::new(self.north, self.east),
            LatLon::new(self.south, self.east),
            LatLon::new(self.south, self.west),
        ])
    }

    /// Convert to a `geo::Rect` with x = longitude and y = latitude.
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            geo::coord! { x: self.west, y: self.south },
            geo::coord! { x: self.east, y: self.north },
        )
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Check whether a coordinate lies inside the box, edges included.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    fn from_edges(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.3}, {:.3}, {:.3}, {:.3})",
            self.north, self.south, self.east, self.west
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn london() -> BoundingBox {
        BoundingBox::new(51.7, 51.3, 0.3, -0.5).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted_edges() {
        assert!(matches!(
            BoundingBox::new(51.3, 51.7, 0.3, -0.5),
            Err(BoundsError::InvertedLatitude { .. })
        ));
        assert!(matches!(
            BoundingBox::new(51.7, 51.3, -0.5, 0.3),
            Err(BoundsError::InvertedLongitude { .. })
        ));
        assert!(matches!(
            BoundingBox::new(51.7, 51.7, 0.3, -0.5),
            Err(BoundsError::InvertedLatitude { .. })
        ));
    }

    #[test]
    fn test_new_rejects_non_finite_and_out_of_range() {
        assert_eq!(
            BoundingBox::new(f64::NAN, 51.3, 0.3, -0.5),
            Err(BoundsError::NonFinite)
        );
        assert_eq!(
            BoundingBox::new(95.0, 51.3, 0.3, -0.5),
            Err(BoundsError::OutOfRange(95.0))
        );
        assert_eq!(
            BoundingBox::new(51.7, 51.3, 200.0, -0.5),
            Err(BoundsError::OutOfRange(200.0))
        );
    }

    #[test]
    fn test_quadrants_follow_split_formula() {
        let bbox = london();
        let mid_lat = (51.7 + 51.3) / 2.0;
        let mid_lon = (0.3 + -0.5) / 2.0;
        let [ne, nw, se, sw] = bbox.quadrants();

        assert_eq!(ne, BoundingBox::from_edges(51.7, mid_lat, 0.3, mid_lon));
        assert_eq!(nw, BoundingBox::from_edges(51.7, mid_lat, mid_lon, -0.5));
        assert_eq!(se, BoundingBox::from_edges(mid_lat, 51.3, 0.3, mid_lon));
        assert_eq!(sw, BoundingBox::from_edges(mid_lat, 51.3, mid_lon, -0.5));
    }

    #[test]
    fn test_quadrants_partition_parent() {
        let bbox = london();
        let quads = bbox.quadrants();

        let north = quads.iter().map(|q| q.north).fold(f64::MIN, f64::max);
        let south = quads.iter().map(|q| q.south).fold(f64::MAX, f64::min);
        let east = quads.iter().map(|q| q.east).fold(f64::MIN, f64::max);
        let west = quads.iter().map(|q| q.west).fold(f64::MAX, f64::min);
        assert_eq!((north, south, east, west), (51.7, 51.3, 0.3, -0.5));

        let total: f64 = quads.iter().map(|q| q.width() * q.height()).sum();
        assert!((total - bbox.width() * bbox.height()).abs() < 1e-12);

        // pairwise interiors are disjoint: overlap extents are zero-width
        for (i, a) in quads.iter().enumerate() {
            for b in quads.iter().skip(i + 1) {
                let overlap_w = (a.east.min(b.east) - a.west.max(b.west)).max(0.0);
                let overlap_h = (a.north.min(b.north) - a.south.max(b.south)).max(0.0);
                assert_eq!(overlap_w * overlap_h, 0.0);
            }
        }
    }

    #[test]
    fn test_to_rect_uses_lon_as_x() {
        let rect = london().to_rect();
        assert_eq!(rect.min().x, -0.5);
        assert_eq!(rect.min().y, 51.3);
        assert_eq!(rect.max().x, 0.3);
        assert_eq!(rect.max().y, 51.7);
    }

    #[test]
    fn test_contains_includes_edges() {
        let bbox = london();
        assert!(bbox.contains(51.5, 0.0));
        assert!(bbox.contains(51.7, -0.5));
        assert!(!bbox.contains(51.8, 0.0));
    }
}
