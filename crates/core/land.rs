//! Land-boundary collaborators used to prune boxes that cover only sea.

use crate::error::{GeobandError, Result};
use geo::{BoundingRect, Intersects, LineString, MultiPolygon, Polygon, Rect};
use geoband_types::BoundingBox;
use geojson::{GeoJson, Geometry, Value};

/// Answers whether a box touches land.
pub trait LandBoundary: Send + Sync {
    fn intersects_land(&self, bbox: &BoundingBox) -> bool;
}

impl<F> LandBoundary for F
where
    F: Fn(&BoundingBox) -> bool + Send + Sync,
{
    fn intersects_land(&self, bbox: &BoundingBox) -> bool {
        self(bbox)
    }
}

/// Treats every box as land. Nothing is pruned.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyLand;

impl LandBoundary for AnyLand {
    fn intersects_land(&self, _bbox: &BoundingBox) -> bool {
        true
    }
}

/// Land described by polygons in lon/lat order.
#[derive(Debug, Clone)]
pub struct GeometryBoundary {
    land: MultiPolygon<f64>,
    extent: Option<Rect<f64>>,
}

impl GeometryBoundary {
    pub fn new(land: MultiPolygon<f64>) -> Self {
        let extent = land.bounding_rect();
        Self { land, extent }
    }

    /// Collect every Polygon and MultiPolygon in a GeoJSON document.
    ///
    /// Features, feature collections and bare geometries are accepted;
    /// other geometry types are skipped.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| GeobandError::InvalidGeometry(format!("Failed to parse GeoJSON: {}", e)))?;

        let mut polygons = Vec::new();
        match geojson {
            GeoJson::Geometry(geometry) => collect_polygons(&geometry, &mut polygons)?,
            GeoJson::Feature(feature) => {
                if let Some(geometry) = &feature.geometry {
                    collect_polygons(geometry, &mut polygons)?;
                }
            }
            GeoJson::FeatureCollection(collection) => {
                for feature in &collection.features {
                    if let Some(geometry) = &feature.geometry {
                        collect_polygons(geometry, &mut polygons)?;
                    }
                }
            }
        }

        if polygons.is_empty() {
            return Err(GeobandError::InvalidGeometry(
                "GeoJSON contains no polygons".to_string(),
            ));
        }

        log::debug!("Loaded land boundary with {} polygons", polygons.len());
        Ok(Self::new(MultiPolygon::new(polygons)))
    }

    pub fn polygon_count(&self) -> usize {
        self.land.0.len()
    }
}

impl LandBoundary for GeometryBoundary {
    fn intersects_land(&self, bbox: &BoundingBox) -> bool {
        let rect = bbox.to_rect();
        match &self.extent {
            Some(extent) if rect.intersects(extent) => {
                self.land.0.iter().any(|polygon| polygon.intersects(&rect))
            }
            _ => false,
        }
    }
}

fn collect_polygons(geometry: &Geometry, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match &geometry.value {
        Value::Polygon(rings) => out.push(polygon_from_rings(rings)?),
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                out.push(polygon_from_rings(rings)?);
            }
        }
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_polygons(geometry, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| ring_from_positions(ring));
    let exterior = rings
        .next()
        .ok_or_else(|| GeobandError::InvalidGeometry("Polygon has no rings".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    if positions.len() < 4 {
        return Err(GeobandError::InvalidGeometry(format!(
            "Ring must have at least 4 positions, got {}",
            positions.len()
        )));
    }
    positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok((*x, *y)),
            _ => Err(GeobandError::InvalidGeometry(
                "Position must have at least 2 coordinates".to_string(),
            )),
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISLAND: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"name": "island"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-1.0, 51.0], [0.0, 51.0], [0.0, 52.0], [-1.0, 52.0], [-1.0, 51.0]]]
            }
        }, {
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "Point", "coordinates": [5.0, 5.0]}
        }]
    }"#;

    #[test]
    fn test_geometry_boundary_from_geojson() {
        let land = GeometryBoundary::from_geojson_str(ISLAND).unwrap();
        assert_eq!(land.polygon_count(), 1);

        let overlapping = BoundingBox::new(51.7, 51.3, 0.3, -0.5).unwrap();
        assert!(land.intersects_land(&overlapping));

        let at_sea = BoundingBox::new(50.0, 49.0, 3.0, 2.0).unwrap();
        assert!(!land.intersects_land(&at_sea));
    }

    #[test]
    fn test_inside_extent_but_off_polygon() {
        // L-shaped land: the extent covers the empty corner, the polygon does not
        let geojson = r#"{"type": "Polygon", "coordinates": [[
            [0.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0], [1.0, 2.0], [0.0, 2.0], [0.0, 0.0]
        ]]}"#;
        let land = GeometryBoundary::from_geojson_str(geojson).unwrap();
        let corner = BoundingBox::new(1.9, 1.5, 1.9, 1.5).unwrap();
        assert!(!land.intersects_land(&corner));
        let arm = BoundingBox::new(0.5, 0.2, 1.9, 1.5).unwrap();
        assert!(land.intersects_land(&arm));
    }

    #[test]
    fn test_rejects_documents_without_polygons() {
        let point = r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#;
        assert!(matches!(
            GeometryBoundary::from_geojson_str(point),
            Err(GeobandError::InvalidGeometry(_))
        ));
        assert!(GeometryBoundary::from_geojson_str("not json").is_err());
    }

    #[test]
    fn test_closure_and_any_land() {
        let north_only = |bbox: &BoundingBox| bbox.south >= 0.0;
        let bbox = BoundingBox::new(10.0, 5.0, 1.0, 0.0).unwrap();
        assert!(north_only.intersects_land(&bbox));
        assert!(AnyLand.intersects_land(&bbox));
    }
}
