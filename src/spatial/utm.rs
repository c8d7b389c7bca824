//! UTM zone selection for metric buffering

use geo::Centroid;
use geo_types::Geometry;

const UTM_NORTH_BASE: i32 = 32600;
const UTM_SOUTH_BASE: i32 = 32700;

/// EPSG code of the WGS84 UTM zone containing `(lon, lat)`
///
/// `zone = floor((lon + 186) / 6)`, clamped to 1..=60. Latitude exactly 0
/// falls in the southern series.
pub fn utm_epsg(lon: f64, lat: f64) -> i32 {
    #[allow(clippy::cast_possible_truncation)]
    let zone = ((lon + 186.0) / 6.0).floor().clamp(1.0, 60.0) as i32;
    let base = if lat > 0.0 { UTM_NORTH_BASE } else { UTM_SOUTH_BASE };
    base + zone
}

/// UTM zone for the centroid of a geometry; `None` for empty geometries
pub fn utm_epsg_for(geometry: &Geometry<f64>) -> Option<i32> {
    geometry.centroid().map(|c| utm_epsg(c.x(), c.y()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, polygon, GeometryCollection};

    #[test]
    fn test_utm_epsg() {
        assert_eq!(utm_epsg(-122.0, 37.0), 32610);
        assert_eq!(utm_epsg(151.0, -33.0), 32756);
        assert_eq!(utm_epsg(100.5, 13.75), 32647);
        assert_eq!(utm_epsg(0.0, 0.0), 32731);
    }

    #[test]
    fn test_utm_epsg_clamps_zone() {
        assert_eq!(utm_epsg(-180.0, 10.0), 32601);
        assert_eq!(utm_epsg(180.0, 10.0), 32660);
        assert_eq!(utm_epsg(-200.0, -10.0), 32701);
    }

    #[test]
    fn test_utm_epsg_for_uses_centroid() {
        let square: Geometry<f64> = polygon![
            (x: -123.0, y: 36.0),
            (x: -121.0, y: 36.0),
            (x: -121.0, y: 38.0),
            (x: -123.0, y: 38.0),
        ]
        .into();
        assert_eq!(utm_epsg_for(&square), Some(32610));

        let line: Geometry<f64> = line_string![(x: 150.0, y: -34.0), (x: 152.0, y: -32.0)].into();
        assert_eq!(utm_epsg_for(&line), Some(32756));

        let p: Geometry<f64> = point!(x: -122.0, y: 37.0).into();
        assert_eq!(utm_epsg_for(&p), Some(32610));
    }

    #[test]
    fn test_empty_geometry_has_no_zone() {
        let empty = Geometry::GeometryCollection(GeometryCollection::<f64>(vec![]));
        assert_eq!(utm_epsg_for(&empty), None);
    }
}
