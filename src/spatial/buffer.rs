//! Metric buffering in the local UTM zone
//!
//! The buffer itself is computed by PostGIS; this module validates the
//! input, picks the projection and shapes the response.

use geo_types::Geometry;
use geojson::GeoJson;
use serde_json::{json, Value};

use super::{utm, SpatialError};

/// Validated buffer input
#[derive(Debug, Clone, PartialEq)]
pub struct BufferPlan {
    /// GeoJSON geometry text handed to `ST_GeomFromGeoJSON`
    pub geometry_json: String,
    /// Projected SRID the buffer is computed in
    pub epsg: i32,
    /// Metres
    pub distance: f64,
}

/// Accept a GeoJSON Geometry or Feature and choose its UTM zone
pub fn plan(input: &Value, distance: f64) -> Result<BufferPlan, SpatialError> {
    if !distance.is_finite() {
        return Err(SpatialError::InvalidGeometry(format!(
            "distance must be a finite number of metres, got {distance}"
        )));
    }

    let geometry = match GeoJson::from_json_value(input.clone())? {
        GeoJson::Geometry(geometry) => geometry,
        GeoJson::Feature(feature) => feature.geometry.ok_or_else(|| {
            SpatialError::InvalidGeometry("feature has no geometry".to_string())
        })?,
        GeoJson::FeatureCollection(_) => {
            return Err(SpatialError::InvalidGeometry(
                "expected a Geometry or Feature, got a FeatureCollection".to_string(),
            ))
        }
    };

    let shape = Geometry::<f64>::try_from(geometry.clone())?;
    let epsg = utm::utm_epsg_for(&shape)
        .ok_or_else(|| SpatialError::InvalidGeometry("geometry is empty".to_string()))?;
    let geometry_json = serde_json::to_string(&geometry)
        .map_err(|e| SpatialError::InvalidGeometry(e.to_string()))?;

    Ok(BufferPlan {
        geometry_json,
        epsg,
        distance,
    })
}

/// Wrap the buffered geometry returned by PostGIS into a Feature
pub fn to_feature(plan: &BufferPlan, buffered: Value) -> Value {
    json!({
        "type": "Feature",
        "geometry": buffered,
        "properties": {
            "distance": plan.distance,
            "epsg": plan.epsg,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_point() {
        let input = json!({"type": "Point", "coordinates": [-122.0, 37.0]});
        let plan = plan(&input, 250.0).unwrap();
        assert_eq!(plan.epsg, 32610);
        assert_eq!(plan.distance, 250.0);
        let round_trip: Value = serde_json::from_str(&plan.geometry_json).unwrap();
        assert_eq!(round_trip["type"], "Point");
    }

    #[test]
    fn test_plan_feature() {
        let input = json!({
            "type": "Feature",
            "geometry": {"type": "LineString", "coordinates": [[150.9, -33.9], [151.1, -33.8]]},
            "properties": {"name": "Harbour"}
        });
        assert_eq!(plan(&input, 10.0).unwrap().epsg, 32756);
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        let point = json!({"type": "Point", "coordinates": [0.0, 0.0]});
        assert!(matches!(plan(&point, f64::NAN), Err(SpatialError::InvalidGeometry(_))));
        assert!(matches!(plan(&point, f64::INFINITY), Err(SpatialError::InvalidGeometry(_))));

        let not_geojson = json!({"type": "Circle", "radius": 3});
        assert!(matches!(plan(&not_geojson, 1.0), Err(SpatialError::GeoJson(_))));

        let no_geometry = json!({"type": "Feature", "geometry": null, "properties": {}});
        assert!(matches!(plan(&no_geometry, 1.0), Err(SpatialError::InvalidGeometry(_))));

        let empty = json!({"type": "MultiPoint", "coordinates": []});
        assert!(matches!(plan(&empty, 1.0), Err(SpatialError::InvalidGeometry(_))));
    }

    #[test]
    fn test_to_feature() {
        let plan = BufferPlan {
            geometry_json: String::new(),
            epsg: 32647,
            distance: 100.0,
        };
        let feature = to_feature(&plan, json!({"type": "Polygon", "coordinates": []}));
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["properties"]["epsg"], 32647);
        assert_eq!(feature["properties"]["distance"], 100.0);
    }

    #[tokio::test]
    async fn test_buffer_area_close_to_circle() {
        let Some(db) = crate::db::test_database().await else {
            return;
        };
        let distance = 1000.0;
        let input = json!({"type": "Point", "coordinates": [100.5018, 13.7563]});
        let plan = plan(&input, distance).unwrap();
        let buffered = crate::db::query::buffer_geometry(
            db.pool(),
            &plan.geometry_json,
            plan.epsg,
            plan.distance,
        )
        .await
        .unwrap();

        let area = crate::db::query::projected_area(db.pool(), &buffered, plan.epsg)
            .await
            .unwrap();
        let expected = std::f64::consts::PI * distance * distance;
        assert!(((area - expected) / expected).abs() < 0.01, "area {area} vs {expected}");
    }
}
