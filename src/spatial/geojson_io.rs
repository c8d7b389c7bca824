//! GeoJSON file import

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo_types::Geometry;
use geojson::{GeoJson, JsonObject};

use super::dataset::Dataset;
use super::{SpatialError, WGS84_SRID};

type Row = (Option<Geometry<f64>>, JsonObject);

/// Read a `.geojson` / `.json` file into a dataset
pub fn read_geojson(path: &Path) -> Result<Dataset, SpatialError> {
    let reader = BufReader::new(File::open(path)?);
    let geojson = GeoJson::from_reader(reader).map_err(geojson::Error::from)?;
    to_dataset(geojson)
}

/// Convert a parsed document; a bare Geometry or Feature becomes one row
pub fn to_dataset(geojson: GeoJson) -> Result<Dataset, SpatialError> {
    let (rows, srid) = match geojson {
        GeoJson::FeatureCollection(collection) => {
            let srid = collection.foreign_members.as_ref().and_then(named_crs);
            let rows = collection
                .features
                .into_iter()
                .map(feature_row)
                .collect::<Result<Vec<_>, _>>()?;
            (rows, srid)
        }
        GeoJson::Feature(feature) => {
            let srid = feature.foreign_members.as_ref().and_then(named_crs);
            (vec![feature_row(feature)?], srid)
        }
        GeoJson::Geometry(geometry) => {
            let geometry = Geometry::<f64>::try_from(geometry)?;
            (vec![(Some(geometry), JsonObject::new())], None)
        }
    };
    Ok(Dataset::from_json_rows(rows, srid))
}

fn feature_row(feature: geojson::Feature) -> Result<Row, SpatialError> {
    let geometry = match feature.geometry {
        Some(geometry) => Some(Geometry::<f64>::try_from(geometry)?),
        None => None,
    };
    Ok((geometry, feature.properties.unwrap_or_default()))
}

/// EPSG code from a legacy (GeoJSON 2008) `"crs": {"type": "name", ...}` member
fn named_crs(members: &JsonObject) -> Option<i32> {
    let name = members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    if name.ends_with("CRS84") {
        return Some(WGS84_SRID);
    }
    let (authority, code) = name.rsplit_once(':')?;
    if !authority.to_ascii_uppercase().contains("EPSG") {
        return None;
    }
    code.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::dataset::{AttributeValue, ColumnKind};

    #[test]
    fn test_feature_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("districts.geojson");
        std::fs::write(
            &path,
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [100.5, 13.7]},
                     "properties": {"name": "Bang Rak", "pop": 45000}},
                    {"type": "Feature", "geometry": null,
                     "properties": {"name": "Unknown", "pop": null}}
                ]
            }"#,
        )
        .unwrap();

        let ds = read_geojson(&path).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.srid, None);
        assert_eq!(ds.columns[0].name, "name");
        assert_eq!(ds.columns[1].kind, ColumnKind::Integer);
        assert_eq!(ds.features[0].values[1], AttributeValue::Integer(45000));
        assert!(ds.features[1].geometry.is_none());
    }

    #[test]
    fn test_bare_geometry() {
        let geojson: GeoJson = r#"{"type": "LineString", "coordinates": [[0, 0], [1, 1]]}"#
            .parse()
            .unwrap();
        let ds = to_dataset(geojson).unwrap();
        assert_eq!(ds.len(), 1);
        assert!(ds.columns.is_empty());
        assert!(matches!(ds.features[0].geometry, Some(Geometry::LineString(_))));
    }

    #[test]
    fn test_named_crs() {
        let geojson: GeoJson = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32647"}},
            "features": []
        }"#
        .parse()
        .unwrap();
        assert_eq!(to_dataset(geojson).unwrap().srid, Some(32647));

        let crs84 = serde_json::json!({"crs": {"properties": {"name": "urn:ogc:def:crs:OGC:1.3:CRS84"}}});
        assert_eq!(named_crs(crs84.as_object().unwrap()), Some(4326));
    }

    #[test]
    fn test_invalid_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.geojson");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_geojson(&path), Err(SpatialError::GeoJson(_))));
    }
}
