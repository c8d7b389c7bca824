//! EPSG detection from `.prj` WKT
//!
//! Shapefiles written by GDAL carry an `AUTHORITY` clause; ESRI tools write
//! bare names. Only the handful of ESRI names seen in practice are mapped.

use std::path::Path;

use super::{SpatialError, WEB_MERCATOR_SRID, WGS84_SRID};

/// Read the `.prj` next to `shp_path`, if any, and detect its EPSG code
pub fn detect_srid_for(shp_path: &Path) -> Result<Option<i32>, SpatialError> {
    let prj_path = shp_path.with_extension("prj");
    if !prj_path.is_file() {
        return Ok(None);
    }
    let wkt = std::fs::read_to_string(&prj_path)?;
    Ok(detect_srid(&wkt))
}

/// Detect the EPSG code of a WKT coordinate system definition
pub fn detect_srid(wkt: &str) -> Option<i32> {
    if let Some(code) = authority_code(wkt) {
        return Some(code);
    }

    let normalized = wkt.to_ascii_uppercase().replace([' ', '-'], "_");
    let top_level = if normalized.trim_start().starts_with("PROJCS") {
        quoted_name(&normalized)?
    } else {
        let name = quoted_name(&normalized)?;
        return match name.as_str() {
            "GCS_WGS_1984" | "WGS_84" | "WGS_1984" => Some(WGS84_SRID),
            "GCS_NORTH_AMERICAN_1983" | "NAD83" => Some(4269),
            "GCS_ETRS_1989" | "ETRS89" => Some(4258),
            _ => None,
        };
    };

    if top_level.contains("WEB_MERCATOR") || top_level.contains("PSEUDO_MERCATOR") {
        return Some(WEB_MERCATOR_SRID);
    }
    utm_code(&top_level)
}

/// Last `AUTHORITY["EPSG","n"]` (WKT1) or `ID["EPSG",n]` (WKT2) clause
///
/// The top-level CRS closes last, so its authority is the final one.
fn authority_code(wkt: &str) -> Option<i32> {
    let upper = wkt.to_ascii_uppercase();
    let mut best: Option<(usize, i32)> = None;
    for marker in ["AUTHORITY[", "ID["] {
        for (pos, _) in upper.match_indices(marker) {
            let clause = &upper[pos + marker.len()..];
            let Some(end) = clause.find(']') else {
                continue;
            };
            let mut parts = clause[..end].split(',').map(|p| p.trim().trim_matches('"'));
            if parts.next() != Some("EPSG") {
                continue;
            }
            if let Some(code) = parts.next().and_then(|c| c.parse::<i32>().ok()) {
                if best.is_none_or(|(p, _)| pos > p) {
                    best = Some((pos, code));
                }
            }
        }
    }
    best.map(|(_, code)| code)
}

/// First double-quoted string
fn quoted_name(wkt: &str) -> Option<String> {
    let start = wkt.find('"')? + 1;
    let len = wkt[start..].find('"')?;
    Some(wkt[start..start + len].to_string())
}

/// `WGS_1984_UTM_ZONE_47N` / `WGS_84_/_UTM_ZONE_56S` → 326xx / 327xx
fn utm_code(name: &str) -> Option<i32> {
    if !(name.starts_with("WGS_1984") || name.starts_with("WGS_84")) {
        return None;
    }
    let idx = name.find("UTM_ZONE_")? + "UTM_ZONE_".len();
    let tail = &name[idx..];
    let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
    let zone: i32 = digits.parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }
    match tail[digits.len()..].chars().next()? {
        'N' => Some(32600 + zone),
        'S' => Some(32700 + zone),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESRI_WGS84: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    const ESRI_UTM47N: &str = r#"PROJCS["WGS_1984_UTM_Zone_47N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",99.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    const GDAL_UTM56S: &str = r#"PROJCS["WGS 84 / UTM zone 56S",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Transverse_Mercator"],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","32756"]]"#;

    #[test]
    fn test_esri_geographic() {
        assert_eq!(detect_srid(ESRI_WGS84), Some(4326));
    }

    #[test]
    fn test_esri_utm_name() {
        assert_eq!(detect_srid(ESRI_UTM47N), Some(32647));
    }

    #[test]
    fn test_authority_clause_uses_top_level_code() {
        assert_eq!(detect_srid(GDAL_UTM56S), Some(32756));
    }

    #[test]
    fn test_web_mercator() {
        let wkt = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984"]]"#;
        assert_eq!(detect_srid(wkt), Some(3857));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(detect_srid(r#"PROJCS["Indian_1975_UTM_Zone_47N"]"#), None);
        assert_eq!(detect_srid("garbage"), None);
    }

    #[test]
    fn test_detect_srid_for_missing_prj() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("roads.shp");
        assert_eq!(detect_srid_for(&shp).unwrap(), None);

        std::fs::write(dir.path().join("roads.prj"), ESRI_UTM47N).unwrap();
        assert_eq!(detect_srid_for(&shp).unwrap(), Some(32647));
    }
}
