//! Layer export: database rows to a zipped Shapefile set

use std::path::PathBuf;

use geo_types::Geometry;
use geojson::GeoJson;

use super::dataset::{AttributeValue, Column, ColumnKind, Dataset, Feature};
use super::import::scoped_temp_dir;
use super::{archive, run_blocking, shapefile_io, SpatialError, WGS84_SRID};
use crate::db::layers::{AttributeColumn, ExportRow};

/// Turn exported rows into a dataset
///
/// Columns keep the table's names, order and types. `srid` is the SRID of the
/// geometries as read; layers stored without one (`0`) are left unlabelled.
pub fn rows_to_dataset(
    columns: Vec<AttributeColumn>,
    rows: Vec<ExportRow>,
    srid: i32,
) -> Result<Dataset, SpatialError> {
    let columns: Vec<Column> = columns
        .into_iter()
        .map(|c| Column {
            kind: ColumnKind::from_sql_type(&c.data_type),
            name: c.name,
        })
        .collect();

    let features = rows
        .into_iter()
        .map(|row| {
            let geometry = row.geometry.as_deref().map(parse_geometry).transpose()?;
            let values = columns
                .iter()
                .map(|column| {
                    row.properties.get(&column.name).map_or(AttributeValue::Null, |v| {
                        AttributeValue::from_json(v).0.coerce(column.kind)
                    })
                })
                .collect();
            Ok(Feature { geometry, values })
        })
        .collect::<Result<Vec<_>, SpatialError>>()?;

    Ok(Dataset {
        columns,
        features,
        srid: (srid != 0).then_some(WGS84_SRID),
    })
}

fn parse_geometry(text: &str) -> Result<Geometry<f64>, SpatialError> {
    match text.parse::<GeoJson>()? {
        GeoJson::Geometry(geometry) => Ok(Geometry::<f64>::try_from(geometry)?),
        other => Err(SpatialError::InvalidGeometry(format!(
            "expected a geometry, found {}",
            geojson_kind(&other)
        ))),
    }
}

const fn geojson_kind(geojson: &GeoJson) -> &'static str {
    match geojson {
        GeoJson::Geometry(_) => "Geometry",
        GeoJson::Feature(_) => "Feature",
        GeoJson::FeatureCollection(_) => "FeatureCollection",
    }
}

/// Write `dataset` as `<table>.shp` and siblings in a scoped temp dir and zip them
pub fn export_zip(
    table: &str,
    dataset: &Dataset,
    temp_parent: Option<&std::path::Path>,
) -> Result<Vec<u8>, SpatialError> {
    let dir = scoped_temp_dir(temp_parent)?;
    let shp_path = dir.path().join(format!("{table}.shp"));
    let written = shapefile_io::write_shapefile(dataset, &shp_path)?;
    tracing::debug!(table, written, "Shapefile written for export");
    let bytes = archive::zip_directory(dir.path())?;
    dir.close()?;
    Ok(bytes)
}

/// Rows → dataset → zipped shapefile, on the blocking pool
pub async fn export_layer(
    table: String,
    columns: Vec<AttributeColumn>,
    rows: Vec<ExportRow>,
    srid: i32,
    temp_parent: Option<PathBuf>,
) -> Result<Vec<u8>, SpatialError> {
    run_blocking(move || {
        let dataset = rows_to_dataset(columns, rows, srid)?;
        export_zip(&table, &dataset, temp_parent.as_deref())
    })
    .await
}
