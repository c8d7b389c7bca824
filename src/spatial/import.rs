//! Upload decoding: raw bytes to [`Dataset`]
//!
//! Every upload is materialized inside its own temporary directory which is
//! removed when [`load_upload`] returns, whatever the outcome.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;

use super::archive::ExtractLimits;
use super::dataset::Dataset;
use super::{archive, geojson_io, run_blocking, shapefile_io, SpatialError};

const TEMP_PREFIX: &str = "webgis-upload-";

/// Uploaded dataset as received from the multipart form
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
    /// Source EPSG code supplied by the client, overriding `.prj` detection
    pub srid: Option<i32>,
}

/// Accepted upload formats, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Zip,
    Shapefile,
    GeoJson,
}

impl UploadKind {
    pub fn from_file_name(name: &str) -> Result<Self, SpatialError> {
        let path = Path::new(name);
        if archive::has_extension(path, "zip") {
            Ok(Self::Zip)
        } else if archive::has_extension(path, "shp") {
            Ok(Self::Shapefile)
        } else if archive::has_extension(path, "geojson") || archive::has_extension(path, "json") {
            Ok(Self::GeoJson)
        } else {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)");
            Err(SpatialError::UnsupportedFormat(ext.to_string()))
        }
    }
}

/// Scoped temp directory, under `parent` when configured
pub fn scoped_temp_dir(parent: Option<&Path>) -> Result<TempDir, SpatialError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX);
    let dir = match parent {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            builder.tempdir_in(parent)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}

/// Decode an upload synchronously
pub fn load_upload(
    temp_parent: Option<&Path>,
    file_name: &str,
    data: &[u8],
    limits: ExtractLimits,
) -> Result<Dataset, SpatialError> {
    let kind = UploadKind::from_file_name(file_name)?;
    let dir = scoped_temp_dir(temp_parent)?;

    // Never trust client paths: keep only the final component
    let local_name = Path::new(file_name)
        .file_name()
        .map_or_else(|| PathBuf::from("upload"), PathBuf::from);
    let path = dir.path().join(local_name);
    fs::write(&path, data)?;

    let dataset = match kind {
        UploadKind::Zip => {
            let extracted = dir.path().join("extracted");
            fs::create_dir(&extracted)?;
            let files = archive::extract(&path, &extracted, limits)?;
            tracing::debug!(files, "Extracted upload archive");
            let shp = archive::find_shapefile(&extracted)?.ok_or(SpatialError::NoShapefile)?;
            shapefile_io::read_shapefile(&shp)?
        }
        UploadKind::Shapefile => shapefile_io::read_shapefile(&path)?,
        UploadKind::GeoJson => geojson_io::read_geojson(&path)?,
    };

    dir.close()?;
    Ok(dataset)
}

/// Decode an upload on the blocking pool and apply the client SRID override
pub async fn import_upload(
    upload: Upload,
    temp_parent: Option<PathBuf>,
    limits: ExtractLimits,
) -> Result<Dataset, SpatialError> {
    let Upload {
        file_name,
        data,
        srid,
    } = upload;
    let mut dataset =
        run_blocking(move || load_upload(temp_parent.as_deref(), &file_name, &data, limits))
            .await?;
    if srid.is_some() {
        dataset.srid = srid;
    }
    Ok(dataset)
}
