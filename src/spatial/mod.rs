//! Spatial file handling
//!
//! Everything that touches Shapefile, Zip and GeoJSON files on disk. The
//! database never sees these formats directly: uploads are parsed into a
//! [`dataset::Dataset`] here and handed to [`crate::db::writer`], and exports
//! go the opposite way.
//!
//! File work is synchronous; async callers go through [`run_blocking`].

pub mod archive;
pub mod buffer;
pub mod dataset;
pub mod export;
pub mod geojson_io;
pub mod import;
pub mod prj;
pub mod shapefile_io;
pub mod utm;

use std::io;

/// Geographic WGS84, the storage SRID of every layer
pub const WGS84_SRID: i32 = 4326;

/// Spherical (Web) Mercator
pub const WEB_MERCATOR_SRID: i32 = 3857;

/// Errors raised while reading or writing spatial files
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("dbf error: {0}")]
    Dbase(#[from] shapefile::dbase::Error),

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("no .shp file found in archive")]
    NoShapefile,

    #[error("archive too large: {0}")]
    ArchiveTooLarge(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("layer mixes incompatible geometry types: {0}")]
    MixedGeometry(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl SpatialError {
    /// Whether the error was caused by the client's input rather than the server
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoShapefile
                | Self::ArchiveTooLarge(_)
                | Self::UnsupportedFormat(_)
                | Self::InvalidGeometry(_)
        )
    }
}

/// Run synchronous file work on tokio's blocking pool
pub async fn run_blocking<T, F>(work: F) -> Result<T, SpatialError>
where
    F: FnOnce() -> Result<T, SpatialError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SpatialError::Io(io::Error::other(e)))?
}
