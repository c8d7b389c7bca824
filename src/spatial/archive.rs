//! Zip archive handling for uploads and exports

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::SpatialError;

/// Caps applied while extracting an uploaded archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Total decompressed bytes across all entries
    pub max_bytes: u64,
    pub max_entries: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024 * 1024,
            max_entries: 10_000,
        }
    }
}

/// Extract every entry of `archive_path` under `dest`
///
/// Entries whose names would escape `dest` (absolute paths, `..`) are
/// skipped. Extraction stops with [`SpatialError::ArchiveTooLarge`] once the
/// archive exceeds `limits`. Returns the number of files written.
pub fn extract(archive_path: &Path, dest: &Path, limits: ExtractLimits) -> Result<usize, SpatialError> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    if archive.len() > limits.max_entries {
        return Err(SpatialError::ArchiveTooLarge(format!(
            "{} entries (max: {})",
            archive.len(),
            limits.max_entries
        )));
    }

    let mut written = 0;
    let mut remaining = limits.max_bytes;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "Skipping unsafe zip entry");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        // one byte past the budget tells an exact fit from an overflow
        let copied = io::copy(&mut (&mut entry).take(remaining + 1), &mut out)?;
        if copied > remaining {
            return Err(SpatialError::ArchiveTooLarge(format!(
                "more than {} bytes uncompressed",
                limits.max_bytes
            )));
        }
        remaining -= copied;
        written += 1;
    }

    Ok(written)
}

/// First `.shp` under `dir` in lexicographic path order, searching recursively
///
/// macOS resource forks (`__MACOSX/`, `._*`) are ignored.
pub fn find_shapefile(dir: &Path) -> Result<Option<PathBuf>, SpatialError> {
    let mut found = Vec::new();
    collect_shapefiles(dir, &mut found)?;
    found.sort();
    Ok(found.into_iter().next())
}

fn collect_shapefiles(dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name == "__MACOSX" || name.starts_with("._") {
            continue;
        }
        if path.is_dir() {
            collect_shapefiles(&path, found)?;
        } else if has_extension(&path, "shp") {
            found.push(path);
        }
    }
    Ok(())
}

/// Case-insensitive extension check
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Zip the regular files directly inside `dir`, sorted by name, into memory
pub fn zip_directory(dir: &Path) -> Result<Vec<u8>, SpatialError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    files.retain(|p| p.is_file());
    files.sort();

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        writer.start_file(name.to_string(), options)?;
        writer.write_all(&fs::read(&path)?)?;
    }

    Ok(writer.finish()?.into_inner())
}
