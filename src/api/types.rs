// API request and response bodies

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /api/query`
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
}

/// `POST /api/buffer`
#[derive(Debug, Deserialize)]
pub struct BufferRequest {
    /// GeoJSON Geometry or Feature in EPSG:4326
    pub geojson: Value,
    /// Metres
    pub distance: f64,
}

/// `POST /api/layers/{table}/addfield`
#[derive(Debug, Deserialize)]
pub struct AddFieldRequest {
    #[serde(rename = "fieldName")]
    pub field_name: String,
    #[serde(rename = "fieldType")]
    pub field_type: String,
}

/// Result of `POST /api/upload`
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub count: u64,
    pub table: String,
}

impl UploadResponse {
    pub fn new(table: String, count: u64) -> Self {
        Self {
            message: format!("Successfully imported layer: {table}"),
            count,
            table,
        }
    }
}

/// Result of `GET /api/test-db`
#[derive(Debug, Serialize)]
pub struct TestDbResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgis_version: Option<String>,
    pub message: String,
}
