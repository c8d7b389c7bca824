// GIS API handlers module
// One function per endpoint; routing and error rendering live in `api::mod`

use std::path::PathBuf;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};

use super::body::{parse_json, parse_upload};
use super::error::ApiError;
use super::response::{json_response, success, zip_download};
use super::types::{AddFieldRequest, BufferRequest, QueryRequest, TestDbResponse, UploadResponse};
use crate::config::{ApiConfig, AppState};
use crate::db::catalog::{self, LayerInfo};
use crate::db::ident::{sanitize_table_name, validate_field_name};
use crate::db::layers::{self, FieldType};
use crate::db::query::{self, ExecutedStatus, QueryOutcome};
use crate::db::writer;
use crate::spatial::archive::ExtractLimits;
use crate::spatial::{buffer, export, import};

pub type ApiResult = Result<Response<Full<Bytes>>, ApiError>;

/// Catalog allowlist check shared by every table-scoped operation
async fn require_layer(state: &AppState, table: &str) -> Result<LayerInfo, ApiError> {
    catalog::find_layer(state.db.pool(), table)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Layer not found: {table}")))
}

fn temp_parent(state: &AppState) -> Option<PathBuf> {
    state.config.upload.temp_dir.as_deref().map(PathBuf::from)
}

fn extract_limits(state: &AppState) -> ExtractLimits {
    ExtractLimits {
        max_bytes: state.config.upload.max_extracted_size,
        max_entries: state.config.upload.max_archive_entries,
    }
}

/// `GET /api/test-db`
pub async fn test_db(state: &AppState) -> Response<Full<Bytes>> {
    match state.db.diagnostics().await {
        Ok(diag) => json_response(
            StatusCode::OK,
            &TestDbResponse {
                status: "success",
                db_version: Some(diag.db_version),
                postgis_version: Some(diag.postgis_version),
                message: "Database connection successful".to_string(),
            },
        ),
        Err(e) => {
            tracing::error!("Database diagnostics failed: {e}");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &TestDbResponse {
                    status: "error",
                    db_version: None,
                    postgis_version: None,
                    message: e.to_string(),
                },
            )
        }
    }
}

/// `GET /api/layers`
pub async fn list_layers(state: &AppState) -> ApiResult {
    let layers = catalog::list_layers(state.db.pool()).await?;
    Ok(json_response(StatusCode::OK, &layers))
}

/// `GET /api/layers/{table}/geojson`
pub async fn layer_geojson(state: &AppState, table: &str) -> ApiResult {
    let layer = require_layer(state, table).await?;
    let collection = layers::feature_collection(state.db.pool(), &layer).await?;
    Ok(json_response(StatusCode::OK, &collection))
}

/// `POST /api/upload`
pub async fn upload(state: &AppState, content_type: Option<&str>, body: Bytes) -> ApiResult {
    let upload = parse_upload(content_type, body).await?;
    let table = sanitize_table_name(&upload.file_name)?;
    tracing::info!(table = %table, file = %upload.file_name, bytes = upload.data.len(), "Importing upload");

    let dataset = import::import_upload(upload, temp_parent(state), extract_limits(state)).await?;
    if dataset.is_empty() {
        tracing::warn!(table = %table, "Upload contains no features; creating an empty layer");
    }
    let count = writer::write_dataset(
        state.db.pool(),
        &table,
        &dataset,
        state.config.upload.batch_size,
    )
    .await?;

    tracing::info!(table = %table, count, features = dataset.len(), "Layer imported");
    Ok(json_response(StatusCode::OK, &UploadResponse::new(table, count)))
}

/// Ad-hoc SQL capability check
fn authorize_sql(api: &ApiConfig, admin_token: Option<&str>) -> Result<(), ApiError> {
    if !api.enable_sql_query {
        return Err(ApiError::Forbidden(
            "ad-hoc SQL queries are disabled on this server".to_string(),
        ));
    }
    match api.admin_token.as_deref() {
        Some(expected) if admin_token != Some(expected) => Err(ApiError::Unauthorized),
        _ => Ok(()),
    }
}

/// `POST /api/query`
pub async fn query(state: &AppState, admin_token: Option<&str>, body: &[u8]) -> ApiResult {
    authorize_sql(&state.config.api, admin_token)?;
    let request: QueryRequest = parse_json(body)?;
    if request.sql.trim().is_empty() {
        return Err(ApiError::BadRequest("sql is empty".to_string()));
    }

    tracing::warn!(sql = %request.sql, "Running ad-hoc SQL");
    match query::run_query(state.db.pool(), &request.sql)
        .await
        .map_err(ApiError::from_statement_error)?
    {
        QueryOutcome::Features(collection) => Ok(json_response(StatusCode::OK, &collection)),
        QueryOutcome::Executed { rows_affected } => Ok(json_response(
            StatusCode::OK,
            &ExecutedStatus {
                status: "success",
                rows_affected,
            },
        )),
    }
}

/// `POST /api/buffer`
pub async fn buffer(state: &AppState, body: &[u8]) -> ApiResult {
    let request: BufferRequest = parse_json(body)?;
    let plan = buffer::plan(&request.geojson, request.distance)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let buffered =
        query::buffer_geometry(state.db.pool(), &plan.geometry_json, plan.epsg, plan.distance)
            .await
            .map_err(ApiError::from_statement_error)?;
    Ok(json_response(StatusCode::OK, &buffer::to_feature(&plan, buffered)))
}

/// `GET /api/export/{table}/shapefile`
pub async fn export_shapefile(state: &AppState, table: &str) -> ApiResult {
    let layer = require_layer(state, table).await?;
    let columns = layers::attribute_columns(state.db.pool(), &layer).await?;
    let rows = layers::export_rows(state.db.pool(), &layer).await?;
    let count = rows.len();

    let data = export::export_layer(
        layer.name.clone(),
        columns,
        rows,
        layer.srid,
        temp_parent(state),
    )
    .await
    .map_err(ApiError::Export)?;
    tracing::info!(table = %layer.name, count, bytes = data.len(), "Layer exported");
    zip_download(&layer.name, data)
}

/// `POST /api/layers/{table}/addfield`
pub async fn add_field(state: &AppState, table: &str, body: &[u8]) -> ApiResult {
    let layer = require_layer(state, table).await?;
    let request: AddFieldRequest = parse_json(body)?;
    let field = validate_field_name(&request.field_name)?;
    let field_type = FieldType::from_tag(&request.field_type);

    layers::add_column(state.db.pool(), &layer, field, field_type)
        .await
        .map_err(ApiError::from_statement_error)?;
    tracing::info!(table = %layer.name, field, sql_type = field_type.sql_type(), "Column added");
    Ok(success())
}

/// `DELETE /api/layers/{table}`
///
/// Succeeds whether or not the layer exists.
pub async fn delete_layer(state: &AppState, table: &str) -> ApiResult {
    if let Some(layer) = catalog::find_layer(state.db.pool(), table).await? {
        layers::drop_layer(state.db.pool(), &layer).await?;
        tracing::info!(table = %layer.name, "Layer dropped");
    }
    Ok(success())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(enable: bool, token: Option<&str>) -> ApiConfig {
        ApiConfig {
            enable_sql_query: enable,
            admin_token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_sql_disabled_by_default() {
        let err = authorize_sql(&ApiConfig::default(), None).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_sql_token_gate() {
        assert!(authorize_sql(&api(true, None), None).is_ok());
        assert!(authorize_sql(&api(true, Some("s3cret")), Some("s3cret")).is_ok());

        let err = authorize_sql(&api(true, Some("s3cret")), Some("guess")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let err = authorize_sql(&api(true, Some("s3cret")), None).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_buffer_rejects_invalid_geojson_before_database() {
        let state = crate::config::test_state();
        let err = buffer(&state, br#"{"geojson": {"type": "Blob"}, "distance": 10}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = buffer(&state, br#"{"geojson": {"type": "MultiPoint", "coordinates": []}, "distance": 10}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_extension() {
        let state = crate::config::test_state();
        let body = Bytes::from(
            "--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"plan.dwg\"\r\n\r\nxx\r\n--b--\r\n",
        );
        let err = upload(&state, Some("multipart/form-data; boundary=b"), body)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
