// API module entry
// GIS REST API under `/api/`

mod body;
mod error;
mod handlers;
mod response;
mod types;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Response};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::AppState;
use crate::logger;

pub use error::ApiError;

use body::read_body;
use handlers::ApiResult;

/// Path prefix owned by the API
pub const API_PREFIX: &str = "/api/";

/// Header carrying the admin token for ad-hoc SQL
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// API route handler
///
/// Dispatches on method and path segments; every error is rendered as JSON here.
pub async fn handle_api<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = dispatch(req, &state)
        .await
        .unwrap_or_else(ApiError::into_response);

    logger::log_api_request(method.as_str(), &path, response.status().as_u16());
    Ok(response)
}

/// `/api/layers/land%20use/geojson` → `["layers", "land use", "geojson"]`
///
/// Each segment is percent-decoded after splitting, so an encoded `/` stays
/// inside its segment.
fn api_segments(path: &str) -> Result<Vec<String>, ApiError> {
    let Some(rest) = path
        .strip_prefix(API_PREFIX)
        .map(|rest| rest.trim_end_matches('/'))
        .filter(|rest| !rest.is_empty())
    else {
        return Ok(Vec::new());
    };
    rest.split('/')
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .map(Cow::into_owned)
                .map_err(|e| ApiError::BadRequest(format!("invalid path segment '{segment}': {e}")))
        })
        .collect()
}

fn header_value<B>(req: &Request<B>, name: impl hyper::header::AsHeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn dispatch<B>(req: Request<B>, state: &AppState) -> ApiResult
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let limit = state.config.http.max_body_size;

    let segments = api_segments(&path)?;
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (method, segments.as_slice()) {
        (Method::GET, ["test-db"]) => Ok(handlers::test_db(state).await),
        (Method::GET, ["layers"]) => handlers::list_layers(state).await,
        (Method::GET, ["layers", table, "geojson"]) => handlers::layer_geojson(state, table).await,
        (Method::GET, ["export", table, "shapefile"]) => {
            handlers::export_shapefile(state, table).await
        }
        (Method::DELETE, ["layers", table]) => handlers::delete_layer(state, table).await,
        (Method::POST, ["upload"]) => {
            let content_type = header_value(&req, CONTENT_TYPE);
            let body = read_body(req.into_body(), limit).await?;
            handlers::upload(state, content_type.as_deref(), body).await
        }
        (Method::POST, ["query"]) => {
            let token = header_value(&req, ADMIN_TOKEN_HEADER);
            let body = read_body(req.into_body(), limit).await?;
            handlers::query(state, token.as_deref(), &body).await
        }
        (Method::POST, ["buffer"]) => {
            let body = read_body(req.into_body(), limit).await?;
            handlers::buffer(state, &body).await
        }
        (Method::POST, ["layers", table, "addfield"]) => {
            let body = read_body(req.into_body(), limit).await?;
            handlers::add_field(state, table, &body).await
        }
        (method, _) => Err(ApiError::NotFound(format!(
            "no API endpoint for {method} {path}"
        ))),
    }
}
