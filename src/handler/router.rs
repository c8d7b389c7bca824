//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method validation, body size
//! limits, health probes, then the API or the static front-end. Access logging
//! and CORS headers are applied to every response here.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, REFERER, SERVER,
    USER_AGENT,
};
use hyper::{Method, Request, Response, Version};

use crate::api;
use crate::config::{AppState, HealthConfig};
use crate::handler::static_files;
use crate::http;
use crate::logger::{self, AccessLogEntry};

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let mut entry = state
        .cached_access_log
        .load(Ordering::Relaxed)
        .then(|| access_entry(&req, peer_addr));

    let mut response = route_request(req, &state).await;

    if let Ok(server) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().entry(SERVER).or_insert(server);
    }

    if state.config.http.enable_cors {
        response
            .headers_mut()
            .entry(ACCESS_CONTROL_ALLOW_ORIGIN)
            .or_insert(HeaderValue::from_static("*"));
    }

    if let Some(entry) = entry.as_mut() {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

fn access_entry<B>(req: &Request<B>, peer_addr: SocketAddr) -> AccessLogEntry {
    let header = |name: HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(str::to_string);
    entry.http_version = http_version(req.version()).to_string();
    entry.referer = header(REFERER);
    entry.user_agent = header(USER_AGENT);
    entry
}

const fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

/// Check HTTP method and answer OPTIONS and unsupported methods directly
fn check_http_method(method: &Method, enable_cors: bool) -> Option<Response<Full<Bytes>>> {
    match *method {
        Method::GET | Method::HEAD | Method::POST | Method::DELETE => None,
        Method::OPTIONS => Some(http::build_options_response(enable_cors)),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = req.headers().get(CONTENT_LENGTH)?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Liveness and readiness probes
async fn health_response(
    health: &HealthConfig,
    path: &str,
    state: &AppState,
) -> Option<Response<Full<Bytes>>> {
    if !health.enabled {
        return None;
    }
    if path == health.liveness_path {
        return Some(http::build_text_response(200, "ok"));
    }
    if path == health.readiness_path {
        return Some(match state.db.ping().await {
            Ok(()) => http::build_text_response(200, "ok"),
            Err(e) => {
                logger::log_warning(&format!("Readiness check failed: {e}"));
                http::build_text_response(503, "database unavailable")
            }
        });
    }
    None
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with(api::API_PREFIX)
}

/// Route request based on path and configuration
async fn route_request<B>(req: Request<B>, state: &Arc<AppState>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let config = &state.config;

    // 1. Check HTTP method
    if let Some(resp) = check_http_method(req.method(), config.http.enable_cors) {
        return resp;
    }

    // 2. Check body size
    if let Some(resp) = check_body_size(&req, config.http.max_body_size) {
        return resp;
    }

    logger::log_headers_count(req.headers().len());

    // 3. Health check endpoints
    if let Some(resp) = health_response(&config.routes.health, req.uri().path(), state).await {
        return resp;
    }

    // 4. API
    if is_api_path(req.uri().path()) {
        return match api::handle_api(req, Arc::clone(state)).await {
            Ok(resp) => resp,
            Err(never) => match never {},
        };
    }

    // 5. Front-end bundle
    let is_head = *req.method() == Method::HEAD;
    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        return http::build_405_response();
    }
    if !config.static_files.enabled {
        return http::build_404_response();
    }
    static_files::serve_static(&config.static_files, req.uri().path(), req.headers(), is_head).await
}
