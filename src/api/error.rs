// API error type
// Every failure becomes a `{"error", "details"}` JSON body with a matching status

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

use super::response::json_response;
use crate::db::ident::IdentError;
use crate::spatial::SpatialError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("invalid or missing admin token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(u64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("import failed: {0}")]
    Import(SpatialError),

    #[error("export failed: {0}")]
    Export(SpatialError),

    #[error("{0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Database(_) | Self::Import(_) | Self::Export(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    const fn summary(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Not found",
            Self::BadRequest(_) => "Bad request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::PayloadTooLarge(_) => "Payload too large",
            Self::Database(_) => "Database error",
            Self::Import(_) => "Import failed",
            Self::Export(_) => "Export failed",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Underlying message, without the summary prefix
    fn details(&self) -> Option<String> {
        match self {
            Self::Unauthorized => None,
            Self::NotFound(msg) | Self::BadRequest(msg) | Self::Forbidden(msg) | Self::Internal(msg) => {
                Some(msg.clone())
            }
            Self::PayloadTooLarge(_) => Some(self.to_string()),
            Self::Database(e) => Some(e.to_string()),
            Self::Import(e) | Self::Export(e) => Some(e.to_string()),
        }
    }

    /// Log and render
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::debug!("{self}");
        }
        let body = ErrorResponse {
            error: self.summary(),
            details: self.details(),
        };
        json_response(status, &body)
    }

    /// SQL rejected by the database is the caller's fault; anything else (pool, io) is ours
    pub fn from_statement_error(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => Self::BadRequest(db.message().to_string()),
            other => Self::Database(other),
        }
    }
}

impl From<IdentError> for ApiError {
    fn from(err: IdentError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<SpatialError> for ApiError {
    fn from(err: SpatialError) -> Self {
        if err.is_client_error() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Import(err)
        }
    }
}

impl From<multer::Error> for ApiError {
    fn from(err: multer::Error) -> Self {
        Self::BadRequest(format!("malformed multipart body: {err}"))
    }
}
