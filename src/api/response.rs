// API response utility functions module

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::error::ApiError;
use crate::logger;

/// Build JSON response
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = match serde_json::to_vec(body) {
        Ok(j) => j,
        Err(e) => {
            logger::log_error(&format!("Failed to serialize response: {e}"));
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from_static(
                    br#"{"error":"Internal server error"}"#,
                )))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Error"))));
        }
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to build response: {e}"));
            Response::new(Full::new(Bytes::from("Error")))
        })
}

/// `{"status":"success"}`
pub fn success() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({ "status": "success" }))
}

/// Zip archive download named after the layer
pub fn zip_download(table: &str, data: Vec<u8>) -> Result<Response<Full<Bytes>>, ApiError> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/zip")
        .header(
            "Content-Disposition",
            format!("attachment; filename=\"{table}.zip\""),
        )
        .header("Content-Length", data.len())
        .body(Full::new(Bytes::from(data)))
        .map_err(|e| ApiError::Internal(format!("failed to build download response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_download_headers() {
        let resp = zip_download("roads", vec![0x50, 0x4b, 0x05, 0x06]).unwrap();
        assert_eq!(resp.headers()["Content-Type"], "application/zip");
        assert_eq!(
            resp.headers()["Content-Disposition"],
            "attachment; filename=\"roads.zip\""
        );
        assert_eq!(resp.headers()["Content-Length"], "4");
    }

    #[test]
    fn test_json_response_content_type() {
        let resp = json_response(StatusCode::CREATED, &[1, 2, 3]);
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()["Content-Type"], "application/json");
    }
}
