// Request body decoding: size-limited collection, JSON and multipart uploads

use std::convert::Infallible;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use serde::de::DeserializeOwned;

use super::error::ApiError;
use crate::spatial::import::Upload;

/// Collect the whole body, refusing more than `limit` bytes
pub async fn read_body<B>(body: B, limit: u64) -> Result<Bytes, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let max = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, max).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ApiError::PayloadTooLarge(limit))
        }
        Err(e) => Err(ApiError::BadRequest(format!(
            "failed to read request body: {e}"
        ))),
    }
}

pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Extract the `file` part (and the optional `srid` part) of a `multipart/form-data` upload
pub async fn parse_upload(content_type: Option<&str>, body: Bytes) -> Result<Upload, ApiError> {
    let content_type = content_type.ok_or_else(|| {
        ApiError::BadRequest("expected a multipart/form-data body".to_string())
    })?;
    let boundary = multer::parse_boundary(content_type)?;
    let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut file = None;
    let mut srid = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("file part has no filename".to_string()))?;
                let data = field.bytes().await?;
                file = Some((file_name, data));
            }
            Some("srid") => srid = parse_srid(&field.text().await?)?,
            _ => {}
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| ApiError::BadRequest("missing multipart part 'file'".to_string()))?;
    Ok(Upload {
        file_name,
        data,
        srid,
    })
}

fn parse_srid(text: &str) -> Result<Option<i32>, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    match text.parse::<i32>() {
        Ok(srid) if srid > 0 => Ok(Some(srid)),
        _ => Err(ApiError::BadRequest(format!(
            "srid must be a positive EPSG code, got '{text}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    const BOUNDARY: &str = "X-WEBGIS-BOUNDARY";

    fn form(parts: &[(&str, Option<&str>, &str)]) -> Bytes {
        let mut body = String::new();
        for (name, file_name, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(f) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Bytes::from(body)
    }

    fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    #[tokio::test]
    async fn test_parse_upload_file_and_srid() {
        let body = form(&[
            ("srid", None, "32647"),
            ("file", Some("Bangkok Roads.geojson"), r#"{"type":"FeatureCollection","features":[]}"#),
        ]);
        let upload = parse_upload(Some(&content_type()), body).await.unwrap();
        assert_eq!(upload.file_name, "Bangkok Roads.geojson");
        assert_eq!(upload.srid, Some(32647));
        assert!(upload.data.starts_with(b"{\"type\""));
    }

    #[tokio::test]
    async fn test_parse_upload_missing_file() {
        let body = form(&[("srid", None, "4326")]);
        let err = parse_upload(Some(&content_type()), body).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("'file'")));
    }

    #[tokio::test]
    async fn test_parse_upload_rejects_non_multipart() {
        let err = parse_upload(Some("application/json"), Bytes::from("{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(parse_upload(None, Bytes::new()).await.is_err());
    }

    #[test]
    fn test_parse_srid() {
        assert_eq!(parse_srid(" 3857 ").unwrap(), Some(3857));
        assert_eq!(parse_srid("").unwrap(), None);
        assert!(parse_srid("wgs84").is_err());
        assert!(parse_srid("-1").is_err());
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let body = Full::new(Bytes::from(vec![b'x'; 64]));
        assert_eq!(read_body(body, 64).await.unwrap().len(), 64);

        let body = Full::new(Bytes::from(vec![b'x'; 65]));
        assert!(matches!(read_body(body, 64).await, Err(ApiError::PayloadTooLarge(64))));
    }

    #[test]
    fn test_parse_json_error() {
        let err = parse_json::<serde_json::Value>(b"{not json").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.starts_with("invalid JSON")));
    }
}
