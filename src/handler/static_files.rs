//! Static file serving module
//!
//! Serves the web map front-end bundle from `static_files.root`, with index
//! file resolution, traversal protection and `ETag` revalidation.

use std::path::{Path, PathBuf};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::Response;
use tokio::fs;

use crate::config::StaticFilesConfig;
use crate::http::{self, cache, mime};
use crate::logger;

/// Serve `path` from the configured root
pub async fn serve_static(
    cfg: &StaticFilesConfig,
    path: &str,
    headers: &HeaderMap,
    is_head: bool,
) -> Response<Full<Bytes>> {
    if !bundle_mounted(&cfg.root, &cfg.index_files) {
        return http::build_404_response();
    }
    let Some(file_path) = resolve_path(&cfg.root, path, &cfg.index_files) else {
        return http::build_404_response();
    };
    if cfg.hidden.contains(&file_path) {
        logger::log_warning(&format!("Refused to serve hidden file: {path}"));
        return http::build_404_response();
    }

    let content = match fs::read(&file_path).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_error(&format!(
                "Failed to read file '{}': {e}",
                file_path.display()
            ));
            return http::build_404_response();
        }
    };

    let etag = cache::generate_etag(&content);
    if cache::is_not_modified(headers, &etag) {
        return http::build_304_response(&etag);
    }

    http::build_cached_response(
        Bytes::from(content),
        mime::content_type_for(&file_path),
        &etag,
        is_head,
    )
}

/// The bundle is only mounted when `root` holds an index file
fn bundle_mounted(root: &str, index_files: &[String]) -> bool {
    index_files
        .iter()
        .any(|index| Path::new(root).join(index).is_file())
}

/// Map a request path onto a file below `root`
///
/// Directories resolve to their first existing index file. Dotfiles and
/// anything that canonicalizes outside `root` are refused.
pub fn resolve_path(root: &str, path: &str, index_files: &[String]) -> Option<PathBuf> {
    let relative = path.trim_start_matches('/');
    if relative
        .split('/')
        .any(|segment| segment.starts_with('.') && segment != "." && segment != "..")
    {
        return None;
    }

    let root_canonical = match Path::new(root).canonicalize() {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Static directory not found or inaccessible '{root}': {e}"
            ));
            return None;
        }
    };

    let mut file_path = root_canonical.join(relative);
    if file_path.is_dir() {
        file_path = index_files
            .iter()
            .map(|index| file_path.join(index))
            .find(|candidate| candidate.is_file())?;
    }

    // Missing files are the common 404 case
    let canonical = file_path.canonicalize().ok()?;
    if !canonical.starts_with(&root_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {path} -> {}",
            canonical.display()
        ));
        return None;
    }
    canonical.is_file().then_some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::IF_NONE_MATCH;
    use std::fs;

    fn bundle() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("site");
        fs::create_dir_all(site.join("assets")).unwrap();
        fs::write(site.join("index.html"), "<div id=\"map\"></div>").unwrap();
        fs::write(site.join("assets/app.js"), "console.log('map')").unwrap();
        fs::write(dir.path().join("secret.txt"), "outside").unwrap();
        dir
    }

    fn index() -> Vec<String> {
        vec!["index.html".to_string()]
    }

    #[test]
    fn test_resolve_index_and_assets() {
        let dir = bundle();
        let root = dir.path().join("site");
        let root = root.to_str().unwrap();

        let resolved = resolve_path(root, "/", &index()).unwrap();
        assert!(resolved.ends_with("index.html"));
        let resolved = resolve_path(root, "/assets/app.js", &index()).unwrap();
        assert!(resolved.ends_with("assets/app.js"));
        assert!(resolve_path(root, "/assets/", &index()).is_none());
        assert!(resolve_path(root, "/missing.css", &index()).is_none());
    }

    #[test]
    fn test_resolve_blocks_traversal() {
        let dir = bundle();
        let root = dir.path().join("site");
        let root = root.to_str().unwrap();
        assert!(resolve_path(root, "/../secret.txt", &index()).is_none());
        assert!(resolve_path(root, "/assets/../../secret.txt", &index()).is_none());
    }

    #[test]
    fn test_resolve_refuses_dotfiles() {
        let dir = bundle();
        let site = dir.path().join("site");
        fs::write(site.join(".env"), "DATABASE_URL=postgresql://gis:pw@db/gis").unwrap();
        fs::create_dir_all(site.join(".git")).unwrap();
        fs::write(site.join(".git/config"), "[core]").unwrap();
        let root = site.to_str().unwrap();

        assert!(resolve_path(root, "/.env", &index()).is_none());
        assert!(resolve_path(root, "/.git/config", &index()).is_none());
        assert!(resolve_path(root, "/./assets/app.js", &index()).is_some());
    }

    fn site_config(dir: &tempfile::TempDir) -> StaticFilesConfig {
        StaticFilesConfig {
            enabled: true,
            root: dir.path().join("site").to_string_lossy().into_owned(),
            index_files: index(),
            hidden: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_config_file_under_root_not_served() {
        let dir = bundle();
        let config_file = dir.path().join("site/config.toml");
        fs::write(&config_file, "[database]\npassword = \"pw\"\n").unwrap();
        let mut cfg = site_config(&dir);
        cfg.hidden.push(config_file.canonicalize().unwrap());

        let resp = serve_static(&cfg, "/config.toml", &HeaderMap::new(), false).await;
        assert_eq!(resp.status(), 404);
        let resp = serve_static(&cfg, "/index.html", &HeaderMap::new(), false).await;
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_directory_without_index_not_mounted() {
        let dir = bundle();
        fs::remove_file(dir.path().join("site/index.html")).unwrap();
        let cfg = site_config(&dir);
        let resp = serve_static(&cfg, "/assets/app.js", &HeaderMap::new(), false).await;
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_serve_static_etag_roundtrip() {
        let dir = bundle();
        let cfg = site_config(&dir);

        let resp = serve_static(&cfg, "/assets/app.js", &HeaderMap::new(), false).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()["Content-Type"],
            "application/javascript; charset=utf-8"
        );
        let etag = resp.headers()["ETag"].clone();

        let mut headers = HeaderMap::new();
        headers.insert(IF_NONE_MATCH, etag);
        let resp = serve_static(&cfg, "/assets/app.js", &headers, false).await;
        assert_eq!(resp.status(), 304);

        let resp = serve_static(&cfg, "/nope.js", &HeaderMap::new(), false).await;
        assert_eq!(resp.status(), 404);
    }
}
