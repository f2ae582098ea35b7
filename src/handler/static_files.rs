//! Static file serving module
//!
//! Resolves GET paths beneath the configured root directory and builds
//! file responses with MIME type detection and `ETag` support.

use crate::config::AppState;
use crate::http::{self, cache, mime};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Serve a static resource for a GET request path
pub async fn serve(
    path: &str,
    if_none_match: Option<&str>,
    state: &AppState,
) -> Response<Full<Bytes>> {
    let files = &state.config.static_files;
    let root = Path::new(&files.root);

    let Some(file_path) = resolve_path(root, path, &files.index_file) else {
        return http::build_404_response();
    };

    // Containment: the resolved target, symlinks included, must stay
    // under the canonicalized root
    let Ok(root_canonical) = root.canonicalize() else {
        logger::log_warning(&format!(
            "Static directory not found or inaccessible '{}'",
            files.root
        ));
        return http::build_404_response();
    };
    let Ok(file_path) = file_path.canonicalize() else {
        return http::build_404_response();
    };
    if !file_path.starts_with(&root_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {path} -> {}",
            file_path.display()
        ));
        return http::build_404_response();
    }

    // Non-regular file is a plain 404
    match fs::metadata(&file_path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return http::build_404_response(),
    }

    let content = match fs::read(&file_path).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_error(&format!(
                "Failed to read file '{}': {e}",
                file_path.display()
            ));
            return http::build_500_response();
        }
    };

    let content_type = mime::get_content_type(file_path.extension().and_then(|e| e.to_str()));
    let etag = cache::generate_etag(&content);

    if cache::check_etag_match(if_none_match, &etag) {
        return http::build_304_response(&etag);
    }

    http::response::build_cached_response(Bytes::from(content), content_type, &etag)
}

/// Resolve a request path against the static root.
///
/// `/` maps to the index file. Any component that is not a plain path
/// segment (`..`, `.`, a root marker) is refused, so requests can never
/// escape the root directory.
fn resolve_path(root: &Path, request_path: &str, index_file: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let relative = if relative.is_empty() { index_file } else { relative };

    let candidate = Path::new(relative);
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        logger::log_warning(&format!("Path traversal attempt blocked: {request_path}"));
        return None;
    }

    Some(root.join(candidate))
}
