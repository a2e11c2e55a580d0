use std::path::{Component, Path};

use log::warn;

use crate::server::context::AppContext;
use crate::server::routes::{bytes_response, html_response, not_found, HttpResponse};

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

pub fn handle_index(ctx: &AppContext) -> HttpResponse {
    let path = ctx.static_dir.join("index.html");
    match std::fs::read_to_string(&path) {
        Ok(html) => html_response(html),
        Err(e) => {
            warn!("could not read {}: {}", path.display(), e);
            not_found()
        }
    }
}

// ---------------------------------------------------------------------------
// GET /static/<file>
// ---------------------------------------------------------------------------

pub fn handle_static(ctx: &AppContext, rel: &str) -> HttpResponse {
    let rel_path = Path::new(rel);
    if rel.is_empty() || !rel_path.components().all(|c| matches!(c, Component::Normal(_))) {
        return not_found();
    }
    match std::fs::read(ctx.static_dir.join(rel_path)) {
        Ok(bytes) => bytes_response(200, content_type_for(rel_path), bytes),
        Err(_) => not_found(),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
