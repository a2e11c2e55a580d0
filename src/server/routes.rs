use std::io::Cursor;
use std::sync::Arc;

use log::{debug, error, warn};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::server::context::AppContext;
use crate::server::handlers;

pub type HttpResponse = Response<Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Builds a header from constant ASCII parts.
pub fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("header names and values are ASCII")
}

pub fn bytes_response(status: u16, content_type: &str, bytes: Vec<u8>) -> HttpResponse {
    let len = bytes.len();
    Response::new(
        StatusCode(status),
        vec![header("Content-Type", content_type)],
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

pub fn html_response(body: String) -> HttpResponse {
    bytes_response(200, "text/html; charset=utf-8", body.into_bytes())
}

pub fn json_response<T: Serialize>(status: u16, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(bytes) => bytes_response(status, "application/json", bytes),
        Err(e) => {
            error!("could not serialize response body: {}", e);
            detail_response(500, "could not serialize response")
        }
    }
}

/// Error body in the `{"detail": "..."}` shape.
pub fn detail_response(status: u16, detail: &str) -> HttpResponse {
    let body = serde_json::json!({ "detail": detail }).to_string();
    bytes_response(status, "application/json", body.into_bytes())
}

pub fn not_found() -> HttpResponse {
    bytes_response(404, "text/plain", b"404 Not Found".to_vec())
}

/// Answers CORS preflight requests.
pub fn preflight() -> HttpResponse {
    Response::new(StatusCode(204), Vec::new(), Cursor::new(Vec::new()), Some(0), None)
        .with_header(header("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .with_header(header("Access-Control-Allow-Headers", "*"))
        .with_header(header("Access-Control-Max-Age", "600"))
}

fn with_cors(response: HttpResponse) -> HttpResponse {
    response.with_header(header("Access-Control-Allow-Origin", "*"))
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Dispatches one request to its handler and sends the response.
pub fn dispatch(mut request: Request, ctx: Arc<AppContext>) {
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();

    let response = match (&method, path.as_str()) {
        (Method::Get, "/") => handlers::assets::handle_index(&ctx),
        (Method::Get, p) if p.starts_with("/static/") => {
            handlers::assets::handle_static(&ctx, &p["/static/".len()..])
        }
        (Method::Post, "/classify") => handlers::classify::handle(&mut request, &ctx),
        (Method::Options, _) => preflight(),
        _ => not_found(),
    };

    debug!("{} {} -> {}", method, path, response.status_code().0);
    if let Err(e) = request.respond(with_cors(response)) {
        warn!("could not send response for {} {}: {}", method, path, e);
    }
}
