//! Router assembly: HTTP endpoints, static files, CORS headers, and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::{
    services::{ServeDir, ServeFile},
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - `POST /generate-chapter` (+ `OPTIONS` preflight answering 204)
/// - `POST /api/bnschool_generate`, the legacy path of the same endpoint
/// - `GET /api/v1/health`
/// - Static SPA from `STATIC_DIR` (default `./static`) with index fallback
/// - `Access-Control-Allow-Origin: *` on every response
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into());
    let static_service = ServeDir::new(&static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route(
            "/generate-chapter",
            post(http::http_post_generate_chapter).options(http::http_preflight),
        )
        .route(
            "/api/bnschool_generate",
            post(http::http_post_generate_chapter).options(http::http_preflight),
        )
        .route("/api/v1/health", get(http::http_health))
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
