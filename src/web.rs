//! HTTP exposition endpoint.
//!
//! Serves the registry's latest snapshot on `GET /metrics`, plus a small
//! index page. Scrapes never block on or trigger a collection cycle:
//! responses always carry the last known values. TLS and authentication
//! are a reverse-proxy concern and are deliberately absent here.

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use tower_http::compression::CompressionLayer;

use crate::registry::{Registry, exposition};

/// Builds the exposition router over a shared registry handle.
pub fn build_router(registry: Registry) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/metrics", get(handle_metrics))
        .layer(CompressionLayer::new())
        .with_state(registry)
}

async fn handle_index() -> Html<&'static str> {
    Html(
        "<html><head><title>ibmiprom</title></head>\
         <body><h1>IBM i exporter</h1><p><a href=\"/metrics\">Metrics</a></p></body></html>",
    )
}

async fn handle_metrics(State(registry): State<Registry>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
        exposition::encode(&registry),
    )
}
