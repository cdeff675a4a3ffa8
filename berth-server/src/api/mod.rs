//! API Module
//!
//! HTTP API layer for the server.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    body::Body,
    http::{HeaderName, Request},
    routing::{get, post},
};
use berth_worker::{JobStore, MessageSender};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the per-request correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub queue: MessageSender,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, queue: MessageSender) -> Self {
        Self { store, queue }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let correlation_header = HeaderName::from_static(CORRELATION_ID_HEADER);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/deployment", post(job::submit_deployment))
        .route("/job/{uuid}", get(job::get_job).delete(job::delete_job))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::new(correlation_header.clone()))
        .layer(SetRequestIdLayer::new(correlation_header, MakeRequestUuid))
}

fn request_span(request: &Request<Body>) -> tracing::Span {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        correlation_id,
    )
}
