//! Generation API router.
//!
//! Layers (outermost first): trace → CORS → body limit → handler.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::config::MAX_REQUEST_BODY_BYTES;
use crate::pipeline::GenerationHandler;

/// Build the router around a shared generation handler.
pub fn generation_router(handler: Arc<GenerationHandler>) -> Router {
    let ctx = ApiContext::new(handler);

    Router::new()
        .route("/generate", post(endpoints::generate::generate))
        .route("/health", get(endpoints::health::check))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
