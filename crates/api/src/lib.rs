//! HTTP host for the prompt backend.
//!
//! Serves the HTTP use cases through the inbound request pipeline, drains the
//! in-process processing queue with a polling worker, and exposes health and
//! Prometheus metrics endpoints.

pub mod authority;
pub mod config;
pub mod gateway;
pub mod queue;
pub mod routes;
pub mod state;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, PROMPT_QUEUE, PromptWorker, Services, create_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route(
            "/prompts",
            post(routes::prompts::submit).get(routes::prompts::list),
        )
        .route("/prompts/{id}", get(routes::prompts::get))
        .route("/accounts", post(routes::accounts::provision))
        .route("/credits", post(routes::credits::add))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
