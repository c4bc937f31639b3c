//! Liveness server: Axum endpoint for process supervisors and operators.
//!
//! `/health` and `/` serve the static engine document; `/api/*` expose
//! live counters, recent iterations and trust scores.
//! CORS enabled for browser tooling.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use routes::{AppState, EngineInfo, HealthState};

/// Bind the port and serve in a background task.
///
/// Binding happens before returning so a taken port is reported to the caller.
pub async fn spawn_health_server(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health port {port}"))?;
    info!(port, "Health server listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Health server stopped");
        }
    });
    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/", get(routes::health))
        .route("/api/status", get(routes::get_status))
        .route("/api/iterations", get(routes::get_iterations))
        .route("/api/trust", get(routes::get_trust))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
