//! Router de la aplicación

pub mod tracking_routes;
pub mod trip_routes;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::middleware::cors::cors_layer;
use crate::state::AppState;
use crate::utils::errors::AppError;

// Solo limita hasta las cabeceras; los streams SSE siguen abiertos
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn create_app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .nest("/api/trips", trip_routes::create_trip_router(state.clone()))
        .nest("/api", tracking_routes::create_tracking_router())
        .layer(cors_layer(&state.config))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "bus-tracking",
        "environment": state.config.environment,
        "storage_backend": state.config.storage_backend.as_str(),
        "subscribers": state.engine.broker().subscriber_count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state
        .engine
        .metrics()
        .render()
        .map_err(|e| AppError::Internal(format!("Error exportando métricas: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
