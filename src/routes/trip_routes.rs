use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::controllers::location_controller::LocationController;
use crate::controllers::trip_controller::TripController;
use crate::dto::location_dto::{LocationHistoryQuery, SubmitLocationRequest};
use crate::dto::trip_dto::{StartTripRequest, TripResponse};
use crate::dto::ApiResponse;
use crate::middleware::auth::{driver_auth_middleware, AuthenticatedDriver};
use crate::models::LocationSample;
use crate::state::AppState;
use crate::utils::errors::AppError;

/// Rutas de viaje; las escrituras requieren token de conductor
pub fn create_trip_router(state: AppState) -> Router<AppState> {
    let driver_auth = || middleware::from_fn_with_state(state.clone(), driver_auth_middleware);

    Router::new()
        .route("/", post(start_trip).route_layer(driver_auth()))
        .route("/active", get(active_trip).route_layer(driver_auth()))
        .route("/:id/end", post(end_trip).route_layer(driver_auth()))
        .route("/:id/cancel", post(cancel_trip).route_layer(driver_auth()))
        .route(
            "/:id/locations",
            post(submit_location)
                .route_layer(driver_auth())
                .merge(get(location_history)),
        )
        .route("/:id/locations/latest", get(latest_location))
}

async fn start_trip(
    State(state): State<AppState>,
    Extension(driver): Extension<AuthenticatedDriver>,
    Json(request): Json<StartTripRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TripResponse>>), AppError> {
    let controller = TripController::new(state.engine.clone());
    let response = controller.start(driver.driver_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn active_trip(
    State(state): State<AppState>,
    Extension(driver): Extension<AuthenticatedDriver>,
) -> Result<Json<ApiResponse<Option<TripResponse>>>, AppError> {
    let controller = TripController::new(state.engine.clone());
    Ok(Json(controller.active(driver.driver_id).await?))
}

async fn end_trip(
    State(state): State<AppState>,
    Extension(driver): Extension<AuthenticatedDriver>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TripResponse>>, AppError> {
    let controller = TripController::new(state.engine.clone());
    Ok(Json(controller.end(id, driver.driver_id).await?))
}

async fn cancel_trip(
    State(state): State<AppState>,
    Extension(driver): Extension<AuthenticatedDriver>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TripResponse>>, AppError> {
    let controller = TripController::new(state.engine.clone());
    Ok(Json(controller.cancel(id, driver.driver_id).await?))
}

async fn submit_location(
    State(state): State<AppState>,
    Extension(driver): Extension<AuthenticatedDriver>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitLocationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LocationSample>>), AppError> {
    let controller = LocationController::new(state.engine.clone());
    let response = controller.submit(id, driver.driver_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn latest_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Option<LocationSample>>>, AppError> {
    let controller = LocationController::new(state.engine.clone());
    Ok(Json(controller.latest(id).await?))
}

async fn location_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LocationHistoryQuery>,
) -> Result<Json<ApiResponse<Vec<LocationSample>>>, AppError> {
    let controller = LocationController::new(state.engine.clone());
    Ok(Json(controller.history(id, query).await?))
}
