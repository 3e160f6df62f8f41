//! Rutas públicas del pasajero
//!
//! Catálogo de rutas, foto de buses activos y stream SSE de cambios de la
//! vista reconciliada. El stream empieza siempre con un `reset`.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::controllers::tracking_controller::TrackingController;
use crate::dto::tracking_dto::{ActiveBusesResponse, RouteStopsResponse};
use crate::dto::ApiResponse;
use crate::models::{Route, ViewChange};
use crate::services::ClientReconciler;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_tracking_router() -> Router<AppState> {
    Router::new()
        .route("/routes", get(list_routes))
        .route("/routes/:id/stops", get(route_stops))
        .route("/routes/:id/active-buses", get(active_buses))
        .route("/routes/:id/live", get(route_live))
        .route("/live", get(all_live))
}

async fn list_routes(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Route>>>, AppError> {
    let controller = TrackingController::new(state.engine.clone());
    Ok(Json(controller.list_routes().await?))
}

async fn route_stops(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RouteStopsResponse>>, AppError> {
    let controller = TrackingController::new(state.engine.clone());
    Ok(Json(controller.route_stops(id).await?))
}

async fn active_buses(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ActiveBusesResponse>>, AppError> {
    let controller = TrackingController::new(state.engine.clone());
    Ok(Json(controller.active_buses(id).await?))
}

async fn route_live(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let controller = TrackingController::new(state.engine.clone());
    let reconciler = controller.live(Some(id)).await?;
    info!("📺 Stream en vivo abierto para la ruta {}", id);
    Ok(live_stream(reconciler))
}

async fn all_live(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let controller = TrackingController::new(state.engine.clone());
    let reconciler = controller.live(None).await?;
    info!("📺 Stream en vivo abierto para todas las rutas");
    Ok(live_stream(reconciler))
}

/// Convertir el reconciliador en eventos SSE; la suscripción se libera al
/// cerrarse la conexión
fn live_stream(reconciler: ClientReconciler) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let initial = ViewChange::Reset {
        buses: reconciler.snapshot(),
    };

    let changes = stream::unfold(reconciler, |mut reconciler| async move {
        match reconciler.next_change().await {
            Ok(Some(change)) => Some((change, reconciler)),
            Ok(None) => None,
            Err(e) => {
                warn!("⚠️ Stream en vivo cerrado: {}", e);
                None
            }
        }
    });

    let events = stream::once(async move { initial })
        .chain(changes)
        .filter_map(|change| async move { to_event(&change) })
        .map(Ok);

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_event(change: &ViewChange) -> Option<Event> {
    let name = match change {
        ViewChange::Upserted { .. } => "upserted",
        ViewChange::Removed { .. } => "removed",
        ViewChange::Reset { .. } => "reset",
    };
    match Event::default().event(name).json_data(change) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("⚠️ No se pudo serializar el cambio {}: {}", name, e);
            None
        }
    }
}
