use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::dto::tracking_dto::{ActiveBusesResponse, RouteStopsResponse};
use crate::dto::ApiResponse;
use crate::models::Route;
use crate::services::{ClientReconciler, SubscriptionFilter, TrackingEngine};
use crate::utils::errors::{not_found_error, AppError};

pub struct TrackingController {
    engine: Arc<TrackingEngine>,
}

impl TrackingController {
    pub fn new(engine: Arc<TrackingEngine>) -> Self {
        Self { engine }
    }

    pub async fn list_routes(&self) -> Result<ApiResponse<Vec<Route>>, AppError> {
        Ok(ApiResponse::success(self.engine.list_active_routes().await?))
    }

    pub async fn route_stops(&self, route_id: Uuid) -> Result<ApiResponse<RouteStopsResponse>, AppError> {
        let route = self.find_route(route_id).await?;
        let stops = self.engine.list_stops(route_id).await?;
        Ok(ApiResponse::success(RouteStopsResponse { route, stops }))
    }

    pub async fn active_buses(&self, route_id: Uuid) -> Result<ApiResponse<ActiveBusesResponse>, AppError> {
        self.find_route(route_id).await?;
        let buses = self.engine.active_buses(SubscriptionFilter::Route(route_id)).await?;

        Ok(ApiResponse::success(ActiveBusesResponse {
            route_id: Some(route_id),
            buses,
            generated_at: Utc::now(),
        }))
    }

    /// Reconciliador para el stream en vivo de una ruta (o de todas)
    pub async fn live(&self, route_id: Option<Uuid>) -> Result<ClientReconciler, AppError> {
        let filter = match route_id {
            Some(route_id) => {
                self.find_route(route_id).await?;
                SubscriptionFilter::Route(route_id)
            }
            None => SubscriptionFilter::AllTrips,
        };
        Ok(self.engine.reconciler(filter).await?)
    }

    async fn find_route(&self, route_id: Uuid) -> Result<Route, AppError> {
        self.engine
            .find_route(route_id)
            .await?
            .ok_or_else(|| not_found_error("Route", &route_id.to_string()).into())
    }
}
