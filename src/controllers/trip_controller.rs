use std::sync::Arc;

use uuid::Uuid;

use crate::dto::trip_dto::{StartTripRequest, TripResponse};
use crate::dto::ApiResponse;
use crate::models::Trip;
use crate::services::TrackingEngine;
use crate::utils::errors::AppError;

pub struct TripController {
    engine: Arc<TrackingEngine>,
}

impl TripController {
    pub fn new(engine: Arc<TrackingEngine>) -> Self {
        Self { engine }
    }

    pub async fn start(
        &self,
        driver_id: Uuid,
        request: StartTripRequest,
    ) -> Result<ApiResponse<TripResponse>, AppError> {
        let trip = self
            .engine
            .registry()
            .start_trip(request.vehicle_id, request.route_id, driver_id)
            .await?;

        Ok(ApiResponse::success_with_message(
            self.to_response(trip).await,
            "Viaje iniciado".to_string(),
        ))
    }

    /// Viaje activo del conductor, para reanudar tras reconexión
    pub async fn active(&self, driver_id: Uuid) -> Result<ApiResponse<Option<TripResponse>>, AppError> {
        let response = match self.engine.registry().get_active_trip(driver_id).await? {
            Some(trip) => Some(self.to_response(trip).await),
            None => None,
        };
        Ok(ApiResponse::success(response))
    }

    pub async fn end(&self, trip_id: Uuid, driver_id: Uuid) -> Result<ApiResponse<TripResponse>, AppError> {
        let trip = self.engine.registry().end_trip(trip_id, driver_id).await?;
        Ok(ApiResponse::success_with_message(
            self.to_response(trip).await,
            "Viaje finalizado".to_string(),
        ))
    }

    pub async fn cancel(&self, trip_id: Uuid, driver_id: Uuid) -> Result<ApiResponse<TripResponse>, AppError> {
        let trip = self.engine.registry().cancel_trip(trip_id, driver_id).await?;
        Ok(ApiResponse::success_with_message(
            self.to_response(trip).await,
            "Viaje cancelado".to_string(),
        ))
    }

    async fn to_response(&self, trip: Trip) -> TripResponse {
        let summary = self.engine.registry().summary_for(&trip).await;
        TripResponse::new(trip, summary)
    }
}
