use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::dto::location_dto::{LocationHistoryQuery, SubmitLocationRequest};
use crate::dto::ApiResponse;
use crate::models::LocationSample;
use crate::repositories::LocationRepository;
use crate::services::TrackingEngine;
use crate::utils::errors::{not_found_error, AppError};

pub struct LocationController {
    engine: Arc<TrackingEngine>,
}

impl LocationController {
    pub fn new(engine: Arc<TrackingEngine>) -> Self {
        Self { engine }
    }

    pub async fn submit(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        request: SubmitLocationRequest,
    ) -> Result<ApiResponse<LocationSample>, AppError> {
        request.validate()?;

        let sample = self.engine.ingest().submit(trip_id, driver_id, request.into()).await?;
        Ok(ApiResponse::success(sample))
    }

    /// Última posición; `data: null` si el viaje aún no tiene muestras
    pub async fn latest(&self, trip_id: Uuid) -> Result<ApiResponse<Option<LocationSample>>, AppError> {
        self.ensure_trip_exists(trip_id).await?;
        let latest = self.engine.locations().latest_for_trip(trip_id).await?;
        Ok(ApiResponse::success(latest))
    }

    pub async fn history(
        &self,
        trip_id: Uuid,
        query: LocationHistoryQuery,
    ) -> Result<ApiResponse<Vec<LocationSample>>, AppError> {
        query.validate()?;
        self.ensure_trip_exists(trip_id).await?;

        let samples = self
            .engine
            .locations()
            .history_for_trip(trip_id, query.limit())
            .await?;
        Ok(ApiResponse::success(samples))
    }

    async fn ensure_trip_exists(&self, trip_id: Uuid) -> Result<(), AppError> {
        match self.engine.registry().get_trip(trip_id).await? {
            Some(_) => Ok(()),
            None => Err(not_found_error("Trip", &trip_id.to_string()).into()),
        }
    }
}
