//! Cliente HTTP del servidor de seguimiento

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use bus_tracking::dto::tracking_dto::RouteStopsResponse;
use bus_tracking::dto::trip_dto::TripResponse;
use bus_tracking::dto::ApiResponse;
use bus_tracking::models::{LocationSample, PositionFix, Route};
use bus_tracking::services::LocationSink;
use bus_tracking::utils::errors::{TrackingError, TrackingResult};

/// Error devuelto por la API, con su código
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.code, self.message)
    }
}

impl std::error::Error for ApiFailure {}

impl ApiFailure {
    fn into_tracking_error(self) -> TrackingError {
        match self.code.as_str() {
            "VALIDATION_ERROR" => TrackingError::Validation(self.message),
            "CONFLICT" => TrackingError::Conflict(self.message),
            "NOT_FOUND" => TrackingError::NotFound(self.message),
            "INVALID_STATE" => TrackingError::InvalidState(self.message),
            _ => TrackingError::Storage(self.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct TrackingClient {
    http: Client,
    base_url: String,
    token: String,
}

impl TrackingClient {
    pub fn new(base_url: &str, token: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub async fn list_routes(&self) -> Result<Vec<Route>> {
        let response = self.http.get(self.url("/api/routes")).send().await?;
        data(response).await
    }

    pub async fn route_stops(&self, route_id: Uuid) -> Result<RouteStopsResponse> {
        let response = self
            .http
            .get(self.url(&format!("/api/routes/{}/stops", route_id)))
            .send()
            .await?;
        data(response).await
    }

    pub async fn active_trip(&self) -> Result<Option<TripResponse>> {
        let response = self
            .http
            .get(self.url("/api/trips/active"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        optional_data(response).await
    }

    pub async fn start_trip(&self, vehicle_id: Uuid, route_id: Uuid) -> Result<TripResponse> {
        let response = self
            .http
            .post(self.url("/api/trips"))
            .bearer_auth(&self.token)
            .json(&json!({ "vehicle_id": vehicle_id, "route_id": route_id }))
            .send()
            .await?;
        data(response).await
    }

    pub async fn end_trip(&self, trip_id: Uuid) -> Result<TripResponse> {
        self.finish(trip_id, "end").await
    }

    pub async fn cancel_trip(&self, trip_id: Uuid) -> Result<TripResponse> {
        self.finish(trip_id, "cancel").await
    }

    async fn finish(&self, trip_id: Uuid, action: &str) -> Result<TripResponse> {
        let response = self
            .http
            .post(self.url(&format!("/api/trips/{}/{}", trip_id, action)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        data(response).await
    }

    pub async fn latest_location(&self, trip_id: Uuid) -> Result<Option<LocationSample>> {
        let response = self
            .http
            .get(self.url(&format!("/api/trips/{}/locations/latest", trip_id)))
            .send()
            .await?;
        optional_data(response).await
    }

    async fn submit_location(&self, trip_id: Uuid, fix: PositionFix) -> Result<LocationSample> {
        let response = self
            .http
            .post(self.url(&format!("/api/trips/{}/locations", trip_id)))
            .bearer_auth(&self.token)
            .json(&fix)
            .send()
            .await?;
        data(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Extraer `data` de un `ApiResponse`, o el error tipado de la API
async fn data<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    optional_data(response)
        .await?
        .ok_or_else(|| anyhow!("respuesta sin datos ({})", status))
}

/// Igual que `data`, para endpoints que responden `data: null`
async fn optional_data<T: DeserializeOwned>(response: Response) -> Result<Option<T>> {
    let status = response.status();
    let body: serde_json::Value = response.json().await?;

    if !status.is_success() {
        return Err(ApiFailure {
            status,
            code: body["code"].as_str().unwrap_or("UNKNOWN").to_string(),
            message: body["message"].as_str().unwrap_or_default().to_string(),
        }
        .into());
    }

    let envelope: ApiResponse<T> = serde_json::from_value(body)?;
    Ok(envelope.data)
}

/// Código de error de la API, si lo hubo
pub fn failure_code(error: &anyhow::Error) -> Option<&str> {
    error.downcast_ref::<ApiFailure>().map(|f| f.code.as_str())
}

/// Envío de posiciones por HTTP
pub struct HttpLocationSink {
    client: TrackingClient,
}

impl HttpLocationSink {
    pub fn new(client: TrackingClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LocationSink for HttpLocationSink {
    async fn submit(&self, trip_id: Uuid, fix: PositionFix) -> TrackingResult<LocationSample> {
        self.client
            .submit_location(trip_id, fix)
            .await
            .map_err(|e| match e.downcast::<ApiFailure>() {
                Ok(failure) => failure.into_tracking_error(),
                Err(e) => TrackingError::Storage(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_codes_map_to_tracking_errors() {
        let failure = |code: &str| ApiFailure {
            status: StatusCode::CONFLICT,
            code: code.to_string(),
            message: "trip is completed".to_string(),
        };

        assert!(matches!(
            failure("INVALID_STATE").into_tracking_error(),
            TrackingError::InvalidState(_)
        ));
        assert!(matches!(failure("CONFLICT").into_tracking_error(), TrackingError::Conflict(_)));
        assert!(matches!(failure("JWT_ERROR").into_tracking_error(), TrackingError::Storage(_)));
    }

    #[test]
    fn test_failure_code_is_recovered_from_anyhow() {
        let error: anyhow::Error = ApiFailure {
            status: StatusCode::CONFLICT,
            code: "CONFLICT".to_string(),
            message: "driver already has an active trip".to_string(),
        }
        .into();
        assert_eq!(failure_code(&error), Some("CONFLICT"));
        assert_eq!(failure_code(&anyhow!("io")), None);
    }
}
