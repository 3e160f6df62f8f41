use serde::Deserialize;
use validator::Validate;

use crate::models::PositionFix;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

// Request de envío de posición
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitLocationRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 0.0))]
    pub speed: Option<f64>,
    #[validate(range(min = 0.0, max = 360.0))]
    pub heading: Option<f64>,
    #[validate(range(min = 0.0))]
    pub accuracy: Option<f64>,
}

impl From<SubmitLocationRequest> for PositionFix {
    fn from(request: SubmitLocationRequest) -> Self {
        Self {
            latitude: request.latitude,
            longitude: request.longitude,
            speed: request.speed,
            heading: request.heading,
            accuracy: request.accuracy,
        }
    }
}

// Query del historial de posiciones
#[derive(Debug, Deserialize, Validate)]
pub struct LocationHistoryQuery {
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<usize>,
}

impl LocationHistoryQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }
}
