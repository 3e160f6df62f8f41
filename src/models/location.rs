//! Modelo de LocationSample
//!
//! Observación de posición con marca de tiempo asignada por el servidor.
//! Append-only; mapea a la tabla `gps_locations`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct LocationSample {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Posición tal como la entrega la fuente de posicionamiento o el cliente
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
}

impl PositionFix {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }
}

impl LocationSample {
    /// Construir la muestra aceptada; los campos opcionales ausentes valen cero
    pub fn accept(trip_id: Uuid, fix: PositionFix, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed: Some(fix.speed.unwrap_or(0.0)),
            heading: Some(fix.heading.unwrap_or(0.0)),
            accuracy: Some(fix.accuracy.unwrap_or(0.0)),
            created_at,
        }
    }
}
