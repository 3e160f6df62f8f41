//! Vista derivada de buses activos
//!
//! Cache por suscriptor, reconstruible siempre desde el registro de viajes
//! y la última muestra de cada viaje.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::LocationSample;
use super::trip::TripSummary;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveBus {
    pub trip_id: Uuid,
    pub route_id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle_number: String,
    pub route_name: String,
    /// `None` mientras el bus está despachado pero sin GPS todavía
    pub sample: Option<LocationSample>,
}

impl ActiveBus {
    pub fn from_summary(summary: &TripSummary, sample: Option<LocationSample>) -> Self {
        Self {
            trip_id: summary.trip_id,
            route_id: summary.route_id,
            vehicle_id: summary.vehicle_id,
            vehicle_number: summary.vehicle_number.clone(),
            route_name: summary.route_name.clone(),
            sample,
        }
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        self.sample.as_ref().map(|s| (s.latitude, s.longitude))
    }
}

/// Diferencia emitida por el reconciliador hacia la capa de presentación
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewChange {
    Upserted { bus: ActiveBus },
    Removed { trip_id: Uuid },
    /// Vista completa tras bootstrap o resync
    Reset { buses: Vec<ActiveBus> },
}
