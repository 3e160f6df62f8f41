use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ActiveBus, Route, Stop};

// Response de ruta con su trazado de paradas
#[derive(Debug, Serialize, Deserialize)]
pub struct RouteStopsResponse {
    pub route: Route,
    pub stops: Vec<Stop>,
}

// Foto de buses activos para el primer render del pasajero
#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveBusesResponse {
    pub route_id: Option<Uuid>,
    pub buses: Vec<ActiveBus>,
    pub generated_at: DateTime<Utc>,
}
