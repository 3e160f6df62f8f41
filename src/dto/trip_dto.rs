use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Trip, TripStatus, TripSummary};

// Request para iniciar un viaje; el conductor sale del token
#[derive(Debug, Deserialize)]
pub struct StartTripRequest {
    pub vehicle_id: Uuid,
    pub route_id: Uuid,
}

// Response de viaje
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TripResponse {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub route_id: Uuid,
    pub driver_id: Uuid,
    pub status: TripStatus,
    pub vehicle_number: String,
    pub route_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TripResponse {
    pub fn new(trip: Trip, summary: TripSummary) -> Self {
        Self {
            id: trip.id,
            bus_id: trip.bus_id,
            route_id: trip.route_id,
            driver_id: trip.driver_id,
            status: trip.status,
            vehicle_number: summary.vehicle_number,
            route_name: summary.route_name,
            started_at: trip.started_at,
            completed_at: trip.completed_at,
        }
    }
}
