//! Eventos del broker de distribución

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::LocationSample;
use super::trip::TripSummary;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
    TripStarted { trip: TripSummary },
    /// Fin del viaje; `trip.status` indica si fue completado o cancelado
    TripEnded { trip: TripSummary },
    SampleAccepted { trip: TripSummary, sample: LocationSample },
}

impl TrackingEvent {
    pub fn trip(&self) -> &TripSummary {
        match self {
            TrackingEvent::TripStarted { trip }
            | TrackingEvent::TripEnded { trip }
            | TrackingEvent::SampleAccepted { trip, .. } => trip,
        }
    }

    pub fn trip_id(&self) -> Uuid {
        self.trip().trip_id
    }

    pub fn route_id(&self) -> Uuid {
        self.trip().route_id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TrackingEvent::TripStarted { .. } => "trip_started",
            TrackingEvent::TripEnded { .. } => "trip_ended",
            TrackingEvent::SampleAccepted { .. } => "sample_accepted",
        }
    }
}
