//! Modelo de Trip
//!
//! Entidad mutable central: un recorrido de un vehículo por una ruta,
//! conducido por un único conductor. Mapea a la tabla `trips`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado del viaje - mapea al ENUM trip_status
///
/// `Completed` y `Cancelled` son terminales.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "trip_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Active,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TripStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Active => "active",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub route_id: Uuid,
    pub driver_id: Uuid,
    pub status: TripStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trip {
    /// Nuevo viaje activo
    pub fn start(id: Uuid, bus_id: Uuid, route_id: Uuid, driver_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            bus_id,
            route_id,
            driver_id,
            status: TripStatus::Active,
            started_at,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TripStatus::Active
    }

    pub fn belongs_to(&self, driver_id: Uuid) -> bool {
        self.driver_id == driver_id
    }
}

/// Resumen desnormalizado que viaja con cada evento del broker
///
/// Lleva número de bus y nombre de ruta para que los suscriptores puedan
/// mostrar el bus sin consultar los datos de referencia.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripSummary {
    pub trip_id: Uuid,
    pub route_id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle_number: String,
    pub route_name: String,
    pub status: TripStatus,
}

impl TripSummary {
    /// Resumen sin datos de referencia (si el vehículo o la ruta ya no existen)
    pub fn bare(trip: &Trip) -> Self {
        Self {
            trip_id: trip.id,
            route_id: trip.route_id,
            vehicle_id: trip.bus_id,
            vehicle_number: String::new(),
            route_name: String::new(),
            status: trip.status,
        }
    }

    pub fn with_status(mut self, status: TripStatus) -> Self {
        self.status = status;
        self
    }
}
