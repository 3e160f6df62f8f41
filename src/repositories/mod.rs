//! Repositorios
//!
//! Contratos de almacenamiento del motor de seguimiento y sus dos
//! implementaciones: PostgreSQL (sqlx) y memoria.

pub mod location_repository;
pub mod memory;
pub mod reference_repository;
pub mod trip_repository;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{LocationSample, Route, Stop, Trip, TripStatus, Vehicle};
use crate::utils::errors::TrackingResult;

pub use location_repository::PgLocationRepository;
pub use memory::{
    InMemoryLocationRepository, InMemoryReferenceData, InMemoryTripRepository, DEMO_ROUTE_ID, DEMO_VEHICLE_ID,
};
pub use reference_repository::PgReferenceDataRepository;
pub use trip_repository::PgTripRepository;

/// Registros de viajes
#[async_trait]
pub trait TripRepository: Send + Sync {
    /// Insertar un viaje activo; `Conflict` si el conductor ya tiene uno activo.
    /// La comprobación y la inserción son atómicas.
    async fn insert_active(&self, trip: Trip) -> TrackingResult<Trip>;

    async fn find_by_id(&self, id: Uuid) -> TrackingResult<Option<Trip>>;

    async fn find_active_by_driver(&self, driver_id: Uuid) -> TrackingResult<Option<Trip>>;

    /// Viajes activos, opcionalmente filtrados por ruta
    async fn list_active(&self, route_id: Option<Uuid>) -> TrackingResult<Vec<Trip>>;

    /// Transición `active -> status`; `InvalidState` si el viaje ya no está activo
    async fn finish(&self, id: Uuid, status: TripStatus, at: DateTime<Utc>) -> TrackingResult<Trip>;
}

/// Log append-only de muestras de posición
#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn append(&self, sample: LocationSample) -> TrackingResult<LocationSample>;

    async fn latest_for_trip(&self, trip_id: Uuid) -> TrackingResult<Option<LocationSample>>;

    /// Última muestra de cada viaje; los viajes sin muestras no aparecen
    async fn latest_for_trips(&self, trip_ids: &[Uuid]) -> TrackingResult<HashMap<Uuid, LocationSample>>;

    /// Historial más reciente primero
    async fn history_for_trip(&self, trip_id: Uuid, limit: usize) -> TrackingResult<Vec<LocationSample>>;
}

/// Datos de referencia de solo lectura
#[async_trait]
pub trait ReferenceDataRepository: Send + Sync {
    async fn find_vehicle(&self, id: Uuid) -> TrackingResult<Option<Vehicle>>;

    async fn find_route(&self, id: Uuid) -> TrackingResult<Option<Route>>;

    async fn list_active_routes(&self) -> TrackingResult<Vec<Route>>;

    /// Paradas de la ruta ordenadas por `stop_order`
    async fn list_stops(&self, route_id: Uuid) -> TrackingResult<Vec<Stop>>;
}
