//! Registro de viajes
//!
//! Dueño del ciclo de vida de los viajes. Garantiza un único viaje activo
//! por conductor y publica `TripStarted` / `TripEnded` en el broker.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{TrackingEvent, Trip, TripStatus, TripSummary};
use crate::repositories::{ReferenceDataRepository, TripRepository};
use crate::services::broker::FanoutBroker;
use crate::utils::errors::{conflict_error, not_found_error, TrackingError, TrackingResult};
use crate::utils::keyed_lock::KeyedLocks;

pub struct TripRegistry {
    trips: Arc<dyn TripRepository>,
    reference: Arc<dyn ReferenceDataRepository>,
    broker: FanoutBroker,
    trip_locks: Arc<KeyedLocks<Uuid>>,
    driver_locks: KeyedLocks<Uuid>,
    // Resúmenes de viajes activos, para no releer datos de referencia en cada muestra
    summaries: RwLock<HashMap<Uuid, TripSummary>>,
}

impl TripRegistry {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        reference: Arc<dyn ReferenceDataRepository>,
        broker: FanoutBroker,
        trip_locks: Arc<KeyedLocks<Uuid>>,
    ) -> Self {
        Self {
            trips,
            reference,
            broker,
            trip_locks,
            driver_locks: KeyedLocks::new(),
            summaries: RwLock::new(HashMap::new()),
        }
    }

    /// Iniciar un viaje para el conductor
    ///
    /// `NotFound` si el vehículo o la ruta no existen o están inactivos;
    /// `Conflict` si el conductor ya tiene un viaje activo.
    pub async fn start_trip(&self, vehicle_id: Uuid, route_id: Uuid, driver_id: Uuid) -> TrackingResult<Trip> {
        let vehicle = self
            .reference
            .find_vehicle(vehicle_id)
            .await?
            .filter(|v| v.is_active)
            .ok_or_else(|| not_found_error("Active vehicle", &vehicle_id.to_string()))?;
        let route = self
            .reference
            .find_route(route_id)
            .await?
            .filter(|r| r.is_active)
            .ok_or_else(|| not_found_error("Active route", &route_id.to_string()))?;

        let _driver_guard = self.driver_locks.lock(driver_id).await;

        if self.trips.find_active_by_driver(driver_id).await?.is_some() {
            return Err(conflict_error("Active trip", "driver_id", &driver_id.to_string()));
        }

        // Lock del viaje tomado antes de insertar: ninguna muestra puede
        // publicarse antes que su TripStarted
        let trip_id = Uuid::new_v4();
        let _trip_guard = self.trip_locks.lock(trip_id).await;

        let trip = self
            .trips
            .insert_active(Trip::start(trip_id, vehicle.id, route.id, driver_id, Utc::now()))
            .await?;

        let summary = TripSummary {
            trip_id: trip.id,
            route_id: route.id,
            vehicle_id: vehicle.id,
            vehicle_number: vehicle.number,
            route_name: route.name,
            status: TripStatus::Active,
        };
        self.summaries.write().await.insert(trip.id, summary.clone());

        info!(
            "🚌 Viaje {} iniciado: bus {} en ruta '{}'",
            trip.id, summary.vehicle_number, summary.route_name
        );
        self.broker.publish(TrackingEvent::TripStarted { trip: summary });

        Ok(trip)
    }

    /// Completar el viaje activo del conductor
    pub async fn end_trip(&self, trip_id: Uuid, driver_id: Uuid) -> TrackingResult<Trip> {
        self.finish_trip(trip_id, driver_id, TripStatus::Completed).await
    }

    /// Cancelar el viaje activo del conductor
    pub async fn cancel_trip(&self, trip_id: Uuid, driver_id: Uuid) -> TrackingResult<Trip> {
        self.finish_trip(trip_id, driver_id, TripStatus::Cancelled).await
    }

    async fn finish_trip(&self, trip_id: Uuid, driver_id: Uuid, status: TripStatus) -> TrackingResult<Trip> {
        // Mismo lock que la ingesta: ninguna muestra se acepta tras el TripEnded
        let _trip_guard = self.trip_locks.lock(trip_id).await;

        match self.trips.find_by_id(trip_id).await? {
            Some(trip) if trip.belongs_to(driver_id) && trip.is_active() => {}
            _ => {
                return Err(TrackingError::NotFound(format!(
                    "no active trip '{}' for driver '{}'",
                    trip_id, driver_id
                )))
            }
        }

        let trip = self.trips.finish(trip_id, status, Utc::now()).await?;

        let cached = self.summaries.write().await.remove(&trip_id);
        let summary = match cached {
            Some(summary) => summary,
            None => self.describe(&trip).await,
        }
        .with_status(trip.status);

        info!("🏁 Viaje {} finalizado ({})", trip.id, trip.status.as_str());
        self.broker.publish(TrackingEvent::TripEnded { trip: summary });

        Ok(trip)
    }

    /// Viaje activo del conductor (para reanudar tras reconexión)
    pub async fn get_active_trip(&self, driver_id: Uuid) -> TrackingResult<Option<Trip>> {
        self.trips.find_active_by_driver(driver_id).await
    }

    pub async fn get_trip(&self, trip_id: Uuid) -> TrackingResult<Option<Trip>> {
        self.trips.find_by_id(trip_id).await
    }

    pub async fn list_active_trips_by_route(&self, route_id: Uuid) -> TrackingResult<Vec<Trip>> {
        self.trips.list_active(Some(route_id)).await
    }

    pub async fn list_active_trips(&self) -> TrackingResult<Vec<Trip>> {
        self.trips.list_active(None).await
    }

    /// Resumen desnormalizado del viaje (número de bus y nombre de ruta)
    pub async fn summary_for(&self, trip: &Trip) -> TripSummary {
        if let Some(summary) = self.summaries.read().await.get(&trip.id) {
            return summary.clone().with_status(trip.status);
        }

        let summary = self.describe(trip).await;
        if trip.is_active() {
            // `trip` puede ser una foto anterior a finish_trip. Con el lock de
            // escritura tomado, finish_trip no puede retirar la entrada entre
            // la comprobación y la inserción.
            let mut summaries = self.summaries.write().await;
            let still_active = matches!(
                self.trips.find_by_id(trip.id).await,
                Ok(Some(current)) if current.is_active()
            );
            if still_active {
                summaries.insert(trip.id, summary.clone());
            }
        }
        summary
    }

    async fn describe(&self, trip: &Trip) -> TripSummary {
        let vehicle = self.reference.find_vehicle(trip.bus_id).await;
        let route = self.reference.find_route(trip.route_id).await;

        match (vehicle, route) {
            (Ok(Some(vehicle)), Ok(Some(route))) => TripSummary {
                trip_id: trip.id,
                route_id: trip.route_id,
                vehicle_id: trip.bus_id,
                vehicle_number: vehicle.number,
                route_name: route.name,
                status: trip.status,
            },
            (vehicle, route) => {
                warn!(
                    "⚠️ Datos de referencia incompletos para el viaje {} (vehículo: {:?}, ruta: {:?})",
                    trip.id,
                    vehicle.map(|v| v.is_some()),
                    route.map(|r| r.is_some())
                );
                TripSummary::bare(trip)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Route, Vehicle};
    use crate::repositories::{InMemoryReferenceData, InMemoryTripRepository};
    use crate::services::broker::SubscriptionFilter;
    use crate::services::metrics::TrackingMetrics;

    struct Fixture {
        registry: TripRegistry,
        broker: FanoutBroker,
        vehicle_id: Uuid,
        route_id: Uuid,
        retired_vehicle_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let reference = InMemoryReferenceData::new();
        let vehicle_id = Uuid::new_v4();
        let route_id = Uuid::new_v4();
        let retired_vehicle_id = Uuid::new_v4();
        reference.insert_vehicle(Vehicle::new(vehicle_id, "12", 40)).await;
        reference
            .insert_vehicle(Vehicle {
                is_active: false,
                ..Vehicle::new(retired_vehicle_id, "99", 40)
            })
            .await;
        reference.insert_route(Route::new(route_id, "Downtown Loop"), Vec::new()).await;

        let broker = FanoutBroker::new(16, TrackingMetrics::new().unwrap());
        let registry = TripRegistry::new(
            Arc::new(InMemoryTripRepository::new()),
            Arc::new(reference),
            broker.clone(),
            Arc::new(KeyedLocks::new()),
        );

        Fixture {
            registry,
            broker,
            vehicle_id,
            route_id,
            retired_vehicle_id,
        }
    }

    #[tokio::test]
    async fn test_second_start_conflicts_until_trip_ends() {
        let f = fixture().await;
        let driver = Uuid::new_v4();

        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();
        let again = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await;
        assert!(matches!(again, Err(TrackingError::Conflict(_))));

        let ended = f.registry.end_trip(trip.id, driver).await.unwrap();
        assert_eq!(ended.status, TripStatus::Completed);
        assert!(ended.completed_at.is_some());

        assert!(f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_references_are_not_found() {
        let f = fixture().await;
        let driver = Uuid::new_v4();

        let unknown = f.registry.start_trip(Uuid::new_v4(), f.route_id, driver).await;
        assert!(matches!(unknown, Err(TrackingError::NotFound(_))));

        let retired = f.registry.start_trip(f.retired_vehicle_id, f.route_id, driver).await;
        assert!(matches!(retired, Err(TrackingError::NotFound(_))));

        let no_route = f.registry.start_trip(f.vehicle_id, Uuid::new_v4(), driver).await;
        assert!(matches!(no_route, Err(TrackingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_end_trip_requires_owner_and_active_status() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();

        let stranger = f.registry.end_trip(trip.id, Uuid::new_v4()).await;
        assert!(matches!(stranger, Err(TrackingError::NotFound(_))));

        f.registry.cancel_trip(trip.id, driver).await.unwrap();
        let twice = f.registry.end_trip(trip.id, driver).await;
        assert!(matches!(twice, Err(TrackingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_published() {
        let f = fixture().await;
        let mut sub = f.broker.subscribe(SubscriptionFilter::Route(f.route_id));
        let driver = Uuid::new_v4();

        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();
        f.registry.cancel_trip(trip.id, driver).await.unwrap();

        match sub.recv().await.unwrap().unwrap() {
            TrackingEvent::TripStarted { trip: summary } => {
                assert_eq!(summary.vehicle_number, "12");
                assert_eq!(summary.route_name, "Downtown Loop");
            }
            other => panic!("unexpected event {:?}", other),
        }
        match sub.recv().await.unwrap().unwrap() {
            TrackingEvent::TripEnded { trip: summary } => assert_eq!(summary.status, TripStatus::Cancelled),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_active_trip_for_resume() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        assert!(f.registry.get_active_trip(driver).await.unwrap().is_none());

        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();
        assert_eq!(f.registry.get_active_trip(driver).await.unwrap(), Some(trip.clone()));
        assert_eq!(f.registry.list_active_trips_by_route(f.route_id).await.unwrap(), vec![trip]);
        assert!(f.registry.list_active_trips_by_route(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_snapshot_does_not_recache_ended_trip() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();

        let snapshot = f.registry.list_active_trips_by_route(f.route_id).await.unwrap();
        f.registry.end_trip(trip.id, driver).await.unwrap();
        assert!(f.registry.summaries.read().await.is_empty());

        let summary = f.registry.summary_for(&snapshot[0]).await;
        assert_eq!(summary.vehicle_number, "12");
        assert!(f.registry.summaries.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_summary_is_cached_again_for_active_trip() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();

        // p. ej. tras reiniciar el proceso con viajes activos en Postgres
        f.registry.summaries.write().await.clear();
        f.registry.summary_for(&trip).await;
        assert!(f.registry.summaries.read().await.contains_key(&trip.id));
    }
}
