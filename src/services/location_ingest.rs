//! Ingesta de posiciones
//!
//! Valida, sella con la hora del servidor, persiste y publica cada muestra.
//! La comprobación de estado del viaje es autoritativa: una muestra para un
//! viaje no activo se rechaza con `InvalidState`.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{LocationSample, PositionFix, TrackingEvent};
use crate::repositories::{LocationRepository, TripRepository};
use crate::services::broker::FanoutBroker;
use crate::services::metrics::TrackingMetrics;
use crate::services::trip_registry::TripRegistry;
use crate::utils::errors::{TrackingError, TrackingResult};
use crate::utils::keyed_lock::KeyedLocks;
use crate::utils::validation::{validate_latitude, validate_longitude, validate_optional_finite};

pub struct LocationIngest {
    trips: Arc<dyn TripRepository>,
    locations: Arc<dyn LocationRepository>,
    registry: Arc<TripRegistry>,
    broker: FanoutBroker,
    trip_locks: Arc<KeyedLocks<Uuid>>,
    metrics: TrackingMetrics,
}

impl LocationIngest {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        locations: Arc<dyn LocationRepository>,
        registry: Arc<TripRegistry>,
        broker: FanoutBroker,
        trip_locks: Arc<KeyedLocks<Uuid>>,
        metrics: TrackingMetrics,
    ) -> Self {
        Self {
            trips,
            locations,
            registry,
            broker,
            trip_locks,
            metrics,
        }
    }

    /// Aceptar una posición para el viaje activo del conductor
    pub async fn submit(&self, trip_id: Uuid, driver_id: Uuid, fix: PositionFix) -> TrackingResult<LocationSample> {
        let result = self.accept(trip_id, driver_id, fix).await;
        match &result {
            Ok(_) => self.metrics.samples_accepted.inc(),
            Err(e) => {
                self.metrics.samples_rejected.inc();
                warn!("⚠️ Muestra rechazada para el viaje {}: {}", trip_id, e);
            }
        }
        result
    }

    async fn accept(&self, trip_id: Uuid, driver_id: Uuid, fix: PositionFix) -> TrackingResult<LocationSample> {
        validate_latitude(fix.latitude)?;
        validate_longitude(fix.longitude)?;
        validate_optional_finite("speed", fix.speed)?;
        validate_optional_finite("heading", fix.heading)?;
        validate_optional_finite("accuracy", fix.accuracy)?;

        // Serializa muestras y fin de viaje del mismo viaje
        let _trip_guard = self.trip_locks.lock(trip_id).await;

        let trip = self
            .trips
            .find_by_id(trip_id)
            .await?
            .filter(|t| t.belongs_to(driver_id))
            .ok_or_else(|| TrackingError::NotFound(format!("trip '{}' not found for driver '{}'", trip_id, driver_id)))?;

        if !trip.is_active() {
            return Err(TrackingError::InvalidState(format!(
                "trip '{}' is {}; samples are no longer accepted",
                trip_id,
                trip.status.as_str()
            )));
        }

        let previous = self.locations.latest_for_trip(trip_id).await?;
        let created_at = next_timestamp(Utc::now(), previous.map(|p| p.created_at));

        let sample = self
            .locations
            .append(LocationSample::accept(trip_id, fix, created_at))
            .await?;

        // La muestra ya es durable; la entrega es best-effort
        let summary = self.registry.summary_for(&trip).await;
        let outcome = self.broker.publish(TrackingEvent::SampleAccepted {
            trip: summary,
            sample: sample.clone(),
        });

        debug!(
            "📍 Muestra {} del viaje {} ({:.5}, {:.5}) entregada a {} suscriptores",
            sample.id, trip_id, sample.latitude, sample.longitude, outcome.delivered
        );

        Ok(sample)
    }
}

/// Hora del servidor, estrictamente creciente dentro del viaje
///
/// Se trunca a microsegundos, la precisión de `timestamptz`, antes de
/// compararla con la muestra anterior.
fn next_timestamp(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match previous {
        Some(previous) if previous >= now => previous + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Route, Vehicle};
    use crate::repositories::{InMemoryLocationRepository, InMemoryReferenceData, InMemoryTripRepository};
    use crate::services::broker::SubscriptionFilter;

    struct Fixture {
        ingest: LocationIngest,
        registry: Arc<TripRegistry>,
        locations: Arc<InMemoryLocationRepository>,
        broker: FanoutBroker,
        vehicle_id: Uuid,
        route_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let reference = InMemoryReferenceData::new();
        let vehicle_id = Uuid::new_v4();
        let route_id = Uuid::new_v4();
        reference.insert_vehicle(Vehicle::new(vehicle_id, "12", 40)).await;
        reference.insert_route(Route::new(route_id, "Downtown Loop"), Vec::new()).await;

        let metrics = TrackingMetrics::new().unwrap();
        let broker = FanoutBroker::new(64, metrics.clone());
        let trips: Arc<InMemoryTripRepository> = Arc::new(InMemoryTripRepository::new());
        let locations = Arc::new(InMemoryLocationRepository::new());
        let locks = Arc::new(KeyedLocks::new());
        let registry = Arc::new(TripRegistry::new(
            trips.clone(),
            Arc::new(reference),
            broker.clone(),
            locks.clone(),
        ));
        let ingest = LocationIngest::new(trips, locations.clone(), registry.clone(), broker.clone(), locks, metrics);

        Fixture {
            ingest,
            registry,
            locations,
            broker,
            vehicle_id,
            route_id,
        }
    }

    #[tokio::test]
    async fn test_valid_sample_is_latest_immediately() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();

        let sample = f.ingest.submit(trip.id, driver, PositionFix::at(40.0, -75.0)).await.unwrap();
        assert_eq!(sample.speed, Some(0.0));
        assert_eq!(sample.heading, Some(0.0));
        assert_eq!(sample.accuracy, Some(0.0));

        let latest = f.locations.latest_for_trip(trip.id).await.unwrap();
        assert_eq!(latest, Some(sample));
    }

    #[tokio::test]
    async fn test_out_of_range_coordinates_are_rejected() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();

        for (lat, lng) in [(90.5, 0.0), (-91.0, 0.0), (0.0, 180.1), (0.0, -200.0), (f64::NAN, 0.0)] {
            let result = f.ingest.submit(trip.id, driver, PositionFix::at(lat, lng)).await;
            assert!(matches!(result, Err(TrackingError::Validation(_))), "({}, {})", lat, lng);
        }
        assert!(f.locations.latest_for_trip(trip.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_after_end_is_invalid_state_and_keeps_latest() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();
        let last = f.ingest.submit(trip.id, driver, PositionFix::at(40.0, -75.0)).await.unwrap();

        f.registry.end_trip(trip.id, driver).await.unwrap();

        let late = f.ingest.submit(trip.id, driver, PositionFix::at(41.0, -74.0)).await;
        assert!(matches!(late, Err(TrackingError::InvalidState(_))));
        assert_eq!(f.locations.latest_for_trip(trip.id).await.unwrap(), Some(last));
    }

    #[tokio::test]
    async fn test_foreign_driver_cannot_submit() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();

        let result = f.ingest.submit(trip.id, Uuid::new_v4(), PositionFix::at(1.0, 1.0)).await;
        assert!(matches!(result, Err(TrackingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase_and_events_follow_order() {
        let f = fixture().await;
        let driver = Uuid::new_v4();
        let trip = f.registry.start_trip(f.vehicle_id, f.route_id, driver).await.unwrap();
        let mut sub = f.broker.subscribe(SubscriptionFilter::Trip(trip.id));

        let mut stamps = Vec::new();
        for i in 0..20 {
            let sample = f
                .ingest
                .submit(trip.id, driver, PositionFix::at(40.0 + i as f64 * 0.001, -75.0))
                .await
                .unwrap();
            stamps.push(sample.created_at);
        }
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));

        for expected in stamps {
            match sub.recv().await.unwrap().unwrap() {
                TrackingEvent::SampleAccepted { sample, trip: summary } => {
                    assert_eq!(sample.created_at, expected);
                    assert_eq!(summary.vehicle_number, "12");
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_timestamps_within_the_same_microsecond_are_bumped() {
        let previous = Utc::now().trunc_subsecs(6);
        let same_micro = previous + Duration::nanoseconds(400);

        let next = next_timestamp(same_micro, Some(previous));
        assert_eq!(next, previous + Duration::microseconds(1));

        let later = next_timestamp(previous + Duration::microseconds(3) + Duration::nanoseconds(250), Some(previous));
        assert_eq!(later, previous + Duration::microseconds(3));
        assert_eq!(later.timestamp_subsec_nanos() % 1_000, 0);

        let first = next_timestamp(same_micro, None);
        assert_eq!(first, previous);
    }
}
