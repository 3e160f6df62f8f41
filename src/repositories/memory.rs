//! Repositorios en memoria
//!
//! Se usan en los tests y con `STORAGE_BACKEND=memory`. Cada viaje tiene su
//! propio log de muestras con lock propio, así las escrituras de viajes
//! distintos no compiten entre sí.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LocationRepository, ReferenceDataRepository, TripRepository};
use crate::models::{LocationSample, Route, Stop, Trip, TripStatus, Vehicle};
use crate::utils::errors::{TrackingError, TrackingResult};

#[derive(Default)]
pub struct InMemoryTripRepository {
    trips: RwLock<HashMap<Uuid, Trip>>,
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TripRepository for InMemoryTripRepository {
    async fn insert_active(&self, trip: Trip) -> TrackingResult<Trip> {
        let mut trips = self.trips.write().await;

        if trips.values().any(|t| t.driver_id == trip.driver_id && t.is_active()) {
            return Err(TrackingError::Conflict(format!(
                "driver '{}' already has an active trip",
                trip.driver_id
            )));
        }
        if trips.contains_key(&trip.id) {
            return Err(TrackingError::Conflict(format!("trip '{}' already exists", trip.id)));
        }

        let stored = Trip {
            status: TripStatus::Active,
            completed_at: None,
            ..trip
        };
        trips.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> TrackingResult<Option<Trip>> {
        Ok(self.trips.read().await.get(&id).cloned())
    }

    async fn find_active_by_driver(&self, driver_id: Uuid) -> TrackingResult<Option<Trip>> {
        let trips = self.trips.read().await;
        Ok(trips
            .values()
            .find(|t| t.driver_id == driver_id && t.is_active())
            .cloned())
    }

    async fn list_active(&self, route_id: Option<Uuid>) -> TrackingResult<Vec<Trip>> {
        let trips = self.trips.read().await;
        let mut active: Vec<Trip> = trips
            .values()
            .filter(|t| t.is_active() && route_id.map_or(true, |r| t.route_id == r))
            .cloned()
            .collect();
        active.sort_by_key(|t| (t.started_at, t.id));
        Ok(active)
    }

    async fn finish(&self, id: Uuid, status: TripStatus, at: DateTime<Utc>) -> TrackingResult<Trip> {
        if !status.is_terminal() {
            return Err(TrackingError::InvalidState(format!(
                "cannot transition trip '{}' to {}",
                id,
                status.as_str()
            )));
        }

        let mut trips = self.trips.write().await;
        let trip = trips
            .get_mut(&id)
            .ok_or_else(|| TrackingError::NotFound(format!("trip '{}' not found", id)))?;

        if !trip.is_active() {
            return Err(TrackingError::InvalidState(format!(
                "trip '{}' is already {}",
                id,
                trip.status.as_str()
            )));
        }

        trip.status = status;
        trip.completed_at = Some(at);
        Ok(trip.clone())
    }
}

type TripLog = Arc<RwLock<Vec<LocationSample>>>;

#[derive(Default)]
pub struct InMemoryLocationRepository {
    logs: RwLock<HashMap<Uuid, TripLog>>,
}

impl InMemoryLocationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn log_for(&self, trip_id: Uuid) -> Option<TripLog> {
        self.logs.read().await.get(&trip_id).cloned()
    }

    async fn log_for_append(&self, trip_id: Uuid) -> TripLog {
        if let Some(log) = self.log_for(trip_id).await {
            return log;
        }
        self.logs
            .write()
            .await
            .entry(trip_id)
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .clone()
    }
}

#[async_trait]
impl LocationRepository for InMemoryLocationRepository {
    async fn append(&self, sample: LocationSample) -> TrackingResult<LocationSample> {
        let log = self.log_for_append(sample.trip_id).await;
        let mut samples = log.write().await;

        // El log se mantiene ordenado por created_at
        match samples.last() {
            Some(last) if last.created_at > sample.created_at => {
                let idx = samples.partition_point(|s| s.created_at <= sample.created_at);
                samples.insert(idx, sample.clone());
            }
            _ => samples.push(sample.clone()),
        }
        Ok(sample)
    }

    async fn latest_for_trip(&self, trip_id: Uuid) -> TrackingResult<Option<LocationSample>> {
        match self.log_for(trip_id).await {
            Some(log) => Ok(log.read().await.last().cloned()),
            None => Ok(None),
        }
    }

    async fn latest_for_trips(&self, trip_ids: &[Uuid]) -> TrackingResult<HashMap<Uuid, LocationSample>> {
        let logs: Vec<TripLog> = {
            let map = self.logs.read().await;
            trip_ids.iter().filter_map(|id| map.get(id).cloned()).collect()
        };

        let mut latest = HashMap::with_capacity(logs.len());
        for log in logs {
            if let Some(sample) = log.read().await.last() {
                latest.insert(sample.trip_id, sample.clone());
            }
        }
        Ok(latest)
    }

    async fn history_for_trip(&self, trip_id: Uuid, limit: usize) -> TrackingResult<Vec<LocationSample>> {
        match self.log_for(trip_id).await {
            Some(log) => Ok(log.read().await.iter().rev().take(limit).cloned().collect()),
            None => Ok(Vec::new()),
        }
    }
}

/// Datos de referencia en memoria
#[derive(Default)]
pub struct InMemoryReferenceData {
    vehicles: RwLock<HashMap<Uuid, Vehicle>>,
    routes: RwLock<HashMap<Uuid, Route>>,
    stops: RwLock<HashMap<Uuid, Vec<Stop>>>,
}

pub const DEMO_VEHICLE_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0012);
pub const DEMO_ROUTE_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0d01);

impl InMemoryReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.write().await.insert(vehicle.id, vehicle);
    }

    pub async fn insert_route(&self, route: Route, mut stops: Vec<Stop>) {
        stops.sort_by_key(|s| s.stop_order);
        self.stops.write().await.insert(route.id, stops);
        self.routes.write().await.insert(route.id, route);
    }

    /// Bus "12" en la ruta "Downtown Loop", para desarrollo local
    pub async fn demo() -> Self {
        let data = Self::new();
        data.insert_vehicle(Vehicle::new(DEMO_VEHICLE_ID, "12", 40)).await;

        let stops = [
            ("Central Station", 40.0000, -75.0000),
            ("Market Street", 40.0040, -74.9950),
            ("City Hall", 40.0080, -74.9990),
            ("Riverside", 40.0050, -75.0060),
        ]
        .iter()
        .enumerate()
        .map(|(i, (name, lat, lng))| Stop {
            id: Uuid::new_v4(),
            route_id: DEMO_ROUTE_ID,
            name: name.to_string(),
            latitude: *lat,
            longitude: *lng,
            stop_order: i as i32 + 1,
        })
        .collect();

        data.insert_route(Route::new(DEMO_ROUTE_ID, "Downtown Loop"), stops).await;
        data
    }
}

#[async_trait]
impl ReferenceDataRepository for InMemoryReferenceData {
    async fn find_vehicle(&self, id: Uuid) -> TrackingResult<Option<Vehicle>> {
        Ok(self.vehicles.read().await.get(&id).cloned())
    }

    async fn find_route(&self, id: Uuid) -> TrackingResult<Option<Route>> {
        Ok(self.routes.read().await.get(&id).cloned())
    }

    async fn list_active_routes(&self) -> TrackingResult<Vec<Route>> {
        let mut routes: Vec<Route> = self
            .routes
            .read()
            .await
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        routes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(routes)
    }

    async fn list_stops(&self, route_id: Uuid) -> TrackingResult<Vec<Stop>> {
        Ok(self.stops.read().await.get(&route_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(trip_id: Uuid, at: DateTime<Utc>, lat: f64) -> LocationSample {
        LocationSample {
            id: Uuid::new_v4(),
            trip_id,
            latitude: lat,
            longitude: 0.0,
            speed: Some(0.0),
            heading: Some(0.0),
            accuracy: Some(0.0),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_second_active_trip_for_driver_conflicts() {
        let repo = InMemoryTripRepository::new();
        let driver = Uuid::new_v4();
        let now = Utc::now();

        repo.insert_active(Trip::start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), driver, now))
            .await
            .unwrap();
        let second = repo
            .insert_active(Trip::start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), driver, now))
            .await;

        assert!(matches!(second, Err(TrackingError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_finish_is_terminal() {
        let repo = InMemoryTripRepository::new();
        let trip = Trip::start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        repo.insert_active(trip.clone()).await.unwrap();

        let done = repo.finish(trip.id, TripStatus::Completed, Utc::now()).await.unwrap();
        assert_eq!(done.status, TripStatus::Completed);
        assert!(done.completed_at.is_some());

        let again = repo.finish(trip.id, TripStatus::Cancelled, Utc::now()).await;
        assert!(matches!(again, Err(TrackingError::InvalidState(_))));
        assert!(repo.list_active(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_and_batched_latest() {
        let repo = InMemoryLocationRepository::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();

        repo.append(sample(a, t0, 1.0)).await.unwrap();
        repo.append(sample(a, t0 + Duration::seconds(5), 2.0)).await.unwrap();
        repo.append(sample(b, t0, 3.0)).await.unwrap();

        assert_eq!(repo.latest_for_trip(a).await.unwrap().unwrap().latitude, 2.0);
        assert!(repo.latest_for_trip(c).await.unwrap().is_none());

        let latest = repo.latest_for_trips(&[a, b, c]).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&a].latitude, 2.0);
        assert_eq!(latest[&b].latitude, 3.0);
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let repo = InMemoryLocationRepository::new();
        let trip = Uuid::new_v4();
        let t0 = Utc::now();
        for i in 0..5 {
            repo.append(sample(trip, t0 + Duration::seconds(i), i as f64)).await.unwrap();
        }

        let history = repo.history_for_trip(trip, 3).await.unwrap();
        let lats: Vec<f64> = history.iter().map(|s| s.latitude).collect();
        assert_eq!(lats, vec![4.0, 3.0, 2.0]);
    }

    #[tokio::test]
    async fn test_demo_reference_data() {
        let data = InMemoryReferenceData::demo().await;
        let vehicle = data.find_vehicle(DEMO_VEHICLE_ID).await.unwrap().unwrap();
        assert_eq!(vehicle.number, "12");
        let route = data.find_route(DEMO_ROUTE_ID).await.unwrap().unwrap();
        assert_eq!(route.name, "Downtown Loop");
        let stops = data.list_stops(DEMO_ROUTE_ID).await.unwrap();
        assert!(stops.windows(2).all(|w| w[0].stop_order < w[1].stop_order));
    }
}
