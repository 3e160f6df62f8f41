use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::TripRepository;
use crate::models::{Trip, TripStatus};
use crate::utils::errors::{TrackingError, TrackingResult};

const TRIP_COLUMNS: &str = "id, bus_id, route_id, driver_id, status, started_at, completed_at";

pub struct PgTripRepository {
    pool: PgPool,
}

impl PgTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TripRepository for PgTripRepository {
    async fn insert_active(&self, trip: Trip) -> TrackingResult<Trip> {
        // El índice único parcial trips_one_active_per_driver hace el check-and-set
        let result = sqlx::query_as::<_, Trip>(&format!(
            r#"
            INSERT INTO trips (id, bus_id, route_id, driver_id, status, started_at, completed_at)
            VALUES ($1, $2, $3, $4, 'active', $5, NULL)
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(trip.id)
        .bind(trip.bus_id)
        .bind(trip.route_id)
        .bind(trip.driver_id)
        .bind(trip.started_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(trip) => Ok(trip),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(TrackingError::Conflict(
                format!("driver '{}' already has an active trip", trip.driver_id),
            )),
            Err(e) => Err(TrackingError::Storage(format!("Error creating trip: {}", e))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> TrackingResult<Option<Trip>> {
        let trip = sqlx::query_as::<_, Trip>(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TrackingError::Storage(format!("Error finding trip: {}", e)))?;

        Ok(trip)
    }

    async fn find_active_by_driver(&self, driver_id: Uuid) -> TrackingResult<Option<Trip>> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {} FROM trips WHERE driver_id = $1 AND status = 'active'",
            TRIP_COLUMNS
        ))
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TrackingError::Storage(format!("Error finding active trip: {}", e)))?;

        Ok(trip)
    }

    async fn list_active(&self, route_id: Option<Uuid>) -> TrackingResult<Vec<Trip>> {
        let trips = sqlx::query_as::<_, Trip>(&format!(
            r#"
            SELECT {} FROM trips
            WHERE status = 'active' AND ($1::uuid IS NULL OR route_id = $1)
            ORDER BY started_at
            "#,
            TRIP_COLUMNS
        ))
        .bind(route_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackingError::Storage(format!("Error listing active trips: {}", e)))?;

        Ok(trips)
    }

    async fn finish(&self, id: Uuid, status: TripStatus, at: DateTime<Utc>) -> TrackingResult<Trip> {
        if !status.is_terminal() {
            return Err(TrackingError::InvalidState(format!(
                "cannot transition trip '{}' to {}",
                id,
                status.as_str()
            )));
        }

        let updated = sqlx::query_as::<_, Trip>(&format!(
            r#"
            UPDATE trips
            SET status = $2, completed_at = $3
            WHERE id = $1 AND status = 'active'
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TrackingError::Storage(format!("Error finishing trip: {}", e)))?;

        match updated {
            Some(trip) => Ok(trip),
            None => match self.find_by_id(id).await? {
                Some(trip) => Err(TrackingError::InvalidState(format!(
                    "trip '{}' is already {}",
                    id,
                    trip.status.as_str()
                ))),
                None => Err(TrackingError::NotFound(format!("trip '{}' not found", id))),
            },
        }
    }
}
