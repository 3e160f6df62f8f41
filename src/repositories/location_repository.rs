use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::LocationRepository;
use crate::models::LocationSample;
use crate::utils::errors::{TrackingError, TrackingResult};

pub struct PgLocationRepository {
    pool: PgPool,
}

impl PgLocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocationRepository for PgLocationRepository {
    async fn append(&self, sample: LocationSample) -> TrackingResult<LocationSample> {
        let stored = sqlx::query_as::<_, LocationSample>(
            r#"
            INSERT INTO gps_locations (id, trip_id, latitude, longitude, speed, heading, accuracy, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, trip_id, latitude, longitude, speed, heading, accuracy, created_at
            "#,
        )
        .bind(sample.id)
        .bind(sample.trip_id)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.speed)
        .bind(sample.heading)
        .bind(sample.accuracy)
        .bind(sample.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TrackingError::Storage(format!("Error storing location: {}", e)))?;

        Ok(stored)
    }

    async fn latest_for_trip(&self, trip_id: Uuid) -> TrackingResult<Option<LocationSample>> {
        // Usa el índice (trip_id, created_at DESC)
        let sample = sqlx::query_as::<_, LocationSample>(
            r#"
            SELECT id, trip_id, latitude, longitude, speed, heading, accuracy, created_at
            FROM gps_locations
            WHERE trip_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TrackingError::Storage(format!("Error finding latest location: {}", e)))?;

        Ok(sample)
    }

    async fn latest_for_trips(&self, trip_ids: &[Uuid]) -> TrackingResult<HashMap<Uuid, LocationSample>> {
        if trip_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let samples = sqlx::query_as::<_, LocationSample>(
            r#"
            SELECT DISTINCT ON (trip_id)
                id, trip_id, latitude, longitude, speed, heading, accuracy, created_at
            FROM gps_locations
            WHERE trip_id = ANY($1)
            ORDER BY trip_id, created_at DESC
            "#,
        )
        .bind(trip_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackingError::Storage(format!("Error batching latest locations: {}", e)))?;

        Ok(samples.into_iter().map(|s| (s.trip_id, s)).collect())
    }

    async fn history_for_trip(&self, trip_id: Uuid, limit: usize) -> TrackingResult<Vec<LocationSample>> {
        let samples = sqlx::query_as::<_, LocationSample>(
            r#"
            SELECT id, trip_id, latitude, longitude, speed, heading, accuracy, created_at
            FROM gps_locations
            WHERE trip_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(trip_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackingError::Storage(format!("Error listing location history: {}", e)))?;

        Ok(samples)
    }
}
