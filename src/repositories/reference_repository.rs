use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::ReferenceDataRepository;
use crate::models::{Route, Stop, Vehicle};
use crate::utils::errors::{TrackingError, TrackingResult};

/// Lectura de buses, rutas y paradas; el núcleo nunca las modifica
pub struct PgReferenceDataRepository {
    pool: PgPool,
}

impl PgReferenceDataRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceDataRepository for PgReferenceDataRepository {
    async fn find_vehicle(&self, id: Uuid) -> TrackingResult<Option<Vehicle>> {
        sqlx::query_as::<_, Vehicle>("SELECT id, number, capacity, is_active FROM buses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TrackingError::Storage(format!("Error finding vehicle: {}", e)))
    }

    async fn find_route(&self, id: Uuid) -> TrackingResult<Option<Route>> {
        sqlx::query_as::<_, Route>("SELECT id, name, is_active FROM routes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TrackingError::Storage(format!("Error finding route: {}", e)))
    }

    async fn list_active_routes(&self) -> TrackingResult<Vec<Route>> {
        sqlx::query_as::<_, Route>("SELECT id, name, is_active FROM routes WHERE is_active ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TrackingError::Storage(format!("Error listing routes: {}", e)))
    }

    async fn list_stops(&self, route_id: Uuid) -> TrackingResult<Vec<Stop>> {
        sqlx::query_as::<_, Stop>(
            r#"
            SELECT id, route_id, name, latitude, longitude, stop_order
            FROM stops
            WHERE route_id = $1
            ORDER BY stop_order
            "#,
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackingError::Storage(format!("Error listing stops: {}", e)))
    }
}
