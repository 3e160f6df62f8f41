//! Modelo de Route y Stop
//!
//! Datos de referencia externos al núcleo: una ruta posee una secuencia
//! ordenada de paradas (`stop_order` único dentro de la ruta).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

impl Route {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Stop {
    pub id: Uuid,
    pub route_id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub stop_order: i32,
}
