//! Modelo de Vehicle
//!
//! Dato de referencia inmutable; lo crea y retira la gestión de flota.
//! Mapea a la tabla `buses`.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    /// Número visible del bus (ej. "12")
    pub number: String,
    pub capacity: i32,
    pub is_active: bool,
}

impl Vehicle {
    pub fn new(id: Uuid, number: impl Into<String>, capacity: i32) -> Self {
        Self {
            id,
            number: number.into(),
            capacity,
            is_active: true,
        }
    }
}
