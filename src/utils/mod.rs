//! Utilidades del sistema
//!
//! Este módulo contiene utilidades para manejo de errores, validación,
//! JWT y locks por clave.

pub mod errors;
pub mod jwt;
pub mod keyed_lock;
pub mod validation;

pub use errors::{AppError, AppResult, TrackingError, TrackingResult};
