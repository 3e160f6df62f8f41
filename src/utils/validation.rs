//! Utilidades de validación
//!
//! Funciones helper para validar coordenadas y datos de posición antes
//! de aceptarlos en la ingesta.

use crate::utils::errors::TrackingError;

pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Validar que la latitud esté en [-90, 90]
pub fn validate_latitude(latitude: f64) -> Result<(), TrackingError> {
    if !latitude.is_finite() || !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        return Err(TrackingError::Validation(format!(
            "latitude {} outside [{}, {}]",
            latitude, MIN_LATITUDE, MAX_LATITUDE
        )));
    }
    Ok(())
}

/// Validar que la longitud esté en [-180, 180]
pub fn validate_longitude(longitude: f64) -> Result<(), TrackingError> {
    if !longitude.is_finite() || !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
        return Err(TrackingError::Validation(format!(
            "longitude {} outside [{}, {}]",
            longitude, MIN_LONGITUDE, MAX_LONGITUDE
        )));
    }
    Ok(())
}

/// Validar un valor opcional (velocidad, rumbo, precisión)
pub fn validate_optional_finite(field: &str, value: Option<f64>) -> Result<(), TrackingError> {
    match value {
        Some(v) if !v.is_finite() => Err(TrackingError::Validation(format!(
            "{} must be a finite number",
            field
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latitude_bounds_are_inclusive() {
        assert!(validate_latitude(90.0).is_ok());
        assert!(validate_latitude(-90.0).is_ok());
        assert!(validate_latitude(90.0001).is_err());
        assert!(validate_latitude(f64::NAN).is_err());
    }

    #[test]
    fn test_longitude_bounds_are_inclusive() {
        assert!(validate_longitude(180.0).is_ok());
        assert!(validate_longitude(-180.0).is_ok());
        assert!(validate_longitude(-180.5).is_err());
        assert!(validate_longitude(f64::INFINITY).is_err());
    }
}
