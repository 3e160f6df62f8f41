//! Configuración del motor de seguimiento
//!
//! Cadencia de muestreo del conductor y tamaños de los buffers del broker.

use std::time::Duration;

use super::environment::{parse_var, ConfigError};

#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Periodo entre adquisiciones de posición
    pub sample_interval: Duration,
    /// Tiempo máximo para obtener una posición
    pub acquisition_timeout: Duration,
    /// Antigüedad máxima aceptada de una posición cacheada (0 = siempre fresca)
    pub max_position_age: Duration,
    /// Capacidad de la cola de cada suscriptor
    pub subscriber_buffer: usize,
    /// Capacidad del stream de cambios de cada reconciliador
    pub view_change_buffer: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
            acquisition_timeout: Duration::from_secs(5),
            max_position_age: Duration::ZERO,
            subscriber_buffer: 256,
            view_change_buffer: 256,
        }
    }
}

impl TrackingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let subscriber_buffer: usize =
            parse_var("SUBSCRIBER_BUFFER", "queue size", defaults.subscriber_buffer)?;
        let view_change_buffer: usize =
            parse_var("VIEW_CHANGE_BUFFER", "queue size", defaults.view_change_buffer)?;

        Ok(Self {
            sample_interval: positive_secs("SAMPLE_INTERVAL_SECS", defaults.sample_interval)?,
            acquisition_timeout: positive_secs("ACQUISITION_TIMEOUT_SECS", defaults.acquisition_timeout)?,
            max_position_age: defaults.max_position_age,
            // mpsc y broadcast no admiten capacidad 0
            subscriber_buffer: subscriber_buffer.max(1),
            view_change_buffer: view_change_buffer.max(1),
        })
    }
}

/// Segundos mayores que cero; un periodo nulo no tiene sentido para el muestreo
fn positive_secs(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    const EXPECTED: &str = "positive number of seconds";
    let secs: u64 = parse_var(name, EXPECTED, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            expected: EXPECTED,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_is_a_config_error() {
        std::env::set_var("BUS_TRACKING_TEST_ZERO_SECS", "0");
        let zero = positive_secs("BUS_TRACKING_TEST_ZERO_SECS", Duration::from_secs(5));
        std::env::remove_var("BUS_TRACKING_TEST_ZERO_SECS");
        assert!(matches!(
            zero,
            Err(ConfigError::Invalid { name: "BUS_TRACKING_TEST_ZERO_SECS", .. })
        ));

        std::env::set_var("BUS_TRACKING_TEST_TEN_SECS", "10");
        let ten = positive_secs("BUS_TRACKING_TEST_TEN_SECS", Duration::from_secs(5));
        std::env::remove_var("BUS_TRACKING_TEST_TEN_SECS");
        assert_eq!(ten.unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_interval_uses_default() {
        let secs = positive_secs("BUS_TRACKING_TEST_UNSET_SECS", Duration::from_secs(5)).unwrap();
        assert_eq!(secs, Duration::from_secs(5));
    }
}
