//! Fuente de posiciones simulada: recorre las paradas de la ruta

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use bus_tracking::models::{PositionFix, Stop};
use bus_tracking::services::{AcquisitionFailure, PositionSource};

/// Pasos interpolados entre dos paradas consecutivas
const STEPS_PER_SEGMENT: usize = 6;

pub struct RouteWalkSource {
    waypoints: Vec<(f64, f64)>,
    step: AtomicUsize,
    failure_rate: f64,
}

impl RouteWalkSource {
    pub fn new(stops: &[Stop], failure_rate: f64) -> Self {
        Self {
            waypoints: stops.iter().map(|s| (s.latitude, s.longitude)).collect(),
            step: AtomicUsize::new(0),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    /// Posición del paso `step`, ida y vuelta por la ruta
    fn position_at(&self, step: usize) -> Option<PositionFix> {
        let (first, rest) = self.waypoints.split_first()?;
        if rest.is_empty() {
            return Some(PositionFix::at(first.0, first.1));
        }

        let segments = self.waypoints.len() - 1;
        let cycle = segments * STEPS_PER_SEGMENT * 2;
        let mut offset = step % cycle;
        let forward = offset < cycle / 2;
        if !forward {
            offset = cycle - offset;
        }

        let segment = (offset / STEPS_PER_SEGMENT).min(segments - 1);
        let t = (offset - segment * STEPS_PER_SEGMENT) as f64 / STEPS_PER_SEGMENT as f64;
        let (from, to) = (self.waypoints[segment], self.waypoints[segment + 1]);

        let latitude = from.0 + (to.0 - from.0) * t;
        let longitude = from.1 + (to.1 - from.1) * t;
        let (d_lat, d_lng) = if forward {
            (to.0 - from.0, to.1 - from.1)
        } else {
            (from.0 - to.0, from.1 - to.1)
        };
        let heading = (d_lng.atan2(d_lat).to_degrees() + 360.0) % 360.0;

        Some(PositionFix {
            latitude,
            longitude,
            speed: Some(8.0 + rand::random::<f64>() * 4.0),
            heading: Some(heading),
            accuracy: Some(3.0 + rand::random::<f64>() * 7.0),
        })
    }
}

#[async_trait]
impl PositionSource for RouteWalkSource {
    async fn acquire_position(&self, _timeout: Duration, _max_age: Duration) -> Result<PositionFix, AcquisitionFailure> {
        if rand::random::<f64>() < self.failure_rate {
            return Err(AcquisitionFailure::Unavailable("señal GPS perdida (simulada)".to_string()));
        }

        let step = self.step.fetch_add(1, Ordering::Relaxed);
        self.position_at(step)
            .ok_or_else(|| AcquisitionFailure::Unavailable("la ruta no tiene paradas".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn stop(order: i32, latitude: f64, longitude: f64) -> Stop {
        Stop {
            id: Uuid::new_v4(),
            route_id: Uuid::nil(),
            name: format!("Stop {}", order),
            latitude,
            longitude,
            stop_order: order,
        }
    }

    #[test]
    fn test_walk_starts_at_first_stop_and_reaches_last() {
        let source = RouteWalkSource::new(&[stop(1, 40.0, -75.0), stop(2, 40.01, -75.0)], 0.0);

        let start = source.position_at(0).unwrap();
        assert_eq!((start.latitude, start.longitude), (40.0, -75.0));

        let end = source.position_at(STEPS_PER_SEGMENT).unwrap();
        assert!((end.latitude - 40.01).abs() < 1e-9);
        assert!(end.heading.unwrap() > 179.0 && end.heading.unwrap() < 181.0);
    }

    #[test]
    fn test_walk_stays_within_coordinate_ranges() {
        let stops = [stop(1, 40.0, -75.0), stop(2, 40.01, -74.99), stop(3, 40.02, -75.01)];
        let source = RouteWalkSource::new(&stops, 0.0);

        for step in 0..100 {
            let fix = source.position_at(step).unwrap();
            assert!(fix.latitude > 40.0 - 1e-9 && fix.latitude < 40.02 + 1e-9);
            assert!(fix.longitude > -75.01 - 1e-9 && fix.longitude < -74.99 + 1e-9);
            assert!((0.0..360.0).contains(&fix.heading.unwrap()));
        }
    }

    #[tokio::test]
    async fn test_route_without_stops_is_unavailable() {
        let source = RouteWalkSource::new(&[], 0.0);
        let result = source.acquire_position(Duration::from_secs(5), Duration::ZERO).await;
        assert!(matches!(result, Err(AcquisitionFailure::Unavailable(_))));
    }
}
