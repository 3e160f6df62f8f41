//! Métricas Prometheus del motor de seguimiento

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct TrackingMetrics {
    registry: Registry,
    pub events_published: IntCounter,
    pub events_delivered: IntCounter,
    pub subscribers_dropped: IntCounter,
    pub active_subscribers: IntGauge,
    pub samples_accepted: IntCounter,
    pub samples_rejected: IntCounter,
}

impl TrackingMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_published = IntCounter::with_opts(Opts::new(
            "tracking_events_published_total",
            "Eventos publicados en el broker",
        ))?;
        let events_delivered = IntCounter::with_opts(Opts::new(
            "tracking_events_delivered_total",
            "Eventos encolados a suscriptores",
        ))?;
        let subscribers_dropped = IntCounter::with_opts(Opts::new(
            "tracking_subscribers_dropped_total",
            "Suscriptores desconectados por desbordamiento",
        ))?;
        let active_subscribers = IntGauge::with_opts(Opts::new(
            "tracking_active_subscribers",
            "Suscriptores conectados",
        ))?;
        let samples_accepted = IntCounter::with_opts(Opts::new(
            "tracking_samples_accepted_total",
            "Muestras de posición aceptadas",
        ))?;
        let samples_rejected = IntCounter::with_opts(Opts::new(
            "tracking_samples_rejected_total",
            "Muestras de posición rechazadas",
        ))?;

        registry.register(Box::new(events_published.clone()))?;
        registry.register(Box::new(events_delivered.clone()))?;
        registry.register(Box::new(subscribers_dropped.clone()))?;
        registry.register(Box::new(active_subscribers.clone()))?;
        registry.register(Box::new(samples_accepted.clone()))?;
        registry.register(Box::new(samples_rejected.clone()))?;

        Ok(Self {
            registry,
            events_published,
            events_delivered,
            subscribers_dropped,
            active_subscribers,
            samples_accepted,
            samples_rejected,
        })
    }

    /// Exportar en formato texto de Prometheus
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = TrackingMetrics::new().unwrap();
        metrics.samples_accepted.inc();
        let text = metrics.render().unwrap();
        assert!(text.contains("tracking_samples_accepted_total 1"));
        assert!(text.contains("tracking_active_subscribers 0"));
    }
}
