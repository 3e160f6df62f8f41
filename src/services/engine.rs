//! Motor de seguimiento
//!
//! Ensambla registro, ingesta, broker y almacenamiento sobre un mismo
//! conjunto de locks por viaje.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::TrackingConfig;
use crate::models::{ActiveBus, Route, Stop};
use crate::repositories::{
    InMemoryLocationRepository, InMemoryReferenceData, InMemoryTripRepository, LocationRepository,
    PgLocationRepository, PgReferenceDataRepository, PgTripRepository, ReferenceDataRepository, TripRepository,
};
use crate::services::broker::{FanoutBroker, SubscriptionFilter};
use crate::services::location_ingest::LocationIngest;
use crate::services::metrics::TrackingMetrics;
use crate::services::reconciler::ClientReconciler;
use crate::services::sampling_scheduler::{
    IngestSink, PositionSource, SamplerHandle, SamplerReport, SamplerSupervisor, SamplingScheduler,
};
use crate::services::trip_registry::TripRegistry;
use crate::utils::errors::TrackingResult;
use crate::utils::keyed_lock::KeyedLocks;

/// Implementaciones de almacenamiento
#[derive(Clone)]
pub struct Backends {
    pub trips: Arc<dyn TripRepository>,
    pub locations: Arc<dyn LocationRepository>,
    pub reference: Arc<dyn ReferenceDataRepository>,
}

impl Backends {
    pub fn in_memory(reference: InMemoryReferenceData) -> Self {
        Self {
            trips: Arc::new(InMemoryTripRepository::new()),
            locations: Arc::new(InMemoryLocationRepository::new()),
            reference: Arc::new(reference),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            trips: Arc::new(PgTripRepository::new(pool.clone())),
            locations: Arc::new(PgLocationRepository::new(pool.clone())),
            reference: Arc::new(PgReferenceDataRepository::new(pool)),
        }
    }
}

pub struct TrackingEngine {
    config: TrackingConfig,
    registry: Arc<TripRegistry>,
    ingest: Arc<LocationIngest>,
    locations: Arc<dyn LocationRepository>,
    reference: Arc<dyn ReferenceDataRepository>,
    broker: FanoutBroker,
    metrics: TrackingMetrics,
}

impl TrackingEngine {
    pub fn new(backends: Backends, config: TrackingConfig) -> Result<Self, prometheus::Error> {
        let metrics = TrackingMetrics::new()?;
        let broker = FanoutBroker::new(config.subscriber_buffer, metrics.clone());
        let trip_locks = Arc::new(KeyedLocks::new());

        let registry = Arc::new(TripRegistry::new(
            backends.trips.clone(),
            backends.reference.clone(),
            broker.clone(),
            trip_locks.clone(),
        ));
        let ingest = Arc::new(LocationIngest::new(
            backends.trips,
            backends.locations.clone(),
            registry.clone(),
            broker.clone(),
            trip_locks,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            registry,
            ingest,
            locations: backends.locations,
            reference: backends.reference,
            broker,
            metrics,
        })
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TripRegistry> {
        &self.registry
    }

    pub fn ingest(&self) -> &Arc<LocationIngest> {
        &self.ingest
    }

    pub fn locations(&self) -> &Arc<dyn LocationRepository> {
        &self.locations
    }

    pub fn broker(&self) -> &FanoutBroker {
        &self.broker
    }

    pub fn metrics(&self) -> &TrackingMetrics {
        &self.metrics
    }

    /// Reconciliador conectado para un pasajero
    pub async fn reconciler(&self, filter: SubscriptionFilter) -> TrackingResult<ClientReconciler> {
        ClientReconciler::connect(
            filter,
            self.registry.clone(),
            self.locations.clone(),
            self.broker.clone(),
            self.config.view_change_buffer,
        )
        .await
    }

    /// Foto de los buses activos (viajes + última muestra)
    pub async fn active_buses(&self, filter: SubscriptionFilter) -> TrackingResult<Vec<ActiveBus>> {
        Ok(self.reconciler(filter).await?.snapshot())
    }

    pub async fn list_active_routes(&self) -> TrackingResult<Vec<Route>> {
        self.reference.list_active_routes().await
    }

    pub async fn find_route(&self, route_id: Uuid) -> TrackingResult<Option<Route>> {
        self.reference.find_route(route_id).await
    }

    pub async fn list_stops(&self, route_id: Uuid) -> TrackingResult<Vec<Stop>> {
        self.reference.list_stops(route_id).await
    }

    /// Muestreo en proceso para un conductor, enviando directo a la ingesta
    pub fn start_sampler(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        source: Arc<dyn PositionSource>,
    ) -> (SamplerHandle, tokio::sync::mpsc::UnboundedReceiver<SamplerReport>) {
        SamplingScheduler::start(
            trip_id,
            (&self.config).into(),
            source,
            Arc::new(IngestSink::new(self.ingest.clone(), driver_id)),
        )
    }

    pub fn supervise_samplers(&self) -> SamplerSupervisor {
        SamplerSupervisor::spawn(self.broker.clone(), self.registry.clone())
    }
}
