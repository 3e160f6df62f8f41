//! Planificador de muestreo del conductor
//!
//! Mientras hay un viaje activo, adquiere una posición cada `period` y la
//! envía a la ingesta. El primer tick es inmediato; los ticks son periódicos
//! según el reloj y cada adquisición corre en su propia tarea, así una
//! adquisición lenta no retrasa la siguiente.
//!
//! Se detiene con `SamplerHandle::stop`, cuando el supervisor ve un
//! `TripEnded` de su viaje o cuando la ingesta rechaza una muestra con
//! `InvalidState`. Al detenerse aborta los ticks en curso y los espera: tras
//! `stop()` no hay más envíos.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TrackingConfig;
use crate::models::{LocationSample, PositionFix, TrackingEvent};
use crate::services::broker::{DeliveryError, FanoutBroker, Subscription, SubscriptionFilter};
use crate::services::location_ingest::LocationIngest;
use crate::services::trip_registry::TripRegistry;
use crate::utils::errors::{TrackingError, TrackingResult};

/// Fallo al obtener una posición
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquisitionFailure {
    #[error("position acquisition timed out")]
    Timeout,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("location permission denied")]
    PermissionDenied,
}

/// Fuente de posicionamiento del dispositivo
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn acquire_position(&self, timeout: Duration, max_age: Duration) -> Result<PositionFix, AcquisitionFailure>;
}

/// Destino de las posiciones adquiridas
#[async_trait]
pub trait LocationSink: Send + Sync {
    async fn submit(&self, trip_id: Uuid, fix: PositionFix) -> TrackingResult<LocationSample>;
}

/// Envío directo a la ingesta en proceso
pub struct IngestSink {
    ingest: Arc<LocationIngest>,
    driver_id: Uuid,
}

impl IngestSink {
    pub fn new(ingest: Arc<LocationIngest>, driver_id: Uuid) -> Self {
        Self { ingest, driver_id }
    }
}

#[async_trait]
impl LocationSink for IngestSink {
    async fn submit(&self, trip_id: Uuid, fix: PositionFix) -> TrackingResult<LocationSample> {
        self.ingest.submit(trip_id, self.driver_id, fix).await
    }
}

/// Periodo mínimo; `interval` no admite un periodo nulo
pub const MIN_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub period: Duration,
    pub acquisition_timeout: Duration,
    pub max_position_age: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&TrackingConfig::default())
    }
}

impl From<&TrackingConfig> for SchedulerConfig {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            period: config.sample_interval,
            acquisition_timeout: config.acquisition_timeout,
            max_position_age: config.max_position_age,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    TripEnded,
    TripNotActive,
}

/// Resultado de cada tick, para la UI del conductor
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerReport {
    Submitted(LocationSample),
    AcquisitionFailed(AcquisitionFailure),
    Rejected(TrackingError),
    Stopped(StopReason),
}

enum TickOutcome {
    Continue,
    TripClosed,
}

pub struct SamplingScheduler;

impl SamplingScheduler {
    /// Arrancar el muestreo de un viaje
    pub fn start(
        trip_id: Uuid,
        config: SchedulerConfig,
        source: Arc<dyn PositionSource>,
        sink: Arc<dyn LocationSink>,
    ) -> (SamplerHandle, mpsc::UnboundedReceiver<SamplerReport>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();

        let mut config = config;
        if config.period < MIN_PERIOD {
            warn!(
                "⚠️ Periodo de muestreo {:?} demasiado corto para el viaje {}; se usa {:?}",
                config.period, trip_id, MIN_PERIOD
            );
            config.period = MIN_PERIOD;
        }

        info!("🛰️ Muestreo iniciado para el viaje {} cada {:?}", trip_id, config.period);
        let task = tokio::spawn(run(trip_id, config, source, sink, stop_rx, reports_tx));

        (
            SamplerHandle {
                trip_id,
                stop_tx: Some(stop_tx),
                task,
            },
            reports_rx,
        )
    }
}

async fn run(
    trip_id: Uuid,
    config: SchedulerConfig,
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn LocationSink>,
    mut stop_rx: oneshot::Receiver<StopReason>,
    reports: mpsc::UnboundedSender<SamplerReport>,
) -> StopReason {
    let mut ticker = interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = JoinSet::new();

    let reason = loop {
        tokio::select! {
            reason = &mut stop_rx => break reason.unwrap_or(StopReason::Requested),
            _ = ticker.tick() => {
                ticks.spawn(tick(trip_id, config, source.clone(), sink.clone(), reports.clone()));
            }
            Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                if let Ok(TickOutcome::TripClosed) = joined {
                    break StopReason::TripNotActive;
                }
            }
        }
    };

    ticks.abort_all();
    while ticks.join_next().await.is_some() {}

    info!("🛑 Muestreo detenido para el viaje {} ({:?})", trip_id, reason);
    let _ = reports.send(SamplerReport::Stopped(reason));
    reason
}

async fn tick(
    trip_id: Uuid,
    config: SchedulerConfig,
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn LocationSink>,
    reports: mpsc::UnboundedSender<SamplerReport>,
) -> TickOutcome {
    let acquired = match timeout(
        config.acquisition_timeout,
        source.acquire_position(config.acquisition_timeout, config.max_position_age),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(AcquisitionFailure::Timeout),
    };

    let fix = match acquired {
        Ok(fix) => fix,
        Err(failure) => {
            warn!("⚠️ Sin posición para el viaje {}: {}", trip_id, failure);
            let _ = reports.send(SamplerReport::AcquisitionFailed(failure));
            return TickOutcome::Continue;
        }
    };

    match sink.submit(trip_id, fix).await {
        Ok(sample) => {
            debug!("📍 Posición enviada para el viaje {}", trip_id);
            let _ = reports.send(SamplerReport::Submitted(sample));
            TickOutcome::Continue
        }
        Err(e) => {
            let closed = matches!(e, TrackingError::InvalidState(_));
            let _ = reports.send(SamplerReport::Rejected(e));
            if closed {
                TickOutcome::TripClosed
            } else {
                TickOutcome::Continue
            }
        }
    }
}

/// Control de un muestreo en marcha
pub struct SamplerHandle {
    trip_id: Uuid,
    stop_tx: Option<oneshot::Sender<StopReason>>,
    task: JoinHandle<StopReason>,
}

impl SamplerHandle {
    pub fn trip_id(&self) -> Uuid {
        self.trip_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Detener y esperar a que no quede ningún tick en curso
    pub async fn stop(self) -> StopReason {
        self.stop_with(StopReason::Requested).await
    }

    pub async fn stop_with(mut self, reason: StopReason) -> StopReason {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Falla si el muestreo ya se detuvo solo
            let _ = stop_tx.send(reason);
        }
        match (&mut self.task).await {
            Ok(reason) => reason,
            Err(e) => {
                warn!("⚠️ Tarea de muestreo del viaje {} terminó con error: {}", self.trip_id, e);
                reason
            }
        }
    }
}

/// Detiene los muestreos cuando su viaje termina
///
/// Observa el broker con un filtro `AllTrips`. Si su suscripción se desborda,
/// se vuelve a suscribir y consulta el estado de cada viaje registrado.
pub struct SamplerSupervisor {
    samplers: Arc<Mutex<HashMap<Uuid, SamplerHandle>>>,
    task: JoinHandle<()>,
}

impl SamplerSupervisor {
    pub fn spawn(broker: FanoutBroker, registry: Arc<TripRegistry>) -> Self {
        let samplers = Arc::new(Mutex::new(HashMap::new()));
        let subscription = broker.subscribe(SubscriptionFilter::AllTrips);
        let task = tokio::spawn(watch(subscription, broker, registry, samplers.clone()));
        Self { samplers, task }
    }

    /// Registrar un muestreo; reemplaza (y detiene) uno previo del mismo viaje
    pub async fn register(&self, handle: SamplerHandle) {
        let previous = self.samplers.lock().await.insert(handle.trip_id(), handle);
        if let Some(previous) = previous {
            previous.stop().await;
        }
    }

    pub async fn stop(&self, trip_id: Uuid) -> Option<StopReason> {
        let handle = self.samplers.lock().await.remove(&trip_id)?;
        Some(handle.stop().await)
    }

    /// Viajes con muestreo todavía en marcha
    pub async fn running(&self) -> Vec<Uuid> {
        self.samplers
            .lock()
            .await
            .values()
            .filter(|h| !h.is_finished())
            .map(|h| h.trip_id())
            .collect()
    }

    pub async fn shutdown(self) {
        self.task.abort();
        let handles: Vec<SamplerHandle> = self.samplers.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop().await;
        }
    }
}

async fn watch(
    mut subscription: Subscription,
    broker: FanoutBroker,
    registry: Arc<TripRegistry>,
    samplers: Arc<Mutex<HashMap<Uuid, SamplerHandle>>>,
) {
    loop {
        match subscription.recv().await {
            Ok(Some(TrackingEvent::TripEnded { trip })) => {
                let handle = samplers.lock().await.remove(&trip.trip_id);
                if let Some(handle) = handle {
                    handle.stop_with(StopReason::TripEnded).await;
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(DeliveryError::Overflow) => {
                warn!("⚠️ Supervisor de muestreo desbordado; revisando viajes");
                subscription = broker.subscribe(SubscriptionFilter::AllTrips);
                let trip_ids: Vec<Uuid> = samplers.lock().await.keys().copied().collect();
                for trip_id in trip_ids {
                    let still_active = matches!(registry.get_trip(trip_id).await, Ok(Some(trip)) if trip.is_active());
                    if !still_active {
                        let handle = samplers.lock().await.remove(&trip_id);
                        if let Some(handle) = handle {
                            handle.stop_with(StopReason::TripEnded).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use chrono::Utc;

    use crate::models::{Route, Vehicle};
    use crate::repositories::{
        InMemoryLocationRepository, InMemoryReferenceData, InMemoryTripRepository, LocationRepository,
    };
    use crate::services::metrics::TrackingMetrics;
    use crate::utils::keyed_lock::KeyedLocks;

    /// Fuente que falla cada `fail_every` llamadas (0 = nunca)
    struct FakeSource {
        calls: AtomicUsize,
        fail_every: usize,
        delay: Duration,
    }

    impl FakeSource {
        fn new(fail_every: usize, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_every,
                delay,
            })
        }
    }

    #[async_trait]
    impl PositionSource for FakeSource {
        async fn acquire_position(&self, _timeout: Duration, _max_age: Duration) -> Result<PositionFix, AcquisitionFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail_every > 0 && n % self.fail_every == 0 {
                return Err(AcquisitionFailure::Unavailable("no satellites".to_string()));
            }
            Ok(PositionFix::at(40.0 + n as f64 * 0.001, -75.0))
        }
    }

    struct RecordingSink {
        fixes: StdMutex<Vec<PositionFix>>,
        reject_after: Option<usize>,
    }

    impl RecordingSink {
        fn new(reject_after: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                fixes: StdMutex::new(Vec::new()),
                reject_after,
            })
        }

        fn count(&self) -> usize {
            self.fixes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LocationSink for RecordingSink {
        async fn submit(&self, trip_id: Uuid, fix: PositionFix) -> TrackingResult<LocationSample> {
            let mut fixes = self.fixes.lock().unwrap();
            if self.reject_after.map_or(false, |limit| fixes.len() >= limit) {
                return Err(TrackingError::InvalidState("trip is completed".to_string()));
            }
            fixes.push(fix);
            Ok(LocationSample::accept(trip_id, fix, Utc::now()))
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            period: Duration::from_secs(5),
            acquisition_timeout: Duration::from_secs(5),
            max_position_age: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_immediate_then_periodic() {
        let sink = RecordingSink::new(None);
        let (handle, _reports) =
            SamplingScheduler::start(Uuid::new_v4(), config(), FakeSource::new(0, Duration::ZERO), sink.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.count(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.count(), 3);

        assert_eq!(handle.stop().await, StopReason::Requested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_submission_after_stop() {
        let sink = RecordingSink::new(None);
        let (handle, _reports) =
            SamplingScheduler::start(Uuid::new_v4(), config(), FakeSource::new(0, Duration::from_secs(2)), sink.clone());

        tokio::time::sleep(Duration::from_secs(6)).await;
        // un tick lleva 1 s esperando a la fuente
        handle.stop().await;
        let after_stop = sink.count();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sink.count(), after_stop);
        assert_eq!(after_stop, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquisition_failures_are_reported_and_sampling_continues() {
        let sink = RecordingSink::new(None);
        let (handle, mut reports) =
            SamplingScheduler::start(Uuid::new_v4(), config(), FakeSource::new(2, Duration::ZERO), sink.clone());

        tokio::time::sleep(Duration::from_secs(16)).await;
        handle.stop().await;

        let mut failures = 0;
        let mut submitted = 0;
        while let Ok(report) = reports.try_recv() {
            match report {
                SamplerReport::AcquisitionFailed(AcquisitionFailure::Unavailable(_)) => failures += 1,
                SamplerReport::Submitted(_) => submitted += 1,
                SamplerReport::Stopped(StopReason::Requested) => {}
                other => panic!("unexpected report {:?}", other),
            }
        }
        assert_eq!((submitted, failures), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        let sink = RecordingSink::new(None);
        let (handle, mut reports) =
            SamplingScheduler::start(Uuid::new_v4(), config(), FakeSource::new(0, Duration::from_secs(60)), sink.clone());

        let first = reports.recv().await.unwrap();
        assert_eq!(first, SamplerReport::AcquisitionFailed(AcquisitionFailure::Timeout));
        assert_eq!(sink.count(), 0);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_state_rejection_stops_sampling() {
        let sink = RecordingSink::new(Some(2));
        let (handle, mut reports) =
            SamplingScheduler::start(Uuid::new_v4(), config(), FakeSource::new(0, Duration::ZERO), sink.clone());

        let mut last = None;
        while let Some(report) = reports.recv().await {
            last = Some(report);
        }
        assert_eq!(last, Some(SamplerReport::Stopped(StopReason::TripNotActive)));
        assert!(handle.is_finished());
        assert_eq!(sink.count(), 2);
        assert_eq!(handle.stop().await, StopReason::TripNotActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_stops_sampler_when_trip_ends() {
        let reference = InMemoryReferenceData::new();
        let (vehicle_id, route_id) = (Uuid::new_v4(), Uuid::new_v4());
        reference.insert_vehicle(Vehicle::new(vehicle_id, "12", 40)).await;
        reference.insert_route(Route::new(route_id, "Downtown Loop"), Vec::new()).await;

        let metrics = TrackingMetrics::new().unwrap();
        let broker = FanoutBroker::new(64, metrics.clone());
        let trips = Arc::new(InMemoryTripRepository::new());
        let locations = Arc::new(InMemoryLocationRepository::new());
        let locks = Arc::new(KeyedLocks::new());
        let registry = Arc::new(TripRegistry::new(trips.clone(), Arc::new(reference), broker.clone(), locks.clone()));
        let ingest = Arc::new(LocationIngest::new(
            trips,
            locations.clone(),
            registry.clone(),
            broker.clone(),
            locks,
            metrics,
        ));

        let supervisor = SamplerSupervisor::spawn(broker.clone(), registry.clone());
        let driver = Uuid::new_v4();
        let trip = registry.start_trip(vehicle_id, route_id, driver).await.unwrap();

        let (handle, mut reports) = SamplingScheduler::start(
            trip.id,
            config(),
            FakeSource::new(0, Duration::ZERO),
            Arc::new(IngestSink::new(ingest, driver)),
        );
        supervisor.register(handle).await;

        assert!(matches!(reports.recv().await, Some(SamplerReport::Submitted(_))));
        assert_eq!(supervisor.running().await, vec![trip.id]);

        registry.end_trip(trip.id, driver).await.unwrap();

        let mut last = None;
        while let Some(report) = reports.recv().await {
            last = Some(report);
        }
        assert_eq!(last, Some(SamplerReport::Stopped(StopReason::TripEnded)));
        assert!(supervisor.running().await.is_empty());
        assert_eq!(locations.history_for_trip(trip.id, 10).await.unwrap().len(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped_instead_of_killing_the_sampler() {
        let sink = RecordingSink::new(None);
        let zero = SchedulerConfig {
            period: Duration::ZERO,
            ..config()
        };
        let (handle, mut reports) =
            SamplingScheduler::start(Uuid::new_v4(), zero, FakeSource::new(0, Duration::ZERO), sink.clone());

        assert!(matches!(reports.recv().await, Some(SamplerReport::Submitted(_))));
        tokio::time::sleep(MIN_PERIOD * 3).await;
        assert!(!handle.is_finished());
        assert!(sink.count() >= 3);

        assert_eq!(handle.stop().await, StopReason::Requested);
        let mut last = None;
        while let Some(report) = reports.recv().await {
            last = Some(report);
        }
        assert_eq!(last, Some(SamplerReport::Stopped(StopReason::Requested)));
    }
}
