//! Reconciliador de cliente
//!
//! Mantiene la vista de buses activos de un suscriptor (pasajero) a partir
//! de un bootstrap desde almacenamiento y de los eventos en vivo del broker.
//!
//! El bootstrap se suscribe ANTES de listar viajes y últimas muestras; los
//! eventos que llegan mientras tanto quedan en la cola y se aplican después,
//! así no hay ventana en la que se pierda un evento. Aplicar un evento repetido
//! o atrasado es inocuo (last-writer-wins por `created_at`).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ActiveBus, TrackingEvent, Trip, ViewChange};
use crate::repositories::LocationRepository;
use crate::services::broker::{DeliveryError, FanoutBroker, Subscription, SubscriptionFilter};
use crate::services::trip_registry::TripRegistry;
use crate::utils::errors::TrackingResult;

pub struct ClientReconciler {
    filter: SubscriptionFilter,
    registry: Arc<TripRegistry>,
    locations: Arc<dyn LocationRepository>,
    broker: FanoutBroker,
    subscription: Subscription,
    view: BTreeMap<Uuid, ActiveBus>,
    changes: broadcast::Sender<ViewChange>,
    resyncs: u64,
}

impl ClientReconciler {
    /// Suscribirse y construir la vista inicial
    pub async fn connect(
        filter: SubscriptionFilter,
        registry: Arc<TripRegistry>,
        locations: Arc<dyn LocationRepository>,
        broker: FanoutBroker,
        change_buffer: usize,
    ) -> TrackingResult<Self> {
        let subscription = broker.subscribe(filter.clone());
        let (changes, _) = broadcast::channel(change_buffer.max(1));

        let mut reconciler = Self {
            filter,
            registry,
            locations,
            broker,
            subscription,
            view: BTreeMap::new(),
            changes,
            resyncs: 0,
        };
        reconciler.seed().await?;
        Ok(reconciler)
    }

    /// Vista actual: viaje -> última muestra + metadatos
    pub fn current_view(&self) -> &BTreeMap<Uuid, ActiveBus> {
        &self.view
    }

    pub fn snapshot(&self) -> Vec<ActiveBus> {
        self.view.values().cloned().collect()
    }

    /// Stream de cambios para la capa de presentación
    pub fn changes(&self) -> broadcast::Receiver<ViewChange> {
        self.changes.subscribe()
    }

    /// Número de resyncs tras desbordamiento
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    /// Reconstruir la vista desde cero con una suscripción nueva
    pub async fn resync(&mut self) -> TrackingResult<()> {
        self.resyncs += 1;
        info!("🔄 Resync del reconciliador ({:?}), intento {}", self.filter, self.resyncs);
        self.subscription = self.broker.subscribe(self.filter.clone());
        self.seed().await
    }

    async fn seed(&mut self) -> TrackingResult<()> {
        loop {
            let trips = self.active_trips().await?;
            let ids: Vec<Uuid> = trips.iter().map(|t| t.id).collect();
            let mut latest = self.locations.latest_for_trips(&ids).await?;

            let mut view = BTreeMap::new();
            for trip in &trips {
                let summary = self.registry.summary_for(trip).await;
                view.insert(trip.id, ActiveBus::from_summary(&summary, latest.remove(&trip.id)));
            }
            self.view = view;

            // Eventos encolados durante el bootstrap
            match self.apply_pending() {
                Ok(applied) => {
                    debug!("🧩 Bootstrap con {} buses, {} eventos pendientes aplicados", self.view.len(), applied);
                    self.emit(ViewChange::Reset { buses: self.snapshot() });
                    return Ok(());
                }
                Err(DeliveryError::Overflow) => {
                    warn!("⚠️ Desbordamiento durante el bootstrap; reintentando");
                    self.resyncs += 1;
                    self.subscription = self.broker.subscribe(self.filter.clone());
                }
            }
        }
    }

    async fn active_trips(&self) -> TrackingResult<Vec<Trip>> {
        match &self.filter {
            SubscriptionFilter::AllTrips => self.registry.list_active_trips().await,
            SubscriptionFilter::Route(route_id) => self.registry.list_active_trips_by_route(*route_id).await,
            SubscriptionFilter::Trip(trip_id) => Ok(self
                .registry
                .get_trip(*trip_id)
                .await?
                .filter(|t| t.is_active())
                .into_iter()
                .collect()),
        }
    }

    /// Aplicar todos los eventos ya encolados sin esperar
    pub fn apply_pending(&mut self) -> Result<usize, DeliveryError> {
        let mut applied = 0;
        while let Some(event) = self.subscription.try_recv()? {
            self.apply(event);
            applied += 1;
        }
        Ok(applied)
    }

    /// Aplicar un evento a la vista; devuelve el cambio si lo hubo
    pub fn apply(&mut self, event: TrackingEvent) -> Option<ViewChange> {
        let change = match event {
            TrackingEvent::TripStarted { trip } => {
                if self.view.contains_key(&trip.trip_id) {
                    None
                } else {
                    let bus = ActiveBus::from_summary(&trip, None);
                    self.view.insert(trip.trip_id, bus.clone());
                    Some(ViewChange::Upserted { bus })
                }
            }
            TrackingEvent::SampleAccepted { trip, sample } => match self.view.get_mut(&trip.trip_id) {
                Some(bus) => {
                    let is_stale = bus
                        .sample
                        .as_ref()
                        .map_or(false, |current| sample.created_at < current.created_at);
                    if is_stale {
                        None
                    } else {
                        bus.sample = Some(sample);
                        Some(ViewChange::Upserted { bus: bus.clone() })
                    }
                }
                None => {
                    // La muestra puede adelantarse al TripStarted
                    let bus = ActiveBus::from_summary(&trip, Some(sample));
                    self.view.insert(trip.trip_id, bus.clone());
                    Some(ViewChange::Upserted { bus })
                }
            },
            TrackingEvent::TripEnded { trip } => self
                .view
                .remove(&trip.trip_id)
                .map(|_| ViewChange::Removed { trip_id: trip.trip_id }),
        };

        if let Some(change) = &change {
            self.emit(change.clone());
        }
        change
    }

    /// Esperar el siguiente cambio de la vista
    ///
    /// Si la suscripción se desborda hace resync y devuelve un `Reset`.
    /// `Ok(None)` cuando el broker se cerró.
    pub async fn next_change(&mut self) -> TrackingResult<Option<ViewChange>> {
        loop {
            match self.subscription.recv().await {
                Ok(Some(event)) => {
                    if let Some(change) = self.apply(event) {
                        return Ok(Some(change));
                    }
                }
                Ok(None) => return Ok(None),
                Err(DeliveryError::Overflow) => {
                    warn!("⚠️ Suscripción desbordada ({:?}); resync", self.filter);
                    self.resync().await?;
                    return Ok(Some(ViewChange::Reset { buses: self.snapshot() }));
                }
            }
        }
    }

    /// Procesar eventos hasta que el broker se cierre o falle el almacenamiento
    pub async fn run(mut self) -> TrackingResult<()> {
        while self.next_change().await?.is_some() {}
        Ok(())
    }

    fn emit(&self, change: ViewChange) {
        // Sin receptores no es un error
        let _ = self.changes.send(change);
    }
}
