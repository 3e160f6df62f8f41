//! Broker de distribución (fan-out)
//!
//! Entrega `TripStarted`, `TripEnded` y `SampleAccepted` a cada suscriptor
//! conectado cuyo filtro coincida.
//!
//! - Cada suscriptor tiene una cola acotada propia (`mpsc`). Publicar usa
//!   `try_send` y nunca bloquea al productor.
//! - Si la cola de un suscriptor se llena, se le desconecta; su siguiente
//!   `recv` devuelve `DeliveryError::Overflow` y debe hacer resync.
//! - El orden por viaje lo garantiza quien publica: la ingesta y el registro
//!   publican bajo el lock del viaje, y cada cola es FIFO.
//! - Soltar una `Subscription` la elimina del broker sin más efectos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::TrackingEvent;
use crate::services::metrics::TrackingMetrics;

pub type SubscriptionId = u64;

/// Filtro de interés de un suscriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    AllTrips,
    Route(Uuid),
    Trip(Uuid),
}

impl SubscriptionFilter {
    pub fn matches(&self, event: &TrackingEvent) -> bool {
        match self {
            SubscriptionFilter::AllTrips => true,
            SubscriptionFilter::Route(route_id) => event.route_id() == *route_id,
            SubscriptionFilter::Trip(trip_id) => event.trip_id() == *trip_id,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber queue overflowed; resync required")]
    Overflow,
}

/// Resultado de una publicación
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

struct SubscriberSlot {
    filter: SubscriptionFilter,
    sender: mpsc::Sender<TrackingEvent>,
    overflowed: Arc<AtomicBool>,
}

struct BrokerInner {
    subscribers: RwLock<HashMap<SubscriptionId, SubscriberSlot>>,
    next_id: AtomicU64,
    buffer: usize,
    metrics: TrackingMetrics,
}

impl BrokerInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let removed = subscribers.remove(&id).is_some();
        if removed {
            self.metrics.active_subscribers.set(subscribers.len() as i64);
        }
        removed
    }
}

#[derive(Clone)]
pub struct FanoutBroker {
    inner: Arc<BrokerInner>,
}

impl FanoutBroker {
    pub fn new(buffer: usize, metrics: TrackingMetrics) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                metrics,
            }),
        }
    }

    /// Registrar un suscriptor; recibe los eventos publicados desde ahora
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        let overflowed = Arc::new(AtomicBool::new(false));

        {
            let mut subscribers = self.inner.subscribers.write().unwrap_or_else(|e| e.into_inner());
            subscribers.insert(
                id,
                SubscriberSlot {
                    filter: filter.clone(),
                    sender,
                    overflowed: overflowed.clone(),
                },
            );
            self.inner.metrics.active_subscribers.set(subscribers.len() as i64);
        }

        debug!("📡 Suscriptor {} registrado ({:?})", id, filter);

        Subscription {
            id,
            receiver,
            overflowed,
            broker: Arc::downgrade(&self.inner),
        }
    }

    /// Publicar un evento a todos los suscriptores interesados
    ///
    /// Nunca falla para el productor: los fallos de entrega quedan aislados
    /// en cada suscriptor.
    pub fn publish(&self, event: TrackingEvent) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        let mut overflowed = Vec::new();
        let mut closed = Vec::new();

        {
            let subscribers = self.inner.subscribers.read().unwrap_or_else(|e| e.into_inner());
            for (id, slot) in subscribers.iter() {
                if !slot.filter.matches(&event) {
                    continue;
                }
                match slot.sender.try_send(event.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        slot.overflowed.store(true, Ordering::Release);
                        overflowed.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        for id in overflowed {
            if self.inner.remove(id) {
                warn!("⚠️ Suscriptor {} desbordado; desconectado, requiere resync", id);
                self.inner.metrics.subscribers_dropped.inc();
                outcome.dropped += 1;
            }
        }
        for id in closed {
            self.inner.remove(id);
        }

        self.inner.metrics.events_published.inc();
        self.inner.metrics.events_delivered.inc_by(outcome.delivered as u64);
        debug!(
            "📤 Evento {} del viaje {} entregado a {} suscriptores",
            event.kind(),
            event.trip_id(),
            outcome.delivered
        );
        outcome
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Suscripción viva al broker
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<TrackingEvent>,
    overflowed: Arc<AtomicBool>,
    broker: Weak<BrokerInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }

    /// Esperar el siguiente evento
    ///
    /// `Ok(None)` cuando el broker ya no existe; `Err(Overflow)` si la cola
    /// se desbordó (los eventos restantes se descartan).
    pub async fn recv(&mut self) -> Result<Option<TrackingEvent>, DeliveryError> {
        if self.is_overflowed() {
            return Err(DeliveryError::Overflow);
        }
        match self.receiver.recv().await {
            Some(event) if !self.is_overflowed() => Ok(Some(event)),
            Some(_) => Err(DeliveryError::Overflow),
            None if self.is_overflowed() => Err(DeliveryError::Overflow),
            None => Ok(None),
        }
    }

    /// Siguiente evento ya encolado, sin esperar
    pub fn try_recv(&mut self) -> Result<Option<TrackingEvent>, DeliveryError> {
        if self.is_overflowed() {
            return Err(DeliveryError::Overflow);
        }
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    /// Cancelar la suscripción; no se entregan más eventos
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            if broker.remove(self.id) {
                debug!("📴 Suscriptor {} eliminado", self.id);
            }
        }
    }
}
