//! Services module
//!
//! Lógica del motor de seguimiento: ciclo de vida de viajes, ingesta de
//! posiciones, distribución en vivo, reconciliación de clientes y muestreo.

pub mod broker;
pub mod engine;
pub mod location_ingest;
pub mod metrics;
pub mod reconciler;
pub mod sampling_scheduler;
pub mod trip_registry;

pub use broker::{DeliveryError, FanoutBroker, PublishOutcome, Subscription, SubscriptionFilter};
pub use engine::{Backends, TrackingEngine};
pub use location_ingest::LocationIngest;
pub use metrics::TrackingMetrics;
pub use reconciler::ClientReconciler;
pub use sampling_scheduler::{
    AcquisitionFailure, IngestSink, LocationSink, PositionSource, SamplerHandle, SamplerReport, SamplerSupervisor,
    SamplingScheduler, SchedulerConfig, StopReason,
};
pub use trip_registry::TripRegistry;
