//! Modelos del sistema
//!
//! Datos de referencia (vehículos, rutas, paradas), entidades de seguimiento
//! (viajes, muestras) y tipos derivados (eventos, vista de buses activos).

pub mod event;
pub mod location;
pub mod route;
pub mod trip;
pub mod vehicle;
pub mod view;

pub use event::TrackingEvent;
pub use location::{LocationSample, PositionFix};
pub use route::{Route, Stop};
pub use trip::{Trip, TripStatus, TripSummary};
pub use vehicle::Vehicle;
pub use view::{ActiveBus, ViewChange};
