//! Seguimiento de buses en tiempo real
//!
//! Los conductores publican su posición durante un viaje; los pasajeros ven
//! los buses activos de una ruta moverse en el mapa casi en tiempo real.

pub mod config;
pub mod controllers;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use routes::create_app_router;
pub use services::{Backends, TrackingEngine};
pub use state::AppState;
