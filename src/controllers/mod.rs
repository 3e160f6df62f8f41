//! Controladores HTTP
//!
//! Traducen requests ya autenticadas y validadas a operaciones del motor.

pub mod location_controller;
pub mod tracking_controller;
pub mod trip_controller;
