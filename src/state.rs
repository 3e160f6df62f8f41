//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use std::sync::Arc;

use crate::config::environment::EnvironmentConfig;
use crate::services::TrackingEngine;
use crate::utils::jwt::JwtConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub engine: Arc<TrackingEngine>,
    pub jwt: JwtConfig,
}

impl AppState {
    pub fn new(config: EnvironmentConfig, engine: TrackingEngine) -> Self {
        let jwt = JwtConfig::from(&config);
        Self {
            config,
            engine: Arc::new(engine),
            jwt,
        }
    }
}
