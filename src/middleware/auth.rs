//! Middleware de autenticación JWT
//!
//! Este módulo maneja la autenticación del conductor: extrae el token
//! Bearer, lo verifica e inyecta el `AuthenticatedDriver` en la request.
//! Las rutas de pasajero son públicas y no pasan por aquí.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    state::AppState,
    utils::{
        errors::AppError,
        jwt::{extract_token_from_header, verify_token, DRIVER_ROLE},
    },
};

/// Conductor autenticado que se inyecta en las requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedDriver {
    pub driver_id: Uuid,
}

/// Middleware de autenticación de conductores
pub async fn driver_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Token de autorización requerido".to_string()))?;

    let token = extract_token_from_header(auth_header)?;
    let claims = verify_token(token, &state.jwt)?;

    if claims.role != DRIVER_ROLE {
        return Err(AppError::Forbidden("Se requiere un token de conductor".to_string()));
    }

    let driver_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("ID de conductor inválido".to_string()))?;

    debug!("🔑 Conductor {} autenticado", driver_id);
    request.extensions_mut().insert(AuthenticatedDriver { driver_id });

    Ok(next.run(request).await)
}
