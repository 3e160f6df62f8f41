//! Sistema de manejo de errores
//!
//! Este módulo define los errores del motor de seguimiento (`TrackingError`)
//! y los errores HTTP de la aplicación (`AppError`) con su conversión a
//! respuestas apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Errores del núcleo de seguimiento (registro de viajes, ingesta, almacén)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TrackingError {
    /// Código estable para clientes HTTP y herramientas
    pub fn code(&self) -> &'static str {
        match self {
            TrackingError::Validation(_) => "VALIDATION_ERROR",
            TrackingError::Conflict(_) => "CONFLICT",
            TrackingError::NotFound(_) => "NOT_FOUND",
            TrackingError::InvalidState(_) => "INVALID_STATE",
            TrackingError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<sqlx::Error> for TrackingError {
    fn from(e: sqlx::Error) -> Self {
        TrackingError::Storage(e.to_string())
    }
}

/// Errores principales de la aplicación HTTP
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("JWT error: {0}")]
    Jwt(String),
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    code: String,
}

impl ErrorResponse {
    fn new(error: &str, message: String, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message,
            details: None,
            code: code.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            AppError::Validation(e) => {
                warn!("⚠️ Validation error: {}", e);
                let mut body = ErrorResponse::new(
                    "Validation Error",
                    "The provided data is invalid".to_string(),
                    "VALIDATION_ERROR",
                );
                body.details = Some(json!(e));
                (StatusCode::BAD_REQUEST, body)
            }

            AppError::Tracking(e) => {
                let code = e.code();
                match e {
                    TrackingError::Validation(msg) => {
                        warn!("⚠️ Muestra rechazada: {}", msg);
                        (StatusCode::BAD_REQUEST, ErrorResponse::new("Validation Error", msg, code))
                    }
                    TrackingError::Conflict(msg) => {
                        warn!("⚠️ Conflict: {}", msg);
                        (StatusCode::CONFLICT, ErrorResponse::new("Conflict", msg, code))
                    }
                    TrackingError::NotFound(msg) => {
                        warn!("🔍 Resource not found: {}", msg);
                        (StatusCode::NOT_FOUND, ErrorResponse::new("Not Found", msg, code))
                    }
                    TrackingError::InvalidState(msg) => {
                        warn!("⛔ Invalid state: {}", msg);
                        (StatusCode::CONFLICT, ErrorResponse::new("Invalid State", msg, code))
                    }
                    TrackingError::Storage(msg) => {
                        error!("❌ Storage error: {}", msg);
                        let mut body = ErrorResponse::new(
                            "Storage Error",
                            "An error occurred while accessing tracking storage".to_string(),
                            code,
                        );
                        body.details = Some(json!({ "storage_error": msg }));
                        (StatusCode::INTERNAL_SERVER_ERROR, body)
                    }
                }
            }

            AppError::Unauthorized(msg) => {
                warn!("🔒 Unauthorized access: {}", msg);
                (StatusCode::UNAUTHORIZED, ErrorResponse::new("Unauthorized", msg, "UNAUTHORIZED"))
            }

            AppError::Forbidden(msg) => {
                warn!("🔒 Forbidden access: {}", msg);
                (StatusCode::FORBIDDEN, ErrorResponse::new("Forbidden", msg, "FORBIDDEN"))
            }

            AppError::BadRequest(msg) => {
                warn!("⚠️ Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, ErrorResponse::new("Bad Request", msg, "BAD_REQUEST"))
            }

            AppError::Internal(msg) => {
                error!("❌ Internal error: {}", msg);
                let mut body = ErrorResponse::new(
                    "Internal Server Error",
                    "An unexpected error occurred".to_string(),
                    "INTERNAL_ERROR",
                );
                body.details = Some(json!({ "internal_error": msg }));
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }

            AppError::Jwt(msg) => {
                warn!("🔒 JWT error: {}", msg);
                (StatusCode::UNAUTHORIZED, ErrorResponse::new("JWT Error", msg, "JWT_ERROR"))
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Resultado tipado para operaciones HTTP que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

/// Resultado tipado para operaciones del núcleo
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, id: &str) -> TrackingError {
    TrackingError::NotFound(format!("{} with id '{}' not found", resource, id))
}

/// Función helper para crear errores de conflicto
pub fn conflict_error(resource: &str, field: &str, value: &str) -> TrackingError {
    TrackingError::Conflict(format!("{} with {} '{}' already exists", resource, field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_error_codes_are_distinct() {
        let errors = [
            TrackingError::Validation("x".into()),
            TrackingError::Conflict("x".into()),
            TrackingError::NotFound("x".into()),
            TrackingError::InvalidState("x".into()),
            TrackingError::Storage("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_invalid_state_maps_to_conflict_status() {
        let response = AppError::from(TrackingError::InvalidState("trip completed".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::from(TrackingError::Validation("lat".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_helper_message() {
        let err = not_found_error("Trip", "abc");
        assert_eq!(err, TrackingError::NotFound("Trip with id 'abc' not found".to_string()));
    }
}
