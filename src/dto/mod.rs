//! DTOs de la API HTTP

pub mod api_response;
pub mod location_dto;
pub mod tracking_dto;
pub mod trip_dto;

pub use api_response::ApiResponse;
