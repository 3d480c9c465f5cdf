use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};

/// JSON body returned for every failed HTTP request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub error_type: String,
    pub code: String,
    pub timestamp: String,
}

/// Map a domain error to its HTTP status and response body.
///
/// Server-side failures keep their detail in the logs; the body only says
/// that something went wrong.
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::BadRequest(_) => ("validation_error", "INVALID_REQUEST"),
        AppError::Unauthorized => ("authentication_error", "INVALID_CREDENTIALS"),
        AppError::Forbidden => ("authorization_error", "CHAT_ACCESS_DENIED"),
        AppError::NotFound(_) => ("not_found_error", "RESOURCE_NOT_FOUND"),
        AppError::Database(_) => ("server_error", "DATABASE_ERROR"),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            ("server_error", "INTERNAL_SERVER_ERROR")
        }
    };

    let message = if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
        "internal server error".to_string()
    } else {
        err.to_string()
    };

    let body = ErrorResponse {
        error: status
            .canonical_reason()
            .unwrap_or("Error")
            .to_string(),
        message,
        status: status.as_u16(),
        error_type: error_type.to_string(),
        code: code.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (status, body)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, body) = map_error(err);
    HttpResponse::build(status).json(body)
}
