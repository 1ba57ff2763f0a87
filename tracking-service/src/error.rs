use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown {kind} {entity_id}")]
    EntityNotFound { kind: &'static str, entity_id: i64 },

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Rejections of inbound tracking payloads
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Malformed tracking update: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Tracking update is not valid UTF-8")]
    NotUtf8,

    #[error("Latitude {0} is outside [-90, 90]")]
    Latitude(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    Longitude(f64),

    #[error("Entity id must be positive, got {0}")]
    EntityId(i64),
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Database lock poisoned")]
    Poisoned,
}

/// Failures reported by the client connection manager
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Not connected")]
    NotConnected,

    #[error("Failed to encode outbound message")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Reconnection attempts exhausted after {attempts} tries")]
    Exhausted { attempts: u32 },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::EntityNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::EntityNotFound { .. } => "entity_not_found",
            ServiceError::Validation(_) => "invalid_update",
            ServiceError::Database(_) => "database_error",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    /// Message suitable for an `error` envelope sent back to a sender.
    ///
    /// Storage failures are reported generically; their detail stays in the logs.
    pub fn sender_message(&self) -> String {
        match self {
            ServiceError::Database(_) | ServiceError::Internal { .. } => {
                "Failed to process message".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
