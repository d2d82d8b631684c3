//! Custom error types for the API service
//!
//! Every handler error is rendered as the error envelope
//! `{status:"error", message, code, error?}`. The envelope is also stored in
//! the response extensions so the route dispatch layer can apply per-route
//! message and status overrides.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use common::error::{CacheError, DatabaseError, GoogleError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::repositories::RepositoryError;

pub const DEFAULT_ERROR_TEXT: &str = "Request failed";

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request input
    #[error("{0}")]
    Validation(String),

    /// A unique value is already taken
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// Unauthorized access
    #[error("Unauthorized")]
    Unauthorized,

    /// A backing service is not available right now
    #[error("{0}")]
    Unavailable(String),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(CacheError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) | ApiError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Detail shown to clients; server-side failures stay in the logs
    fn detail(&self) -> Option<String> {
        match self {
            ApiError::Validation(message)
            | ApiError::Conflict(message)
            | ApiError::NotFound(message)
            | ApiError::Unavailable(message) => Some(message.clone()),
            ApiError::Unauthorized => Some("Unauthorized".to_string()),
            ApiError::Cache(CacheError::NotReady(_)) => Some("Cache unavailable".to_string()),
            ApiError::Cache(_) | ApiError::Database(_) | ApiError::Internal(_) => None,
        }
    }
}

/// Body of every error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: StatusCode, error: Option<String>) -> Self {
        Self {
            status: "error",
            message: DEFAULT_ERROR_TEXT.to_string(),
            code: code.as_u16(),
            error,
        }
    }

    /// Apply route-level overrides of message and status
    pub fn with_overrides(mut self, message: Option<&str>, code: Option<StatusCode>) -> Self {
        if let Some(message) = message {
            self.message = message.to_string();
        }
        if let Some(code) = code {
            self.code = code.as_u16();
        }
        self
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(&self)).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let mut response = ErrorEnvelope::new(status, self.detail()).into_response();
        if matches!(self, ApiError::Unauthorized) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"blog\""),
            );
        }
        response
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Duplicate(field) => {
                ApiError::Conflict(format!("{} already exists", field))
            }
            RepositoryError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Producer(e) => ApiError::from_producer(e),
            other => ApiError::Cache(other),
        }
    }
}

impl From<GoogleError> for ApiError {
    fn from(e: GoogleError) -> Self {
        match e {
            GoogleError::NotInitialized => ApiError::Unavailable(e.to_string()),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl ApiError {
    /// Recover the typed error a cache producer failed with
    pub fn from_producer(e: anyhow::Error) -> Self {
        let e = match e.downcast::<ApiError>() {
            Ok(api) => return api,
            Err(e) => e,
        };
        match e.downcast::<RepositoryError>() {
            Ok(repository) => repository.into(),
            Err(e) => ApiError::Internal(e),
        }
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::state::ConnectionState;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(CacheError::NotReady(ConnectionState::Reconnecting)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        let envelope = ErrorEnvelope::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(anyhow::anyhow!("password=hunter2")).detail(),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], DEFAULT_ERROR_TEXT);
        assert_eq!(json["code"], 500);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn producer_errors_keep_their_type() {
        let wrapped: anyhow::Error = ApiError::NotFound("User 7 not found".into()).into();
        assert!(matches!(
            ApiError::from(CacheError::Producer(wrapped)),
            ApiError::NotFound(_)
        ));

        let duplicate: anyhow::Error = RepositoryError::Duplicate("email".into()).into();
        assert!(matches!(ApiError::from_producer(duplicate), ApiError::Conflict(_)));
    }

    #[test]
    fn overrides_replace_message_and_code() {
        let envelope = ErrorEnvelope::new(StatusCode::NOT_FOUND, Some("gone".into()))
            .with_overrides(Some("Tag lookup failed"), Some(StatusCode::BAD_REQUEST));
        assert_eq!(envelope.message, "Tag lookup failed");
        assert_eq!(envelope.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(envelope.error.as_deref(), Some("gone"));
    }
}
