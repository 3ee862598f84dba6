use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use commune_shared::DomainError;
use commune_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// A domain rule rejected the request.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Not found")]
    NotFound,

    #[error("Media too large: {size} bytes (max {max})")]
    MediaTooLarge { size: usize, max: usize },

    #[error("Media storage error: {0}")]
    MediaStorage(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(msg))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Domain(DomainError::Validation(_)) => StatusCode::BAD_REQUEST,
            ServerError::Domain(DomainError::NotFound(_)) | ServerError::NotFound => {
                StatusCode::NOT_FOUND
            }
            ServerError::Domain(DomainError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            ServerError::Domain(DomainError::Conflict(_)) => StatusCode::CONFLICT,
            ServerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServerError::MediaTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::MediaStorage(_) | ServerError::Store(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(domain) => ServerError::Domain(domain),
            StoreError::NotFound => ServerError::NotFound,
            other => ServerError::Store(other),
        }
    }
}

/// Name the missing entity when a lookup by id finds nothing.
pub trait OrNotFound<T> {
    fn or_not_found(self, what: &str) -> Result<T, ServerError>;
}

impl<T> OrNotFound<T> for Result<T, StoreError> {
    fn or_not_found(self, what: &str) -> Result<T, ServerError> {
        self.map_err(|e| match e {
            StoreError::NotFound => DomainError::not_found(what).into(),
            other => other.into(),
        })
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
