//! Crate-wide error and result types

use hyper::StatusCode;
use thiserror::Error;

/// Errors surfaced by the gateway and its collaborators
#[derive(Debug, Error)]
pub enum GatehouseError {
    /// Pool could not establish a database handle
    #[error("connection failed: {0}")]
    Connection(String),

    /// Storage-layer failure passed through from the driver
    #[error("storage error: {0}")]
    Storage(String),

    /// Insert hit an existing identifier
    #[error("duplicate identifier: {0}")]
    Duplicate(String),

    /// No document matched the identifier
    #[error("not found")]
    NotFound,

    /// Credentials did not verify
    #[error("forbidden")]
    Forbidden,

    /// Hashing or credential handling failed
    #[error("auth error: {0}")]
    Auth(String),

    /// Request could not be read
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatehouseError {
    /// HTTP status the marshalling layer maps this error to
    pub fn status(&self) -> StatusCode {
        match self {
            GatehouseError::NotFound => StatusCode::NOT_FOUND,
            GatehouseError::Forbidden => StatusCode::FORBIDDEN,
            GatehouseError::InvalidInput(_) | GatehouseError::Duplicate(_) => {
                StatusCode::BAD_REQUEST
            }
            GatehouseError::Connection(_)
            | GatehouseError::Storage(_)
            | GatehouseError::Auth(_)
            | GatehouseError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable label used in error payloads
    pub fn label(&self) -> &'static str {
        match self {
            GatehouseError::Connection(_) => "connection_failed",
            GatehouseError::Storage(_) => "storage_error",
            GatehouseError::Duplicate(_) => "conflict",
            GatehouseError::NotFound => "not_found",
            GatehouseError::Forbidden => "forbidden",
            GatehouseError::Auth(_) => "auth_error",
            GatehouseError::InvalidInput(_) => "bad_request",
            GatehouseError::Internal(_) => "server_error",
        }
    }
}

impl From<std::io::Error> for GatehouseError {
    fn from(e: std::io::Error) -> Self {
        GatehouseError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatehouseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatehouseError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(GatehouseError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatehouseError::Duplicate("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatehouseError::Storage("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(GatehouseError::NotFound.label(), "not_found");
        assert_eq!(GatehouseError::Duplicate("x".into()).label(), "conflict");
    }
}
