//! Error types for the server.
//!
//! Every handler returns `Result<_, ServerError>`; the error renders itself
//! as an HTTP status plus a JSON body `{ "code": .., "message": .. }`.
//!
//! | Variant             | Status |
//! |---------------------|--------|
//! | `ProtocolViolation` | 400    |
//! | `InvalidRequest`    | 400    |
//! | `NotFound`          | 404    |
//! | `Conflict`          | 409    |
//! | `InconsistentState` | 500    |
//! | `Persistence`       | 500    |
//! | `Internal`          | 500    |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use vex_core::CoreError;
use vex_db::DbError;

pub type ServerResult<T> = Result<T, ServerError>;

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed or unrecognized device message. Nothing was changed.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A queue entry references a command body that does not exist.
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::ProtocolViolation(_) | ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Persistence(_) | ServerError::InconsistentState(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::ProtocolViolation(_) => "protocol_violation",
            ServerError::NotFound(_) => "not_found",
            ServerError::Persistence(_) => "persistence_error",
            ServerError::InconsistentState(_) => "inconsistent_state",
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Conflict(_) => "conflict",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DbError> for ServerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => ServerError::NotFound(err.to_string()),
            DbError::DuplicateCommand { .. } | DbError::UniqueViolation { .. } => {
                ServerError::Conflict(err.to_string())
            }
            DbError::InconsistentState(msg) => ServerError::InconsistentState(msg),
            DbError::Invalid(e) => ServerError::InvalidRequest(e.to_string()),
            other if other.is_persistence() => ServerError::Persistence(other.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ServerError::InvalidRequest(e.to_string()),
            other => ServerError::ProtocolViolation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_core::ValidationError;

    #[test]
    fn test_db_errors_map_to_status() {
        let err: ServerError = DbError::not_found("Device", "UDID-1").into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ServerError = DbError::DuplicateCommand {
            command_uuid: "cmd-1".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ServerError = DbError::InconsistentState("missing body".to_string()).into();
        assert!(matches!(err, ServerError::InconsistentState(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ServerError = DbError::QueryFailed("disk I/O error".to_string()).into();
        assert!(matches!(err, ServerError::Persistence(_)));

        let err: ServerError = DbError::PoolExhausted.into();
        assert_eq!(err.code(), "persistence_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ServerError = DbError::Invalid(ValidationError::Required {
            field: "udid".to_string(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_core_errors_are_protocol_violations() {
        let err: ServerError = CoreError::UnknownCommandStatus("Bogus".to_string()).into();
        assert!(matches!(err, ServerError::ProtocolViolation(_)));
        assert_eq!(err.code(), "protocol_violation");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
