//! HTTP error types for `Lifeguard` server.
//!
//! Maps domain errors from `lifeguard-core` into HTTP responses. Every
//! response carries a JSON body with a machine-readable `error` field and a
//! human-readable `message`. Messages never contain tool output or client
//! input; failures without a dedicated message are logged here and answered
//! generically.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use lifeguard_core::error::ZfsError;

/// Answer for an identifier token that does not resolve.
pub const INVALID_ID: &str = "invalid id";

/// Answer for any failure that has no dedicated message.
pub const GENERIC_FAILURE: &str = "an error occurred";

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Missing or wrong credentials.
    Unauthorized(String),
    /// Requested object not found.
    NotFound(String),
    /// Client sent invalid input, or the operation was refused.
    BadRequest(String),
    /// Internal server error. The message is sent as is.
    Internal(String),
}

impl AppError {
    pub fn invalid_id() -> Self {
        Self::BadRequest(INVALID_ID.to_owned())
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<ZfsError> for AppError {
    fn from(err: ZfsError) -> Self {
        match err {
            ZfsError::InvalidName => Self::invalid_id(),
            ZfsError::IncorrectKey => Self::Unauthorized("Incorrect passphrase".to_owned()),
            ZfsError::DatasetBusy => Self::BadRequest("Dataset is mounted".to_owned()),
            ZfsError::KeyNotLoaded => Self::BadRequest("Encryption key is not loaded".to_owned()),
            ZfsError::MissingProperty { .. } => {
                error!(error = %err, "listing returned no row");
                Self::NotFound("no such dataset".to_owned())
            }
            ZfsError::Property(ref inner) if inner.is_configuration() => {
                error!(error = %err, "property configuration is invalid");
                Self::Internal(GENERIC_FAILURE.to_owned())
            }
            ZfsError::Property(_) | ZfsError::Command(_) => {
                error!(error = %err, "storage command failed");
                Self::Internal(GENERIC_FAILURE.to_owned())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use lifeguard_core::error::{ExecError, PropertyError};

    use super::*;

    fn failed(stderr: &str) -> ExecError {
        ExecError::Failed {
            command: "/sbin/zfs mount tank".to_owned(),
            code: Some(1),
            stderr: stderr.to_owned(),
        }
    }

    #[test]
    fn adapter_errors_have_fixed_messages() {
        assert!(matches!(
            AppError::from(ZfsError::IncorrectKey),
            AppError::Unauthorized(ref m) if m == "Incorrect passphrase"
        ));
        assert!(matches!(
            AppError::from(ZfsError::DatasetBusy),
            AppError::BadRequest(ref m) if m == "Dataset is mounted"
        ));
        assert!(matches!(
            AppError::from(ZfsError::KeyNotLoaded),
            AppError::BadRequest(ref m) if m == "Encryption key is not loaded"
        ));
        assert!(matches!(
            AppError::from(ZfsError::InvalidName),
            AppError::BadRequest(ref m) if m == INVALID_ID
        ));
    }

    #[test]
    fn stderr_never_reaches_the_client() {
        let secret = "cannot open '/root/.ssh/id_rsa': permission denied";
        for err in [
            ZfsError::Command(failed(secret)),
            ZfsError::Property(PropertyError::Command(failed(secret))),
        ] {
            match AppError::from(err) {
                AppError::Internal(m) => assert_eq!(m, GENERIC_FAILURE),
                other => panic!("unexpected mapping: {other:?}"),
            }
        }
    }

    #[test]
    fn status_codes() {
        assert_eq!(AppError::invalid_id().into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Unauthorized(String::new()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Internal(String::new()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
