//! Error types for the probe toolkit.
//!
//! Two families live here:
//!
//! - [`ProbeError`] covers everything the toolkit itself can fail at: missing
//!   fixtures, unreadable spreadsheets, container provisioning, database
//!   connectivity and mock registration. Test-facing entry points turn these
//!   into panics; the `try_*` variants hand them back to the caller.
//! - [`HttpError`] is the typed error a handler under test returns. It carries
//!   the HTTP status code that the framework would have written, which is what
//!   error-expecting test cases compare against.
//!
//! # Status mapping
//!
//! | Constructor | HTTP Status |
//! |-------------|-------------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `internal` | 500 |
//! | `service_unavailable` | 503 |

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The primary error type for toolkit operations.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// A fixture file does not exist under the fixture root.
    #[error("fixture not found: {}", .path.display())]
    FixtureNotFound { path: PathBuf },

    /// A fixture file exists but could not be read.
    #[error("could not read fixture '{}': {source}", .path.display())]
    FixtureIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bytes could not be decoded as a spreadsheet.
    #[error("could not read spreadsheet: {message}")]
    Spreadsheet { message: String },

    /// The container runtime refused or failed an operation.
    #[error(transparent)]
    Container(#[from] testcontainers::TestcontainersError),

    /// A command executed inside a container exited unsuccessfully.
    #[error("command `{command}` exited with {exit_code:?}: {stderr}")]
    ContainerExec {
        command: String,
        exit_code: Option<i64>,
        stderr: String,
    },

    /// A container port never started accepting connections.
    #[error("endpoint {host}:{port} not reachable within {timeout:?}")]
    NotReady {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// The database could not be connected to.
    #[error("database connection error: {message}")]
    Database { message: String },

    /// A mock declaration or base URL was rejected.
    #[error("mock registration error: {message}")]
    Mock { message: String },

    /// A request could not be assembled.
    #[error("request build error: {message}")]
    Request { message: String },

    /// Invalid toolkit configuration.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl From<url::ParseError> for ProbeError {
    fn from(err: url::ParseError) -> Self {
        ProbeError::Mock {
            message: format!("invalid base URL: {}", err),
        }
    }
}

impl From<calamine::XlsxError> for ProbeError {
    fn from(err: calamine::XlsxError) -> Self {
        ProbeError::Spreadsheet {
            message: err.to_string(),
        }
    }
}

/// Result type alias for toolkit operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// An HTTP error returned by a handler, carrying the status code to respond with.
///
/// Handlers under test return `Result<impl IntoResponse, HttpError>`. When a
/// handler fails, the recorder keeps whatever was written before the failure
/// and error-expecting cases take the status from the error instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("code={}, message={message}", .status.as_u16())]
pub struct HttpError {
    /// Status code the framework would respond with.
    pub status: StatusCode,
    /// Human-readable message.
    pub message: String,
}

impl HttpError {
    /// Creates a new error with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates an error from a bare status code, using its canonical reason as message.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or_default())
    }

    /// Bad request (HTTP 400).
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Not found (HTTP 404).
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Internal server error (HTTP 500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Service unavailable (HTTP 503).
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Returns the status code as a number.
    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "message": self.message })),
        )
            .into_response()
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::bad_request(format!("Invalid JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = HttpError::not_found("order 42 does not exist");
        assert_eq!(err.to_string(), "code=404, message=order 42 does not exist");
        assert_eq!(err.code(), 404);
    }

    #[test]
    fn test_http_error_from_status() {
        let err = HttpError::from_status(StatusCode::CONFLICT);
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "Conflict");
    }

    #[test]
    fn test_http_error_into_response() {
        let response = HttpError::service_unavailable("upstream down").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_json_error_maps_to_bad_request() {
        let err: HttpError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.starts_with("Invalid JSON"));
    }

    #[test]
    fn test_fixture_not_found_display() {
        let err = ProbeError::FixtureNotFound {
            path: PathBuf::from("/tmp/fixtures/responses/missing.json"),
        };
        assert_eq!(
            err.to_string(),
            "fixture not found: /tmp/fixtures/responses/missing.json"
        );
    }

    #[test]
    fn test_url_error_maps_to_mock_error() {
        let err: ProbeError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, ProbeError::Mock { .. }));
    }
}
