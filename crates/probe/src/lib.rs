//! # helios-probe - Integration Test Toolkit for HTTP Services
//!
//! This crate drives HTTP handlers in integration tests without a running
//! server. A test declares a request and the response it expects; the toolkit
//! builds a synthetic request, calls the handler directly and compares what
//! came back against fixture files.
//!
//! ## Features
//!
//! - **Fixtures**: JSON, CSV and xlsx files under a fixed directory layout
//! - **Synthetic requests**: path and multi-value query parameters, JSON bodies from fixtures
//! - **Outbound mocks**: a wiremock server per upstream, bound to reqwest clients by host name
//! - **Assertions**: semantic JSON equality and cell-by-cell spreadsheet equality
//! - **Ephemeral infrastructure**: PostgreSQL and the BigQuery emulator via testcontainers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use helios_probe::{HarnessConfig, HarnessSession, HttpError, MockDeclaration, Params,
//!     RequestContext, TestCase, fixture_dir};
//! use http::{Method, StatusCode};
//!
//! #[tokio::test]
//! async fn forecast() {
//!     let mut session = HarnessSession::start(
//!         HarnessConfig::new(fixture_dir!()).with_mocks("http://weather.test"),
//!     )
//!     .await;
//!
//!     let case = TestCase::new("forecast ok", Method::GET, forecast_handler)
//!         .with_params(Params::new().query("city", "Lisbon"))
//!         .with_mock(MockDeclaration::get("/v1/forecast").with_response("weather-ok"))
//!         .expect_code(StatusCode::OK)
//!         .expect_response("weather-ok");
//!
//!     session.assert_all(&[case]).await;
//!     session.teardown().await;
//! }
//! ```
//!
//! ## Fixture Layout
//!
//! | Category | Path |
//! |----------|------|
//! | responses | `<root>/fixtures/responses/<name>.json` |
//! | requests | `<root>/fixtures/requests/<name>.json` |
//! | excel | `<root>/fixtures/excel/<name>.xlsx` |
//! | csv | `<root>/fixtures/csv/<name>.csv` |
//! | mocks | `<root>/fixtures/mocks/<name>.json` |
//!
//! ## Configuration
//!
//! Container images and deadlines are read from `PROBE_*` environment
//! variables; see [`ProbeConfig`].

pub mod assert;
pub mod config;
pub mod containers;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod mock;
pub mod request;
pub mod spreadsheet;

use std::sync::Once;

pub use assert::{Mismatch, ResponseKind, ResultAsserter, TestCase, json_eq};
pub use config::{HarnessConfig, PostgresOptions, ProbeConfig, Subsystem};
pub use containers::{BigQueryInstance, PostgresInstance};
pub use error::{HttpError, ProbeError, ProbeResult};
pub use fixtures::{FixtureCategory, FixtureStore};
pub use harness::HarnessSession;
pub use mock::{MockDeclaration, MockRegistrar};
pub use request::{
    ExecutionResult, Handler, Params, RecordedResponse, RequestBuilder, RequestContext,
    ResponseRecorder,
};
pub use spreadsheet::Spreadsheet;

/// Initializes the tracing subscriber.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("helios_probe={}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

static TEST_LOGGING: Once = Once::new();

/// Installs a test-writer subscriber once per process.
///
/// Output is captured by the test runner and shown only for failing tests.
/// The level comes from `RUST_LOG`, else `PROBE_LOG_LEVEL`.
pub fn init_test_logging() {
    TEST_LOGGING.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let level = ProbeConfig::from_env().log_level;
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("helios_probe={}", level)));

        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::info!("logging initialized");
    }
}
