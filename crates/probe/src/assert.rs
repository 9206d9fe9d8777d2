//! Test cases and response assertions.
//!
//! A [`TestCase`] declares one request against a handler and what should come
//! back. [`ResultAsserter`] compares an [`ExecutionResult`] against it,
//! collecting every mismatch before failing so a single run reports the
//! status and the body together.

use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::Value;

use crate::error::{HttpError, ProbeResult};
use crate::fixtures::{FixtureCategory, FixtureStore};
use crate::mock::MockDeclaration;
use crate::request::{ExecutionResult, Handler, Params};
use crate::spreadsheet::Spreadsheet;

/// How an expected response fixture is compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseKind {
    /// `responses/<name>.json`, compared as JSON values.
    #[default]
    Json,
    /// `excel/<name>.xlsx`, compared sheet by sheet, cell by cell.
    Tabular,
}

/// One declared request and its expected outcome.
#[derive(Clone)]
pub struct TestCase {
    /// Name logged before the case is asserted.
    pub name: String,
    /// Request method.
    pub method: Method,
    /// Path, query and body parameters.
    pub params: Params,
    /// Handler under test.
    pub handler: Arc<dyn Handler>,
    /// Outbound calls registered before the handler runs.
    pub mocks: Vec<MockDeclaration>,
    /// Expected response status.
    pub expected_status: StatusCode,
    /// Expected response fixture name. Blank skips the body check.
    pub expected_response: String,
    /// How `expected_response` is compared.
    pub response_kind: ResponseKind,
    /// Whether the handler is expected to return an [`HttpError`].
    pub expect_error: bool,
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("mocks", &self.mocks)
            .field("expected_status", &self.expected_status)
            .field("expected_response", &self.expected_response)
            .field("response_kind", &self.response_kind)
            .field("expect_error", &self.expect_error)
            .finish_non_exhaustive()
    }
}

impl TestCase {
    /// Declares a case expecting 200, no error and no body check.
    pub fn new(name: impl Into<String>, method: Method, handler: impl Handler) -> Self {
        Self {
            name: name.into(),
            method,
            params: Params::default(),
            handler: Arc::new(handler),
            mocks: Vec::new(),
            expected_status: StatusCode::OK,
            expected_response: String::new(),
            response_kind: ResponseKind::Json,
            expect_error: false,
        }
    }

    /// Sets the request parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Adds an outbound mock.
    pub fn with_mock(mut self, mock: MockDeclaration) -> Self {
        self.mocks.push(mock);
        self
    }

    /// Sets the expected status.
    pub fn expect_code(mut self, status: StatusCode) -> Self {
        self.expected_status = status;
        self
    }

    /// Sets the expected response fixture.
    pub fn expect_response(mut self, fixture: impl Into<String>) -> Self {
        self.expected_response = fixture.into();
        self
    }

    /// Compares the response as a spreadsheet.
    pub fn tabular(mut self) -> Self {
        self.response_kind = ResponseKind::Tabular;
        self
    }

    /// Expects the handler to return an [`HttpError`].
    pub fn expect_error(mut self) -> Self {
        self.expect_error = true;
        self
    }

    /// Returns the expected fixture name, if one is set and not blank.
    pub fn response_fixture(&self) -> Option<&str> {
        let name = self.expected_response.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// A single difference between a declared case and what the handler did.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    /// The handler failed though no error was expected.
    UnexpectedError(HttpError),
    /// An error was expected but the handler succeeded.
    MissingError,
    /// The response status differs.
    Status {
        expected: StatusCode,
        actual: StatusCode,
    },
    /// The response body is not valid JSON.
    InvalidJson { body: String, reason: String },
    /// The JSON body differs from the fixture.
    Json { expected: Value, actual: Value },
    /// The body could not be decoded as a spreadsheet.
    InvalidSpreadsheet { reason: String },
    /// The spreadsheet body differs from the fixture.
    Tabular { difference: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::UnexpectedError(err) => write!(f, "unexpected error: {}", err),
            Mismatch::MissingError => write!(f, "expected an error, handler succeeded"),
            Mismatch::Status { expected, actual } => write!(
                f,
                "status: expected {}, got {}",
                expected.as_u16(),
                actual.as_u16()
            ),
            Mismatch::InvalidJson { body, reason } => {
                write!(f, "body is not JSON ({}): {}", reason, body)
            }
            Mismatch::Json { expected, actual } => {
                write!(f, "body: expected {}, got {}", expected, actual)
            }
            Mismatch::InvalidSpreadsheet { reason } => {
                write!(f, "body is not a spreadsheet: {}", reason)
            }
            Mismatch::Tabular { difference } => write!(f, "spreadsheet: {}", difference),
        }
    }
}

/// Compares execution results against declared cases.
#[derive(Debug, Clone, Copy)]
pub struct ResultAsserter<'a> {
    fixtures: &'a FixtureStore,
}

impl<'a> ResultAsserter<'a> {
    /// Creates an asserter reading expected fixtures from `fixtures`.
    pub fn new(fixtures: &'a FixtureStore) -> Self {
        Self { fixtures }
    }

    /// Returns every mismatch between `case` and `result`.
    ///
    /// An error is returned only when the expected fixture itself cannot be loaded.
    pub fn check(&self, case: &TestCase, result: &ExecutionResult) -> ProbeResult<Vec<Mismatch>> {
        let mut mismatches = Vec::new();
        let mut status = result.response.status;

        match (&result.error, case.expect_error) {
            (Some(err), true) => status = err.status,
            (Some(err), false) => mismatches.push(Mismatch::UnexpectedError(err.clone())),
            (None, true) => mismatches.push(Mismatch::MissingError),
            (None, false) => {}
        }

        if status != case.expected_status {
            mismatches.push(Mismatch::Status {
                expected: case.expected_status,
                actual: status,
            });
        }

        let Some(fixture) = case.response_fixture() else {
            return Ok(mismatches);
        };

        match case.response_kind {
            ResponseKind::Json => {
                let expected = self.fixtures.try_read(FixtureCategory::Responses, fixture)?;
                let actual = String::from_utf8_lossy(&result.response.body);
                mismatches.extend(compare_json(&expected, &actual));
            }
            ResponseKind::Tabular => {
                let expected = self.fixtures.try_read_spreadsheet(fixture)?;
                match Spreadsheet::from_bytes(&result.response.body) {
                    Ok(actual) => {
                        if let Some(difference) = expected.first_difference(&actual) {
                            mismatches.push(Mismatch::Tabular { difference });
                        }
                    }
                    Err(err) => mismatches.push(Mismatch::InvalidSpreadsheet {
                        reason: err.to_string(),
                    }),
                }
            }
        }

        Ok(mismatches)
    }

    /// Fails the current test if `result` does not match `case`.
    pub fn assert(&self, case: &TestCase, result: &ExecutionResult) {
        let mismatches = self
            .check(case, result)
            .unwrap_or_else(|err| panic!("[{}] {}", case.name, err));

        if !mismatches.is_empty() {
            let report: Vec<String> = mismatches.iter().map(|m| format!("  - {}", m)).collect();
            panic!(
                "[{}] {} mismatch(es):\n{}",
                case.name,
                mismatches.len(),
                report.join("\n")
            );
        }
    }
}

/// Compares two JSON documents, ignoring whitespace and key order.
fn compare_json(expected: &str, actual: &str) -> Option<Mismatch> {
    let expected: Value = match serde_json::from_str(expected.trim()) {
        Ok(value) => value,
        Err(err) => {
            return Some(Mismatch::InvalidJson {
                body: format!("<fixture> {}", expected.trim()),
                reason: err.to_string(),
            });
        }
    };

    let actual_value: Value = match serde_json::from_str(actual.trim()) {
        Ok(value) => value,
        Err(err) => {
            return Some(Mismatch::InvalidJson {
                body: actual.trim().to_string(),
                reason: err.to_string(),
            });
        }
    };

    if json_eq(&expected, &actual_value) {
        None
    } else {
        Some(Mismatch::Json {
            expected,
            actual: actual_value,
        })
    }
}

/// Semantic JSON equality: objects compare as maps and numbers compare by value, so `1` equals `1.0`.
pub fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(l, r)| json_eq(l, r))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(key, value)| r.get(key).is_some_and(|other| json_eq(value, other)))
        }
        _ => left == right,
    }
}
