//! Common utilities for the probe integration tests.
//!
//! - [`handlers`] - Sample handlers exercised by the tests
//! - [`workbook`] - Spreadsheet bytes generated at test time

#![allow(dead_code)]

pub mod handlers;
pub mod workbook;

use helios_probe::{FixtureStore, fixture_dir};

/// Returns a store over `tests/fixtures`.
pub fn fixtures() -> FixtureStore {
    FixtureStore::new(fixture_dir!())
}
