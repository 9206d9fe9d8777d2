//! Fixture file access.
//!
//! Fixtures live under an explicit root, one directory per category:
//!
//! ```text
//! <root>/fixtures/responses/<name>.json
//! <root>/fixtures/requests/<name>.json
//! <root>/fixtures/excel/<name>.xlsx
//! <root>/fixtures/csv/<name>.csv
//! <root>/fixtures/mocks/<name>.json
//! ```
//!
//! A missing fixture means the test itself is broken, so the plain readers
//! panic and fail the current test. Every reader has a `try_` twin that
//! returns a [`ProbeError`] instead.

use std::path::{Path, PathBuf};

use crate::error::{ProbeError, ProbeResult};
use crate::spreadsheet::Spreadsheet;

/// Expands to the `tests` directory of the crate invoking it.
///
/// Pass it to [`FixtureStore::new`] or
/// [`HarnessConfig::new`](crate::HarnessConfig::new) so fixtures resolve
/// beside the integration tests regardless of the working directory.
#[macro_export]
macro_rules! fixture_dir {
    () => {
        ::std::path::PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/tests"))
    };
}

/// A fixture directory and the file extension its fixtures carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureCategory {
    /// Expected handler responses.
    Responses,
    /// Request bodies.
    Requests,
    /// Spreadsheet tables.
    Excel,
    /// CSV text.
    Csv,
    /// Replies served by outbound HTTP mocks.
    Mocks,
}

impl FixtureCategory {
    /// Directory name under `fixtures/`.
    pub fn dir(&self) -> &'static str {
        match self {
            FixtureCategory::Responses => "responses",
            FixtureCategory::Requests => "requests",
            FixtureCategory::Excel => "excel",
            FixtureCategory::Csv => "csv",
            FixtureCategory::Mocks => "mocks",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FixtureCategory::Responses | FixtureCategory::Requests | FixtureCategory::Mocks => {
                "json"
            }
            FixtureCategory::Excel => "xlsx",
            FixtureCategory::Csv => "csv",
        }
    }
}

/// Reads named fixtures from a fixed root directory.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    /// Creates a store rooted at `root`; fixtures are read from `<root>/fixtures/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of a named fixture.
    pub fn path(&self, category: FixtureCategory, name: &str) -> PathBuf {
        self.root
            .join("fixtures")
            .join(category.dir())
            .join(format!("{}.{}", name, category.extension()))
    }

    /// Resolves a path relative to `<root>/fixtures/`.
    pub fn fixture_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join("fixtures").join(relative)
    }

    /// Resolves a path relative to the root itself.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Reads a fixture as text.
    pub fn try_read(&self, category: FixtureCategory, name: &str) -> ProbeResult<String> {
        let bytes = self.try_read_bytes(category, name)?;
        String::from_utf8(bytes).map_err(|err| ProbeError::FixtureIo {
            path: self.path(category, name),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        })
    }

    /// Reads a fixture as raw bytes.
    pub fn try_read_bytes(&self, category: FixtureCategory, name: &str) -> ProbeResult<Vec<u8>> {
        read_file(&self.path(category, name))
    }

    /// Reads and decodes a spreadsheet fixture.
    pub fn try_read_spreadsheet(&self, name: &str) -> ProbeResult<Spreadsheet> {
        let bytes = self.try_read_bytes(FixtureCategory::Excel, name)?;
        Spreadsheet::from_bytes(&bytes)
    }

    /// Reads a fixture as text, failing the test if it is missing.
    pub fn read(&self, category: FixtureCategory, name: &str) -> String {
        self.try_read(category, name)
            .unwrap_or_else(|err| panic!("{}", err))
    }

    /// Reads a fixture as raw bytes, failing the test if it is missing.
    pub fn read_bytes(&self, category: FixtureCategory, name: &str) -> Vec<u8> {
        self.try_read_bytes(category, name)
            .unwrap_or_else(|err| panic!("{}", err))
    }

    /// Reads `responses/<name>.json`.
    pub fn read_response(&self, name: &str) -> String {
        self.read(FixtureCategory::Responses, name)
    }

    /// Reads `requests/<name>.json`.
    pub fn read_request_body(&self, name: &str) -> String {
        self.read(FixtureCategory::Requests, name)
    }

    /// Reads `mocks/<name>.json`.
    pub fn read_mock(&self, name: &str) -> String {
        self.read(FixtureCategory::Mocks, name)
    }

    /// Reads `csv/<name>.csv` verbatim.
    pub fn read_csv(&self, name: &str) -> String {
        self.read(FixtureCategory::Csv, name)
    }

    /// Reads `csv/<name>.csv` split into rows of comma-separated fields.
    ///
    /// Quoting is not interpreted; use [`read_csv`](Self::read_csv) for anything richer.
    pub fn read_csv_records(&self, name: &str) -> Vec<Vec<String>> {
        self.read_csv(name)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.split(',').map(|field| field.trim().to_string()).collect())
            .collect()
    }

    /// Reads and decodes `excel/<name>.xlsx`, failing the test if it is missing or unreadable.
    pub fn read_spreadsheet(&self, name: &str) -> Spreadsheet {
        self.try_read_spreadsheet(name).unwrap_or_else(|err| {
            panic!("could not load excel file '{}': {}", name, err)
        })
    }
}

pub(crate) fn read_file(path: &Path) -> ProbeResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ProbeError::FixtureNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ProbeError::FixtureIo {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(files: &[(&str, &str)]) -> (tempfile::TempDir, FixtureStore) {
        let dir = tempfile::tempdir().unwrap();
        for (relative, content) in files {
            let path = dir.path().join("fixtures").join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        let store = FixtureStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_path_layout() {
        let store = FixtureStore::new("/srv/tests");
        assert_eq!(
            store.path(FixtureCategory::Responses, "live-probe-ok"),
            PathBuf::from("/srv/tests/fixtures/responses/live-probe-ok.json")
        );
        assert_eq!(
            store.path(FixtureCategory::Excel, "sales"),
            PathBuf::from("/srv/tests/fixtures/excel/sales.xlsx")
        );
        assert_eq!(
            store.fixture_path("init.sql"),
            PathBuf::from("/srv/tests/fixtures/init.sql")
        );
    }

    #[test]
    fn test_read_returns_exact_content() {
        let content = "{\n  \"status\": \"healthy\"\n}\n\n";
        let (_dir, store) = store_with(&[("responses/live.json", content)]);
        assert_eq!(store.read_response("live"), content);
    }

    #[test]
    fn test_try_read_missing() {
        let (_dir, store) = store_with(&[]);
        let err = store.try_read(FixtureCategory::Mocks, "nope").unwrap_err();
        assert!(matches!(err, ProbeError::FixtureNotFound { .. }));
    }

    #[test]
    #[should_panic(expected = "fixture not found")]
    fn test_read_missing_panics() {
        let (_dir, store) = store_with(&[]);
        store.read_request_body("nope");
    }

    #[test]
    fn test_read_csv_records() {
        let (_dir, store) = store_with(&[("csv/orders.csv", "id,total\n1, 9.50\n\n2,3\n")]);
        assert_eq!(
            store.read_csv_records("orders"),
            vec![
                vec!["id".to_string(), "total".to_string()],
                vec!["1".to_string(), "9.50".to_string()],
                vec!["2".to_string(), "3".to_string()],
            ]
        );
    }

    #[test]
    fn test_try_read_spreadsheet_rejects_non_xlsx() {
        let (_dir, store) = store_with(&[("excel/broken.xlsx", "plain text")]);
        let err = store.try_read_spreadsheet("broken").unwrap_err();
        assert!(matches!(err, ProbeError::Spreadsheet { .. }));
    }
}
