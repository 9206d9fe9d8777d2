//! Tabular (spreadsheet) values.
//!
//! A [`Spreadsheet`] is the structural view of an xlsx workbook: sheet name to
//! rows to cell text. Two workbooks compare equal when every sheet, row and
//! cell matches, regardless of how the bytes were produced.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Range, Reader, Xlsx};

use crate::error::ProbeResult;
use crate::fixtures::read_file;

/// Rows of cell text, in sheet order.
pub type Rows = Vec<Vec<String>>;

/// Sheet name to rows of cell text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spreadsheet {
    sheets: BTreeMap<String, Rows>,
}

impl Spreadsheet {
    /// Creates an empty spreadsheet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a sheet. Rows are normalized the same way decoded rows are.
    pub fn with_sheet<R, C, S>(mut self, name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        self.sheets.insert(name.into(), normalize(rows));
        self
    }

    /// Decodes an xlsx workbook from bytes.
    pub fn from_bytes(bytes: &[u8]) -> ProbeResult<Self> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;

        let mut sheets = BTreeMap::new();
        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name)?;
            sheets.insert(name, normalize(range_rows(&range)));
        }

        Ok(Self { sheets })
    }

    /// Decodes an xlsx workbook from a file.
    pub fn from_path(path: impl AsRef<Path>) -> ProbeResult<Self> {
        let bytes = read_file(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Returns the rows of a sheet.
    pub fn sheet(&self, name: &str) -> Option<&Rows> {
        self.sheets.get(name)
    }

    /// Returns the sheet names in sorted order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.keys().map(String::as_str).collect()
    }

    /// Returns the number of sheets.
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    /// Returns true if there are no sheets.
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Describes the first difference from `other`, if any.
    pub fn first_difference(&self, other: &Spreadsheet) -> Option<String> {
        for name in self.sheets.keys().chain(other.sheets.keys()) {
            let (ours, theirs) = match (self.sheet(name), other.sheet(name)) {
                (Some(ours), Some(theirs)) => (ours, theirs),
                (Some(_), None) => return Some(format!("sheet '{}' missing from actual", name)),
                (None, _) => return Some(format!("unexpected sheet '{}'", name)),
            };

            if ours.len() != theirs.len() {
                return Some(format!(
                    "sheet '{}': expected {} rows, got {}",
                    name,
                    ours.len(),
                    theirs.len()
                ));
            }

            for (index, (expected, actual)) in ours.iter().zip(theirs).enumerate() {
                if expected != actual {
                    return Some(format!(
                        "sheet '{}' row {}: expected {:?}, got {:?}",
                        name,
                        index + 1,
                        expected,
                        actual
                    ));
                }
            }
        }
        None
    }

    /// Consumes the spreadsheet, returning the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Rows> {
        self.sheets
    }
}

/// Expands a calamine range into rows anchored at A1.
///
/// calamine ranges start at the first used cell, so leading blank rows and
/// columns are materialized as empty cells to keep positions stable.
fn range_rows(range: &Range<Data>) -> Rows {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };

    let mut rows: Rows = (0..start_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells: Vec<String> = (0..start_col).map(|_| String::new()).collect();
        cells.extend(row.iter().map(|cell| cell.to_string()));
        rows.push(cells);
    }
    rows
}

/// Drops trailing empty cells of each row and trailing empty rows.
fn normalize(mut rows: Rows) -> Rows {
    for row in rows.iter_mut() {
        while row.last().is_some_and(|cell| cell.is_empty()) {
            row.pop();
        }
    }
    while rows.last().is_some_and(|row| row.is_empty()) {
        rows.pop();
    }
    rows
}
