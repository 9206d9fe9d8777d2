//! Spreadsheet bytes for tabular tests.

use rust_xlsxwriter::{DocProperties, Workbook, XlsxError};

/// Rows of the `Sales` sheet used across the tabular tests.
pub const SALES: [[&str; 3]; 3] = [
    ["id", "customer", "total"],
    ["41", "c-1000", "19.90"],
    ["42", "c-1001", "7.25"],
];

/// Builds a workbook with one sheet per `(name, rows)` pair.
///
/// `author` only changes document metadata, so two calls differing in author
/// produce different bytes for the same table.
pub fn workbook(sheets: &[(&str, &[[&str; 3]])], author: &str) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    workbook.set_properties(&DocProperties::new().set_author(author));

    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name)?;
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                worksheet.write_string(r as u32, c as u16, *cell)?;
            }
        }
    }

    workbook.save_to_buffer()
}

/// The sales workbook.
pub fn sales(author: &str) -> Vec<u8> {
    workbook(&[("Sales", &SALES[..])], author).unwrap()
}
