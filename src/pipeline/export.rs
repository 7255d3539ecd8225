//! Spreadsheet export: encode flat rows as an XLSX workbook in memory.
//!
//! One sheet, one bold header row with the [`FLAT_COLUMNS`] keys, one row per
//! [`FlatRow`]. Every cell is written as a string, so "$1,000.00" stays
//! exactly what the model extracted.

use crate::error::InvoiceError;
use crate::flatten::flatten_documents;
use crate::schema::{Document, FlatRow, FLAT_COLUMNS};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

/// Name of the only worksheet.
pub const SHEET_NAME: &str = "Extracted Data";

/// File name offered to the browser.
pub const FILE_NAME: &str = "extracted_data.xlsx";

/// MIME type of the workbook.
pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Excel refuses cells longer than this.
const MAX_CELL_CHARS: usize = 32_767;

const MIN_COLUMN_WIDTH: f64 = 10.0;
const MAX_COLUMN_WIDTH: f64 = 60.0;

fn xlsx_err(e: XlsxError) -> InvoiceError {
    InvoiceError::SpreadsheetFailed(e.to_string())
}

/// Flatten documents and encode them. See [`encode_rows`].
pub fn export_documents(documents: &[Document]) -> Result<Vec<u8>, InvoiceError> {
    encode_rows(&flatten_documents(documents))
}

/// Encode rows as an XLSX workbook and return its bytes.
///
/// Zero rows still produce a valid workbook with just the header.
pub fn encode_rows(rows: &[FlatRow]) -> Result<Vec<u8>, InvoiceError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME).map_err(xlsx_err)?;

    let header_format = Format::new().set_bold();
    for (col, header) in FLAT_COLUMNS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *header, &header_format)
            .map_err(xlsx_err)?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        let r = (row_idx + 1) as u32;
        for (col, value) in row.cells().iter().enumerate() {
            worksheet
                .write_string(r, col as u16, sanitize_cell(value))
                .map_err(xlsx_err)?;
        }
    }

    for (col, width) in column_widths(rows).into_iter().enumerate() {
        worksheet
            .set_column_width(col as u16, width)
            .map_err(xlsx_err)?;
    }
    worksheet.set_freeze_panes(1, 0).map_err(xlsx_err)?;

    workbook.save_to_buffer().map_err(xlsx_err)
}

/// Drop control characters other than tab/newline and cap the length.
fn sanitize_cell(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n'))
        .take(MAX_CELL_CHARS)
        .collect()
}

/// Widest value per column, in characters, clamped to a readable range.
fn column_widths(rows: &[FlatRow]) -> [f64; 7] {
    let mut widths = FLAT_COLUMNS.map(|h| h.chars().count());
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.cells()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths.map(|w| (w as f64 + 2.0).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH))
}
