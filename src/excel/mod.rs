//! Excel ledger access
//!
//! - Placement: declaration fields → a month column of an existing .xlsx,
//!   rewriting only the cells it owns (`placer`)
//! - Read back: ledger columns → `(label, value)` rows (`reader`)
//! - Template: a clean ledger workbook to import into (`template`)

mod package;
mod patch;
mod placer;
mod reader;
mod shared_formula;
mod styles;
mod template;

pub use package::{SheetInfo, XlsxPackage};
pub use patch::{CellEdit, EditValue, WorksheetEdits};
pub use placer::{write_declaration, LedgerPlacer};
pub use reader::{read_column, read_headers};
pub use styles::{IntegerStyles, INTEGER_NUM_FMT_ID};
pub use template::{create_ledger_template, TEMPLATE_SHEET};

use crate::error::{ExporterError, ExporterResult};

/// Largest 1-based column index an .xlsx sheet can address (`XFD`)
pub const MAX_COLUMN: u32 = 16_384;

/// Largest 1-based row index an .xlsx sheet can address
pub const MAX_ROW: u32 = 1_048_576;

/// Convert a 1-based column index to its letters (1 → `A`, 27 → `AA`)
pub fn column_letter(index: u32) -> String {
    let mut result = String::new();
    let mut num = index;

    while num > 0 {
        let remainder = (num - 1) % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        num = (num - 1) / 26;
    }

    result
}

/// Convert column letters to a 1-based index (`A` → 1). Case-insensitive.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut index: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = u32::from(ch.to_ascii_uppercase() as u8 - b'A') + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    (index <= MAX_COLUMN).then_some(index)
}

/// A1 reference for a 1-based row and column
pub fn cell_reference(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row)
}

/// Split an A1 reference into 1-based `(row, col)`
pub fn parse_cell_reference(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim().replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let col = column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    (row >= 1 && row <= MAX_ROW).then_some((row, col))
}

/// Target column for a `TaksMenesis` period: index = period + 1 (1 → B, 12 → M)
///
/// No month bound is applied here; only indices outside the sheet's
/// addressable columns are rejected.
pub fn column_for_period(period: &str) -> ExporterResult<u32> {
    let value: i64 = period
        .trim()
        .parse()
        .map_err(|_| ExporterError::InvalidPeriod(period.to_string()))?;

    let index = value.saturating_add(1);
    if index < 1 || index > i64::from(MAX_COLUMN) {
        return Err(ExporterError::ColumnOutOfRange {
            period: value,
            index,
        });
    }
    Ok(index as u32)
}

/// Month number of a period if it falls in 1..=12
pub fn month_of_period(period: &str) -> Option<u32> {
    let month: u32 = period.trim().parse().ok()?;
    (1..=12).contains(&month).then_some(month)
}
