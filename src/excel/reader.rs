use super::package::XlsxPackage;
use crate::error::ExporterResult;
use crate::types::LedgerRow;
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::path::Path;

/// Read the `(label, value)` pairs of a ledger column from the active sheet.
///
/// Rows start at 2 (row 1 holds headers). A row is included when column A
/// holds a text label; its value is `None` unless the target cell is numeric.
pub fn read_column(path: &Path, column: u32) -> ExporterResult<Vec<LedgerRow>> {
    let range = active_range(path)?;
    let Some((last_row, _)) = range.end() else {
        return Ok(Vec::new());
    };

    let col = column.saturating_sub(1);
    let mut rows = Vec::new();
    for row in 1..=last_row {
        let label = match range.get_value((row, 0)) {
            Some(Data::String(s)) if !s.is_empty() => s.clone(),
            _ => continue,
        };
        let value = match range.get_value((row, col)) {
            Some(Data::Float(f)) => Some(*f),
            Some(Data::Int(i)) => Some(*i as f64),
            _ => None,
        };
        rows.push(LedgerRow { label, value });
    }

    Ok(rows)
}

/// Header row of the active sheet, from column A through the last used column
pub fn read_headers(path: &Path) -> ExporterResult<Vec<String>> {
    let range = active_range(path)?;
    let Some((_, last_col)) = range.end() else {
        return Ok(Vec::new());
    };

    Ok((0..=last_col)
        .map(|col| match range.get_value((0, col)) {
            Some(Data::String(s)) => s.clone(),
            Some(Data::Float(f)) => f.to_string(),
            Some(Data::Int(i)) => i.to_string(),
            _ => String::new(),
        })
        .collect())
}

fn active_range(path: &Path) -> ExporterResult<Range<Data>> {
    // calamine does not expose the selected tab, so resolve it from the package
    let sheet = XlsxPackage::open(path)?.active_sheet()?;
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    Ok(workbook.worksheet_range(&sheet.name)?)
}
