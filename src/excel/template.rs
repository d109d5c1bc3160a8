use crate::error::ExporterResult;
use crate::types::{FieldTag, LABEL_HEADER, MONTH_NAMES};
use rust_xlsxwriter::{Format, FormatAlign, Workbook};
use std::path::Path;

/// Name of the single sheet in a freshly created ledger
pub const TEMPLATE_SHEET: &str = "Ledger";

/// Create a clean ledger workbook at `path`, replacing any existing file.
///
/// Layout: `A1` = `R Row`, `B1..M1` = month names, `A2..A33` = `R01..R32`,
/// and the `"0"` number format on columns B..M.
pub fn create_ledger_template(path: &Path) -> ExporterResult<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(TEMPLATE_SHEET)?;

    let header = Format::new().set_bold().set_align(FormatAlign::Center);
    let integer = Format::new().set_num_format("0");

    worksheet.write_string_with_format(0, 0, LABEL_HEADER, &header)?;
    worksheet.set_column_width(0, 10)?;

    for (i, month) in MONTH_NAMES.iter().enumerate() {
        let col = i as u16 + 1;
        worksheet.write_string_with_format(0, col, *month, &header)?;
        worksheet.set_column_format(col, &integer)?;
        worksheet.set_column_width(col, 12)?;
    }

    for tag in FieldTag::all() {
        worksheet.write_string(tag.row() - 1, 0, tag.name())?;
    }

    worksheet.set_freeze_panes(1, 1)?;
    workbook.save(path)?;
    Ok(())
}
