use super::patch::{self, EditValue, WorksheetEdits};
use super::styles::IntegerStyles;
use super::{column_letter, package::XlsxPackage, MAX_COLUMN};
use crate::error::{ExporterError, ExporterResult};
use crate::types::{FieldMap, DATA_HEADER, FIELD_COUNT, LABEL_HEADER, MONTH_NAMES};
use std::path::Path;
use tracing::{debug, info};

/// Last row the ledger layout itself occupies (header plus R01..R32)
const LEDGER_LAST_ROW: u32 = FIELD_COUNT as u32 + 1;

/// Places one declaration's fields into a month column of the active sheet
pub struct LedgerPlacer<'a> {
    fields: &'a FieldMap,
    column: u32,
}

impl<'a> LedgerPlacer<'a> {
    pub fn new(fields: &'a FieldMap, column: u32) -> Self {
        Self { fields, column }
    }

    /// Cell edits for a sheet whose last used row is `last_row`
    ///
    /// Later edits to the same cell win, so the month headers replace the
    /// `Data` header when the target is one of B..M.
    pub fn edits(&self, last_row: u32) -> WorksheetEdits {
        let mut edits = WorksheetEdits::new();

        edits.set_value(1, 1, EditValue::Text(LABEL_HEADER.to_string()));
        edits.set_value(1, self.column, EditValue::Text(DATA_HEADER.to_string()));
        for (i, month) in MONTH_NAMES.iter().enumerate() {
            edits.set_value(1, i as u32 + 2, EditValue::Text(month.to_string()));
        }

        for (tag, value) in self.fields.iter() {
            let row = tag.row();
            edits.set_value(row, 1, EditValue::Text(tag.name()));
            let value = match value {
                Some(n) => EditValue::Number(n),
                None => EditValue::Clear,
            };
            edits.set_value(row, self.column, value);
        }

        for row in 1..=last_row.max(LEDGER_LAST_ROW) {
            edits.set_integer_format(row, self.column);
        }

        edits
    }

    /// Patch the active sheet and stylesheet of an opened workbook
    pub fn apply(&self, package: &mut XlsxPackage) -> ExporterResult<()> {
        if self.column == 0 || self.column > MAX_COLUMN {
            return Err(ExporterError::ColumnOutOfRange {
                period: i64::from(self.column) - 1,
                index: i64::from(self.column),
            });
        }

        let sheet = package.active_sheet()?;
        let styles_part = package.styles_part()?;
        debug!(sheet = %sheet.name, part = %sheet.part, "patching active sheet");

        let sheet_xml = package
            .part(&sheet.part)
            .ok_or_else(|| ExporterError::MissingPart(sheet.part.clone()))?
            .to_vec();
        let mut styles = IntegerStyles::parse(package.part_text(&styles_part)?)?;

        let last_row = patch::last_row(&sheet_xml)?;
        let edits = self.edits(last_row);
        let patched = patch::patch_worksheet_xml(&sheet_xml, &edits, &mut styles)?;

        package.set_part(sheet.part, patched.xml);
        if let Some(rendered) = styles.render() {
            package.set_part(styles_part, rendered.into_bytes());
        }
        if patched.formula_removed && package.remove_calc_chain()? {
            debug!("removed calcChain after overwriting formula cells");
        }

        Ok(())
    }
}

/// Write a declaration into column `column` of the workbook at `path`, in place.
///
/// The workbook must already exist. Only the active sheet's header row,
/// label column and target column are touched; every other part of the
/// package is written back unchanged.
pub fn write_declaration(path: &Path, fields: &FieldMap, column: u32) -> ExporterResult<()> {
    let mut package = XlsxPackage::open(path)?;
    LedgerPlacer::new(fields, column).apply(&mut package)?;
    package.save(path)?;

    info!(
        workbook = %path.display(),
        column = %column_letter(column),
        fields = fields.present_count(),
        "declaration written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldTag;

    fn fields() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.set(FieldTag::new(1).unwrap(), Some(100.5));
        fields.set(FieldTag::new(32).unwrap(), Some(-3.0));
        fields
    }

    #[test]
    fn test_edits_layout_for_data_column() {
        let fields = fields();
        let edits = LedgerPlacer::new(&fields, 14).edits(0);

        assert_eq!(
            edits.get(1, 1).map(|e| &e.value),
            Some(&EditValue::Text("R Row".to_string()))
        );
        assert_eq!(
            edits.get(1, 14).map(|e| &e.value),
            Some(&EditValue::Text("Data".to_string()))
        );
        assert_eq!(
            edits.get(1, 2).map(|e| &e.value),
            Some(&EditValue::Text("January".to_string()))
        );
        assert_eq!(
            edits.get(2, 1).map(|e| &e.value),
            Some(&EditValue::Text("R01".to_string()))
        );
        assert_eq!(
            edits.get(2, 14).map(|e| &e.value),
            Some(&EditValue::Number(100.5))
        );
        assert_eq!(edits.get(3, 14).map(|e| &e.value), Some(&EditValue::Clear));
        assert_eq!(
            edits.get(33, 14).map(|e| &e.value),
            Some(&EditValue::Number(-3.0))
        );
    }

    #[test]
    fn test_month_header_replaces_data_header() {
        let fields = fields();
        let edits = LedgerPlacer::new(&fields, 4).edits(0);
        assert_eq!(
            edits.get(1, 4).map(|e| &e.value),
            Some(&EditValue::Text("March".to_string()))
        );
    }

    #[test]
    fn test_integer_format_covers_used_rows() {
        let fields = fields();

        let edits = LedgerPlacer::new(&fields, 2).edits(10);
        assert!(edits.get(1, 2).unwrap().integer_format);
        assert!(edits.get(33, 2).unwrap().integer_format);
        assert!(edits.get(34, 2).is_none());
        assert!(!edits.get(2, 1).unwrap().integer_format);

        let edits = LedgerPlacer::new(&fields, 2).edits(50);
        assert!(edits.get(50, 2).unwrap().integer_format);
        assert_eq!(edits.get(50, 2).unwrap().value, EditValue::Keep);
    }

    #[test]
    fn test_apply_rejects_column_zero() {
        let fields = fields();
        let mut package = XlsxPackage::from_reader(std::io::Cursor::new(empty_zip())).unwrap();
        assert!(matches!(
            LedgerPlacer::new(&fields, 0).apply(&mut package),
            Err(ExporterError::ColumnOutOfRange { index: 0, .. })
        ));
    }

    fn empty_zip() -> Vec<u8> {
        let writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer.finish().unwrap().into_inner()
    }
}
