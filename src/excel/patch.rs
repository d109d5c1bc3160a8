//! Streaming worksheet rewrite
//!
//! Rows and cells that are not edited are copied event for event. Edited
//! cells are replaced in place, and missing rows and cells are inserted in
//! row-major order.

use super::shared_formula;
use super::styles::IntegerStyles;
use super::{cell_reference, parse_cell_reference};
use crate::error::{ExporterError, ExporterResult};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::io::BufRead;

/// New content for a cell
#[derive(Debug, Clone, PartialEq)]
pub enum EditValue {
    /// Leave the content as it is (used for format-only edits)
    Keep,
    /// Remove the value and any formula, keeping the cell's format
    Clear,
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub value: EditValue,
    /// Switch the cell to the `"0"` number format
    pub integer_format: bool,
}

/// Cell edits for one worksheet, keyed by 1-based `(row, col)`
#[derive(Debug, Clone, Default)]
pub struct WorksheetEdits {
    cells: BTreeMap<(u32, u32), CellEdit>,
}

impl WorksheetEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a cell's content; a later call for the same cell wins
    pub fn set_value(&mut self, row: u32, col: u32, value: EditValue) {
        self.entry(row, col).value = value;
    }

    pub fn set_integer_format(&mut self, row: u32, col: u32) {
        self.entry(row, col).integer_format = true;
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&CellEdit> {
        self.cells.get(&(row, col))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Bounding box of all edits as `(min_row, min_col, max_row, max_col)`
    pub fn extent(&self) -> Option<(u32, u32, u32, u32)> {
        let mut keys = self.cells.keys();
        let &(row, col) = keys.next()?;
        Some(keys.fold((row, col, row, col), |(r1, c1, r2, c2), &(r, c)| {
            (r1.min(r), c1.min(c), r2.max(r), c2.max(c))
        }))
    }

    fn entry(&mut self, row: u32, col: u32) -> &mut CellEdit {
        self.cells.entry((row, col)).or_insert(CellEdit {
            value: EditValue::Keep,
            integer_format: false,
        })
    }

    fn by_row(&self) -> BTreeMap<u32, Vec<(u32, &CellEdit)>> {
        let mut out: BTreeMap<u32, Vec<(u32, &CellEdit)>> = BTreeMap::new();
        // BTreeMap order is row-major, so each row's cells arrive sorted by column
        for (&(row, col), edit) in &self.cells {
            out.entry(row).or_default().push((col, edit));
        }
        out
    }
}

/// Result of patching one worksheet part
#[derive(Debug)]
pub struct PatchedSheet {
    pub xml: Vec<u8>,
    /// An edited cell previously held a formula
    pub formula_removed: bool,
}

/// Last row that holds at least one cell (0 for an empty sheet)
pub fn last_row(xml: &[u8]) -> ExporterResult<u32> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cursor = SheetCursor::default();
    let mut last: u32 = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"row" => {
                    cursor.enter_row(&e)?;
                }
                b"c" => {
                    let (row, _, _) = cursor.enter_cell(&e)?;
                    last = last.max(row);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(last)
}

/// Apply `edits` to a worksheet XML part
pub fn patch_worksheet_xml(
    original: &[u8],
    edits: &WorksheetEdits,
    styles: &mut IntegerStyles,
) -> ExporterResult<PatchedSheet> {
    let detached = shared_formula::detach_shared_formulas(original, edits)?;
    let original = detached.as_deref().unwrap_or(original);

    let rows = edits.by_row();
    let mut state = PatchState {
        pending: rows.keys().copied().collect(),
        rows: &rows,
        next: 0,
        styles,
        formula_removed: false,
    };

    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + edits.len() * 64));

    let mut buf = Vec::new();
    let mut saw_sheet_data = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                state.patch_sheet_data(&mut reader, &mut writer)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                if rows.is_empty() {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                } else {
                    // `<sheetData/>` becomes `<sheetData>...</sheetData>`
                    let end = end_tag_for(&e);
                    writer.write_event(Event::Start(e.into_owned()))?;
                    state.flush_rows_before(u32::MAX, &mut writer)?;
                    writer.write_event(Event::End(end))?;
                }
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"dimension" => {
                writer.write_event(Event::Start(widen_dimension(&e, edits)?))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"dimension" => {
                writer.write_event(Event::Empty(widen_dimension(&e, edits)?))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"worksheet" => {
                if !saw_sheet_data && !rows.is_empty() {
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    state.flush_rows_before(u32::MAX, &mut writer)?;
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(PatchedSheet {
        xml: writer.into_inner(),
        formula_removed: state.formula_removed,
    })
}

/// Current position while streaming `sheetData`.
///
/// `r` is optional on both `<row>` and `<c>`: a row without it follows the
/// previous row, a cell without it follows the previous cell of its row.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct SheetCursor {
    row: u32,
    col: u32,
}

impl SheetCursor {
    /// Number of a `<row>` tag and whether it carried `r`
    pub(super) fn enter_row(&mut self, tag: &BytesStart<'_>) -> ExporterResult<(u32, bool)> {
        let numbered = attr_text(tag, b"r")?.and_then(|v| v.parse::<u32>().ok());
        self.row = numbered.unwrap_or(self.row.saturating_add(1));
        self.col = 0;
        Ok((self.row, numbered.is_some()))
    }

    /// `(row, col)` of a `<c>` tag and whether it carried `r`
    pub(super) fn enter_cell(&mut self, tag: &BytesStart<'_>) -> ExporterResult<(u32, u32, bool)> {
        match attr_text(tag, b"r")?.and_then(|r| parse_cell_reference(&r)) {
            Some((row, col)) => {
                self.col = col;
                Ok((row, col, true))
            }
            None => {
                self.col = self.col.saturating_add(1);
                Ok((self.row, self.col, false))
            }
        }
    }
}

type RowEdits<'e> = BTreeMap<u32, Vec<(u32, &'e CellEdit)>>;

struct PatchState<'e, 's> {
    rows: &'e RowEdits<'e>,
    /// Edited row numbers in ascending order; `next` is the first not yet written
    pending: Vec<u32>,
    next: usize,
    styles: &'s mut IntegerStyles,
    formula_removed: bool,
}

/// Edits of the existing row being patched
struct RowPatch<'e> {
    row_num: u32,
    cells: &'e [(u32, &'e CellEdit)],
    /// First edit not yet written
    idx: usize,
}

impl<'e, 's> PatchState<'e, 's> {
    fn patch_sheet_data<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        writer: &mut Writer<Vec<u8>>,
    ) -> ExporterResult<()> {
        let mut buf = Vec::new();
        let mut cursor = SheetCursor::default();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                    let row_start = e.into_owned();
                    self.patch_existing_row(reader, writer, &mut cursor, row_start, false)?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                    let row_empty = e.into_owned();
                    self.patch_existing_row(reader, writer, &mut cursor, row_empty, true)?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    self.flush_rows_before(u32::MAX, writer)?;
                    writer.write_event(Event::End(e.into_owned()))?;
                    break;
                }
                Event::Eof => {
                    return Err(ExporterError::Workbook(
                        "unexpected end of worksheet inside sheetData".to_string(),
                    ))
                }
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }

        Ok(())
    }

    /// Write one `<row>` of the sheet, patched when it has edits.
    /// An edited row that relied on its implicit number gets an explicit `r`.
    fn patch_existing_row<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        writer: &mut Writer<Vec<u8>>,
        cursor: &mut SheetCursor,
        tag: BytesStart<'static>,
        empty: bool,
    ) -> ExporterResult<()> {
        let (row_num, numbered) = cursor.enter_row(&tag)?;
        self.flush_rows_before(row_num, writer)?;
        let Some(cells) = self.take_row(row_num) else {
            return write_tag(writer, tag, empty);
        };

        let reference = (!numbered).then(|| row_num.to_string());
        let start = rebuild_tag(&tag, reference.as_deref(), &[b"spans".as_slice()])?;
        writer.write_event(Event::Start(start))?;

        let mut row = RowPatch {
            row_num,
            cells,
            idx: 0,
        };
        if empty {
            // `<row/>` becomes `<row>...</row>`
            self.write_remaining(writer, &mut row)?;
            writer.write_event(Event::End(end_tag_for(&tag)))?;
            return Ok(());
        }
        self.patch_row(reader, writer, cursor, &mut row)
    }

    fn patch_row<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        writer: &mut Writer<Vec<u8>>,
        cursor: &mut SheetCursor,
        row: &mut RowPatch<'e>,
    ) -> ExporterResult<()> {
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                    let cell_start = e.into_owned();
                    self.patch_cell(reader, writer, cursor, row, cell_start, false)?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                    let cell_empty = e.into_owned();
                    self.patch_cell(reader, writer, cursor, row, cell_empty, true)?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                    self.write_remaining(writer, row)?;
                    writer.write_event(Event::End(e.into_owned()))?;
                    break;
                }
                Event::Eof => {
                    return Err(ExporterError::Workbook(format!(
                        "unexpected end of worksheet inside row {}",
                        row.row_num
                    )))
                }
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }

        Ok(())
    }

    /// Copy, restyle or replace one existing `<c>` of an edited row.
    /// Cells without `r` get one, since inserted cells would shift their
    /// implicit position.
    fn patch_cell<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        writer: &mut Writer<Vec<u8>>,
        cursor: &mut SheetCursor,
        row: &mut RowPatch<'e>,
        tag: BytesStart<'static>,
        empty: bool,
    ) -> ExporterResult<()> {
        let (cell_row, col, numbered) = cursor.enter_cell(&tag)?;
        if cell_row != row.row_num {
            // Reference into another row; nothing here can be matched to it
            return write_tag(writer, tag, empty);
        }

        self.write_cells_before(writer, row, col)?;
        let reference = (!numbered).then(|| cell_reference(row.row_num, col));
        let style = attr_text(&tag, b"s")?.and_then(|s| s.parse().ok());

        let edit = match row.cells.get(row.idx).filter(|(c, _)| *c == col) {
            Some(&(_, edit)) => {
                row.idx += 1;
                edit
            }
            None => {
                let tag = rebuild_tag(&tag, reference.as_deref(), &[])?;
                return write_tag(writer, tag, empty);
            }
        };

        if edit.value == EditValue::Keep {
            // Content (value, formula) flows through untouched
            let tag = self.restyle(&tag, reference.as_deref(), style, edit)?;
            return write_tag(writer, tag, empty);
        }
        if !empty {
            let mut buf = Vec::new();
            self.formula_removed |= skip_cell(reader, &mut buf)?;
        }
        self.write_cell(writer, row.row_num, col, edit, style)
    }

    /// Write new rows for every pending edited row number below `row_num`
    fn flush_rows_before(
        &mut self,
        row_num: u32,
        writer: &mut Writer<Vec<u8>>,
    ) -> ExporterResult<()> {
        while self.next < self.pending.len() && self.pending[self.next] < row_num {
            let row = self.pending[self.next];
            self.next += 1;
            let rows: &'e RowEdits<'e> = self.rows;
            let cells = rows.get(&row).map(Vec::as_slice).unwrap_or_default();

            let mut start = BytesStart::new("row");
            start.push_attribute(("r", row.to_string().as_str()));
            writer.write_event(Event::Start(start))?;
            for (col, edit) in cells {
                self.write_cell(writer, row, *col, edit, None)?;
            }
            writer.write_event(Event::End(BytesEnd::new("row")))?;
        }
        Ok(())
    }

    /// Claim the edits of an existing row. A row number seen twice is only
    /// patched the first time.
    fn take_row(&mut self, row_num: u32) -> Option<&'e [(u32, &'e CellEdit)]> {
        if self.next < self.pending.len() && self.pending[self.next] == row_num {
            self.next += 1;
            self.rows.get(&row_num).map(Vec::as_slice)
        } else {
            None
        }
    }

    /// Insert new cells that sort before existing column `col`
    fn write_cells_before(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        row: &mut RowPatch<'e>,
        col: u32,
    ) -> ExporterResult<()> {
        while row.idx < row.cells.len() && row.cells[row.idx].0 < col {
            let (new_col, edit) = row.cells[row.idx];
            self.write_cell(writer, row.row_num, new_col, edit, None)?;
            row.idx += 1;
        }
        Ok(())
    }

    /// Append the edits that sort after every existing cell of the row
    fn write_remaining(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        row: &mut RowPatch<'e>,
    ) -> ExporterResult<()> {
        self.write_cells_before(writer, row, u32::MAX)
    }

    fn cell_style(&mut self, edit: &CellEdit, existing: Option<u32>) -> Option<u32> {
        if edit.integer_format {
            Some(self.styles.integer_style(existing.unwrap_or(0)))
        } else {
            existing
        }
    }

    /// Existing cell tag with its `s` attribute switched to the integer format
    fn restyle(
        &mut self,
        tag: &BytesStart<'_>,
        reference: Option<&str>,
        existing: Option<u32>,
        edit: &CellEdit,
    ) -> ExporterResult<BytesStart<'static>> {
        if !edit.integer_format {
            return rebuild_tag(tag, reference, &[]);
        }
        let style = self.cell_style(edit, existing).unwrap_or(0);

        let mut out = rebuild_tag(tag, reference, &[b"s".as_slice()])?;
        if style != 0 {
            out.push_attribute(("s", style.to_string().as_str()));
        }
        Ok(out)
    }

    fn write_cell(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        row_num: u32,
        col: u32,
        edit: &CellEdit,
        existing_style: Option<u32>,
    ) -> ExporterResult<()> {
        let mut cell = format!(r#"<c r="{}""#, cell_reference(row_num, col));
        if let Some(s) = self.cell_style(edit, existing_style).filter(|s| *s != 0) {
            cell.push_str(&format!(r#" s="{}""#, s));
        }

        match &edit.value {
            EditValue::Keep | EditValue::Clear => cell.push_str("/>"),
            EditValue::Number(n) => {
                cell.push_str(&format!("><v>{}</v></c>", n));
            }
            EditValue::Text(text) => {
                cell.push_str(r#" t="inlineStr"><is><t"#);
                if needs_space_preserve(text) {
                    cell.push_str(r#" xml:space="preserve""#);
                }
                cell.push('>');
                cell.push_str(&escape_text(text));
                cell.push_str("</t></is></c>");
            }
        }

        writer.get_mut().extend_from_slice(cell.as_bytes());
        Ok(())
    }
}

/// Consume a cell's content through its closing tag; reports whether it held a formula
fn skip_cell<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> ExporterResult<bool> {
    let mut had_formula = false;
    let mut depth = 1usize;

    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(inner) => {
                if depth == 1 && local_name(inner.name().as_ref()) == b"f" {
                    had_formula = true;
                }
                depth += 1;
            }
            Event::Empty(inner) => {
                if depth == 1 && local_name(inner.name().as_ref()) == b"f" {
                    had_formula = true;
                }
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => {
                return Err(ExporterError::Workbook(
                    "unexpected end of worksheet inside a cell".to_string(),
                ))
            }
            _ => {}
        }
    }

    Ok(had_formula)
}

fn write_tag(
    writer: &mut Writer<Vec<u8>>,
    tag: BytesStart<'static>,
    empty: bool,
) -> ExporterResult<()> {
    if empty {
        writer.write_event(Event::Empty(tag))?;
    } else {
        writer.write_event(Event::Start(tag))?;
    }
    Ok(())
}

/// Copy of `tag` without the `drop` attributes, with `r` set first when
/// `reference` is given
fn rebuild_tag(
    tag: &BytesStart<'_>,
    reference: Option<&str>,
    drop: &[&[u8]],
) -> ExporterResult<BytesStart<'static>> {
    if reference.is_none() && drop.is_empty() {
        return Ok(tag.to_owned());
    }

    let mut out = tag.to_owned();
    out.clear_attributes();
    if let Some(reference) = reference {
        out.push_attribute(("r", reference));
    }
    for attr in tag.attributes() {
        let attr = attr?;
        let key = local_name(attr.key.as_ref());
        if drop.contains(&key) || (reference.is_some() && key == b"r") {
            continue;
        }
        out.push_attribute(attr);
    }
    Ok(out)
}

fn widen_dimension(
    tag: &BytesStart<'_>,
    edits: &WorksheetEdits,
) -> ExporterResult<BytesStart<'static>> {
    let Some((r1, c1, r2, c2)) = edits.extent() else {
        return Ok(tag.to_owned());
    };

    let mut out = tag.to_owned();
    out.clear_attributes();
    for attr in tag.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"ref" {
            let current = std::str::from_utf8(&attr.value).unwrap_or_default();
            let widened = widen_range(current, (r1, c1, r2, c2));
            out.push_attribute(("ref", widened.as_str()));
        } else {
            out.push_attribute(attr);
        }
    }
    Ok(out)
}

/// Union of an A1 range (`A1:M33` or `A1`) with a bounding box
fn widen_range(current: &str, (r1, c1, r2, c2): (u32, u32, u32, u32)) -> String {
    let mut parts = current.split(':').map(parse_cell_reference);
    let (mut top, mut left, mut bottom, mut right) = (r1, c1, r2, c2);
    if let Some(Some((row, col))) = parts.next() {
        let (end_row, end_col) = match parts.next() {
            Some(Some(end)) => end,
            _ => (row, col),
        };
        top = top.min(row.min(end_row));
        left = left.min(col.min(end_col));
        bottom = bottom.max(row.max(end_row));
        right = right.max(col.max(end_col));
    }

    if (top, left) == (bottom, right) {
        cell_reference(top, left)
    } else {
        format!("{}:{}", cell_reference(top, left), cell_reference(bottom, right))
    }
}

fn end_tag_for(tag: &BytesStart<'_>) -> BytesEnd<'static> {
    BytesEnd::new(String::from_utf8_lossy(tag.name().as_ref()).into_owned())
}

pub(super) fn attr_text(tag: &BytesStart<'_>, key: &[u8]) -> ExporterResult<Option<String>> {
    for attr in tag.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    Ok(None)
}

pub(super) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

pub(super) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0" fontId="0"/><xf numFmtId="0" fontId="1"/></cellXfs></styleSheet>"#;

    fn sheet(data: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:C3"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetData>{}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#,
            data
        )
    }

    fn patch(xml: &str, edits: &WorksheetEdits) -> (String, bool, IntegerStyles) {
        let mut styles = IntegerStyles::parse(STYLES).unwrap();
        let patched = patch_worksheet_xml(xml.as_bytes(), edits, &mut styles).unwrap();
        (
            String::from_utf8(patched.xml).unwrap(),
            patched.formula_removed,
            styles,
        )
    }

    #[test]
    fn test_no_edits_is_identity() {
        let xml = sheet(r#"<row r="1" spans="1:2"><c r="A1" t="s"><v>0</v></c><c r="B1"><v>5</v></c></row>"#);
        let (out, removed, _) = patch(&xml, &WorksheetEdits::new());
        assert_eq!(out, xml);
        assert!(!removed);
    }

    #[test]
    fn test_replace_existing_cell_keeps_neighbours() {
        let xml = sheet(r#"<row r="2" spans="1:3"><c r="A2"><v>1</v></c><c r="B2" s="1"><v>2</v></c><c r="C2"><v>3</v></c></row>"#);
        let mut edits = WorksheetEdits::new();
        edits.set_value(2, 2, EditValue::Number(42.5));

        let (out, _, _) = patch(&xml, &edits);
        assert!(out.contains(r#"<row r="2"><c r="A2"><v>1</v></c><c r="B2" s="1"><v>42.5</v></c><c r="C2"><v>3</v></c></row>"#));
    }

    #[test]
    fn test_insert_cells_and_rows_in_order() {
        let xml = sheet(r#"<row r="2"><c r="C2"><v>3</v></c></row><row r="5"><c r="A5"><v>5</v></c></row>"#);
        let mut edits = WorksheetEdits::new();
        edits.set_value(1, 1, EditValue::Text("R Row".to_string()));
        edits.set_value(2, 1, EditValue::Text("R01".to_string()));
        edits.set_value(2, 4, EditValue::Number(7.0));
        edits.set_value(3, 1, EditValue::Text("R02".to_string()));

        let (out, _, _) = patch(&xml, &edits);
        let expected = concat!(
            r#"<sheetData>"#,
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>R Row</t></is></c></row>"#,
            r#"<row r="2"><c r="A2" t="inlineStr"><is><t>R01</t></is></c><c r="C2"><v>3</v></c><c r="D2"><v>7</v></c></row>"#,
            r#"<row r="3"><c r="A3" t="inlineStr"><is><t>R02</t></is></c></row>"#,
            r#"<row r="5"><c r="A5"><v>5</v></c></row>"#,
            r#"</sheetData>"#,
        );
        assert!(out.contains(expected), "got: {}", out);
    }

    #[test]
    fn test_clear_removes_value_and_keeps_style() {
        let xml = sheet(r#"<row r="2"><c r="B2" s="1" t="s"><v>4</v></c></row>"#);
        let mut edits = WorksheetEdits::new();
        edits.set_value(2, 2, EditValue::Clear);

        let (out, _, _) = patch(&xml, &edits);
        assert!(out.contains(r#"<row r="2"><c r="B2" s="1"/></row>"#));
    }

    #[test]
    fn test_integer_format_on_kept_cell_preserves_content() {
        let xml = sheet(r#"<row r="40"><c r="B40" s="1"><f>SUM(B2:B33)</f><v>10</v></c></row>"#);
        let mut edits = WorksheetEdits::new();
        edits.set_integer_format(40, 2);

        let (out, removed, mut styles) = patch(&xml, &edits);
        let s = styles.integer_style(1);
        assert!(out.contains(&format!(
            r#"<c r="B40" s="{}"><f>SUM(B2:B33)</f><v>10</v></c>"#,
            s
        )));
        assert!(!removed);
    }

    #[test]
    fn test_integer_format_on_missing_cell_creates_styled_blank() {
        let xml = sheet("");
        let mut edits = WorksheetEdits::new();
        edits.set_integer_format(3, 2);

        let (out, _, mut styles) = patch(&xml, &edits);
        let s = styles.integer_style(0);
        assert!(out.contains(&format!(r#"<row r="3"><c r="B3" s="{}"/></row>"#, s)));
    }

    #[test]
    fn test_overwriting_formula_is_reported() {
        let xml = sheet(r#"<row r="2"><c r="B2"><f>1+1</f><v>2</v></c></row>"#);
        let mut edits = WorksheetEdits::new();
        edits.set_value(2, 2, EditValue::Number(3.0));

        let (out, removed, _) = patch(&xml, &edits);
        assert!(out.contains(r#"<c r="B2"><v>3</v></c>"#));
        assert!(removed);
    }

    #[test]
    fn test_overwriting_shared_master_keeps_group_formulas() {
        let xml = sheet(concat!(
            r#"<row r="2"><c r="B2"><f t="shared" ref="B2:B3" si="0">A2*2</f><v>2</v></c></row>"#,
            r#"<row r="3"><c r="B3"><f t="shared" si="0"/><v>4</v></c></row>"#,
        ));
        let mut edits = WorksheetEdits::new();
        edits.set_value(2, 2, EditValue::Number(5.0));

        let (out, removed, _) = patch(&xml, &edits);
        assert!(out.contains(r#"<row r="2"><c r="B2"><v>5</v></c></row>"#), "got: {}", out);
        assert!(out.contains(r#"<row r="3"><c r="B3"><f>A3*2</f><v>4</v></c></row>"#), "got: {}", out);
        assert!(!out.contains(r#"si="0""#));
        assert!(removed);
    }

    #[test]
    fn test_rows_and_cells_without_references() {
        let xml = sheet(concat!(
            r#"<row><c t="inlineStr"><is><t>R Row</t></is></c></row>"#,
            r#"<row><c t="inlineStr"><is><t>R01</t></is></c><c><v>5</v></c></row>"#,
            r#"<row><c><v>9</v></c></row>"#,
        ));
        assert_eq!(last_row(xml.as_bytes()).unwrap(), 3);

        let mut edits = WorksheetEdits::new();
        edits.set_value(1, 2, EditValue::Text("January".to_string()));
        edits.set_value(2, 2, EditValue::Number(7.0));
        edits.set_value(4, 1, EditValue::Text("R03".to_string()));

        let (out, _, _) = patch(&xml, &edits);
        let expected = concat!(
            r#"<sheetData>"#,
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>R Row</t></is></c><c r="B1" t="inlineStr"><is><t>January</t></is></c></row>"#,
            r#"<row r="2"><c r="A2" t="inlineStr"><is><t>R01</t></is></c><c r="B2"><v>7</v></c></row>"#,
            r#"<row><c><v>9</v></c></row>"#,
            r#"<row r="4"><c r="A4" t="inlineStr"><is><t>R03</t></is></c></row>"#,
            r#"</sheetData>"#,
        );
        assert!(out.contains(expected), "got: {}", out);
    }

    #[test]
    fn test_empty_sheet_data_is_expanded() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;
        let mut edits = WorksheetEdits::new();
        edits.set_value(1, 1, EditValue::Text("R Row".to_string()));

        let (out, _, _) = patch(xml, &edits);
        assert!(out.contains(r#"<sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>R Row</t></is></c></row></sheetData>"#));
    }

    #[test]
    fn test_empty_row_element_is_expanded() {
        let xml = sheet(r#"<row r="2" ht="20" customHeight="1"/>"#);
        let mut edits = WorksheetEdits::new();
        edits.set_value(2, 1, EditValue::Text("R01".to_string()));

        let (out, _, _) = patch(&xml, &edits);
        assert!(out.contains(r#"<row r="2" ht="20" customHeight="1"><c r="A2" t="inlineStr"><is><t>R01</t></is></c></row>"#));
    }

    #[test]
    fn test_dimension_is_widened() {
        let xml = sheet("");
        let mut edits = WorksheetEdits::new();
        edits.set_value(33, 13, EditValue::Number(1.0));

        let (out, _, _) = patch(&xml, &edits);
        assert!(out.contains(r#"<dimension ref="A1:M33"/>"#));
    }

    #[test]
    fn test_text_is_escaped() {
        let xml = sheet("");
        let mut edits = WorksheetEdits::new();
        edits.set_value(1, 1, EditValue::Text(" A&B <x> ".to_string()));

        let (out, _, _) = patch(&xml, &edits);
        assert!(out.contains(r#"<t xml:space="preserve"> A&amp;B &lt;x&gt; </t>"#));
    }

    #[test]
    fn test_last_row() {
        let xml = sheet(r#"<row r="2"><c r="A2"><v>1</v></c></row><row r="7"><c r="C7"><v>1</v></c></row><row r="9" ht="20" customHeight="1"/>"#);
        assert_eq!(last_row(xml.as_bytes()).unwrap(), 7);
        assert_eq!(last_row(sheet("").as_bytes()).unwrap(), 0);
    }

    #[test]
    fn test_widen_range() {
        assert_eq!(widen_range("A1:C3", (1, 1, 33, 13)), "A1:M33");
        assert_eq!(widen_range("A1", (1, 1, 1, 1)), "A1");
        assert_eq!(widen_range("B2:Z50", (1, 1, 33, 13)), "A1:Z50");
        assert_eq!(widen_range("", (1, 2, 3, 4)), "B1:D3");
    }

    #[test]
    fn test_extent() {
        let mut edits = WorksheetEdits::new();
        assert_eq!(edits.extent(), None);
        edits.set_value(2, 3, EditValue::Clear);
        edits.set_value(1, 5, EditValue::Clear);
        edits.set_integer_format(40, 1);
        assert_eq!(edits.extent(), Some((1, 1, 40, 5)));
    }
}
