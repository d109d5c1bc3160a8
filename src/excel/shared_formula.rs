//! Shared formulas whose master cell is overwritten
//!
//! A shared group stores its formula once, on the master cell
//! (`<f t="shared" ref="B2:B9" si="0">A2*2</f>`); the other members only
//! carry `<f t="shared" si="0"/>`. Before the master is replaced, each
//! member gets a formula of its own, shifted from the master's position.

use super::patch::{attr_text, escape_text, local_name, EditValue, SheetCursor, WorksheetEdits};
use super::{column_index, column_letter, MAX_COLUMN, MAX_ROW};
use crate::error::{ExporterError, ExporterResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::io::BufRead;
use tracing::debug;

/// Master cell of a shared group
#[derive(Debug)]
struct Master {
    row: u32,
    col: u32,
    formula: String,
}

/// Give every member of a group whose master `edits` overwrite its own
/// formula. `None` when the sheet has no such group.
pub(super) fn detach_shared_formulas(
    xml: &[u8],
    edits: &WorksheetEdits,
) -> ExporterResult<Option<Vec<u8>>> {
    let masters = overwritten_masters(xml, edits)?;
    if masters.is_empty() {
        return Ok(None);
    }
    debug!(groups = masters.len(), "detaching shared formulas from overwritten masters");

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut cursor = SheetCursor::default();
    let mut cell: Option<(u32, u32)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"f" => {
                match member_formula(&e, cell, &masters)? {
                    Some(formula) => {
                        read_formula(&mut reader)?;
                        write_formula(&mut writer, &formula);
                    }
                    None => writer.write_event(Event::Start(e.into_owned()))?,
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"f" => {
                match member_formula(&e, cell, &masters)? {
                    Some(formula) => write_formula(&mut writer, &formula),
                    None => writer.write_event(Event::Empty(e.into_owned()))?,
                }
            }
            Event::Start(e) => {
                match local_name(e.name().as_ref()) {
                    b"row" => {
                        cursor.enter_row(&e)?;
                    }
                    b"c" => {
                        let (row, col, _) = cursor.enter_cell(&e)?;
                        cell = Some((row, col));
                    }
                    _ => {}
                }
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e) => {
                match local_name(e.name().as_ref()) {
                    b"row" => {
                        cursor.enter_row(&e)?;
                    }
                    b"c" => {
                        cursor.enter_cell(&e)?;
                        cell = None;
                    }
                    _ => {}
                }
                writer.write_event(Event::Empty(e.into_owned()))?;
            }
            Event::End(e) => {
                if local_name(e.name().as_ref()) == b"c" {
                    cell = None;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(Some(writer.into_inner()))
}

/// Shift the relative references of `formula` by `rows` and `cols`.
/// A reference pushed off the sheet becomes `#REF!`.
pub(super) fn translate_shared_formula(formula: &str, rows: i64, cols: i64) -> ExporterResult<String> {
    let cell_ref = Regex::new(
        r"(?P<sheet>(?:'[^']+'|[A-Za-z0-9_.]+)!)?(?P<col_abs>\$?)(?P<col>[A-Z]{1,3})(?P<row_abs>\$?)(?P<row>[0-9]+)",
    )
    .map_err(|e| ExporterError::Workbook(format!("Regex error: {}", e)))?;

    let mut out = String::with_capacity(formula.len());
    let mut copied = 0;
    for caps in cell_ref.captures_iter(formula) {
        let Some(whole) = caps.get(0) else { continue };
        if !is_reference(formula, whole.start(), whole.end()) {
            continue;
        }
        let Some(shifted) = shift_reference(&caps, rows, cols) else {
            continue;
        };
        out.push_str(&formula[copied..whole.start()]);
        out.push_str(&shifted);
        copied = whole.end();
    }
    out.push_str(&formula[copied..]);

    Ok(out)
}

/// Masters (by `si`) whose cell receives a new value
fn overwritten_masters(xml: &[u8], edits: &WorksheetEdits) -> ExporterResult<HashMap<String, Master>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cursor = SheetCursor::default();
    let mut cell: Option<(u32, u32)> = None;
    let mut masters = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"row" => {
                    cursor.enter_row(&e)?;
                }
                b"c" => {
                    let (row, col, _) = cursor.enter_cell(&e)?;
                    cell = Some((row, col));
                }
                b"f" => {
                    let overwritten = cell.filter(|&(row, col)| {
                        edits
                            .get(row, col)
                            .is_some_and(|edit| edit.value != EditValue::Keep)
                    });
                    if let (Some((row, col)), Some(si)) = (overwritten, shared_index(&e, true)?) {
                        let formula = read_formula(&mut reader)?;
                        masters.insert(si, Master { row, col, formula });
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"row" => {
                    cursor.enter_row(&e)?;
                }
                b"c" => {
                    cursor.enter_cell(&e)?;
                    cell = None;
                }
                _ => {}
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"c" => cell = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(masters)
}

/// `si` of a shared-formula tag. Masters carry `ref`, members do not.
fn shared_index(tag: &BytesStart<'_>, master: bool) -> ExporterResult<Option<String>> {
    if attr_text(tag, b"t")?.as_deref() != Some("shared") {
        return Ok(None);
    }
    if attr_text(tag, b"ref")?.is_some() != master {
        return Ok(None);
    }
    attr_text(tag, b"si")
}

/// Formula for a member `<f>` of a detached group, translated to its cell
fn member_formula(
    tag: &BytesStart<'_>,
    cell: Option<(u32, u32)>,
    masters: &HashMap<String, Master>,
) -> ExporterResult<Option<String>> {
    let Some((row, col)) = cell else {
        return Ok(None);
    };
    let Some(master) = shared_index(tag, false)?.and_then(|si| masters.get(&si)) else {
        return Ok(None);
    };

    let formula = translate_shared_formula(
        &master.formula,
        i64::from(row) - i64::from(master.row),
        i64::from(col) - i64::from(master.col),
    )?;
    Ok(Some(formula))
}

/// Unescaped text of an `<f>` element, consumed through its end tag
fn read_formula<R: BufRead>(reader: &mut Reader<R>) -> ExporterResult<String> {
    let mut buf = Vec::new();
    let mut formula = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => formula.push_str(&e.unescape()?),
            Event::End(e) if local_name(e.name().as_ref()) == b"f" => break,
            Event::Eof => {
                return Err(ExporterError::Workbook(
                    "unexpected end of worksheet inside a formula".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(formula)
}

fn write_formula(writer: &mut Writer<Vec<u8>>, formula: &str) {
    let element = format!("<f>{}</f>", escape_text(formula));
    writer.get_mut().extend_from_slice(element.as_bytes());
}

/// A match is a cell reference unless it sits inside a string literal or is
/// part of a longer name (`LOG10(`, `ABCD1`, `_A1`)
fn is_reference(formula: &str, start: usize, end: usize) -> bool {
    let in_string = formula[..start].matches('"').count() % 2 == 1;
    let name_char = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.';
    let joined_before = formula[..start].chars().next_back().is_some_and(name_char);
    let joined_after = formula[end..]
        .chars()
        .next()
        .is_some_and(|c| name_char(c) || c == '(');

    !in_string && !joined_before && !joined_after
}

fn shift_reference(caps: &Captures<'_>, rows: i64, cols: i64) -> Option<String> {
    let col = column_index(&caps["col"])?;
    let row: u32 = caps["row"].parse().ok()?;
    let sheet = caps.name("sheet").map_or("", |m| m.as_str());
    let col_abs = &caps["col_abs"];
    let row_abs = &caps["row_abs"];

    let new_col = if col_abs.is_empty() { i64::from(col) + cols } else { i64::from(col) };
    let new_row = if row_abs.is_empty() { i64::from(row) + rows } else { i64::from(row) };
    if !(1..=i64::from(MAX_COLUMN)).contains(&new_col) || !(1..=i64::from(MAX_ROW)).contains(&new_row) {
        return Some(format!("{}#REF!", sheet));
    }

    Some(format!(
        "{}{}{}{}{}",
        sheet,
        col_abs,
        column_letter(new_col as u32),
        row_abs,
        new_row
    ))
}
