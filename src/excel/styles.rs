//! Integer number format for ledger cells
//!
//! A cell's number format lives in its cell format record (`<xf>` inside
//! `<cellXfs>`). Giving a cell the `"0"` format means pointing it at a record
//! identical to its current one except for `numFmtId="1"`, which is the
//! built-in id for `"0"`. Records are reused when such a twin already exists,
//! so repeated imports do not grow the stylesheet.

use crate::error::{ExporterError, ExporterResult};
use roxmltree::{Document, Node};
use std::collections::HashMap;

/// Built-in number format id for `"0"`
pub const INTEGER_NUM_FMT_ID: u32 = 1;

#[derive(Debug, Clone)]
struct XfRecord {
    attrs: Vec<(String, String)>,
    inner: String,
}

impl XfRecord {
    fn from_node(xml: &str, node: Node<'_, '_>) -> Self {
        let attrs = node
            .attributes()
            .filter(|a| a.namespace().is_none())
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect();
        let inner = match (node.first_child(), node.last_child()) {
            (Some(first), Some(last)) => xml[first.range().start..last.range().end].to_string(),
            _ => String::new(),
        };
        Self { attrs, inner }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn num_fmt_id(&self) -> Option<u32> {
        self.attr("numFmtId").and_then(|v| v.trim().parse().ok())
    }

    fn with_integer_format(&self) -> Self {
        let mut twin = self.clone();
        twin.set_attr("numFmtId", &INTEGER_NUM_FMT_ID.to_string());
        twin.set_attr("applyNumberFormat", "1");
        twin
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    /// Attribute set and content, independent of attribute order
    fn key(&self) -> (Vec<(&str, &str)>, &str) {
        let mut attrs: Vec<(&str, &str)> = self
            .attrs
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        attrs.sort_unstable();
        (attrs, self.inner.trim())
    }

    fn render(&self, tag: &str) -> String {
        let mut out = format!("<{}", tag);
        for (name, value) in &self.attrs {
            out.push_str(&format!(r#" {}="{}""#, name, escape_attr(value)));
        }
        if self.inner.is_empty() {
            out.push_str("/>");
        } else {
            out.push('>');
            out.push_str(&self.inner);
            out.push_str(&format!("</{}>", tag));
        }
        out
    }
}

/// Cell format records of a stylesheet, extended on demand with integer twins
pub struct IntegerStyles {
    xml: String,
    xf_tag: String,
    existing: Vec<XfRecord>,
    added: Vec<XfRecord>,
    derived: HashMap<u32, u32>,
    /// Byte range of the `cellXfs/@count` value
    count_span: Option<(usize, usize)>,
    /// Byte offset of the `</cellXfs>` closing tag
    insert_at: usize,
}

impl IntegerStyles {
    /// Read the `cellXfs` records of a `styles.xml` part
    pub fn parse(xml: &str) -> ExporterResult<Self> {
        let doc = Document::parse(xml)?;
        let cell_xfs = doc
            .descendants()
            .find(|n| n.has_tag_name("cellXfs"))
            .ok_or_else(|| ExporterError::Workbook("stylesheet has no cellXfs".to_string()))?;

        let xf_nodes: Vec<Node<'_, '_>> = cell_xfs
            .children()
            .filter(|n| n.has_tag_name("xf"))
            .collect();
        let Some(first_xf) = xf_nodes.first() else {
            return Err(ExporterError::Workbook(
                "stylesheet has no cell formats".to_string(),
            ));
        };

        let existing = xf_nodes.iter().map(|n| XfRecord::from_node(xml, *n)).collect();
        let xf_tag = qualified_name(&xml[first_xf.range().start..]);

        let range = cell_xfs.range();
        let insert_at = xml[..range.end]
            .rfind("</")
            .filter(|pos| *pos > range.start)
            .ok_or_else(|| ExporterError::Workbook("malformed cellXfs element".to_string()))?;
        let open_tag_end = xml[range.start..]
            .find('>')
            .map(|pos| range.start + pos)
            .unwrap_or(range.start);
        let count_span = attr_value_span(xml, range.start, open_tag_end, "count");

        Ok(Self {
            xml: xml.to_string(),
            xf_tag,
            existing,
            added: Vec::new(),
            derived: HashMap::new(),
            count_span,
            insert_at,
        })
    }

    /// Format index equal to `base` except for the `"0"` number format
    pub fn integer_style(&mut self, base: u32) -> u32 {
        let base = if (base as usize) < self.existing.len() { base } else { 0 };
        if let Some(idx) = self.derived.get(&base) {
            return *idx;
        }

        let record = &self.existing[base as usize];
        let idx = if record.num_fmt_id() == Some(INTEGER_NUM_FMT_ID) {
            base
        } else {
            let twin = record.with_integer_format();
            let twin_key = twin.key();
            let found = self
                .existing
                .iter()
                .chain(self.added.iter())
                .position(|r| r.key() == twin_key);
            match found {
                Some(pos) => pos as u32,
                None => {
                    let idx = (self.existing.len() + self.added.len()) as u32;
                    self.added.push(twin);
                    idx
                }
            }
        };

        self.derived.insert(base, idx);
        idx
    }

    /// Number of records after any additions
    pub fn len(&self) -> usize {
        self.existing.len() + self.added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number format id of a record, if it names one
    pub fn num_fmt_id(&self, index: u32) -> Option<u32> {
        self.existing
            .iter()
            .chain(self.added.iter())
            .nth(index as usize)
            .and_then(XfRecord::num_fmt_id)
    }

    /// Updated stylesheet, or `None` when no record was added
    pub fn render(&self) -> Option<String> {
        if self.added.is_empty() {
            return None;
        }

        let mut out = String::with_capacity(self.xml.len() + self.added.len() * 96);
        let mut cursor = 0;
        if let Some((start, end)) = self.count_span {
            out.push_str(&self.xml[..start]);
            out.push_str(&self.len().to_string());
            cursor = end;
        }
        out.push_str(&self.xml[cursor..self.insert_at]);
        for record in &self.added {
            out.push_str(&record.render(&self.xf_tag));
        }
        out.push_str(&self.xml[self.insert_at..]);
        Some(out)
    }
}

/// Element name (with prefix) at the start of `tag`, e.g. `x:xf` for `<x:xf ...>`
fn qualified_name(tag: &str) -> String {
    tag.trim_start_matches('<')
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '/' && *c != '>')
        .collect()
}

/// Byte span of an attribute value inside the open tag `xml[start..end]`
fn attr_value_span(xml: &str, start: usize, end: usize, name: &str) -> Option<(usize, usize)> {
    let tag = &xml[start..end];
    let bytes = tag.as_bytes();
    let mut from = 0;

    while let Some(pos) = tag[from..].find(name) {
        let at = from + pos;
        from = at + name.len();
        if at == 0 || !bytes[at - 1].is_ascii_whitespace() {
            continue;
        }

        let mut i = at + name.len();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let quote = *bytes.get(i)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let value_start = i + 1;
        let value_len = tag[value_start..].find(char::from(quote))?;
        return Some((start + value_start, start + value_start + value_len));
    }
    None
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
