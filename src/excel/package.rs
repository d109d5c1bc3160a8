//! In-memory .xlsx package
//!
//! Every ZIP entry is held as raw bytes in archive order, so parts that are
//! never touched are written back exactly as they were read.

use crate::error::{ExporterError, ExporterResult};
use roxmltree::Document;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const DEFAULT_STYLES_PART: &str = "xl/styles.xml";
const DEFAULT_CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// A worksheet of the workbook and the package part holding its XML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    pub part: String,
}

#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

pub struct XlsxPackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl XlsxPackage {
    /// Read every part of the workbook at `path` into memory
    pub fn open<P: AsRef<Path>>(path: P) -> ExporterResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> ExporterResult<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            parts.push((name, data));
        }

        Ok(Self { parts })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Replace a part, or append it when the package has no such part
    pub fn set_part(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        match self.parts.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = data,
            None => self.parts.push((name, data)),
        }
    }

    pub fn remove_part(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|(n, _)| n != name);
        self.parts.len() != before
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    /// Part content as UTF-8 text (a leading BOM is dropped)
    pub fn part_text(&self, name: &str) -> ExporterResult<&str> {
        let bytes = self
            .part(name)
            .ok_or_else(|| ExporterError::MissingPart(name.to_string()))?;
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ExporterError::Workbook(format!("{} is not valid UTF-8", name)))?;
        Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
    }

    /// Serialize the package into .xlsx bytes
    pub fn to_bytes(&self) -> ExporterResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, data) in &self.parts {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(data)?;
        }

        Ok(writer.finish()?.into_inner())
    }

    /// Write the package to `path`, replacing any existing file.
    ///
    /// The archive is assembled in memory first so a failure while building it
    /// leaves the file on disk untouched.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ExporterResult<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    /// Main workbook part, normally `xl/workbook.xml`
    pub fn workbook_part(&self) -> ExporterResult<String> {
        let target = self
            .relationships("")?
            .into_iter()
            .find(|rel| rel.rel_type.ends_with("/officeDocument"))
            .map(|rel| rel.target);
        Ok(target.unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string()))
    }

    /// All worksheets in tab order
    pub fn sheets(&self) -> ExporterResult<Vec<SheetInfo>> {
        let workbook_part = self.workbook_part()?;
        let rels = self.relationships(&workbook_part)?;
        let doc = Document::parse(self.part_text(&workbook_part)?)?;

        let mut sheets = Vec::new();
        for node in doc.descendants().filter(|n| n.has_tag_name("sheet")) {
            let name = node.attribute("name").unwrap_or_default().to_string();
            // r:id lives in the relationships namespace (transitional or strict)
            let rel_id = node
                .attributes()
                .find(|a| a.name() == "id" && a.namespace().is_some())
                .map(|a| a.value().to_string())
                .ok_or_else(|| {
                    ExporterError::Workbook(format!("sheet '{}' has no relationship id", name))
                })?;
            let part = rels
                .iter()
                .find(|rel| rel.id == rel_id)
                .map(|rel| rel.target.clone())
                .ok_or_else(|| {
                    ExporterError::Workbook(format!(
                        "relationship '{}' for sheet '{}' not found",
                        rel_id, name
                    ))
                })?;
            sheets.push(SheetInfo { name, part });
        }

        Ok(sheets)
    }

    /// The sheet selected when the workbook was last saved (`activeTab`),
    /// falling back to the first sheet
    pub fn active_sheet(&self) -> ExporterResult<SheetInfo> {
        let workbook_part = self.workbook_part()?;
        let doc = Document::parse(self.part_text(&workbook_part)?)?;
        let active_tab = doc
            .descendants()
            .find(|n| n.has_tag_name("workbookView"))
            .and_then(|n| n.attribute("activeTab"))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut sheets = self.sheets()?;
        if sheets.is_empty() {
            return Err(ExporterError::Workbook("workbook has no sheets".to_string()));
        }
        let idx = if active_tab < sheets.len() { active_tab } else { 0 };
        Ok(sheets.swap_remove(idx))
    }

    /// Stylesheet part, normally `xl/styles.xml`
    pub fn styles_part(&self) -> ExporterResult<String> {
        let workbook_part = self.workbook_part()?;
        let target = self
            .relationships(&workbook_part)?
            .into_iter()
            .find(|rel| rel.rel_type.ends_with("/styles"))
            .map(|rel| rel.target)
            .unwrap_or_else(|| DEFAULT_STYLES_PART.to_string());
        if self.part(&target).is_none() {
            return Err(ExporterError::MissingPart(target));
        }
        Ok(target)
    }

    /// Drop the calculation chain along with its content-type override and
    /// workbook relationship. Returns whether the package had one.
    pub fn remove_calc_chain(&mut self) -> ExporterResult<bool> {
        let workbook_part = self.workbook_part()?;
        let calc_part = self
            .relationships(&workbook_part)?
            .into_iter()
            .find(|rel| rel.rel_type.ends_with("/calcChain"))
            .map(|rel| rel.target)
            .unwrap_or_else(|| DEFAULT_CALC_CHAIN_PART.to_string());
        if !self.remove_part(&calc_part) {
            return Ok(false);
        }

        let rels_part = rels_part_for(&workbook_part);
        self.strip_elements(&rels_part, |n| {
            n.has_tag_name("Relationship")
                && n.attribute("Type").is_some_and(|t| t.ends_with("/calcChain"))
        })?;

        let part_name = format!("/{}", calc_part);
        self.strip_elements(CONTENT_TYPES_PART, |n| {
            n.has_tag_name("Override") && n.attribute("PartName") == Some(part_name.as_str())
        })?;

        Ok(true)
    }

    /// Cut every element matching `pred` out of an XML part, leaving the rest
    /// of the text as it was
    fn strip_elements<F>(&mut self, part: &str, pred: F) -> ExporterResult<()>
    where
        F: Fn(&roxmltree::Node<'_, '_>) -> bool,
    {
        if self.part(part).is_none() {
            return Ok(());
        }

        let updated = {
            let text = self.part_text(part)?;
            let doc = Document::parse(text)?;
            let ranges: Vec<_> = doc
                .descendants()
                .filter(|n| n.is_element() && pred(n))
                .map(|n| n.range())
                .collect();
            if ranges.is_empty() {
                return Ok(());
            }

            let mut out = String::with_capacity(text.len());
            let mut pos = 0;
            for range in ranges {
                if range.start < pos {
                    continue;
                }
                out.push_str(&text[pos..range.start]);
                pos = range.end;
            }
            out.push_str(&text[pos..]);
            out
        };

        self.set_part(part, updated.into_bytes());
        Ok(())
    }

    /// Relationships of `source_part` with targets resolved to part names.
    /// `""` addresses the package-level `_rels/.rels`.
    fn relationships(&self, source_part: &str) -> ExporterResult<Vec<Relationship>> {
        let rels_part = rels_part_for(source_part);
        if self.part(&rels_part).is_none() {
            return Ok(Vec::new());
        }
        let doc = Document::parse(self.part_text(&rels_part)?)?;

        Ok(doc
            .descendants()
            .filter(|n| n.has_tag_name("Relationship"))
            .filter(|n| n.attribute("TargetMode") != Some("External"))
            .map(|n| Relationship {
                id: n.attribute("Id").unwrap_or_default().to_string(),
                rel_type: n.attribute("Type").unwrap_or_default().to_string(),
                target: resolve_target(source_part, n.attribute("Target").unwrap_or_default()),
            })
            .collect())
    }
}

/// `xl/workbook.xml` → `xl/_rels/workbook.xml.rels`
fn rels_part_for(source_part: &str) -> String {
    match source_part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None if source_part.is_empty() => "_rels/.rels".to_string(),
        None => format!("_rels/{}.rels", source_part),
    }
}

/// Resolve a relationship target against the directory of its source part
fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}
