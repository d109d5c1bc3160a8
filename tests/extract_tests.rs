//! Declaration file extraction tests

use cit_exporter::error::ExporterError;
use cit_exporter::parser::extract_declaration;
use cit_exporter::types::{FieldTag, FIELD_COUNT};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

const EDS_EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DeclarationFile>
  <Declaration Id="DEC">
    <DokUIENv5>
      <TaksMenesis>7</TaksMenesis>
      <Tab1>
        <R01>100.5</R01>
        <R02>0</R02>
        <R10></R10>
      </Tab1>
      <R32>-15</R32>
    </DokUIENv5>
  </Declaration>
  <Declaration Id="ATT">
    <File>attachment.pdf</File>
  </Declaration>
</DeclarationFile>"#;

#[test]
fn test_extract_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("declaration.xml");
    fs::write(&path, EDS_EXPORT).unwrap();

    let decl = extract_declaration(&path).unwrap().unwrap();
    assert_eq!(decl.period, "7");

    let values: Vec<(String, Option<f64>)> = decl
        .fields
        .iter()
        .filter(|(_, v)| v.is_some())
        .map(|(tag, v)| (tag.name(), v))
        .collect();
    assert_eq!(
        values,
        vec![
            ("R01".to_string(), Some(100.5)),
            ("R02".to_string(), Some(0.0)),
            ("R32".to_string(), Some(-15.0)),
        ]
    );
    assert_eq!(decl.fields.iter().count(), FIELD_COUNT);
    assert_eq!(decl.fields.get(FieldTag::new(10).unwrap()), None);
}

#[test]
fn test_file_without_declaration_yields_none() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("other.xml");
    fs::write(&path, "<Invoice><Total>10</Total></Invoice>").unwrap();

    assert!(extract_declaration(&path).unwrap().is_none());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = extract_declaration(&dir.path().join("missing.xml"));
    assert!(matches!(result, Err(ExporterError::Io(_))));
}

#[test]
fn test_truncated_file_is_xml_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncated.xml");
    fs::write(&path, &EDS_EXPORT[..EDS_EXPORT.len() / 2]).unwrap();

    assert!(matches!(
        extract_declaration(&path),
        Err(ExporterError::Xml(_))
    ));
}

#[test]
fn test_fields_serialize_in_tag_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("declaration.xml");
    fs::write(&path, EDS_EXPORT).unwrap();

    let decl = extract_declaration(&path).unwrap().unwrap();
    let json = serde_json::to_value(&decl).unwrap();

    assert_eq!(json["period"], "7");
    assert_eq!(json["fields"]["R01"], 100.5);
    assert!(json["fields"]["R03"].is_null());

    let keys: Vec<&String> = json["fields"].as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), FIELD_COUNT);
}
