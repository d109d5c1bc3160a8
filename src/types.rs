use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

//==============================================================================
// Field Tags
//==============================================================================

/// Number of value fields (`R01`..`R32`) carried by a declaration
pub const FIELD_COUNT: usize = 32;

/// One of the 32 numbered value fields of a DokUIENv5 declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldTag(u8);

impl FieldTag {
    /// Tag for a 1-based field number (`1` → `R01`)
    pub fn new(number: u8) -> Option<Self> {
        (1..=FIELD_COUNT as u8)
            .contains(&number)
            .then_some(Self(number))
    }

    /// All tags in declaration order
    pub fn all() -> impl Iterator<Item = FieldTag> {
        (1..=FIELD_COUNT as u8).map(FieldTag)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// XML element name and ledger row label, e.g. `R07`
    pub fn name(self) -> String {
        format!("R{:02}", self.0)
    }

    /// 1-based worksheet row that holds this field (row 1 is the header)
    pub fn row(self) -> u32 {
        u32::from(self.0) + 1
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{:02}", self.0)
    }
}

//==============================================================================
// Field Map
//==============================================================================

/// Ordered values for `R01`..`R32`
///
/// Always holds exactly one entry per tag. A field that is missing from the
/// declaration, or present but empty, is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    values: [Option<f64>; FIELD_COUNT],
}

impl FieldMap {
    /// A map with every field unset
    pub fn new() -> Self {
        Self {
            values: [None; FIELD_COUNT],
        }
    }

    pub fn get(&self, tag: FieldTag) -> Option<f64> {
        self.values[usize::from(tag.number()) - 1]
    }

    pub fn set(&mut self, tag: FieldTag, value: Option<f64>) {
        self.values[usize::from(tag.number()) - 1] = value;
    }

    /// `(tag, value)` pairs in tag order
    pub fn iter(&self) -> impl Iterator<Item = (FieldTag, Option<f64>)> + '_ {
        FieldTag::all().zip(self.values.iter().copied())
    }

    /// Number of fields that carry a value
    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELD_COUNT))?;
        for (tag, value) in self.iter() {
            map.serialize_entry(&tag.name(), &value)?;
        }
        map.end()
    }
}

//==============================================================================
// Declaration
//==============================================================================

/// Data extracted from one declaration document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Declaration {
    /// `TaksMenesis` text as found in the document (trimmed)
    pub period: String,
    pub fields: FieldMap,
}

//==============================================================================
// Ledger
//==============================================================================

/// English month names used as ledger column headers (B..M)
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Header written to `A1`
pub const LABEL_HEADER: &str = "R Row";

/// Header written to row 1 of the target column before the month names
pub const DATA_HEADER: &str = "Data";

/// One `(label, value)` row read back from a ledger column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRow {
    pub label: String,
    pub value: Option<f64>,
}

/// Full English name for a 1-based month number
pub fn month_name(month: u32) -> Option<&'static str> {
    let idx = usize::try_from(month).ok()?.checked_sub(1)?;
    MONTH_NAMES.get(idx).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_tag_bounds() {
        assert!(FieldTag::new(0).is_none());
        assert!(FieldTag::new(33).is_none());
        assert_eq!(FieldTag::new(1).unwrap().name(), "R01");
        assert_eq!(FieldTag::new(32).unwrap().name(), "R32");
    }

    #[test]
    fn test_field_tag_rows_start_below_header() {
        assert_eq!(FieldTag::new(1).unwrap().row(), 2);
        assert_eq!(FieldTag::new(32).unwrap().row(), 33);
    }

    #[test]
    fn test_all_tags_in_order() {
        let names: Vec<String> = FieldTag::all().map(|t| t.to_string()).collect();
        assert_eq!(names.len(), FIELD_COUNT);
        assert_eq!(names.first().map(String::as_str), Some("R01"));
        assert_eq!(names.get(9).map(String::as_str), Some("R10"));
        assert_eq!(names.last().map(String::as_str), Some("R32"));
    }

    #[test]
    fn test_field_map_defaults_to_none() {
        let map = FieldMap::new();
        assert_eq!(map.iter().count(), FIELD_COUNT);
        assert!(map.iter().all(|(_, v)| v.is_none()));
        assert_eq!(map.present_count(), 0);
    }

    #[test]
    fn test_field_map_set_and_get() {
        let mut map = FieldMap::new();
        let r05 = FieldTag::new(5).unwrap();
        map.set(r05, Some(12.5));
        assert_eq!(map.get(r05), Some(12.5));
        assert_eq!(map.get(FieldTag::new(6).unwrap()), None);
        assert_eq!(map.present_count(), 1);
    }

    #[test]
    fn test_field_map_serializes_in_tag_order() {
        let mut map = FieldMap::new();
        map.set(FieldTag::new(1).unwrap(), Some(100.5));
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.starts_with(r#"{"R01":100.5,"R02":null"#));
        assert!(json.ends_with(r#""R32":null}"#));
    }

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
    }
}
