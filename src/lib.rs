//! CIT Exporter - CIT declaration XML to Excel ledger
//!
//! This library extracts the period and the `R01`..`R32` values of CIT
//! declarations exported from the EDS system and places them into one
//! monthly column of an existing Excel ledger, leaving the rest of the
//! workbook intact.
//!
//! # Features
//!
//! - Declaration search at any depth (`Declaration[@Id="DEC"]` → `DokUIENv5`)
//! - In-place .xlsx patching (only the target cells, header row and styles change)
//! - Integer display format on the written column
//! - Ledger read-back and clean template creation
//!
//! # Example
//!
//! ```no_run
//! use cit_exporter::excel::{column_for_period, write_declaration};
//! use cit_exporter::parser::extract_declaration;
//! use std::path::Path;
//!
//! if let Some(decl) = extract_declaration(Path::new("declaration.xml"))? {
//!     let column = column_for_period(&decl.period)?;
//!     write_declaration(Path::new("ExcelResult/OutputExcel.xlsx"), &decl.fields, column)?;
//! }
//! # Ok::<(), cit_exporter::error::ExporterError>(())
//! ```

pub mod cli;
pub mod error;
pub mod excel;
pub mod parser;
pub mod types;

// Re-export commonly used types
pub use error::{ExporterError, ExporterResult};
pub use types::{Declaration, FieldMap, FieldTag, LedgerRow};
