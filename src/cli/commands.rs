use crate::error::{ExporterError, ExporterResult};
use crate::excel::{self, column_letter, create_ledger_template, write_declaration};
use crate::parser;
use crate::types::{month_name, LedgerRow};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

//==============================================================================
// Import
//==============================================================================

/// What happened to one input file
#[derive(Debug)]
pub enum FileOutcome {
    /// Fields placed into the workbook column
    Written { column: u32 },
    /// No DEC declaration with a period; nothing to place
    NoData,
    /// Declaration found but refused (e.g. period outside 1..=12 in strict mode)
    Rejected(String),
    /// Declaration found but the workbook could not be opened, patched or saved
    WriteFailed(ExporterError),
}

/// Per-run tally of file outcomes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    pub no_data: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Written { .. } => self.written += 1,
            FileOutcome::NoData => self.no_data += 1,
            FileOutcome::Rejected(_) => self.rejected += 1,
            FileOutcome::WriteFailed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.written + self.no_data + self.rejected + self.failed
    }

    /// Every file was either written or had nothing to write
    pub fn is_clean(&self) -> bool {
        self.rejected == 0 && self.failed == 0
    }
}

/// Extract one declaration file and place it into the workbook.
///
/// Malformed XML, non-numeric fields and unusable periods are returned as
/// errors; workbook failures are folded into [`FileOutcome::WriteFailed`].
pub fn import_file(
    file: &Path,
    workbook: &Path,
    strict_period: bool,
    verbose: bool,
) -> ExporterResult<FileOutcome> {
    let Some(declaration) = parser::extract_declaration(file)? else {
        return Ok(FileOutcome::NoData);
    };

    println!(
        "Data extracted from {} with TaksMenesis: {}",
        file.display(),
        declaration.period.bright_blue()
    );
    if verbose {
        println!("{}", serde_json::to_string_pretty(&declaration.fields)?);
    }

    // Strict mode turns any integer outside 1..=12 into a per-file rejection,
    // including periods that have no column at all
    if strict_period
        && excel::month_of_period(&declaration.period).is_none()
        && declaration.period.trim().parse::<i64>().is_ok()
    {
        return Ok(FileOutcome::Rejected(format!(
            "TaksMenesis {} is not a month (1-12)",
            declaration.period
        )));
    }
    let column = excel::column_for_period(&declaration.period)?;

    match write_declaration(workbook, &declaration.fields, column) {
        Ok(()) => Ok(FileOutcome::Written { column }),
        Err(e) => Ok(FileOutcome::WriteFailed(e)),
    }
}

/// Execute the import command
pub fn import(
    files: Vec<PathBuf>,
    workbook: PathBuf,
    strict_period: bool,
    verbose: bool,
) -> ExporterResult<()> {
    if files.is_empty() {
        println!("No files selected. Exiting.");
        return Ok(());
    }

    println!("{}", "📥 CIT Exporter - Import".bold().green());
    println!("   Workbook: {}", workbook.display());
    println!("   Files:    {}\n", files.len());

    let mut summary = RunSummary::default();
    for file in &files {
        let outcome = match import_file(file, &workbook, strict_period, verbose) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(file = %file.display(), error = %e, "aborting run");
                eprintln!("{} {}", "❌ Cannot process".bold().red(), file.display());
                return Err(e);
            }
        };

        match &outcome {
            FileOutcome::Written { column } => {
                info!(file = %file.display(), column = %column_letter(*column), "file imported");
                if verbose {
                    println!("   → column {}", column_letter(*column).bold());
                }
            }
            FileOutcome::NoData => {
                warn!(file = %file.display(), "no declaration data, skipped");
                if verbose {
                    println!("   {} {}", "Skipped (no data):".yellow(), file.display());
                }
            }
            FileOutcome::Rejected(reason) => {
                warn!(file = %file.display(), reason = %reason, "declaration rejected");
                println!("{} {}: {}", "⚠️  Rejected".yellow(), file.display(), reason);
            }
            FileOutcome::WriteFailed(e) => {
                error!(file = %file.display(), workbook = %workbook.display(), error = %e, "workbook write failed");
                println!("Error writing data to Excel: {}", e);
            }
        }
        summary.record(&outcome);
    }

    print_summary(&summary);

    if !summary.is_clean() {
        println!(
            "{}",
            "⚠️  Some files were not written to the workbook".bold().yellow()
        );
        return Err(ExporterError::Incomplete {
            failed: summary.rejected + summary.failed,
            total: summary.total(),
        });
    }

    println!(
        "{}",
        format!(
            "✅ Data from {} XML files has been successfully written to {}",
            files.len(),
            workbook.display()
        )
        .bold()
        .green()
    );
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "📊 Summary".bold());
    println!("   Written:           {}", summary.written.to_string().green());
    println!("   Skipped (no data): {}", summary.no_data);
    if summary.rejected > 0 {
        println!("   Rejected:          {}", summary.rejected.to_string().yellow());
    }
    if summary.failed > 0 {
        println!("   Failed:            {}", summary.failed.to_string().red());
    }
    println!();
}

//==============================================================================
// Init
//==============================================================================

/// Execute the init command
pub fn init(workbook: PathBuf, force: bool) -> ExporterResult<()> {
    if workbook.exists() && !force {
        return Err(ExporterError::Workbook(format!(
            "{} already exists (use --force to replace it)",
            workbook.display()
        )));
    }

    if let Some(parent) = workbook.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    create_ledger_template(&workbook)?;

    info!(workbook = %workbook.display(), "ledger template created");
    println!("{}", "✅ Clean ledger created".bold().green());
    println!("   Workbook: {}\n", workbook.display());
    Ok(())
}

//==============================================================================
// Show
//==============================================================================

#[derive(Serialize)]
struct ColumnReport<'a> {
    period: &'a str,
    column: String,
    header: Option<&'a str>,
    rows: &'a [LedgerRow],
}

/// Execute the show command
pub fn show(period: String, workbook: PathBuf, json: bool) -> ExporterResult<()> {
    let column = excel::column_for_period(&period)?;
    let headers = excel::read_headers(&workbook)?;
    let rows = excel::read_column(&workbook, column)?;
    let header = headers
        .get(column as usize - 1)
        .map(String::as_str)
        .filter(|h| !h.is_empty());

    if json {
        let report = ColumnReport {
            period: period.trim(),
            column: column_letter(column),
            header,
            rows: &rows,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("📒 TaksMenesis {} → column {}", period.trim(), column_letter(column)).bold()
    );
    if let Some(month) = excel::month_of_period(&period).and_then(month_name) {
        println!("   Month:  {}", month);
    }
    if let Some(header) = header {
        println!("   Header: {}", header.bright_blue());
    }
    println!();

    for row in &rows {
        let value = match row.value {
            Some(v) => format_number(v),
            None => "-".dimmed().to_string(),
        };
        println!("   {:<8} {}", row.label, value);
    }
    Ok(())
}

//==============================================================================
// Instructions
//==============================================================================

const INSTRUCTIONS: &str = "\
1. Run 'cit-exporter import FILE...' with CIT declaration XML files exported from the EDS system.
2. The data is written to the workbook (default ExcelResult/OutputExcel.xlsx; see --workbook).
3. Each file's data goes into its own column, chosen by the declaration month (TaksMenesis).
4. Start from a clean ledger workbook; 'cit-exporter init' creates one.
5. After each export, recreate the clean ledger ('cit-exporter init --force') before the next batch.
6. You are ready to go!";

/// Execute the instructions command
pub fn instructions() -> ExporterResult<()> {
    println!("{}", "📖 Instructions".bold().green());
    println!();
    println!("{}", INSTRUCTIONS);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(100.0), "100");
        assert_eq!(format_number(100.5), "100.5");
        assert_eq!(format_number(-3.25), "-3.25");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = RunSummary::default();
        summary.record(&FileOutcome::Written { column: 2 });
        summary.record(&FileOutcome::NoData);
        assert!(summary.is_clean());

        summary.record(&FileOutcome::Rejected("13".to_string()));
        summary.record(&FileOutcome::WriteFailed(ExporterError::MissingPart(
            "xl/workbook.xml".to_string(),
        )));
        assert_eq!(
            summary,
            RunSummary {
                written: 1,
                no_data: 1,
                rejected: 1,
                failed: 1
            }
        );
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_strict_period_rejects_periods_without_a_column() {
        let dir = tempfile::TempDir::new().unwrap();
        let workbook = dir.path().join("missing.xlsx");

        for period in ["-5", "99999"] {
            let file = dir.path().join(format!("period{}.xml", period));
            let xml = format!(
                r#"<Root><Declaration Id="DEC"><DokUIENv5><TaksMenesis>{}</TaksMenesis><R01>1</R01></DokUIENv5></Declaration></Root>"#,
                period
            );
            fs::write(&file, xml).unwrap();

            let outcome = import_file(&file, &workbook, true, false).unwrap();
            assert!(matches!(outcome, FileOutcome::Rejected(_)), "period {}", period);
            assert!(matches!(
                import_file(&file, &workbook, false, false),
                Err(ExporterError::ColumnOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_import_without_files_is_a_no_op() {
        assert!(import(Vec::new(), PathBuf::from("missing.xlsx"), false, false).is_ok());
    }
}
