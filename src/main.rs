use clap::{Parser, Subcommand};
use cit_exporter::cli;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_WORKBOOK: &str = "ExcelResult/OutputExcel.xlsx";

#[derive(Parser)]
#[command(name = "cit-exporter")]
#[command(about = "Export CIT declaration XML files into a monthly Excel ledger.")]
#[command(long_about = "CIT Exporter - EDS declaration XML to Excel ledger

Reads the period (TaksMenesis) and the R01..R32 values of each CIT
declaration and writes them into the matching month column of an
existing workbook. Everything else in the workbook is left as it was.

COMMANDS:
  import        - Write declaration files into the ledger
  init          - Create a clean ledger workbook
  show          - Print the ledger column of one month
  instructions  - How to use the tool

EXAMPLES:
  cit-exporter init                              # Clean ledger at the default path
  cit-exporter import decl_01.xml decl_02.xml    # January and February
  cit-exporter show 7                            # Column H (July)

LOGGING:
  Diagnostics go to stderr. Set RUST_LOG (e.g. RUST_LOG=cit_exporter=debug).")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Write declaration XML files into the ledger workbook.

Each file is searched for Declaration[@Id=\"DEC\"] → DokUIENv5 → TaksMenesis.
The values R01..R32 go to rows 2..33 of column (TaksMenesis + 1):
period 1 → B, period 12 → M. The workbook must already exist.

Files without a DEC declaration or a period are skipped. A file whose
workbook write fails is reported and the run continues; the run then
exits with a non-zero status.

EXAMPLE:
  cit-exporter import exports/*.xml --workbook ledger.xlsx")]
    /// Write declaration XML files into the ledger
    Import {
        /// Declaration XML files, processed in order
        files: Vec<PathBuf>,

        /// Ledger workbook (.xlsx) to write into
        #[arg(short, long, env = "CIT_EXPORTER_WORKBOOK", default_value = DEFAULT_WORKBOOK)]
        workbook: PathBuf,

        /// Reject declarations whose period is not a month (1-12)
        #[arg(long)]
        strict_period: bool,

        /// Print the extracted fields and target columns
        #[arg(short, long)]
        verbose: bool,
    },

    /// Create a clean ledger workbook
    Init {
        /// Path of the workbook to create
        #[arg(short, long, env = "CIT_EXPORTER_WORKBOOK", default_value = DEFAULT_WORKBOOK)]
        workbook: PathBuf,

        /// Replace an existing workbook
        #[arg(long)]
        force: bool,
    },

    /// Print the ledger column of one period
    Show {
        /// TaksMenesis period (1 = January)
        period: String,

        /// Ledger workbook (.xlsx) to read
        #[arg(short, long, env = "CIT_EXPORTER_WORKBOOK", default_value = DEFAULT_WORKBOOK)]
        workbook: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show usage instructions
    Instructions,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "cit_exporter=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            files,
            workbook,
            strict_period,
            verbose,
        } => cli::import(files, workbook, strict_period, verbose)?,

        Commands::Init { workbook, force } => cli::init(workbook, force)?,

        Commands::Show {
            period,
            workbook,
            json,
        } => cli::show(period, workbook, json)?,

        Commands::Instructions => cli::instructions()?,
    }

    Ok(())
}
