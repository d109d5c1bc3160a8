//! CLI command handlers

pub mod commands;

pub use commands::{import, import_file, init, instructions, show, FileOutcome, RunSummary};
