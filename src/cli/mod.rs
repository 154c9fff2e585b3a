//! Command-line interface for archforge.
//!
//! Provides commands for running the diagram-to-infrastructure pipeline on
//! one diagram or a batch of diagrams.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
