//! Command-line interface for circuit-forge.
//!
//! Provides commands for dataset generation, autorouting and seed fixture
//! export.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
