//! Command-line interface for trendpulse.
//!
//! Provides commands for analysis passes, stage workers, queue depth and
//! dead letter inspection.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
