//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::batch::BatchArgs;
use crate::commands::merge::MergeArgs;
use crate::commands::process::ProcessArgs;
use crate::commands::stats::StatsArgs;
use crate::commands::trim::TrimArgs;

/// Lickometer log analysis.
///
/// Reconstructs drinking bouts from two-channel beam-break logs, merges
/// recording sessions, and apportions measured fluid volume across bouts.
#[derive(Debug, Parser)]
#[command(name = "lick", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge, trim and annotate logs with volume and light/dark data.
    Process(ProcessArgs),

    /// Merge logs from one device into a single file.
    Merge(MergeArgs),

    /// Trim a log to a time window.
    Trim(TrimArgs),

    /// Show bout and interbout statistics per device.
    Stats(StatsArgs),

    /// Merge every session file in a directory, per device.
    Batch(BatchArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_process_with_trim_window() {
        let cli = Cli::try_parse_from([
            "lick",
            "process",
            "a.csv",
            "b.csv",
            "--trim-before",
            "2024-07-02 12:00",
            "--json",
        ])
        .unwrap();
        let Some(Commands::Process(args)) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.trim_before.as_deref(), Some("2024-07-02 12:00"));
        assert!(args.trim_after.is_none());
        assert!(args.json);
    }

    #[test]
    fn merge_requires_output() {
        assert!(Cli::try_parse_from(["lick", "merge", "a.csv"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["lick", "stats", "a.csv", "-v", "--config", "x.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
