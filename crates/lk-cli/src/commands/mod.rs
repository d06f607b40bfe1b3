//! CLI subcommand implementations.

pub mod batch;
pub mod merge;
pub mod process;
pub mod stats;
pub mod trim;
pub mod util;
