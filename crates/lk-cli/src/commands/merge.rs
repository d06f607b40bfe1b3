//! Merge command: combine a device's session logs into one file.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lk_core::DeviceLog;
use lk_core::log_file::write_path;

use crate::Config;
use crate::commands::util::{format_span, load_logs};
use crate::config::Collaborators;

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Log files from a single device, in any order.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Where to write the merged log.
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn run<W: Write>(writer: &mut W, args: &MergeArgs, config: &Config) -> Result<()> {
    let logs = load_logs(&args.files, &Collaborators::default())?;
    let count = logs.len();
    let merged =
        DeviceLog::merge_all(logs, &config.merge_config()).context("failed to merge logs")?;

    write_path(&args.output, &merged)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    writeln!(
        writer,
        "Merged {count} logs for device {} into {}",
        merged.device(),
        args.output.display()
    )?;
    writeln!(writer, "Span: {}", format_span(merged.span().as_ref()))?;
    Ok(())
}
