//! Process command: merge, trim and annotate a device's logs.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lk_core::{Annotation, Channel, DeviceLog, annotate};

use crate::Config;
use crate::commands::util::{format_seconds, format_span, load_logs, parse_datetime};

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Log files from a single device.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Drop data before this time.
    #[arg(long)]
    pub trim_before: Option<String>,

    /// Drop data after this time.
    #[arg(long)]
    pub trim_after: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &ProcessArgs, config: &Config) -> Result<()> {
    let trim_before = args.trim_before.as_deref().map(parse_datetime).transpose()?;
    let trim_after = args.trim_after.as_deref().map(parse_datetime).transpose()?;

    let collaborators = config
        .collaborators()
        .context("failed to build volume and light/dark data")?;
    let logs = load_logs(&args.files, &collaborators)?;
    let mut log = DeviceLog::merge_all(logs, &config.merge_config()).context("failed to merge logs")?;

    if let Some(cutoff) = trim_before {
        log = log.trim_before(cutoff);
    }
    if let Some(cutoff) = trim_after {
        log = log.trim_after(cutoff);
    }

    let annotation = annotate(&log)
        .with_context(|| format!("failed to annotate device {}", log.device()))?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&annotation)?)?;
    } else {
        write_annotation(writer, &log, &annotation)?;
    }
    Ok(())
}

fn write_annotation<W: Write>(writer: &mut W, log: &DeviceLog, annotation: &Annotation) -> Result<()> {
    writeln!(writer, "DEVICE {}", annotation.device)?;
    if let Some(source) = log.source() {
        writeln!(writer, "Source: {source}")?;
    }
    writeln!(writer, "Span:   {}", format_span(log.span().as_ref()))?;

    for channel in Channel::BOTH {
        let annotated = annotation.channel(channel);
        writeln!(writer)?;
        writeln!(
            writer,
            "{} ({} bouts, {} skipped, {:.3} ml)",
            channel.as_str().to_uppercase(),
            annotated.bouts.len(),
            annotated.skipped,
            annotated.total_volume()
        )?;
        if annotated.bouts.is_empty() {
            writeln!(writer, "  (no bouts)")?;
            continue;
        }
        writeln!(
            writer,
            "  {:<19}  {:>9}  {:<5}  {:>8}  {:>8}",
            "end", "duration", "phase", "step ml", "total ml"
        )?;
        for bout in &annotated.bouts {
            writeln!(
                writer,
                "  {:<19}  {:>9}  {:<5}  {:>8.3}  {:>8.3}",
                bout.end.format("%Y-%m-%d %H:%M:%S"),
                format_seconds(bout.duration_ms),
                bout.phase.as_str(),
                bout.step_volume,
                bout.cumulative_total_volume
            )?;
        }
    }
    Ok(())
}
