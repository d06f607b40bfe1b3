//! Batch command: merge every session file in a directory, per device.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use clap::Args;
use lk_core::log_file::write_path;
use lk_core::{DeviceId, DeviceLog, DeviceSummary};
use regex::Regex;
use serde::Serialize;

use crate::Config;
use crate::commands::stats::write_summaries;
use crate::commands::util::load_log;

static SESSION_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^sip(\d+)_(\d{2})(\d{2})(\d{2})_(\d+)\.csv$").unwrap()
});

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Directory of `sip<device>_<MMDDYY>_<seq>.csv` files.
    pub dir: PathBuf,

    /// Where to write merged logs [default: <DIR>/merged].
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// A session file recognized by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub path: PathBuf,
    pub device: DeviceId,
    /// `YYYYMMDDSSSS`, so lexical order is recording order.
    pub sort_key: String,
}

impl SessionFile {
    /// Recognizes a session file name, or `None` for anything else.
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let caps = SESSION_FILE_RE.captures(name)?;
        let number = |i: usize| caps[i].parse::<u32>().ok();

        let device = DeviceId::new(number(1)?);
        let (month, day, year, seq) = (number(2)?, number(3)?, number(4)?, number(5)?);
        Some(Self {
            path: path.to_path_buf(),
            device,
            sort_key: format!("{:04}{month:02}{day:02}{seq:04}", 2000 + year),
        })
    }
}

#[derive(Debug, Serialize)]
struct BatchEntry {
    files: Vec<PathBuf>,
    output: PathBuf,
    summary: DeviceSummary,
}

pub fn run<W: Write>(writer: &mut W, args: &BatchArgs, config: &Config) -> Result<()> {
    let groups = discover(&args.dir)?;
    if groups.is_empty() {
        anyhow::bail!("No session files found in {}", args.dir.display());
    }

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| args.dir.join("merged"));
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let merge_config = config.merge_config();
    let mut entries = Vec::new();
    for (device, files) in groups {
        let logs = files
            .iter()
            .map(|file| load_log(&file.path))
            .collect::<Result<Vec<_>>>()?;
        let merged = DeviceLog::merge_all(logs, &merge_config)
            .with_context(|| format!("failed to merge logs for device {device}"))?;

        // Groups are never empty and are sorted by key.
        let first = files.first().map_or("", |f| f.sort_key.as_str());
        let last = files.last().map_or("", |f| f.sort_key.as_str());
        let output = output_dir.join(format!("SIP_{:03}_{first}-{last}.csv", device.value()));
        write_path(&output, &merged)
            .with_context(|| format!("failed to write {}", output.display()))?;
        tracing::debug!(%device, files = files.len(), output = %output.display(), "wrote merged log");

        entries.push(BatchEntry {
            files: files.into_iter().map(|f| f.path).collect(),
            output,
            summary: DeviceSummary::from_log(&merged),
        });
    }

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }

    for entry in &entries {
        writeln!(
            writer,
            "Device {}: merged {} files into {}",
            entry.summary.device,
            entry.files.len(),
            entry.output.display()
        )?;
    }
    writeln!(writer)?;
    let summaries: Vec<DeviceSummary> = entries.into_iter().map(|e| e.summary).collect();
    write_summaries(writer, &summaries)
}

/// Finds session files in `dir`, grouped by device and sorted by date and
/// sequence number.
///
/// Hidden files, files marked `truncated`, and names that don't match the
/// session pattern are skipped.
pub fn discover(dir: &Path) -> Result<BTreeMap<DeviceId, Vec<SessionFile>>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?;

    let mut groups: BTreeMap<DeviceId, Vec<SessionFile>> = BTreeMap::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || name.to_lowercase().contains("truncated") {
            tracing::debug!(file = name, "skipping file");
            continue;
        }
        let Some(file) = SessionFile::parse(&path) else {
            tracing::debug!(file = name, "skipping file with unrecognized name");
            continue;
        };
        groups.entry(file.device).or_default().push(file);
    }

    for files in groups.values_mut() {
        files.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
    }
    Ok(groups)
}
