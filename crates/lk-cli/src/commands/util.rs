//! Shared utilities for CLI commands.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use lk_core::log_file::{self, parse_timestamp};
use lk_core::{DeviceId, DeviceLog, LogSpan, MergeConfig};

use crate::config::Collaborators;

/// Accepted datetime formats, tried in order after the log file formats.
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%m/%d/%Y %H:%M:%S"];

/// Parse a naive local datetime.
///
/// Supports:
/// - Log formats: "2024-07-02 14:00:00", "7/2/2024 14:00"
/// - ISO 8601 without offset: "2024-07-02T14:00:00"
/// - Minute precision: "2024-07-02 14:00"
/// - Date only, meaning midnight: "2024-07-02"
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Some(dt) = parse_timestamp(s) {
        return Ok(dt);
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    anyhow::bail!("Invalid datetime: {s}. Use e.g. '2024-07-02 14:00:00' or '7/2/2024 14:00'")
}

/// Parse a time of day as `HH:MM` or `HH:MM:SS`. `24:00` is midnight.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    if matches!(s, "24:00" | "24:00:00") {
        return Ok(NaiveTime::MIN);
    }
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .with_context(|| format!("Invalid time of day: {s}. Use HH:MM or HH:MM:SS"))
}

/// Reads a device log file.
pub fn load_log(path: &Path) -> Result<DeviceLog> {
    log_file::read_path(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Reads log files and attaches the shared collaborators to each.
pub fn load_logs(paths: &[impl AsRef<Path>], collaborators: &Collaborators) -> Result<Vec<DeviceLog>> {
    paths
        .iter()
        .map(|path| load_log(path.as_ref()).map(|log| collaborators.attach(log)))
        .collect()
}

/// Groups logs by device, preserving input order within each group.
pub fn group_by_device(logs: Vec<DeviceLog>) -> BTreeMap<DeviceId, Vec<DeviceLog>> {
    let mut groups: BTreeMap<DeviceId, Vec<DeviceLog>> = BTreeMap::new();
    for log in logs {
        groups.entry(log.device()).or_default().push(log);
    }
    groups
}

/// Merges each device's logs into one.
pub fn merge_per_device(
    groups: BTreeMap<DeviceId, Vec<DeviceLog>>,
    config: &MergeConfig,
) -> Result<Vec<DeviceLog>> {
    groups
        .into_iter()
        .map(|(device, logs)| {
            let count = logs.len();
            let merged = DeviceLog::merge_all(logs, config)
                .with_context(|| format!("failed to merge logs for device {device}"))?;
            tracing::debug!(%device, count, "merged device logs");
            Ok(merged)
        })
        .collect()
}

/// Formats milliseconds as seconds with millisecond precision.
#[expect(clippy::cast_precision_loss, reason = "display only")]
pub fn format_seconds(ms: i64) -> String {
    format!("{:.3}s", ms as f64 / 1000.0)
}

/// Formats an optional statistic, or `-` when absent.
pub fn format_stat(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v / 1000.0))
}

/// Formats a log span, or a placeholder for an empty log.
pub fn format_span(span: Option<&LogSpan>) -> String {
    span.map_or_else(|| "(no data)".to_string(), ToString::to_string)
}
