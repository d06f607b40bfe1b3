//! Stats command: bout and interbout statistics per device.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use lk_core::{Channel, DeviceSummary, StatSummary};

use crate::Config;
use crate::commands::util::{format_span, format_stat, group_by_device, load_logs, merge_per_device};
use crate::config::Collaborators;

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Log files; logs from the same device are merged first.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &StatsArgs, config: &Config) -> Result<()> {
    let logs = load_logs(&args.files, &Collaborators::default())?;
    let merged = merge_per_device(group_by_device(logs), &config.merge_config())?;
    let summaries: Vec<DeviceSummary> = merged.iter().map(DeviceSummary::from_log).collect();

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&summaries)?)?;
    } else {
        write_summaries(writer, &summaries)?;
    }
    Ok(())
}

/// Writes summaries as a table, durations in seconds.
pub fn write_summaries<W: Write>(writer: &mut W, summaries: &[DeviceSummary]) -> Result<()> {
    for (idx, summary) in summaries.iter().enumerate() {
        if idx > 0 {
            writeln!(writer)?;
        }
        writeln!(writer, "DEVICE {}", summary.device)?;
        writeln!(writer, "Span: {}", format_span(summary.span.as_ref()))?;
        writeln!(
            writer,
            "  {:<16}  {:>5}  {:>8}  {:>7}  {:>7}  {:>7}  {:>7}",
            "", "count", "total s", "mean s", "median", "min", "max"
        )?;
        for channel in Channel::BOTH {
            let stats = summary.channel(channel);
            write_row(writer, &format!("{channel} bouts"), &stats.bouts)?;
            write_row(writer, &format!("{channel} interbouts"), &stats.interbouts)?;
        }
    }
    Ok(())
}

fn write_row<W: Write>(writer: &mut W, label: &str, stats: &StatSummary) -> Result<()> {
    writeln!(
        writer,
        "  {:<16}  {:>5}  {:>8}  {:>7}  {:>7}  {:>7}  {:>7}",
        label,
        stats.count,
        format_stat(Some(stats.sum)),
        format_stat(stats.mean),
        format_stat(stats.median),
        format_stat(stats.minimum),
        format_stat(stats.maximum)
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn stats_table_per_device() {
        let temp = tempfile::tempdir().unwrap();
        let a = write(
            &temp,
            "sip2_070224_1.csv",
            "\
2024-07-02 12:00:00,0,2,1,1,3.9
2024-07-02 12:00:01,1000,2,0,1,3.9
2024-07-02 12:00:03,3000,2,1,1,3.9
2024-07-02 12:00:10,10000,2,0,1,3.9
2024-07-02 12:00:14,14000,2,1,1,3.9
",
        );
        let b = write(
            &temp,
            "sip5_070224_1.csv",
            "2024-07-02 12:00:00,0,5,1,1,3.9\n2024-07-02 12:00:30,30000,5,1,1,3.9\n",
        );
        let args = StatsArgs {
            files: vec![b, a],
            json: false,
        };
        let mut out = Vec::new();
        run(&mut out, &args, &Config::default()).unwrap();

        assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        DEVICE 2
        Span: 2024-07-02 12:00:00 to 2024-07-02 12:00:14
                            count   total s   mean s   median      min      max
          left bouts            2       6.0      3.0      3.0      2.0      4.0
          left interbouts       2       8.0      4.0      4.0      1.0      7.0
          right bouts           0       0.0        -        -        -        -
          right interbouts      0       0.0        -        -        -        -

        DEVICE 5
        Span: 2024-07-02 12:00:00 to 2024-07-02 12:00:00
                            count   total s   mean s   median      min      max
          left bouts            0       0.0        -        -        -        -
          left interbouts       0       0.0        -        -        -        -
          right bouts           0       0.0        -        -        -        -
          right interbouts      0       0.0        -        -        -        -
        ");
    }

    #[test]
    fn stats_json_lists_devices() {
        let temp = tempfile::tempdir().unwrap();
        let a = write(
            &temp,
            "a.csv",
            "2024-07-02 12:00:00,0,2,1,1,3.9\n2024-07-02 12:00:01,1000,2,1,0,3.9\n2024-07-02 12:00:02,2000,2,1,1,3.9\n",
        );
        let args = StatsArgs {
            files: vec![a],
            json: true,
        };
        let mut out = Vec::new();
        run(&mut out, &args, &Config::default()).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["device"], 2);
        assert_eq!(json[0]["source"], "a.csv");
        assert_eq!(json[0]["right"]["bouts"]["count"], 1);
        assert_eq!(json[0]["right"]["bouts"]["sum"], 1000.0);
    }
}
