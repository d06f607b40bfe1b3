//! Trim command: cut a log down to a time window.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lk_core::log_file::write_path;

use crate::Config;
use crate::commands::util::{format_span, load_log, parse_datetime};

#[derive(Debug, Args)]
pub struct TrimArgs {
    /// Log file to trim.
    pub file: PathBuf,

    /// Drop data before this time.
    #[arg(long)]
    pub before: Option<String>,

    /// Drop data after this time.
    #[arg(long)]
    pub after: Option<String>,

    /// Where to write the trimmed log.
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn run<W: Write>(writer: &mut W, args: &TrimArgs, _config: &Config) -> Result<()> {
    if args.before.is_none() && args.after.is_none() {
        anyhow::bail!("Nothing to trim. Pass --before and/or --after");
    }
    let before = args.before.as_deref().map(parse_datetime).transpose()?;
    let after = args.after.as_deref().map(parse_datetime).transpose()?;
    if let (Some(start), Some(end)) = (before, after) {
        anyhow::ensure!(start <= end, "--before {start} is later than --after {end}");
    }

    let mut log = load_log(&args.file)?;
    let untrimmed = log.span();
    if let Some(cutoff) = before {
        log = log.trim_before(cutoff);
    }
    if let Some(cutoff) = after {
        log = log.trim_after(cutoff);
    }

    write_path(&args.output, &log)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    writeln!(writer, "Trimmed device {} log", log.device())?;
    writeln!(writer, "  From: {}", format_span(untrimmed.as_ref()))?;
    writeln!(writer, "  To:   {}", format_span(log.span().as_ref()))?;
    writeln!(writer, "Wrote {}", args.output.display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use lk_core::log_file::read_path;

    const LOG: &str = "\
2024-07-02 12:00:00,0,7,1,1,3.9
2024-07-02 12:00:10,10000,7,0,1,3.9
2024-07-02 12:00:12,12000,7,1,1,3.9
2024-07-02 12:01:00,60000,7,1,1,3.9
2024-07-02 12:02:00,120000,7,0,1,3.9
2024-07-02 12:02:05,125000,7,1,1,3.9
";

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sip7_070224_1.csv");
        std::fs::write(&path, LOG).unwrap();
        (temp, path)
    }

    #[test]
    fn trims_to_window_and_writes_file() {
        let (temp, input) = setup();
        let output = temp.path().join("trimmed.csv");
        let args = TrimArgs {
            file: input,
            before: Some("2024-07-02 12:00:11".to_string()),
            after: Some("2024-07-02 12:02:05".to_string()),
            output: output.clone(),
        };

        let mut out = Vec::new();
        run(&mut out, &args, &Config::default()).unwrap();
        let text = String::from_utf8(out)
            .unwrap()
            .replace(&output.display().to_string(), "[OUT]");
        assert_snapshot!(text, @r"
        Trimmed device 7 log
          From: 2024-07-02 12:00:00 to 2024-07-02 12:02:05
          To:   2024-07-02 12:00:12 to 2024-07-02 12:02:05
        Wrote [OUT]
        ");

        // The first bout straddles the cut; only the second survives.
        let trimmed = read_path(&output).unwrap();
        assert_eq!(trimmed.left().durations(lk_core::EventKind::Bout), vec![5_000]);
    }

    #[test]
    fn requires_a_cutoff() {
        let (temp, input) = setup();
        let args = TrimArgs {
            file: input,
            before: None,
            after: None,
            output: temp.path().join("out.csv"),
        };
        let err = run(&mut Vec::new(), &args, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("Nothing to trim"));
    }

    #[test]
    fn rejects_inverted_window() {
        let (temp, input) = setup();
        let args = TrimArgs {
            file: input,
            before: Some("2024-07-02 13:00".to_string()),
            after: Some("2024-07-02 12:00".to_string()),
            output: temp.path().join("out.csv"),
        };
        let err = run(&mut Vec::new(), &args, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("is later than"));
    }
}
