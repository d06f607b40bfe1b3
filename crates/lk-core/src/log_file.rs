//! Row-oriented device log files.
//!
//! Each row is `timestamp, clock_ms, device, left_bit, right_bit, voltage`,
//! with bits `1` for an open beam and `0` for a broken one. The device
//! writes timestamps as `%m/%d/%Y %H:%M`; rewritten logs use
//! `%Y-%m-%d %H:%M:%S`. Both are accepted on read.
//!
//! A header row after data starts a new session: the device clock restarts
//! its synchronization there. Merged logs are written this way, one block per
//! session, so reading a written log recovers its seams.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::iter;
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::channel::RawSample;
use crate::device_log::DeviceLog;
use crate::types::{Channel, DeviceId};

/// Timestamp format used when writing.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Minute-resolution format written by the device itself.
pub const DEVICE_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M";

/// Header row written before the data.
pub const HEADER: &str =
    "YYYY-MM-DD hh:mm:ss,Milliseconds,Device,LeftState,RightState,BatteryVoltage";

/// Errors reading a device log file.
#[derive(Debug, Error)]
pub enum LogFileError {
    #[error("failed to read log: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: expected at least 5 columns, found {found}")]
    MissingColumns { line: usize, found: usize },

    #[error("line {line}: invalid timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },

    #[error("line {line}: invalid {column} {value:?}")]
    InvalidField {
        line: usize,
        column: &'static str,
        value: String,
    },

    #[error("line {line}: device {found} differs from device {expected} earlier in the file")]
    MixedDevices {
        line: usize,
        expected: DeviceId,
        found: DeviceId,
    },

    #[error("log contains no data rows")]
    NoRows,
}

/// Parsed rows of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub device: DeviceId,
    pub samples: Vec<RawSample>,
    /// Indices into `samples` where a header row started a new session.
    pub session_starts: Vec<usize>,
}

impl LogFile {
    /// Samples grouped by session, in file order.
    pub fn sessions(&self) -> Vec<&[RawSample]> {
        let bounds: Vec<usize> = iter::once(0)
            .chain(self.session_starts.iter().copied())
            .chain(iter::once(self.samples.len()))
            .collect();
        bounds
            .windows(2)
            .map(|pair| &self.samples[pair[0]..pair[1]])
            .collect()
    }

    /// Reconstructs the channel traces, one session at a time.
    pub fn into_log(self) -> DeviceLog {
        DeviceLog::from_sessions(self.device, self.sessions())
    }
}

/// Parses a device log.
pub fn read_samples<R: BufRead>(reader: R) -> Result<LogFile, LogFileError> {
    let mut device: Option<DeviceId> = None;
    let mut samples = Vec::new();
    let mut session_starts = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("YYYY") {
            if !samples.is_empty() && session_starts.last() != Some(&samples.len()) {
                session_starts.push(samples.len());
            }
            continue;
        }

        let (row_device, sample) = parse_row(trimmed, line_no)?;
        match device {
            None => device = Some(row_device),
            Some(expected) if expected != row_device => {
                return Err(LogFileError::MixedDevices {
                    line: line_no,
                    expected,
                    found: row_device,
                });
            }
            Some(_) => {}
        }
        samples.push(sample);
    }

    let device = device.ok_or(LogFileError::NoRows)?;
    tracing::debug!(
        %device,
        rows = samples.len(),
        sessions = session_starts.len() + 1,
        "read device log"
    );
    Ok(LogFile {
        device,
        samples,
        session_starts,
    })
}

/// Reads and reconstructs a log file, labelled with its file name.
pub fn read_path(path: &Path) -> Result<DeviceLog, LogFileError> {
    let file = File::open(path)?;
    let log = read_samples(BufReader::new(file))?.into_log();
    let label = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    Ok(log.with_source(label))
}

fn parse_row(row: &str, line: usize) -> Result<(DeviceId, RawSample), LogFileError> {
    let columns: Vec<&str> = row.split(',').map(str::trim).collect();
    if columns.len() < 5 {
        return Err(LogFileError::MissingColumns {
            line,
            found: columns.len(),
        });
    }

    let timestamp = parse_timestamp(columns[0]).ok_or_else(|| LogFileError::InvalidTimestamp {
        line,
        value: columns[0].to_string(),
    })?;
    let invalid = |column: &'static str, value: &str| LogFileError::InvalidField {
        line,
        column,
        value: value.to_string(),
    };

    let clock_ms = columns[1]
        .parse::<i64>()
        .map_err(|_| invalid("clock", columns[1]))?;
    let device = columns[2]
        .parse::<DeviceId>()
        .map_err(|_| invalid("device", columns[2]))?;
    let left_open = parse_bit(columns[3]).ok_or_else(|| invalid("left state", columns[3]))?;
    let right_open = parse_bit(columns[4]).ok_or_else(|| invalid("right state", columns[4]))?;

    Ok((
        device,
        RawSample {
            timestamp,
            clock_ms,
            left_open,
            right_open,
        },
    ))
}

/// Parses either supported timestamp format.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DEVICE_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT))
        .ok()
}

fn parse_bit(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Writes a log as rows, one per distinct transition clock.
///
/// The log is written in its [synchronized](DeviceLog::synchronized) form,
/// with a header row opening each session. A channel without a mark at a
/// given clock repeats its previous bit. Voltage is not tracked and is
/// written as `0.0`.
pub fn write_log<W: Write>(mut writer: W, log: &DeviceLog) -> io::Result<()> {
    let sessions = log.synchronized().sessions();
    let mut rows = 0_usize;
    for session in &sessions {
        writeln!(writer, "{HEADER}")?;
        rows += write_session(&mut writer, session)?;
    }

    tracing::debug!(device = %log.device(), rows, sessions = sessions.len(), "wrote device log");
    Ok(())
}

/// Writes the rows of one session, whose channels share an `Open` baseline.
fn write_session<W: Write>(writer: &mut W, log: &DeviceLog) -> io::Result<usize> {
    let mut marks: Vec<(Channel, _)> = Channel::BOTH
        .into_iter()
        .flat_map(|channel| log.trace(channel).marks().iter().map(move |m| (channel, *m)))
        .collect();
    marks.sort_by_key(|(_, m)| m.clock_ms);

    let mut bits = [1_u8, 1_u8];
    let mut rows = 0_usize;
    let mut iter = marks.iter().peekable();
    while let Some((channel, mark)) = iter.next() {
        bits[*channel as usize] = mark.state.open_bit();
        while let Some((next_channel, next)) = iter.next_if(|(_, n)| n.clock_ms == mark.clock_ms) {
            bits[*next_channel as usize] = next.state.open_bit();
        }
        writeln!(
            writer,
            "{},{},{},{},{},0.0",
            mark.timestamp.format(TIMESTAMP_FORMAT),
            mark.clock_ms,
            log.device(),
            bits[0],
            bits[1],
        )?;
        rows += 1;
    }
    Ok(rows)
}

/// Writes a log to `path`, replacing any existing file.
pub fn write_path(path: &Path, log: &DeviceLog) -> io::Result<()> {
    let mut writer = io::BufWriter::new(File::create(path)?);
    write_log(&mut writer, log)?;
    writer.flush()
}
