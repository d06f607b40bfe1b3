//! Device log ownership, trimming and merging.
//!
//! A [`DeviceLog`] is the reconstructed record of one recording session (or
//! several merged sessions) from a single device. Volume and light/dark data
//! are attached as shared collaborators; trimming and merging always return a
//! new log that shares the same `Arc`s.
//!
//! # Merging
//!
//! Each session restarts the device's millisecond counter, so the later log's
//! clock is shifted to continue from the earlier log's last tick plus the
//! wall-clock gap between them and a fixed pad. Bouts cut off at either side
//! of the seam are dropped because their durations are unknown.
//!
//! # Sessions
//!
//! A merged log remembers the shifted clock at which each later session
//! begins (its seams). Within a session both channels start `Open` at one
//! shared instant, which is the only shape the row format can express.
//! Trimming cuts each channel independently, so [`DeviceLog::synchronized`]
//! restarts every session at its first instant with both beams open before
//! the log is written out.

use std::fmt;
use std::iter;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use thiserror::Error;

use crate::channel::{ChannelTrace, RawSample, StateMark, reconstruct};
use crate::light_dark::LightDarkCycle;
use crate::types::{Channel, ChannelState, DeviceId};
use crate::volume::VolumeInterpolator;

/// Errors raised when combining device logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("cannot merge logs from different devices: {first} and {second}")]
    DeviceMismatch { first: DeviceId, second: DeviceId },

    #[error("device {device}: logs reference different volume data")]
    VolumeDataMismatch { device: DeviceId },

    #[error("device {device}: only one log has volume data attached")]
    VolumeDataMissing { device: DeviceId },

    #[error("device {device}: logs reference different light/dark schedules")]
    LightDarkMismatch { device: DeviceId },

    #[error("device {device}: only one log has a light/dark schedule attached")]
    LightDarkMissing { device: DeviceId },

    #[error("device {device}: log spans overlap ({first} and {second})")]
    OverlappingSpans {
        device: DeviceId,
        first: LogSpan,
        second: LogSpan,
    },

    #[error("no logs to merge")]
    NoLogs,
}

/// Configuration for merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConfig {
    /// Milliseconds added to the wall-clock gap when continuing the device
    /// clock across a seam.
    /// Default: 1000.
    pub clock_pad_ms: i64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            clock_pad_ms: 1_000,
        }
    }
}

/// Extent of a log in both wall-clock and device-clock terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogSpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub min_clock_ms: i64,
    pub max_clock_ms: i64,
}

impl LogSpan {
    /// Wall-clock duration of the span.
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    fn of<'a>(marks: impl Iterator<Item = &'a StateMark>) -> Option<Self> {
        marks.fold(None, |span: Option<Self>, m| {
            Some(span.map_or(
                Self {
                    start: m.timestamp,
                    end: m.timestamp,
                    min_clock_ms: m.clock_ms,
                    max_clock_ms: m.clock_ms,
                },
                |s| Self {
                    start: s.start.min(m.timestamp),
                    end: s.end.max(m.timestamp),
                    min_clock_ms: s.min_clock_ms.min(m.clock_ms),
                    max_clock_ms: s.max_clock_ms.max(m.clock_ms),
                },
            ))
        })
    }
}

impl fmt::Display for LogSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Reconstructed channel traces for one device.
#[derive(Debug, Clone)]
pub struct DeviceLog {
    device: DeviceId,
    source: Option<String>,
    left: ChannelTrace,
    right: ChannelTrace,
    /// Clock at which each later session begins, ascending.
    seams: Vec<i64>,
    volume: Option<Arc<VolumeInterpolator>>,
    light_dark: Option<Arc<LightDarkCycle>>,
}

impl DeviceLog {
    /// Creates a log from already reconstructed traces.
    pub const fn new(device: DeviceId, left: ChannelTrace, right: ChannelTrace) -> Self {
        Self {
            device,
            source: None,
            left,
            right,
            seams: Vec::new(),
            volume: None,
            light_dark: None,
        }
    }

    /// Reconstructs a log from raw device rows.
    pub fn from_samples(device: DeviceId, samples: &[RawSample]) -> Self {
        Self::from_sessions(device, [samples])
    }

    /// Reconstructs a log from consecutive sessions of raw rows.
    ///
    /// Each session synchronizes on its own; every session after the first
    /// that yields data starts a seam at its baseline clock.
    pub fn from_sessions<'a>(
        device: DeviceId,
        sessions: impl IntoIterator<Item = &'a [RawSample]>,
    ) -> Self {
        let logs = sessions.into_iter().map(|samples| {
            let reconstruction = reconstruct(samples);
            if !reconstruction.is_synchronized() {
                tracing::warn!(
                    %device,
                    samples = samples.len(),
                    "log never reads open on both channels; no usable data"
                );
            }
            Self::new(device, reconstruction.left, reconstruction.right)
        });
        Self::new(device, ChannelTrace::new(), ChannelTrace::new()).with_sessions(logs)
    }

    /// Labels the log with where it came from (typically a file name).
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_volume(mut self, volume: Arc<VolumeInterpolator>) -> Self {
        self.volume = Some(volume);
        self
    }

    #[must_use]
    pub fn with_light_dark(mut self, cycle: Arc<LightDarkCycle>) -> Self {
        self.light_dark = Some(cycle);
        self
    }

    pub const fn device(&self) -> DeviceId {
        self.device
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub const fn left(&self) -> &ChannelTrace {
        &self.left
    }

    pub const fn right(&self) -> &ChannelTrace {
        &self.right
    }

    pub const fn trace(&self, channel: Channel) -> &ChannelTrace {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }

    /// Clock values at which later sessions begin.
    pub fn seams(&self) -> &[i64] {
        &self.seams
    }

    pub const fn volume(&self) -> Option<&Arc<VolumeInterpolator>> {
        self.volume.as_ref()
    }

    pub const fn light_dark(&self) -> Option<&Arc<LightDarkCycle>> {
        self.light_dark.as_ref()
    }

    /// Whether neither channel has any marks.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Extent over every mark of both channels, `None` when empty.
    pub fn span(&self) -> Option<LogSpan> {
        LogSpan::of(self.left.marks().iter().chain(self.right.marks()))
    }

    /// Keeps marks at or after `cutoff`.
    ///
    /// A channel whose first retained mark is `Broken` loses it, since that
    /// bout started before the cut.
    #[must_use]
    pub fn trim_before(&self, cutoff: NaiveDateTime) -> Self {
        let mut trimmed = self.clone();
        trimmed.left.retain_from(cutoff);
        trimmed.right.retain_from(cutoff);
        trimmed.prune_seams();
        tracing::debug!(
            device = %self.device,
            %cutoff,
            left_removed = self.left.len() - trimmed.left.len(),
            right_removed = self.right.len() - trimmed.right.len(),
            "trimmed log start"
        );
        trimmed
    }

    /// Keeps marks at or before `cutoff`.
    ///
    /// A channel whose last retained mark is `Broken` loses it, since that
    /// bout ends after the cut.
    #[must_use]
    pub fn trim_after(&self, cutoff: NaiveDateTime) -> Self {
        let mut trimmed = self.clone();
        trimmed.left.retain_until(cutoff);
        trimmed.right.retain_until(cutoff);
        trimmed.prune_seams();
        tracing::debug!(
            device = %self.device,
            %cutoff,
            left_removed = self.left.len() - trimmed.left.len(),
            right_removed = self.right.len() - trimmed.right.len(),
            "trimmed log end"
        );
        trimmed
    }

    /// Keeps marks within `[start, end]`.
    #[must_use]
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.trim_before(start).trim_after(end)
    }

    /// Merges two logs of the same device into one continuous log.
    ///
    /// The logs may be given in either order; the one that starts later is
    /// appended to the other. An empty log contributes nothing.
    pub fn merge(a: &Self, b: &Self, config: &MergeConfig) -> Result<Self, MergeError> {
        if a.device != b.device {
            return Err(MergeError::DeviceMismatch {
                first: a.device,
                second: b.device,
            });
        }
        let device = a.device;

        match (&a.volume, &b.volume) {
            (Some(x), Some(y)) if !Arc::ptr_eq(x, y) => {
                return Err(MergeError::VolumeDataMismatch { device });
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(MergeError::VolumeDataMissing { device });
            }
            _ => {}
        }
        match (&a.light_dark, &b.light_dark) {
            (Some(x), Some(y)) if !Arc::ptr_eq(x, y) => {
                return Err(MergeError::LightDarkMismatch { device });
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(MergeError::LightDarkMissing { device });
            }
            _ => {}
        }

        let (span_a, span_b) = match (a.span(), b.span()) {
            (None, _) => return Ok(b.clone()),
            (_, None) => return Ok(a.clone()),
            (Some(x), Some(y)) => (x, y),
        };

        let (earlier, later, span_e, span_l) = if span_b.start >= span_a.end {
            (a, b, span_a, span_b)
        } else if span_a.start > span_b.end {
            (b, a, span_b, span_a)
        } else {
            return Err(MergeError::OverlappingSpans {
                device,
                first: span_a,
                second: span_b,
            });
        };

        let gap_ms = round_to_ms(span_l.start - span_e.end) + config.clock_pad_ms;
        // The later session has to begin strictly after the earlier one ends.
        let start_ms = (gap_ms + span_e.max_clock_ms).max(span_e.max_clock_ms + 1);
        let delta_ms = start_ms - span_l.min_clock_ms;

        let seams = earlier
            .seams
            .iter()
            .copied()
            .chain(iter::once(start_ms))
            .chain(later.seams.iter().map(|seam| seam + delta_ms))
            .collect();
        let mut merged = Self {
            device,
            source: join_sources(earlier.source(), later.source()),
            left: ChannelTrace::new(),
            right: ChannelTrace::new(),
            seams,
            volume: earlier.volume.clone(),
            light_dark: earlier.light_dark.clone(),
        };

        for channel in Channel::BOTH {
            let mut head = earlier.trace(channel).clone();
            let mut tail = later.trace(channel).clone();

            if let Some(mark) = head.drop_trailing_bout() {
                tracing::warn!(
                    %device,
                    %channel,
                    timestamp = %mark.timestamp,
                    "dropping bout left open at end of earlier log"
                );
            }
            if let Some(mark) = tail.drop_leading_bout() {
                tracing::warn!(
                    %device,
                    %channel,
                    timestamp = %mark.timestamp,
                    "dropping bout already in progress at start of later log"
                );
            }

            head.append_shifted(&tail, delta_ms);
            match channel {
                Channel::Left => merged.left = head,
                Channel::Right => merged.right = head,
            }
        }
        merged.prune_seams();

        tracing::debug!(
            %device,
            gap_ms,
            delta_ms,
            sessions = merged.seams.len() + 1,
            left_marks = merged.left.len(),
            right_marks = merged.right.len(),
            "merged logs"
        );
        Ok(merged)
    }

    /// Merges any number of logs of one device, in chronological order.
    pub fn merge_all(
        logs: impl IntoIterator<Item = Self>,
        config: &MergeConfig,
    ) -> Result<Self, MergeError> {
        let mut logs: Vec<Self> = logs.into_iter().collect();
        logs.sort_by_key(|log| log.span().map(|s| s.start));

        let mut iter = logs.into_iter();
        let first = iter.next().ok_or(MergeError::NoLogs)?;
        iter.try_fold(first, |acc, log| Self::merge(&acc, &log, config))
    }

    /// Splits the log at its seams, one log per recorded session.
    pub fn sessions(&self) -> Vec<Self> {
        let starts = iter::once(None).chain(self.seams.iter().copied().map(Some));
        let ends = self.seams.iter().copied().map(Some).chain(iter::once(None));
        starts
            .zip(ends)
            .map(|(lower, upper)| {
                let within = |m: &&StateMark| {
                    lower.is_none_or(|lo| m.clock_ms >= lo) && upper.is_none_or(|hi| m.clock_ms < hi)
                };
                let pick = |trace: &ChannelTrace| {
                    ChannelTrace::from_marks(trace.marks().iter().filter(within).copied().collect())
                };
                let mut session = self.emptied();
                session.left = pick(&self.left);
                session.right = pick(&self.right);
                session
            })
            .collect()
    }

    /// Restarts every session at its first instant with both beams open.
    ///
    /// Marks before that instant are dropped, and a session whose beams are
    /// never open together is dropped entirely. Reconstructed and merged
    /// logs are already in this form and come back unchanged.
    #[must_use]
    pub fn synchronized(&self) -> Self {
        let sessions = self.sessions().into_iter().filter_map(|session| {
            let start = session.span().map(|s| s.start);
            let restarted = session.resynchronized();
            if restarted.is_none() && start.is_some() {
                tracing::debug!(
                    device = %self.device,
                    ?start,
                    "dropping session that never synchronizes"
                );
            }
            restarted
        });
        self.emptied().with_sessions(sessions)
    }

    /// A copy with the same device, source and collaborators but no data.
    fn emptied(&self) -> Self {
        Self {
            device: self.device,
            source: self.source.clone(),
            left: ChannelTrace::new(),
            right: ChannelTrace::new(),
            seams: Vec::new(),
            volume: self.volume.clone(),
            light_dark: self.light_dark.clone(),
        }
    }

    /// Replaces the data with `sessions` laid end to end.
    ///
    /// A bout still open when a session ends is dropped, as in a merge.
    fn with_sessions(mut self, sessions: impl IntoIterator<Item = Self>) -> Self {
        self.left = ChannelTrace::new();
        self.right = ChannelTrace::new();
        self.seams.clear();
        for session in sessions {
            let Some(span) = session.span() else {
                continue;
            };
            if !self.is_empty() {
                for channel in Channel::BOTH {
                    let trace = match channel {
                        Channel::Left => &mut self.left,
                        Channel::Right => &mut self.right,
                    };
                    if let Some(mark) = trace.drop_trailing_bout() {
                        tracing::warn!(
                            device = %self.device,
                            %channel,
                            timestamp = %mark.timestamp,
                            "dropping bout left open at end of session"
                        );
                    }
                }
                self.seams.push(span.min_clock_ms);
            }
            self.left.append(session.left);
            self.right.append(session.right);
        }
        self
    }

    /// Restarts a single session with an `Open` baseline on both channels
    /// at the first clock where neither beam is broken.
    fn resynchronized(self) -> Option<Self> {
        let start = [&self.left, &self.right]
            .into_iter()
            .filter_map(|trace| trace.first().map(|m| m.clock_ms))
            .max()?;

        let mut candidates: Vec<StateMark> = self
            .left
            .marks()
            .iter()
            .chain(self.right.marks())
            .filter(|m| m.clock_ms >= start)
            .copied()
            .collect();
        candidates.sort_by_key(|m| m.clock_ms);

        let open = |trace: &ChannelTrace, clock_ms| {
            trace
                .state_at(clock_ms)
                .is_none_or(|state| state == ChannelState::Open)
        };
        let sync = candidates
            .into_iter()
            .find(|m| open(&self.left, m.clock_ms) && open(&self.right, m.clock_ms))?;

        let restart = |trace: ChannelTrace| {
            let baseline = StateMark {
                state: ChannelState::Open,
                ..sync
            };
            ChannelTrace::from_marks(
                iter::once(baseline)
                    .chain(trace.into_marks().into_iter().filter(|m| m.clock_ms > sync.clock_ms))
                    .collect(),
            )
        };
        Some(Self {
            left: restart(self.left),
            right: restart(self.right),
            ..self
        })
    }

    /// Drops seams that no longer have marks on both sides.
    fn prune_seams(&mut self) {
        match self.span() {
            Some(span) => self
                .seams
                .retain(|&seam| span.min_clock_ms < seam && seam <= span.max_clock_ms),
            None => self.seams.clear(),
        }
    }
}

/// Rounds a non-negative gap to the nearest millisecond.
fn round_to_ms(delta: TimeDelta) -> i64 {
    delta
        .num_microseconds()
        .map_or_else(|| delta.num_milliseconds(), |us| (us + 500).div_euclid(1_000))
}

fn join_sources(first: Option<&str>, second: Option<&str>) -> Option<String> {
    match (first, second) {
        (Some(a), Some(b)) => Some(format!("{a}+{b}")),
        (a, b) => a.or(b).map(str::to_string),
    }
}
