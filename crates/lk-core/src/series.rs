//! Derived per-channel series for plotting and reporting.
//!
//! Everything here is recomputed from a [`DeviceLog`] on demand.

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::Serialize;

use crate::channel::{ChannelTrace, EventKind};
use crate::device_log::{DeviceLog, LogSpan};
use crate::stats::StatSummary;
use crate::types::{Channel, DeviceId};

/// Running bout time at an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CumulativePoint {
    pub at: NaiveDateTime,
    pub total_ms: i64,
}

/// Bouts ending within one wall-clock minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MinuteCount {
    pub minute: NaiveDateTime,
    pub bouts: usize,
    pub total_ms: i64,
}

/// Consecutive-minute bout count on one tube, reset by the other tube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepetitionPoint {
    pub minute: NaiveDateTime,
    pub count: usize,
}

/// Plot-ready series for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSeries {
    pub channel: Channel,
    /// Bout durations, ascending.
    pub bout_durations: Vec<i64>,
    /// Interbout durations, ascending.
    pub interbout_durations: Vec<i64>,
    pub cumulative_bout_time: Vec<CumulativePoint>,
    pub bouts_per_minute: Vec<MinuteCount>,
    pub bout_repetitions: Vec<RepetitionPoint>,
}

/// Plot-ready series for both channels of a log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSeries {
    pub device: DeviceId,
    pub left: ChannelSeries,
    pub right: ChannelSeries,
}

impl DeviceSeries {
    pub fn from_log(log: &DeviceLog) -> Self {
        let span = log.span();
        let left_minutes = bouts_per_minute(log.left(), span);
        let right_minutes = bouts_per_minute(log.right(), span);

        let channel_series = |channel: Channel, own: &[MinuteCount], other: &[MinuteCount]| {
            let trace = log.trace(channel);
            ChannelSeries {
                channel,
                bout_durations: sorted_durations(trace, EventKind::Bout),
                interbout_durations: sorted_durations(trace, EventKind::Interbout),
                cumulative_bout_time: cumulative_bout_time(trace),
                bouts_per_minute: own.to_vec(),
                bout_repetitions: bout_repetitions(own, other),
            }
        };

        Self {
            device: log.device(),
            left: channel_series(Channel::Left, &left_minutes, &right_minutes),
            right: channel_series(Channel::Right, &right_minutes, &left_minutes),
        }
    }

    pub const fn channel(&self, channel: Channel) -> &ChannelSeries {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }
}

/// Statistics for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub channel: Channel,
    pub bouts: StatSummary,
    pub interbouts: StatSummary,
}

/// Statistics for both channels of a log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub device: DeviceId,
    pub source: Option<String>,
    pub span: Option<LogSpan>,
    pub left: ChannelSummary,
    pub right: ChannelSummary,
}

impl DeviceSummary {
    pub fn from_log(log: &DeviceLog) -> Self {
        let summarize = |channel: Channel| {
            let trace = log.trace(channel);
            ChannelSummary {
                channel,
                bouts: StatSummary::from_durations(&trace.durations(EventKind::Bout)),
                interbouts: StatSummary::from_durations(&trace.durations(EventKind::Interbout)),
            }
        };
        Self {
            device: log.device(),
            source: log.source().map(str::to_string),
            span: log.span(),
            left: summarize(Channel::Left),
            right: summarize(Channel::Right),
        }
    }

    pub const fn channel(&self, channel: Channel) -> &ChannelSummary {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }
}

/// Durations of one event kind, ascending.
pub fn sorted_durations(trace: &ChannelTrace, kind: EventKind) -> Vec<i64> {
    let mut durations = trace.durations(kind);
    durations.sort_unstable();
    durations
}

/// Running total of bout time, starting from zero at the first mark.
///
/// Interbouts repeat the current total so the series steps flat between bouts.
pub fn cumulative_bout_time(trace: &ChannelTrace) -> Vec<CumulativePoint> {
    let Some(first) = trace.first() else {
        return Vec::new();
    };

    let mut total_ms = 0;
    std::iter::once(CumulativePoint {
        at: first.timestamp,
        total_ms,
    })
    .chain(trace.events().map(|event| {
        if event.kind == EventKind::Bout {
            total_ms += event.duration_ms;
        }
        CumulativePoint {
            at: event.timestamp,
            total_ms,
        }
    }))
    .collect()
}

/// Bout counts per minute, with zero-filled minutes across `span`.
///
/// Bouts are binned by the minute their closing transition falls in.
pub fn bouts_per_minute(trace: &ChannelTrace, span: Option<LogSpan>) -> Vec<MinuteCount> {
    let Some(span) = span else {
        return Vec::new();
    };
    let start = truncate_to_minute(span.start);
    let end = truncate_to_minute(span.end);
    let minutes = usize::try_from((end - start).num_minutes()).unwrap_or(0) + 1;

    let mut counts: Vec<MinuteCount> = (0..minutes)
        .map(|i| MinuteCount {
            minute: start + TimeDelta::minutes(i64::try_from(i).unwrap_or(i64::MAX)),
            bouts: 0,
            total_ms: 0,
        })
        .collect();

    for event in trace.events().filter(|e| e.kind == EventKind::Bout) {
        let offset = (truncate_to_minute(event.timestamp) - start).num_minutes();
        if let Some(slot) = usize::try_from(offset).ok().and_then(|i| counts.get_mut(i)) {
            slot.bouts += 1;
            slot.total_ms += event.duration_ms;
        }
    }
    counts
}

/// Counts consecutive minutes with bouts on `own`, resetting to zero in any
/// minute with a bout on `other`. Both slices must share the same minute axis.
pub fn bout_repetitions(own: &[MinuteCount], other: &[MinuteCount]) -> Vec<RepetitionPoint> {
    let mut count = 0;
    own.iter()
        .zip(other)
        .map(|(mine, theirs)| {
            if theirs.bouts > 0 {
                count = 0;
            } else if mine.bouts > 0 {
                count += 1;
            }
            RepetitionPoint {
                minute: mine.minute,
                count,
            }
        })
        .collect()
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}
