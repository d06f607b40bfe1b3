//! Volume and phase annotation of completed bouts.
//!
//! Each completed bout is charged a share of the fluid consumed between the
//! two volume readings that bracket its end. Within one bracket the share is
//! proportional to bout duration, so the shares of a bracket always sum to
//! the volume measured across it.
//!
//! # Algorithm Summary
//!
//! 1. Resolve every completed bout against the volume readings and the
//!    light/dark schedule; bouts whose lookups fail are skipped
//! 2. Group resolved bouts by bracket to get each bracket's total bout time
//!    and the volume charged to all earlier brackets
//! 3. Fold over the resolved bouts, accumulating the running series

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::channel::CompletedBout;
use crate::device_log::DeviceLog;
use crate::light_dark::{LightDarkCycle, ScheduleError};
use crate::types::{Channel, DeviceId, Phase};
use crate::volume::{VolumeError, VolumeInterpolator};

/// Errors that prevent annotating a log at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnnotateError {
    #[error("device {device}: no volume data attached")]
    MissingVolume { device: DeviceId },

    #[error("device {device}: no light/dark schedule attached")]
    MissingLightDark { device: DeviceId },

    #[error("device {device}: invalid light/dark schedule")]
    InvalidSchedule {
        device: DeviceId,
        #[source]
        source: ScheduleError,
    },
}

/// Why a single bout could not be annotated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Phase(#[from] ScheduleError),
}

/// Receives bouts dropped from the annotation.
pub trait AnnotationObserver {
    fn bout_skipped(
        &mut self,
        device: DeviceId,
        channel: Channel,
        bout: &CompletedBout,
        reason: &SkipReason,
    );
}

/// Logs skipped bouts at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AnnotationObserver for TracingObserver {
    fn bout_skipped(
        &mut self,
        device: DeviceId,
        channel: Channel,
        bout: &CompletedBout,
        reason: &SkipReason,
    ) {
        tracing::warn!(
            %device,
            %channel,
            start = %bout.start,
            end = %bout.end,
            error = %reason,
            "skipping bout"
        );
    }
}

/// A completed bout with its volume share and phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoutRecord {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_ms: i64,

    pub phase: Phase,
    /// Increments each time the phase differs from the previous bout's.
    pub phase_index: usize,

    /// Bracket this bout was charged to.
    pub volume_index: usize,
    /// Volume consumed across the bracket.
    pub interval_volume: f64,
    /// Volume charged to all earlier brackets.
    pub volume_base: f64,

    /// Running bout time over the channel.
    pub delta_total_cdf: i64,
    /// Running bout time within the bracket.
    pub delta_cdf: i64,

    pub step_volume: f64,
    /// Running volume within the bracket.
    pub cumulative_volume: f64,
    /// Running volume over the channel.
    pub cumulative_total_volume: f64,

    /// Running volume over light-phase bouts, set on light-phase bouts.
    pub light_phase_total_volume_cdf: Option<f64>,
    /// Running volume over dark-phase bouts, set on dark-phase bouts.
    pub dark_phase_total_volume_cdf: Option<f64>,
}

/// Annotated bouts of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAnnotation {
    pub channel: Channel,
    pub bouts: Vec<BoutRecord>,
    /// Completed bouts left out because a lookup failed.
    pub skipped: usize,
}

impl ChannelAnnotation {
    /// Volume charged to every annotated bout.
    pub fn total_volume(&self) -> f64 {
        self.bouts.last().map_or(0.0, |b| b.cumulative_total_volume)
    }
}

/// Annotated bouts of both channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub device: DeviceId,
    pub left: ChannelAnnotation,
    pub right: ChannelAnnotation,
}

impl Annotation {
    pub const fn channel(&self, channel: Channel) -> &ChannelAnnotation {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }

    pub const fn total_skipped(&self) -> usize {
        self.left.skipped + self.right.skipped
    }
}

/// Annotates a log, logging skipped bouts.
pub fn annotate(log: &DeviceLog) -> Result<Annotation, AnnotateError> {
    annotate_with(log, &mut TracingObserver)
}

/// Annotates a log, reporting skipped bouts to `observer`.
pub fn annotate_with(
    log: &DeviceLog,
    observer: &mut dyn AnnotationObserver,
) -> Result<Annotation, AnnotateError> {
    let device = log.device();
    let volume = log
        .volume()
        .ok_or(AnnotateError::MissingVolume { device })?;
    let cycle = log
        .light_dark()
        .ok_or(AnnotateError::MissingLightDark { device })?;
    cycle
        .validate()
        .map_err(|source| AnnotateError::InvalidSchedule { device, source })?;

    let left = annotate_channel(log, Channel::Left, volume, cycle, observer);
    let right = annotate_channel(log, Channel::Right, volume, cycle, observer);
    Ok(Annotation {
        device,
        left,
        right,
    })
}

fn annotate_channel(
    log: &DeviceLog,
    channel: Channel,
    volume: &VolumeInterpolator,
    cycle: &LightDarkCycle,
    observer: &mut dyn AnnotationObserver,
) -> ChannelAnnotation {
    let (resolved, skipped) = resolve(log, channel, volume, cycle, observer);
    let bouts = allocate(&resolved);
    tracing::debug!(
        device = %log.device(),
        %channel,
        bouts = bouts.len(),
        skipped,
        "annotated channel"
    );
    ChannelAnnotation {
        channel,
        bouts,
        skipped,
    }
}

/// A bout whose volume bracket and phase were found.
#[derive(Debug, Clone, Copy)]
struct ResolvedBout {
    bout: CompletedBout,
    phase: Phase,
    phase_index: usize,
    volume_index: usize,
    budget: f64,
}

fn resolve(
    log: &DeviceLog,
    channel: Channel,
    volume: &VolumeInterpolator,
    cycle: &LightDarkCycle,
    observer: &mut dyn AnnotationObserver,
) -> (Vec<ResolvedBout>, usize) {
    let device = log.device();
    let mut resolved: Vec<ResolvedBout> = Vec::new();
    let mut skipped = 0;

    for bout in log.trace(channel).completed_bouts() {
        let lookup = volume
            .volume_at(bout.end, device)
            .and_then(|window| Ok((window.index, window.consumed(channel)?)))
            .map_err(SkipReason::from)
            .and_then(|(index, budget)| {
                let phase = cycle.phase_at_datetime(&bout.end)?;
                Ok((index, budget, phase))
            });

        let (volume_index, budget, phase) = match lookup {
            Ok(found) => found,
            Err(reason) => {
                observer.bout_skipped(device, channel, &bout, &reason);
                skipped += 1;
                continue;
            }
        };

        let phase_index = match resolved.last() {
            Some(prev) if prev.phase != phase => prev.phase_index + 1,
            Some(prev) => prev.phase_index,
            None => 0,
        };
        resolved.push(ResolvedBout {
            bout,
            phase,
            phase_index,
            volume_index,
            budget,
        });
    }

    (resolved, skipped)
}

/// Per-bracket totals from the grouping pass.
#[derive(Debug, Clone, Copy, Default)]
struct IntervalTotals {
    budget: f64,
    total_ms: i64,
    count: usize,
    base: f64,
}

/// Running sums carried from one bout to the next.
#[derive(Debug, Default)]
struct RunningTotals {
    delta_total_cdf: i64,
    /// Per bracket: summed duration and bout count so far.
    within: HashMap<usize, (i64, usize)>,
    light_cdf: f64,
    dark_cdf: f64,
}

#[expect(
    clippy::cast_precision_loss,
    reason = "durations and bout counts stay far below 2^52"
)]
fn allocate(resolved: &[ResolvedBout]) -> Vec<BoutRecord> {
    // Pass 1: group by bracket, in order of first appearance.
    let mut totals: HashMap<usize, IntervalTotals> = HashMap::new();
    let mut order: Vec<usize> = Vec::new();
    for r in resolved {
        let entry = totals.entry(r.volume_index).or_insert_with(|| {
            order.push(r.volume_index);
            IntervalTotals {
                budget: r.budget,
                ..IntervalTotals::default()
            }
        });
        entry.total_ms += r.bout.duration_ms();
        entry.count += 1;
    }
    let mut base = 0.0;
    for index in &order {
        if let Some(t) = totals.get_mut(index) {
            t.base = base;
            base += t.budget;
        }
    }

    // Pass 2: running sums in bout order.
    resolved
        .iter()
        .scan(RunningTotals::default(), |running, r| {
            let t = totals
                .get(&r.volume_index)
                .copied()
                .unwrap_or_default();
            let duration_ms = r.bout.duration_ms();
            running.delta_total_cdf += duration_ms;

            let seen = running.within.entry(r.volume_index).or_insert((0, 0));
            seen.0 += duration_ms;
            seen.1 += 1;
            let (delta_cdf, seen_count) = *seen;

            let (step_volume, cumulative_volume) = if t.total_ms > 0 {
                let per_ms = t.budget / t.total_ms as f64;
                (duration_ms as f64 * per_ms, delta_cdf as f64 * per_ms)
            } else {
                let share = t.budget / t.count as f64;
                (share, share * seen_count as f64)
            };

            let (light_phase_total_volume_cdf, dark_phase_total_volume_cdf) = match r.phase {
                Phase::Light => {
                    running.light_cdf += step_volume;
                    (Some(running.light_cdf), None)
                }
                Phase::Dark => {
                    running.dark_cdf += step_volume;
                    (None, Some(running.dark_cdf))
                }
            };

            Some(BoutRecord {
                start: r.bout.start,
                end: r.bout.end,
                duration_ms,
                phase: r.phase,
                phase_index: r.phase_index,
                volume_index: r.volume_index,
                interval_volume: t.budget,
                volume_base: t.base,
                delta_total_cdf: running.delta_total_cdf,
                delta_cdf,
                step_volume,
                cumulative_volume,
                cumulative_total_volume: cumulative_volume + t.base,
                light_phase_total_volume_cdf,
                dark_phase_total_volume_cdf,
            })
        })
        .collect()
}
