//! Beam-state reconstruction.
//!
//! A lickometer samples both beams at irregular ticks and reports whether
//! each is open. Reconstruction turns those samples into a per-channel
//! trace of state marks: an `Open` baseline followed by one mark for every
//! transition. Bout and interbout events are derived from consecutive marks
//! whose states differ.
//!
//! # Synchronization
//!
//! Samples are discarded until one reads `Open` on both channels. Before that
//! point the device may have powered up mid-lick, so neither channel has a
//! trustworthy starting state. A log that never synchronizes yields empty
//! traces rather than an error.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::{Channel, ChannelState};

/// One row from the device: both beam bits at a sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Wall-clock time assigned by the recorder.
    pub timestamp: NaiveDateTime,
    /// Device-local millisecond counter, non-decreasing within a session.
    pub clock_ms: i64,
    pub left_open: bool,
    pub right_open: bool,
}

impl RawSample {
    /// Beam bit for one channel.
    pub const fn is_open(&self, channel: Channel) -> bool {
        match channel {
            Channel::Left => self.left_open,
            Channel::Right => self.right_open,
        }
    }

    /// Whether neither tube is obstructed.
    pub const fn both_open(&self) -> bool {
        self.left_open && self.right_open
    }
}

/// A channel entering `state` at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMark {
    pub timestamp: NaiveDateTime,
    pub clock_ms: i64,
    pub state: ChannelState,
}

/// Whether an interval was spent drinking or idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Time spent `Broken`.
    Bout,
    /// Time spent `Open` between bouts.
    Interbout,
}

impl EventKind {
    /// The event emitted when leaving `state`.
    const fn leaving(state: ChannelState) -> Self {
        match state {
            ChannelState::Broken => Self::Bout,
            ChannelState::Open => Self::Interbout,
        }
    }
}

/// A closed interval, stamped at the transition that ended it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalEvent {
    pub timestamp: NaiveDateTime,
    pub clock_ms: i64,
    pub kind: EventKind,
    pub duration_ms: i64,
}

/// A `Broken → Open` pair of marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletedBout {
    pub start: NaiveDateTime,
    pub start_ms: i64,
    pub end: NaiveDateTime,
    pub end_ms: i64,
}

impl CompletedBout {
    pub const fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Ordered state marks for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChannelTrace {
    marks: Vec<StateMark>,
}

impl ChannelTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a trace from marks already in clock order.
    pub const fn from_marks(marks: Vec<StateMark>) -> Self {
        Self { marks }
    }

    pub fn marks(&self) -> &[StateMark] {
        &self.marks
    }

    pub fn into_marks(self) -> Vec<StateMark> {
        self.marks
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn first(&self) -> Option<&StateMark> {
        self.marks.first()
    }

    pub fn last(&self) -> Option<&StateMark> {
        self.marks.last()
    }

    /// Whether the trace ends mid-bout.
    pub fn has_trailing_bout(&self) -> bool {
        self.last().is_some_and(|m| m.state.is_broken())
    }

    /// Bout and interbout events in the order the transitions occurred.
    ///
    /// Consecutive marks in the same state (the seam of a merged log) are
    /// not an observed interval and produce no event.
    pub fn events(&self) -> impl Iterator<Item = IntervalEvent> + '_ {
        self.marks.windows(2).filter_map(|pair| {
            let (prev, next) = (pair[0], pair[1]);
            (prev.state != next.state).then(|| IntervalEvent {
                timestamp: next.timestamp,
                clock_ms: next.clock_ms,
                kind: EventKind::leaving(prev.state),
                duration_ms: next.clock_ms - prev.clock_ms,
            })
        })
    }

    /// Every bout closed by an observed `Broken → Open` transition.
    pub fn completed_bouts(&self) -> impl Iterator<Item = CompletedBout> + '_ {
        self.marks.windows(2).filter_map(|pair| {
            let (prev, next) = (pair[0], pair[1]);
            (prev.state == ChannelState::Broken && next.state == ChannelState::Open).then_some(
                CompletedBout {
                    start: prev.timestamp,
                    start_ms: prev.clock_ms,
                    end: next.timestamp,
                    end_ms: next.clock_ms,
                },
            )
        })
    }

    /// State in effect at `clock_ms`, or `None` before the first mark.
    pub fn state_at(&self, clock_ms: i64) -> Option<ChannelState> {
        self.marks
            .iter()
            .rev()
            .find(|m| m.clock_ms <= clock_ms)
            .map(|m| m.state)
    }

    /// Durations of one event kind, in trace order.
    pub fn durations(&self, kind: EventKind) -> Vec<i64> {
        self.events()
            .filter(|e| e.kind == kind)
            .map(|e| e.duration_ms)
            .collect()
    }

    /// Keeps marks at or after `cutoff`, then drops a leading `Broken` mark
    /// whose bout began before the cut.
    pub(crate) fn retain_from(&mut self, cutoff: NaiveDateTime) {
        self.marks.retain(|m| m.timestamp >= cutoff);
        self.drop_leading_bout();
    }

    /// Keeps marks at or before `cutoff`, then drops a trailing `Broken`
    /// mark whose bout ends after the cut.
    pub(crate) fn retain_until(&mut self, cutoff: NaiveDateTime) {
        self.marks.retain(|m| m.timestamp <= cutoff);
        self.drop_trailing_bout();
    }

    /// Removes the first mark if it opens a bout.
    pub(crate) fn drop_leading_bout(&mut self) -> Option<StateMark> {
        if self.first().is_some_and(|m| m.state.is_broken()) {
            Some(self.marks.remove(0))
        } else {
            None
        }
    }

    /// Removes the last mark if it opens a bout.
    pub(crate) fn drop_trailing_bout(&mut self) -> Option<StateMark> {
        if self.has_trailing_bout() {
            self.marks.pop()
        } else {
            None
        }
    }

    /// Appends the marks of a trace that starts after this one ends.
    pub(crate) fn append(&mut self, other: Self) {
        self.marks.extend(other.marks);
    }

    /// Appends `other`, moving its device clock forward by `delta_ms`.
    pub(crate) fn append_shifted(&mut self, other: &Self, delta_ms: i64) {
        self.marks.extend(other.marks.iter().map(|m| StateMark {
            clock_ms: m.clock_ms + delta_ms,
            ..*m
        }));
    }
}

/// Per-channel beam state machine.
///
/// Starts in the synchronized `Open` state and records a mark at every bit
/// change.
#[derive(Debug, Clone)]
pub struct ChannelReconstructor {
    state: ChannelState,
    last_transition_ms: i64,
    trace: ChannelTrace,
}

impl ChannelReconstructor {
    /// Starts a channel at the synchronization sample.
    pub fn synchronized_at(timestamp: NaiveDateTime, clock_ms: i64) -> Self {
        Self {
            state: ChannelState::Open,
            last_transition_ms: clock_ms,
            trace: ChannelTrace::from_marks(vec![StateMark {
                timestamp,
                clock_ms,
                state: ChannelState::Open,
            }]),
        }
    }

    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// Feeds one sample bit, returning the interval closed by a transition.
    pub fn observe(
        &mut self,
        timestamp: NaiveDateTime,
        clock_ms: i64,
        open: bool,
    ) -> Option<IntervalEvent> {
        let observed = ChannelState::from_open_bit(open);
        if observed == self.state {
            return None;
        }

        if clock_ms < self.last_transition_ms {
            tracing::warn!(
                %timestamp,
                clock_ms,
                last_transition_ms = self.last_transition_ms,
                "device clock moved backwards"
            );
        }

        let event = IntervalEvent {
            timestamp,
            clock_ms,
            kind: EventKind::leaving(self.state),
            duration_ms: clock_ms - self.last_transition_ms,
        };
        self.state = observed;
        self.last_transition_ms = clock_ms;
        self.trace.marks.push(StateMark {
            timestamp,
            clock_ms,
            state: observed,
        });
        Some(event)
    }

    pub fn finish(self) -> ChannelTrace {
        self.trace
    }
}

/// Output of [`reconstruct`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconstruction {
    pub left: ChannelTrace,
    pub right: ChannelTrace,
    /// Samples dropped while waiting for both beams to read open.
    pub discarded: usize,
}

impl Reconstruction {
    /// Whether a synchronization sample was found.
    pub fn is_synchronized(&self) -> bool {
        !self.left.is_empty()
    }

    pub const fn trace(&self, channel: Channel) -> &ChannelTrace {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }
}

/// Reconstructs both channel traces from ordered samples.
pub fn reconstruct(samples: &[RawSample]) -> Reconstruction {
    let Some(sync) = samples.iter().position(RawSample::both_open) else {
        tracing::debug!(
            samples = samples.len(),
            "no sample with both beams open; log has no usable data"
        );
        return Reconstruction {
            discarded: samples.len(),
            ..Reconstruction::default()
        };
    };

    let baseline = &samples[sync];
    let mut left = ChannelReconstructor::synchronized_at(baseline.timestamp, baseline.clock_ms);
    let mut right = ChannelReconstructor::synchronized_at(baseline.timestamp, baseline.clock_ms);

    for sample in &samples[sync + 1..] {
        left.observe(sample.timestamp, sample.clock_ms, sample.left_open);
        right.observe(sample.timestamp, sample.clock_ms, sample.right_open);
    }

    let result = Reconstruction {
        left: left.finish(),
        right: right.finish(),
        discarded: sync,
    };
    tracing::debug!(
        discarded = result.discarded,
        left_marks = result.left.len(),
        right_marks = result.right.len(),
        "reconstructed channel traces"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn ts(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 2)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn sample(ms: i64, left: u8, right: u8) -> RawSample {
        RawSample {
            timestamp: ts(ms / 1000),
            clock_ms: ms,
            left_open: left == 1,
            right_open: right == 1,
        }
    }

    #[test]
    fn discards_prefix_until_both_open() {
        let samples = [
            sample(0, 0, 1),
            sample(100, 1, 0),
            sample(200, 1, 1),
            sample(300, 0, 1),
        ];
        let r = reconstruct(&samples);
        assert!(r.is_synchronized());
        assert_eq!(r.discarded, 2);
        assert_eq!(r.left.first().unwrap().clock_ms, 200);
        assert_eq!(r.right.len(), 1);
        assert_eq!(r.left.len(), 2);
    }

    #[test]
    fn never_synchronized_is_empty_not_error() {
        let samples = [sample(0, 0, 1), sample(100, 1, 0)];
        let r = reconstruct(&samples);
        assert!(!r.is_synchronized());
        assert!(r.left.is_empty());
        assert!(r.right.is_empty());
        assert_eq!(r.discarded, 2);
    }

    #[test]
    fn transitions_emit_alternating_events() {
        let samples = [
            sample(1_000, 1, 1),
            sample(1_500, 1, 1),
            sample(2_000, 0, 1),
            sample(2_250, 0, 1),
            sample(2_400, 1, 1),
            sample(5_000, 0, 1),
            sample(5_100, 1, 1),
        ];
        let r = reconstruct(&samples);
        let events: Vec<_> = r.left.events().collect();
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        let durations: Vec<_> = events.iter().map(|e| e.duration_ms).collect();

        assert_eq!(
            kinds,
            vec![
                EventKind::Interbout,
                EventKind::Bout,
                EventKind::Interbout,
                EventKind::Bout
            ]
        );
        assert_eq!(durations, vec![1_000, 400, 2_600, 100]);
        assert_eq!(durations.iter().sum::<i64>(), 5_100 - 1_000);
        assert_eq!(r.left.durations(EventKind::Bout), vec![400, 100]);
        assert_eq!(r.right.events().count(), 0);
    }

    #[test]
    fn trailing_broken_is_kept_but_not_a_completed_bout() {
        let samples = [
            sample(0, 1, 1),
            sample(100, 0, 1),
            sample(300, 1, 1),
            sample(900, 0, 1),
        ];
        let r = reconstruct(&samples);
        assert!(r.left.has_trailing_bout());
        assert_eq!(r.left.len(), 4);

        let bouts: Vec<_> = r.left.completed_bouts().collect();
        assert_eq!(bouts.len(), 1);
        assert_eq!(bouts[0].start_ms, 100);
        assert_eq!(bouts[0].end_ms, 300);
        assert_eq!(bouts[0].duration_ms(), 200);
    }

    #[test]
    fn observe_reports_closed_interval() {
        let mut machine = ChannelReconstructor::synchronized_at(ts(0), 0);
        assert!(machine.observe(ts(1), 1_000, true).is_none());

        let event = machine.observe(ts(2), 2_000, false).unwrap();
        assert_eq!(event.kind, EventKind::Interbout);
        assert_eq!(event.duration_ms, 2_000);
        assert_eq!(machine.state(), ChannelState::Broken);

        let event = machine.observe(ts(2), 2_300, true).unwrap();
        assert_eq!(event.kind, EventKind::Bout);
        assert_eq!(event.duration_ms, 300);
        assert_eq!(machine.finish().len(), 3);
    }

    #[test]
    fn channels_are_independent() {
        let samples = [
            sample(0, 1, 1),
            sample(100, 0, 0),
            sample(200, 1, 0),
            sample(400, 1, 1),
        ];
        let r = reconstruct(&samples);
        assert_eq!(r.left.durations(EventKind::Bout), vec![100]);
        assert_eq!(r.right.durations(EventKind::Bout), vec![300]);
        assert_eq!(r.trace(Channel::Right).len(), 3);
    }

    #[test]
    fn seam_between_open_marks_emits_nothing() {
        let trace = ChannelTrace::from_marks(vec![
            StateMark {
                timestamp: ts(0),
                clock_ms: 0,
                state: ChannelState::Open,
            },
            StateMark {
                timestamp: ts(60),
                clock_ms: 61_000,
                state: ChannelState::Open,
            },
            StateMark {
                timestamp: ts(61),
                clock_ms: 62_000,
                state: ChannelState::Broken,
            },
        ]);
        let events: Vec<_> = trace.events().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Interbout);
        assert_eq!(events[0].duration_ms, 1_000);
    }

    #[test]
    fn state_at_follows_last_mark() {
        let samples = [sample(0, 1, 1), sample(1_000, 0, 1), sample(3_000, 1, 1)];
        let r = reconstruct(&samples);
        assert_eq!(r.left.state_at(-1), None);
        assert_eq!(r.left.state_at(0), Some(ChannelState::Open));
        assert_eq!(r.left.state_at(2_999), Some(ChannelState::Broken));
        assert_eq!(r.left.state_at(3_000), Some(ChannelState::Open));
        assert_eq!(ChannelTrace::new().state_at(0), None);
    }

    #[test]
    fn retain_drops_straddling_bouts() {
        let samples = [
            sample(0, 1, 1),
            sample(1_000, 0, 1),
            sample(3_000, 1, 1),
            sample(5_000, 0, 1),
            sample(7_000, 1, 1),
        ];
        let r = reconstruct(&samples);

        let mut head = r.left.clone();
        head.retain_until(ts(5));
        assert_eq!(head.len(), 3);
        assert!(!head.has_trailing_bout());

        let mut tail = r.left.clone();
        tail.retain_from(ts(1));
        assert_eq!(tail.first().unwrap().clock_ms, 3_000);
        assert_eq!(tail.completed_bouts().count(), 1);
    }
}
