//! Property-based tests for reconstruction, merging, trimming and annotation.
//!
//! Uses proptest to check the pipeline invariants across random sessions.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use lk_core::log_file::{read_samples, write_log};
use lk_core::{
    Channel, ChannelState, ChannelTrace, DeviceId, DeviceLog, EventKind, LightDarkCycle,
    MergeConfig, RawSample, StateMark, VolumeInterpolator, annotate, reconstruct,
};
use proptest::prelude::*;

/// Tolerance for floating point comparisons.
const TOL: f64 = 1e-9;

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 7, 2)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn device() -> DeviceId {
    DeviceId::new(8)
}

/// Rows of `(bits, gap_ms)`; bit 0 is left, bit 1 is right, set means open.
fn rows() -> impl Strategy<Value = Vec<(u8, i64)>> {
    prop::collection::vec((0u8..4, 1i64..20_000), 0..60)
}

/// Builds samples starting at `start` with the device clock at `clock0`.
///
/// Timestamps are whole seconds so they survive the row codec.
fn samples(start: NaiveDateTime, clock0: i64, rows: &[(u8, i64)]) -> Vec<RawSample> {
    let mut clock = clock0;
    rows.iter()
        .map(|&(bits, gap)| {
            clock += gap;
            RawSample {
                timestamp: start + TimeDelta::seconds((clock - clock0) / 1_000),
                clock_ms: clock,
                left_open: bits & 1 == 1,
                right_open: bits & 2 == 2,
            }
        })
        .collect()
}

fn session(start: NaiveDateTime, rows: &[(u8, i64)]) -> DeviceLog {
    DeviceLog::from_samples(device(), &samples(start, 0, rows))
}

/// Two sessions `gap_secs` apart, merged.
fn merged(a: &[(u8, i64)], b: &[(u8, i64)], gap_secs: i64) -> DeviceLog {
    let first = session(base(), a);
    let second_start = first.span().map_or(base(), |s| s.end) + TimeDelta::seconds(gap_secs + 1);
    DeviceLog::merge(&first, &session(second_start, b), &MergeConfig::default()).unwrap()
}

fn round_trip(log: &DeviceLog) -> DeviceLog {
    let mut out = Vec::new();
    write_log(&mut out, log).unwrap();
    read_samples(Cursor::new(out)).unwrap().into_log()
}

/// Consecutive `Open → Broken` mark pairs.
fn idle_intervals(trace: &ChannelTrace) -> Vec<(StateMark, StateMark)> {
    trace
        .marks()
        .windows(2)
        .filter(|pair| pair[0].state == ChannelState::Open && pair[1].state == ChannelState::Broken)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

fn cycle() -> Arc<LightDarkCycle> {
    let hm = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    let mut cycle = LightDarkCycle::new();
    cycle.add_light_phase(hm(5), hm(19)).unwrap();
    cycle.add_dark_phase(hm(19), hm(5)).unwrap();
    Arc::new(cycle)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Bout and interbout events strictly alternate on an unmerged trace.
    #[test]
    fn events_alternate(rows in rows()) {
        let r = reconstruct(&samples(base(), 0, &rows));
        for channel in Channel::BOTH {
            let kinds: Vec<EventKind> = r.trace(channel).events().map(|e| e.kind).collect();
            for pair in kinds.windows(2) {
                prop_assert_ne!(pair[0], pair[1]);
            }
            if let Some(first) = kinds.first() {
                prop_assert_eq!(*first, EventKind::Interbout);
            }
        }
    }

    /// Event durations add up to the clock span of the trace.
    #[test]
    fn durations_sum_to_trace_span(rows in rows()) {
        let r = reconstruct(&samples(base(), 0, &rows));
        for channel in Channel::BOTH {
            let trace = r.trace(channel);
            let total: i64 = trace.events().map(|e| e.duration_ms).sum();
            match (trace.first(), trace.last()) {
                (Some(first), Some(last)) => prop_assert_eq!(total, last.clock_ms - first.clock_ms),
                _ => prop_assert_eq!(total, 0),
            }
            prop_assert!(trace.events().all(|e| e.duration_ms >= 0));
        }
    }

    /// Merging is independent of argument order.
    #[test]
    fn merge_order_independent(a in rows(), b in rows(), gap_mins in 0i64..600) {
        let first = session(base(), &a);
        let second_start = first.span().map_or(base(), |s| s.end) + TimeDelta::minutes(gap_mins);
        let second = session(second_start + TimeDelta::seconds(1), &b);
        let config = MergeConfig::default();

        let ab = DeviceLog::merge(&first, &second, &config).unwrap();
        let ba = DeviceLog::merge(&second, &first, &config).unwrap();
        prop_assert_eq!(ab.left(), ba.left());
        prop_assert_eq!(ab.right(), ba.right());

        for channel in Channel::BOTH {
            for pair in ab.trace(channel).marks().windows(2) {
                prop_assert!(pair[0].clock_ms <= pair[1].clock_ms);
            }
        }
    }

    /// A window keeps exactly the intervals observed inside it.
    ///
    /// A bout opening on the first sample past the start is dropped, as is
    /// an idle interval closed by a break on the last sample before the end,
    /// since the other side of those boundary samples is unknown.
    #[test]
    fn window_keeps_intervals_inside_it(rows in rows(), from in 0i64..600, len in 0i64..600) {
        let log = session(base(), &rows);
        let start = base() + TimeDelta::seconds(from);
        let end = start + TimeDelta::seconds(len);
        let window = log.window(start, end);

        for channel in Channel::BOTH {
            let marks = log.trace(channel).marks();
            let first_kept = marks.iter().find(|m| m.timestamp >= start);
            let last_kept = marks.iter().rev().find(|m| m.timestamp <= end);

            let expected_bouts: Vec<_> = log
                .trace(channel)
                .completed_bouts()
                .filter(|b| b.start >= start && b.end <= end)
                .filter(|b| first_kept.is_none_or(|m| m.clock_ms != b.start_ms))
                .collect();
            let bouts: Vec<_> = window.trace(channel).completed_bouts().collect();
            prop_assert_eq!(bouts, expected_bouts);

            let expected_idle: Vec<_> = idle_intervals(log.trace(channel))
                .into_iter()
                .filter(|(open, broken)| open.timestamp >= start && broken.timestamp <= end)
                .filter(|(_, broken)| last_kept.is_none_or(|m| m.clock_ms != broken.clock_ms))
                .collect();
            prop_assert_eq!(idle_intervals(window.trace(channel)), expected_idle);

            let trace = window.trace(channel);
            prop_assert!(!trace.has_trailing_bout());
            prop_assert!(trace.first().is_none_or(|m| !m.state.is_broken()));
        }
    }

    /// Trimming the start and end commutes.
    #[test]
    fn trims_commute(rows in rows(), from in 0i64..600, len in 0i64..600) {
        let log = session(base(), &rows);
        let start = base() + TimeDelta::seconds(from);
        let end = start + TimeDelta::seconds(len);

        let window = log.window(start, end);
        let reversed = log.trim_after(end).trim_before(start);
        prop_assert_eq!(window.left(), reversed.left());
        prop_assert_eq!(window.right(), reversed.right());
    }

    /// Bout shares within one bracket sum to the bracket's volume.
    #[test]
    fn allocation_is_exact(rows in rows(), left in 0.0..10.0f64, right in 0.0..10.0f64) {
        let log = session(base(), &rows);
        let Some(span) = log.span() else { return Ok(()); };
        let midpoint = span.start + span.duration() / 2;

        let mut volume = VolumeInterpolator::new();
        volume.add_fill(base() - TimeDelta::minutes(1), device(), Some(20.0), Some(20.0)).unwrap();
        volume.add_measurement(midpoint, device(), Some(20.0 - left), Some(20.0 - right)).unwrap();
        volume.add_measurement(span.end + TimeDelta::hours(1), device(), Some(5.0), Some(5.0)).unwrap();
        let log = log.with_volume(Arc::new(volume)).with_light_dark(cycle());

        let annotation = annotate(&log).unwrap();
        for channel in Channel::BOTH {
            let annotated = annotation.channel(channel);
            prop_assert_eq!(annotated.skipped, 0);
            prop_assert_eq!(annotated.bouts.len(), log.trace(channel).completed_bouts().count());

            let mut per_bracket: HashMap<usize, (f64, f64)> = HashMap::new();
            for bout in &annotated.bouts {
                let entry = per_bracket.entry(bout.volume_index).or_insert((0.0, bout.interval_volume));
                entry.0 += bout.step_volume;
            }
            for (sum, budget) in per_bracket.values() {
                prop_assert!((sum - budget).abs() <= TOL * budget.abs().max(1.0),
                    "bracket shares {} != budget {}", sum, budget);
            }
        }
    }

    /// Written rows read back into the same traces.
    #[test]
    fn row_codec_preserves_traces(rows in rows()) {
        let log = session(base(), &rows);
        prop_assume!(!log.is_empty());

        let reread = round_trip(&log);
        prop_assert_eq!(reread.left(), log.left());
        prop_assert_eq!(reread.right(), log.right());
        let synced = log.synchronized();
        prop_assert_eq!(synced.left(), log.left());
    }

    /// Merged logs read back with their seams, so no idle interval spans
    /// the gap between sessions.
    #[test]
    fn row_codec_preserves_merged_logs(a in rows(), b in rows(), gap_secs in 0i64..36_000) {
        let log = merged(&a, &b, gap_secs);
        prop_assume!(!log.is_empty());

        let reread = round_trip(&log);
        prop_assert_eq!(reread.seams(), log.seams());
        prop_assert_eq!(reread.left(), log.left());
        prop_assert_eq!(reread.right(), log.right());
        for channel in Channel::BOTH {
            prop_assert_eq!(
                reread.trace(channel).durations(EventKind::Interbout),
                log.trace(channel).durations(EventKind::Interbout)
            );
        }
    }

    /// Trimmed logs are written in synchronized form, keeping every bout
    /// after the restart.
    #[test]
    fn row_codec_synchronizes_trimmed_logs(
        a in rows(),
        b in rows(),
        gap_secs in 0i64..600,
        from in 0i64..2_400,
        len in 0i64..2_400,
    ) {
        let start = base() + TimeDelta::seconds(from);
        let trimmed = merged(&a, &b, gap_secs).window(start, start + TimeDelta::seconds(len));
        let synced = trimmed.synchronized();
        prop_assume!(!synced.is_empty());

        let reread = round_trip(&trimmed);
        prop_assert_eq!(reread.seams(), synced.seams());
        prop_assert_eq!(reread.left(), synced.left());
        prop_assert_eq!(reread.right(), synced.right());

        let restart = synced
            .seams()
            .last()
            .copied()
            .or_else(|| synced.span().map(|s| s.min_clock_ms))
            .unwrap();
        for channel in Channel::BOTH {
            let written: Vec<_> = reread.trace(channel).completed_bouts().collect();
            let before: Vec<_> = trimmed.trace(channel).completed_bouts().collect();
            prop_assert!(written.iter().all(|b| before.contains(b)));

            let after_restart: Vec<_> = before.into_iter().filter(|b| b.start_ms >= restart).collect();
            let written_after: Vec<_> = written.into_iter().filter(|b| b.start_ms >= restart).collect();
            prop_assert_eq!(written_after, after_restart);
        }
    }
}
