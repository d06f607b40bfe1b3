//! Light/dark cycle schedule.
//!
//! A schedule partitions the 24-hour clock into light and dark intervals.
//! Phases may be added incrementally in any order; a phase whose end is
//! before its start wraps past midnight and is stored as two intervals.
//! [`LightDarkCycle::validate`] is the explicit finalization step that
//! rejects schedules with gaps, overlaps, or uncovered midnight boundaries.

use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use thiserror::Error;

use crate::types::Phase;

/// Schedule construction and lookup errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A phase was added with identical start and end.
    #[error("phase start and end are the same time: {time}")]
    EmptyPhase { time: NaiveTime },

    /// No phases have been added.
    #[error("light/dark schedule has no phases")]
    Empty,

    /// The earliest interval does not begin at midnight.
    #[error("light/dark schedule does not start at midnight (first interval starts at {start})")]
    DoesNotStartAtMidnight { start: NaiveTime },

    /// The latest interval does not run to midnight.
    #[error("light/dark schedule does not end at midnight (last interval ends at {end})")]
    DoesNotEndAtMidnight { end: DayTime },

    /// Two consecutive intervals leave part of the day uncovered.
    #[error("light/dark schedule has a gap from {from} to {to}")]
    Gap { from: DayTime, to: NaiveTime },

    /// Two intervals claim the same part of the day.
    #[error("light/dark schedule has overlapping phases at {at}")]
    Overlap { at: NaiveTime },

    /// A lookup fell outside every interval.
    #[error("time {time} is not covered by the light/dark schedule")]
    Uncovered { time: NaiveTime },
}

/// An interval bound on the 24-hour clock.
///
/// `EndOfDay` is 24:00, which `NaiveTime` cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayTime {
    At(NaiveTime),
    EndOfDay,
}

impl Serialize for DayTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl fmt::Display for DayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(t) => write!(f, "{t}"),
            Self::EndOfDay => write!(f, "24:00:00"),
        }
    }
}

/// A half-open slice `[start, end)` of the day tagged with its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseInterval {
    pub start: NaiveTime,
    pub end: DayTime,
    pub phase: Phase,
}

impl PhaseInterval {
    /// Whether `time` falls inside this interval.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && DayTime::At(time) < self.end
    }
}

/// A 24-hour light/dark schedule.
#[derive(Debug, Clone, Default)]
pub struct LightDarkCycle {
    intervals: Vec<PhaseInterval>,
    complete: bool,
}

impl LightDarkCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a light phase from `start` to `end`, wrapping past midnight when
    /// `end < start`.
    pub fn add_light_phase(&mut self, start: NaiveTime, end: NaiveTime) -> Result<(), ScheduleError> {
        self.add_phase(Phase::Light, start, end)
    }

    /// Adds a dark phase from `start` to `end`, wrapping past midnight when
    /// `end < start`.
    pub fn add_dark_phase(&mut self, start: NaiveTime, end: NaiveTime) -> Result<(), ScheduleError> {
        self.add_phase(Phase::Dark, start, end)
    }

    /// Adds a phase of the given kind.
    pub fn add_phase(
        &mut self,
        phase: Phase,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<(), ScheduleError> {
        if start == end {
            return Err(ScheduleError::EmptyPhase { time: start });
        }

        if start < end {
            self.intervals.push(PhaseInterval {
                start,
                end: DayTime::At(end),
                phase,
            });
        } else {
            self.intervals.push(PhaseInterval {
                start,
                end: DayTime::EndOfDay,
                phase,
            });
            if end != NaiveTime::MIN {
                self.intervals.push(PhaseInterval {
                    start: NaiveTime::MIN,
                    end: DayTime::At(end),
                    phase,
                });
            }
        }

        self.refresh();
        Ok(())
    }

    /// Intervals sorted by start time.
    pub fn intervals(&self) -> &[PhaseInterval] {
        &self.intervals
    }

    /// Whether the intervals currently tile the whole day.
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Checks that the schedule covers midnight to midnight with no gaps or
    /// overlaps.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let (Some(first), Some(last)) = (self.intervals.first(), self.intervals.last()) else {
            return Err(ScheduleError::Empty);
        };

        if first.start != NaiveTime::MIN {
            return Err(ScheduleError::DoesNotStartAtMidnight { start: first.start });
        }
        if last.end != DayTime::EndOfDay {
            return Err(ScheduleError::DoesNotEndAtMidnight { end: last.end });
        }

        for pair in self.intervals.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let next_start = DayTime::At(next.start);
            if prev.end < next_start {
                return Err(ScheduleError::Gap {
                    from: prev.end,
                    to: next.start,
                });
            }
            if prev.end > next_start {
                return Err(ScheduleError::Overlap { at: next.start });
            }
        }

        Ok(())
    }

    /// Phase in effect at `time`.
    pub fn phase_at(&self, time: NaiveTime) -> Result<Phase, ScheduleError> {
        self.intervals
            .iter()
            .find(|interval| interval.contains(time))
            .map(|interval| interval.phase)
            .ok_or(ScheduleError::Uncovered { time })
    }

    /// Phase in effect at the time of day of `timestamp`.
    pub fn phase_at_datetime(&self, timestamp: &NaiveDateTime) -> Result<Phase, ScheduleError> {
        self.phase_at(timestamp.time())
    }

    fn refresh(&mut self) {
        self.intervals.sort_by_key(|i| (i.start, i.end));
        self.complete = self.validate().is_ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn standard_cycle() -> LightDarkCycle {
        let mut cycle = LightDarkCycle::new();
        cycle.add_light_phase(hm(5, 0), hm(19, 0)).unwrap();
        cycle.add_dark_phase(hm(19, 0), hm(5, 0)).unwrap();
        cycle
    }

    #[test]
    fn complementary_phases_are_complete() {
        let cycle = standard_cycle();
        assert!(cycle.is_complete());
        assert!(cycle.validate().is_ok());
        assert_eq!(cycle.intervals().len(), 3);
    }

    #[test]
    fn phase_lookup_across_the_day() {
        let cycle = standard_cycle();
        assert_eq!(cycle.phase_at(hm(12, 0)).unwrap(), Phase::Light);
        assert_eq!(cycle.phase_at(hm(23, 0)).unwrap(), Phase::Dark);
        assert_eq!(cycle.phase_at(hm(2, 0)).unwrap(), Phase::Dark);
    }

    #[test]
    fn boundaries_belong_to_the_starting_phase() {
        let cycle = standard_cycle();
        assert_eq!(cycle.phase_at(hm(5, 0)).unwrap(), Phase::Light);
        assert_eq!(cycle.phase_at(hm(19, 0)).unwrap(), Phase::Dark);
        assert_eq!(cycle.phase_at(NaiveTime::MIN).unwrap(), Phase::Dark);
        let last_instant = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap();
        assert_eq!(cycle.phase_at(last_instant).unwrap(), Phase::Dark);
    }

    #[test]
    fn phase_at_datetime_uses_time_of_day() {
        let cycle = standard_cycle();
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 7, 3)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(cycle.phase_at_datetime(&dt).unwrap(), Phase::Light);
    }

    #[test]
    fn incremental_additions_become_complete() {
        let mut cycle = LightDarkCycle::new();
        cycle.add_light_phase(hm(6, 0), hm(18, 0)).unwrap();
        assert!(!cycle.is_complete());
        cycle.add_dark_phase(hm(18, 0), hm(0, 0)).unwrap();
        assert!(!cycle.is_complete());
        cycle.add_dark_phase(hm(0, 0), hm(6, 0)).unwrap();
        assert!(cycle.is_complete());
    }

    #[test]
    fn wrap_ending_at_midnight_is_single_interval() {
        let mut cycle = LightDarkCycle::new();
        cycle.add_dark_phase(hm(20, 0), hm(0, 0)).unwrap();
        assert_eq!(
            cycle.intervals(),
            &[PhaseInterval {
                start: hm(20, 0),
                end: DayTime::EndOfDay,
                phase: Phase::Dark,
            }]
        );
    }

    #[test]
    fn same_start_and_end_rejected() {
        let mut cycle = LightDarkCycle::new();
        let err = cycle.add_light_phase(hm(7, 0), hm(7, 0)).unwrap_err();
        assert_eq!(err, ScheduleError::EmptyPhase { time: hm(7, 0) });
        assert!(cycle.intervals().is_empty());
    }

    #[test]
    fn validate_reports_empty_schedule() {
        assert_eq!(LightDarkCycle::new().validate(), Err(ScheduleError::Empty));
    }

    #[test]
    fn validate_reports_missing_midnight_start() {
        let mut cycle = LightDarkCycle::new();
        cycle.add_light_phase(hm(5, 0), hm(19, 0)).unwrap();
        assert_eq!(
            cycle.validate(),
            Err(ScheduleError::DoesNotStartAtMidnight { start: hm(5, 0) })
        );
    }

    #[test]
    fn validate_reports_missing_midnight_end() {
        let mut cycle = LightDarkCycle::new();
        cycle.add_dark_phase(hm(0, 0), hm(5, 0)).unwrap();
        cycle.add_light_phase(hm(5, 0), hm(19, 0)).unwrap();
        assert_eq!(
            cycle.validate(),
            Err(ScheduleError::DoesNotEndAtMidnight {
                end: DayTime::At(hm(19, 0))
            })
        );
    }

    #[test]
    fn validate_reports_gap() {
        let mut cycle = LightDarkCycle::new();
        cycle.add_light_phase(hm(5, 0), hm(18, 0)).unwrap();
        cycle.add_dark_phase(hm(19, 0), hm(5, 0)).unwrap();
        assert!(!cycle.is_complete());
        let err = cycle.validate().unwrap_err();
        assert_eq!(
            err,
            ScheduleError::Gap {
                from: DayTime::At(hm(18, 0)),
                to: hm(19, 0)
            }
        );
        assert_eq!(
            err.to_string(),
            "light/dark schedule has a gap from 18:00:00 to 19:00:00"
        );
        assert_eq!(
            cycle.phase_at(hm(18, 30)),
            Err(ScheduleError::Uncovered { time: hm(18, 30) })
        );
    }

    #[test]
    fn validate_reports_overlap() {
        let mut cycle = LightDarkCycle::new();
        cycle.add_light_phase(hm(5, 0), hm(20, 0)).unwrap();
        cycle.add_dark_phase(hm(19, 0), hm(5, 0)).unwrap();
        assert!(!cycle.is_complete());
        assert_eq!(
            cycle.validate(),
            Err(ScheduleError::Overlap { at: hm(19, 0) })
        );
    }
}
