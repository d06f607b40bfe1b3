//! Core domain logic for lickometer beam-break analysis.
//!
//! This crate contains the fundamental types and logic for:
//! - Reconstruction: turning raw beam samples into bout/interbout traces
//! - Device logs: trimming and clock-consistent merging of sessions
//! - Volume and light/dark data: bracketing readings and phase lookup
//! - Annotation: apportioning consumed volume across bouts
//! - Series and statistics for plotting and reporting

pub mod annotate;
pub mod channel;
pub mod device_log;
pub mod light_dark;
pub mod log_file;
pub mod series;
pub mod stats;
pub mod types;
pub mod volume;

pub use annotate::{
    AnnotateError, Annotation, AnnotationObserver, BoutRecord, ChannelAnnotation, SkipReason,
    TracingObserver, annotate, annotate_with,
};
pub use channel::{
    ChannelReconstructor, ChannelTrace, CompletedBout, EventKind, IntervalEvent, RawSample,
    Reconstruction, StateMark, reconstruct,
};
pub use device_log::{DeviceLog, LogSpan, MergeConfig, MergeError};
pub use light_dark::{DayTime, LightDarkCycle, PhaseInterval, ScheduleError};
pub use log_file::{LogFile, LogFileError};
pub use series::{ChannelSeries, ChannelSummary, DeviceSeries, DeviceSummary};
pub use stats::StatSummary;
pub use types::{Channel, ChannelState, DeviceId, Phase, ValidationError, VolumeKind};
pub use volume::{VolumeDelta, VolumeError, VolumeInterpolator, VolumePoint, VolumeSample, VolumeWindow};
