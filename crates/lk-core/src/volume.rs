//! Fluid volume bookkeeping.
//!
//! Operators record sparse, manual readings per device: measurements of the
//! fluid remaining in each tube, and fills that top a tube back up. A fill
//! recorded at the same instant as a measurement is ordered one microsecond
//! after it, so a measure-then-refill visit sorts the right way round.
//!
//! [`VolumeInterpolator::volume_at`] answers which pair of readings brackets a
//! given time, which the annotation pass uses to apportion the consumed volume
//! across the bouts inside that bracket.

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use thiserror::Error;

use crate::types::{Channel, DeviceId, ValidationError, VolumeKind};

/// Volume lookup errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// No readings have been recorded for any device.
    #[error("no volume data")]
    NoData,

    /// No readings have been recorded for this device.
    #[error("no volume data for device {device}")]
    NoDeviceData { device: DeviceId },

    /// The requested time precedes the first reading of the device.
    #[error("time requested ({time}) is before all volume data for device {device}")]
    BeforeAllData { time: NaiveDateTime, device: DeviceId },

    /// The requested time follows the last reading of the device.
    #[error("time requested ({time}) is after all volume data for device {device}")]
    AfterAllData { time: NaiveDateTime, device: DeviceId },

    /// No earlier reading carries a value for the channel.
    #[error("no prior {channel} volume before {time} for device {device}")]
    NoPriorValue {
        channel: Channel,
        time: NaiveDateTime,
        device: DeviceId,
    },

    /// The bracketing reading has no value for the channel.
    #[error("no {channel} volume recorded at {time} for device {device}")]
    NoPostValue {
        channel: Channel,
        time: NaiveDateTime,
        device: DeviceId,
    },
}

/// A single manual reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeSample {
    /// When the operator took the reading.
    pub recorded_at: NaiveDateTime,
    pub kind: VolumeKind,
    pub device: DeviceId,
    pub left_ml: Option<f64>,
    pub right_ml: Option<f64>,
}

impl VolumeSample {
    /// Sort and search position; fills sit one microsecond after their
    /// recorded time.
    pub fn effective_time(&self) -> NaiveDateTime {
        match self.kind {
            VolumeKind::Measured => self.recorded_at,
            VolumeKind::Fill => self.recorded_at + TimeDelta::microseconds(1),
        }
    }

    /// Reading for one channel.
    pub const fn volume(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Left => self.left_ml,
            Channel::Right => self.right_ml,
        }
    }
}

/// A `(time, left, right)` bracket endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumePoint {
    pub at: NaiveDateTime,
    pub left_ml: Option<f64>,
    pub right_ml: Option<f64>,
}

impl VolumePoint {
    pub const fn volume(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Left => self.left_ml,
            Channel::Right => self.right_ml,
        }
    }
}

/// Change across a bracket. Volumes are `pre - post`, i.e. the amount consumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeDelta {
    pub elapsed: TimeDelta,
    pub left_ml: Option<f64>,
    pub right_ml: Option<f64>,
}

/// The pair of readings bracketing a query time.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeWindow {
    /// Position of `post` in the device's reading stream. Stable only while
    /// the stream is unchanged; bouts sharing an index share a bracket.
    pub index: usize,
    pub device: DeviceId,
    pub pre: VolumePoint,
    pub post: VolumePoint,
    pub delta: VolumeDelta,
}

impl VolumeWindow {
    /// Volume consumed on `channel` across the bracket.
    pub fn consumed(&self, channel: Channel) -> Result<f64, VolumeError> {
        match channel {
            Channel::Left => self.delta.left_ml,
            Channel::Right => self.delta.right_ml,
        }
        .ok_or_else(|| {
            if self.pre.volume(channel).is_none() {
                VolumeError::NoPriorValue {
                    channel,
                    time: self.post.at,
                    device: self.device,
                }
            } else {
                VolumeError::NoPostValue {
                    channel,
                    time: self.post.at,
                    device: self.device,
                }
            }
        })
    }
}

/// Chronological measured/fill readings for any number of devices.
#[derive(Debug, Clone, Default)]
pub struct VolumeInterpolator {
    samples: Vec<VolumeSample>,
}

impl VolumeInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a measurement of the fluid remaining in each tube.
    pub fn add_measurement(
        &mut self,
        time: NaiveDateTime,
        device: DeviceId,
        left_ml: Option<f64>,
        right_ml: Option<f64>,
    ) -> Result<(), ValidationError> {
        self.add(VolumeKind::Measured, time, device, left_ml, right_ml)
    }

    /// Records a fill. Sorts after a measurement taken at the same time.
    pub fn add_fill(
        &mut self,
        time: NaiveDateTime,
        device: DeviceId,
        left_ml: Option<f64>,
        right_ml: Option<f64>,
    ) -> Result<(), ValidationError> {
        self.add(VolumeKind::Fill, time, device, left_ml, right_ml)
    }

    /// Records a reading of either kind.
    pub fn add(
        &mut self,
        kind: VolumeKind,
        time: NaiveDateTime,
        device: DeviceId,
        left_ml: Option<f64>,
        right_ml: Option<f64>,
    ) -> Result<(), ValidationError> {
        for value in [left_ml, right_ml].into_iter().flatten() {
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteVolume { value });
            }
        }

        self.samples.push(VolumeSample {
            recorded_at: time,
            kind,
            device,
            left_ml,
            right_ml,
        });
        // Stable sort keeps insertion order for identical instants
        self.samples.sort_by_key(VolumeSample::effective_time);
        Ok(())
    }

    /// All readings in effective-time order.
    pub fn samples(&self) -> &[VolumeSample] {
        &self.samples
    }

    /// Readings for one device in effective-time order.
    pub fn samples_for(&self, device: DeviceId) -> impl Iterator<Item = &VolumeSample> {
        self.samples.iter().filter(move |s| s.device == device)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Brackets `time` for `device`.
    ///
    /// `post` is the first reading at or after `time`, so a bout ending
    /// exactly at a measurement is charged to the interval that measurement
    /// closes. `pre` is searched backward independently per channel for the
    /// nearest reading carrying a value; its timestamp is the left reading's
    /// when one exists, the right reading's otherwise.
    pub fn volume_at(
        &self,
        time: NaiveDateTime,
        device: DeviceId,
    ) -> Result<VolumeWindow, VolumeError> {
        if self.samples.is_empty() {
            return Err(VolumeError::NoData);
        }

        let stream: Vec<&VolumeSample> = self.samples_for(device).collect();
        if stream.is_empty() {
            return Err(VolumeError::NoDeviceData { device });
        }

        let index = stream
            .iter()
            .position(|s| time <= s.effective_time())
            .ok_or(VolumeError::AfterAllData { time, device })?;
        if index == 0 {
            return Err(VolumeError::BeforeAllData { time, device });
        }

        let prior = &stream[..index];
        let pre_left = prior.iter().rev().find(|s| s.left_ml.is_some());
        let pre_right = prior.iter().rev().find(|s| s.right_ml.is_some());

        let pre_at = match (pre_left, pre_right) {
            (Some(s), _) | (None, Some(s)) => s.recorded_at,
            (None, None) => {
                return Err(VolumeError::NoPriorValue {
                    channel: Channel::Left,
                    time,
                    device,
                });
            }
        };

        let post = stream[index];
        let pre = VolumePoint {
            at: pre_at,
            left_ml: pre_left.and_then(|s| s.left_ml),
            right_ml: pre_right.and_then(|s| s.right_ml),
        };
        let post = VolumePoint {
            at: post.recorded_at,
            left_ml: post.left_ml,
            right_ml: post.right_ml,
        };

        let consumed = |channel: Channel| {
            pre.volume(channel)
                .zip(post.volume(channel))
                .map(|(before, after)| before - after)
        };

        Ok(VolumeWindow {
            index,
            device,
            delta: VolumeDelta {
                elapsed: post.at - pre.at,
                left_ml: consumed(Channel::Left),
                right_ml: consumed(Channel::Right),
            },
            pre,
            post,
        })
    }
}
