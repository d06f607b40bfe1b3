//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A label did not match any known variant.
    #[error("invalid {field}: {value}")]
    UnknownLabel { field: &'static str, value: String },

    /// A device identifier could not be parsed.
    #[error("invalid device ID: {value}")]
    InvalidDeviceId { value: String },

    /// A volume reading was NaN or infinite.
    #[error("volume must be finite, got {value}")]
    NonFiniteVolume { value: f64 },
}

/// Generates a lowercase label enum with `as_str`, `Display` and `FromStr`.
macro_rules! define_label_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// String representation used in logs and serialized output.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $( $label => Ok(Self::$variant), )+
                    _ => Err(ValidationError::UnknownLabel {
                        field: $field_name,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

define_label_enum!(
    /// One of the two drinking tubes on a device.
    Channel, "channel" {
        Left => "left",
        Right => "right",
    }
);

impl Channel {
    /// Both channels in canonical (left, right) order.
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];
}

define_label_enum!(
    /// Beam state of a single channel.
    ChannelState, "channel state" {
        /// Tube unobstructed.
        Open => "open",
        /// Tongue interrupting the beam (actively drinking).
        Broken => "broken",
    }
);

impl ChannelState {
    /// Maps a raw device bit (`true` = beam open) to a state.
    #[must_use]
    pub const fn from_open_bit(open: bool) -> Self {
        if open { Self::Open } else { Self::Broken }
    }

    /// Device bit for this state: `1` when open, `0` when broken.
    #[must_use]
    pub const fn open_bit(self) -> u8 {
        match self {
            Self::Open => 1,
            Self::Broken => 0,
        }
    }

    #[must_use]
    pub const fn is_broken(self) -> bool {
        matches!(self, Self::Broken)
    }
}

define_label_enum!(
    /// Segment of the 24-hour day.
    Phase, "phase" {
        Light => "light",
        Dark => "dark",
    }
);

define_label_enum!(
    /// How a volume reading was taken.
    VolumeKind, "volume kind" {
        /// Direct reading of the remaining fluid.
        Measured => "measured",
        /// Operator top-up of the reservoir.
        Fill => "fill",
    }
);

/// Identifier programmed into a physical lickometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric ID.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| ValidationError::InvalidDeviceId {
                value: s.to_string(),
            })
    }
}
