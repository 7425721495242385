//! # Telemetry Protocol Constants and Types
//!
//! One record per line, fields in fixed order:
//!
//! | Index | Field | Type |
//! |-------|-------|------|
//! | 0 | slow bitrate | bool |
//! | 1 | extended ids | bool |
//! | 2 | speed | float |
//! | 3 | rpm | float |
//! | 4 | load | float |
//! | 5 | temp | float |
//! | 6 | fuel | float |

use serde::Serialize;
use std::fmt;

/// Field separator within a record
pub const FIELD_SEPARATOR: char = ',';

/// Number of fields in a well-formed record
pub const RECORD_FIELD_COUNT: usize = 7;

/// Index of the first numeric channel field
pub const FIRST_CHANNEL_FIELD: usize = 2;

/// CAN bitrate reported when the module runs in slow mode (kbps)
pub const SLOW_BITRATE_KBPS: u32 = 250;

/// CAN bitrate reported otherwise (kbps)
pub const FAST_BITRATE_KBPS: u32 = 500;

/// One decoded telemetry record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Module is on the 250 kbps bus instead of 500 kbps
    pub slow_bitrate: bool,
    /// Module uses 29-bit CAN identifiers
    pub extended_ids: bool,
    /// Vehicle speed
    pub speed: f64,
    /// Engine speed
    pub rpm: f64,
    /// Engine load
    pub load: f64,
    /// Coolant temperature
    pub temp: f64,
    /// Fuel level
    pub fuel: f64,
}

impl TelemetrySample {
    /// Bus parameters carried by this sample
    pub fn link_parameters(&self) -> LinkParameters {
        LinkParameters {
            slow_bitrate: self.slow_bitrate,
            extended_ids: self.extended_ids,
        }
    }
}

/// Bus parameters of the diagnostic module, announced once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkParameters {
    pub slow_bitrate: bool,
    pub extended_ids: bool,
}

impl LinkParameters {
    pub fn bitrate_kbps(&self) -> u32 {
        if self.slow_bitrate {
            SLOW_BITRATE_KBPS
        } else {
            FAST_BITRATE_KBPS
        }
    }

    pub fn id_width_label(&self) -> &'static str {
        if self.extended_ids {
            "extended ids"
        } else {
            "standard ids"
        }
    }
}

impl fmt::Display for LinkParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kbps, {}", self.bitrate_kbps(), self.id_width_label())
    }
}
