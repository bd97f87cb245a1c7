//! # Vision Equipment Communications Module
//!
//! Both pose cameras publish the same reading structure, whether they localise
//! against fiducials (primary) or by visual-inertial tracking (secondary).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single reading from a vision source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisionReading {
    /// Field position of the robot in meters.
    pub x_m: f64,
    pub y_m: f64,

    /// Field-relative heading of the robot in radians.
    pub heading_rad: f64,

    /// Capture time of the reading on the session clock, may be older than
    /// the time it is received.
    pub timestamp_s: f64,

    /// Distance from the camera to the target it localised against.
    pub distance_m: f64,

    /// `false` when no target was seen this cycle. The rest of the reading is
    /// meaningless in that case, in particular `distance_m` is not zero range.
    pub exists: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifies one of the two vision sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisionSourceId {
    /// Fiducial camera, the more accurate source at close range.
    Primary,

    /// Tracking camera, re-seeded by the primary when it is confident.
    Secondary,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl VisionReading {
    /// A reading carrying no target.
    pub fn none(timestamp_s: f64) -> Self {
        Self {
            x_m: 0.0,
            y_m: 0.0,
            heading_rad: 0.0,
            timestamp_s,
            distance_m: 0.0,
            exists: false,
        }
    }
}

impl VisionSourceId {
    pub const ALL: [VisionSourceId; 2] = [VisionSourceId::Primary, VisionSourceId::Secondary];

    /// Index of the source into per-source arrays.
    pub fn index(&self) -> usize {
        match self {
            VisionSourceId::Primary => 0,
            VisionSourceId::Secondary => 1,
        }
    }
}

impl std::fmt::Display for VisionSourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionSourceId::Primary => write!(f, "primary"),
            VisionSourceId::Secondary => write!(f, "secondary"),
        }
    }
}
