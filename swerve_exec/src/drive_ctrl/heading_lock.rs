//! # Heading lock
//!
//! Holds the robot's heading while the driver is only translating. The lock
//! engages on the first tick the driver is moving without commanding
//! rotation, latching the measured heading, and releases the moment the
//! driver commands rotation again.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Arc;

use log::debug;
use serde::Serialize;
use util::maths::{clamp, deadband, get_ang_dist};

use super::HeadingLockParams;
use crate::loc::HeadingSource;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The heading lock state machine.
///
/// The measured heading is read from the source given at construction, the
/// fused pose heading is never used here.
#[derive(Clone)]
pub struct HeadingLockController {
    params: HeadingLockParams,
    heading_source: Arc<dyn HeadingSource>,
    enabled: bool,
    state: HeadingLockState,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum HeadingLockState {
    Inactive,
    Active {
        /// The heading being held.
        ///
        /// Units: radians
        locked_heading_rad: f64,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HeadingLockController {
    pub fn new(params: HeadingLockParams, heading_source: Arc<dyn HeadingSource>) -> Self {
        Self {
            params,
            heading_source,
            enabled: params.enabled,
            state: HeadingLockState::Inactive,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            debug!("Heading lock {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
        if !enabled {
            self.state = HeadingLockState::Inactive;
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> HeadingLockState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, HeadingLockState::Active { .. })
    }

    /// Drop any latched heading, for example after the pose is re-seeded.
    pub fn reset(&mut self) {
        self.state = HeadingLockState::Inactive;
    }

    /// Compute the rotation command for this tick.
    ///
    /// Returns `rot_rads` unchanged unless the lock is active and the robot
    /// is moving, in which case a proportional correction towards the locked
    /// heading replaces it. While the heading source reports nothing the
    /// driver's command is always passed through.
    pub fn update(&mut self, linear_speed_ms: f64, rot_rads: f64) -> f64 {
        if !self.enabled {
            return rot_rads;
        }

        if rot_rads.abs() > self.params.rotation_deadband_rads {
            if self.is_active() {
                debug!("Heading lock released, driver is rotating");
            }
            self.state = HeadingLockState::Inactive;
            return rot_rads;
        }

        let heading_rad = match self.heading_source.heading_rad() {
            Some(h) if h.is_finite() => h,
            _ => return rot_rads
        };

        if linear_speed_ms <= self.params.min_motion_ms {
            return rot_rads;
        }

        match self.state {
            HeadingLockState::Inactive => {
                debug!("Heading lock engaged at {:.4} rad", heading_rad);
                self.state = HeadingLockState::Active { locked_heading_rad: heading_rad };
                rot_rads
            },
            HeadingLockState::Active { locked_heading_rad } => {
                self.correction(locked_heading_rad, heading_rad)
            }
        }
    }

    /// The bounded proportional correction from `current` towards `locked`.
    fn correction(&self, locked_heading_rad: f64, current_heading_rad: f64) -> f64 {
        let unbounded = self.params.k_p * get_ang_dist(current_heading_rad, locked_heading_rad);

        clamp(
            deadband(unbounded, self.params.noise_floor_rads),
            -self.params.max_correction_rads,
            self.params.max_correction_rads,
        )
    }
}
