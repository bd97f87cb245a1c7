//! Parameters structure for DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::kinematics::ModuleGeometry;
use super::DriveCtrlError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for drivetrain control.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveCtrlParams {

    // ---- GEOMETRY ----

    /// Offsets of the modules from the chassis rotation centre.
    ///
    /// Units: meters
    /// Frame: Robot body, x forward, y left
    pub geometry: ModuleGeometry,

    // ---- CAPABILITIES ----

    /// Maximum linear wheel speed.
    ///
    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Maximum linear wheel speed in slow mode.
    ///
    /// Units: meters/second
    pub slow_max_speed_ms: f64,

    /// Maximum chassis angular speed.
    ///
    /// Units: radians/second
    pub max_ang_speed_rads: f64,

    /// Below this wheel speed the module holds its steer angle.
    ///
    /// Units: meters/second
    pub steer_hold_speed_ms: f64,

    // ---- BEHAVIOUR ----

    /// If `false` drive commands are ignored at startup, odometry still runs.
    pub drive_enabled: bool,

    /// A manual command with a linear speed above this cancels any running
    /// auto command. Rotation uses the heading lock rotation deadband.
    ///
    /// Units: meters/second
    pub auto_override_speed_ms: f64,

    pub heading_lock: HeadingLockParams,

    pub skew_correction: SkewCorrectionParams,
}

/// Parameters for the heading lock.
#[derive(Debug, Copy, Clone, Deserialize)]
pub struct HeadingLockParams {
    /// Heading lock enabled at startup.
    pub enabled: bool,

    /// Commanded rotation above this magnitude is the driver rotating.
    ///
    /// Units: radians/second
    pub rotation_deadband_rads: f64,

    /// Commanded linear speed must exceed this for the lock to engage.
    ///
    /// Units: meters/second
    pub min_motion_ms: f64,

    /// Proportional gain on the heading error.
    ///
    /// Units: (radians/second)/radian
    pub k_p: f64,

    /// Largest correction the lock may command.
    ///
    /// Units: radians/second
    pub max_correction_rads: f64,

    /// Corrections smaller than this are zeroed.
    ///
    /// Units: radians/second
    pub noise_floor_rads: f64,
}

/// Parameters for the rotational skew correction.
#[derive(Debug, Copy, Clone, Deserialize)]
pub struct SkewCorrectionParams {
    pub enabled: bool,

    /// How far ahead, in seconds of yaw rate, the heading is projected. A
    /// tuned damping gain rather than the tick period.
    pub coefficient: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCtrlParams {
    /// Check the parameters are usable, geometry is checked when the
    /// kinematics are built.
    pub fn validate(&self) -> Result<(), DriveCtrlError> {
        let positive = [
            ("max_speed_ms", self.max_speed_ms),
            ("slow_max_speed_ms", self.slow_max_speed_ms),
            ("max_ang_speed_rads", self.max_ang_speed_rads),
        ];
        let non_negative = [
            ("steer_hold_speed_ms", self.steer_hold_speed_ms),
            ("auto_override_speed_ms", self.auto_override_speed_ms),
            ("heading_lock.rotation_deadband_rads", self.heading_lock.rotation_deadband_rads),
            ("heading_lock.min_motion_ms", self.heading_lock.min_motion_ms),
            ("heading_lock.k_p", self.heading_lock.k_p),
            ("heading_lock.max_correction_rads", self.heading_lock.max_correction_rads),
            ("heading_lock.noise_floor_rads", self.heading_lock.noise_floor_rads),
            ("skew_correction.coefficient", self.skew_correction.coefficient),
        ];

        for &(name, v) in positive.iter() {
            if !(v.is_finite() && v > 0.0) {
                return Err(DriveCtrlError::InvalidParam(name, v));
            }
        }
        for &(name, v) in non_negative.iter() {
            if !(v.is_finite() && v >= 0.0) {
                return Err(DriveCtrlError::InvalidParam(name, v));
            }
        }

        Ok(())
    }
}

impl Default for DriveCtrlParams {
    fn default() -> Self {
        Self {
            geometry: ModuleGeometry::rectangular(0.3, 0.3),
            max_speed_ms: 3.0,
            slow_max_speed_ms: 1.5,
            max_ang_speed_rads: 3.0,
            steer_hold_speed_ms: 0.03,
            drive_enabled: true,
            auto_override_speed_ms: 0.05,
            heading_lock: HeadingLockParams::default(),
            skew_correction: SkewCorrectionParams {
                enabled: true,
                coefficient: 0.3,
            },
        }
    }
}

impl Default for HeadingLockParams {
    fn default() -> Self {
        Self {
            enabled: true,
            rotation_deadband_rads: 0.01,
            min_motion_ms: 0.1,
            k_p: 1.0,
            max_correction_rads: 0.3,
            noise_floor_rads: 0.005,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_param_file() {
        let p: DriveCtrlParams = util::params::from_toml_str(
            include_str!("../../../params/drive_ctrl.toml")
        ).unwrap();

        assert!(p.validate().is_ok());
        assert_eq!(p.max_speed_ms, 3.0);
        assert_eq!(p.heading_lock.max_correction_rads, 0.3);
        assert_eq!(p.skew_correction.coefficient, 0.3);
    }

    #[test]
    fn test_validate() {
        let mut p = DriveCtrlParams::default();
        p.max_speed_ms = 0.0;
        assert!(matches!(p.validate(), Err(DriveCtrlError::InvalidParam("max_speed_ms", _))));

        let mut p = DriveCtrlParams::default();
        p.heading_lock.k_p = f64::NAN;
        assert!(p.validate().is_err());
    }
}
