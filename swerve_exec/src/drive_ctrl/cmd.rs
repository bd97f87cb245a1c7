//! Commands passed into DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use crate::kinematics::ChassisVelocity;
use crate::wheel_module::{ModuleState, NUM_MODULES};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A drive command. The latest command persists until replaced.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum DriveCmd {
    /// Driver demand, subject to heading lock and skew correction.
    ///
    /// Units: meters/second, radians/second
    Manual {
        forward_ms: f64,
        sideways_ms: f64,
        rot_rads: f64,
        field_relative: bool,
    },

    /// Robot-relative chassis velocity, as produced by a trajectory follower.
    ChassisSpeeds(ChassisVelocity),

    /// Raw module targets in FL, FR, BL, BR order.
    ModuleStates([ModuleState; NUM_MODULES]),

    /// Bring all modules to rest, holding their steer angles.
    Stop,

    /// Open-loop duty on every drive actuator, between -1 and +1.
    DirectDrive(f64),

    /// Open-loop duty on every steer actuator, between -1 and +1.
    DirectTurn(f64),
}

/// A request to the autonomous handoff.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum AutoRequest {
    /// Drive to the destination at this 0-based index, `None` for no
    /// selection.
    Goto(Option<usize>),

    /// Drive to whatever the controller's destination selector holds,
    /// consuming the selection.
    GotoSelected,

    /// Cancel any running autonomous command.
    Cancel,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCmd {
    /// `true` if this command should take control back from a running
    /// autonomous command.
    ///
    /// Manual demands only do so once they leave the deadbands, so a resting
    /// joystick doesn't cancel auto.
    pub fn overrides_auto(&self, speed_deadband_ms: f64, rot_deadband_rads: f64) -> bool {
        match *self {
            DriveCmd::Manual { forward_ms, sideways_ms, rot_rads, .. } => {
                forward_ms.hypot(sideways_ms) > speed_deadband_ms
                    || rot_rads.abs() > rot_deadband_rads
            }
            _ => true,
        }
    }
}
