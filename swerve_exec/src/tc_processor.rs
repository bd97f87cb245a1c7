//! # Telecommand processor module
//!
//! The telecommand processor handles various TCs coming from any source.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;

// Internal
use comms_if::tc::Tc;
use crate::data_store::{DataStore, SafeModeCause};
use crate::drive_ctrl::{AutoRequest, DriveCmd};
use crate::loc::Pose;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a telecommand.
///
/// Mutates the datastore to send commands to different modules.
pub fn exec(ds: &mut DataStore, tc: &Tc) {
    debug!("Executing TC: {:?}", tc);

    match *tc {
        Tc::MakeSafe => ds.make_safe(SafeModeCause::MakeSafeTc),
        Tc::MakeUnsafe => {
            ds.make_unsafe(SafeModeCause::MakeSafeTc).ok();
        }
        Tc::Drive { forward_ms, sideways_ms, rot_rads, field_relative } => {
            ds.drive_ctrl_input.cmd = Some(DriveCmd::Manual { forward_ms, sideways_ms, rot_rads, field_relative })
        }
        Tc::Stop => ds.drive_ctrl_input.cmd = Some(DriveCmd::Stop),
        Tc::SetHeadingLock(e) => ds.drive_ctrl_input.heading_lock = Some(e),
        Tc::SetSlowMode(s) => ds.drive_ctrl_input.slow_mode = Some(s),
        Tc::SetDriveEnabled(d) => ds.drive_ctrl_input.drive_enabled = Some(d),
        Tc::AutoGoto { destination } => {
            ds.destination_selector.select(destination);
            ds.drive_ctrl_input.auto = Some(AutoRequest::GotoSelected);
        }
        Tc::CancelAuto => ds.drive_ctrl_input.auto = Some(AutoRequest::Cancel),
        Tc::ResetPose { x_m, y_m, heading_rad } => {
            ds.drive_ctrl_input.reset_pose = Some(Pose::new(x_m, y_m, heading_rad))
        }
    }
}
