//! # Data Store

use log::{info, warn};

use crate::{auto::DestinationSelector, drive_ctrl};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the drivetrain has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    MakeSafeTc,
    DriveCtrlFault,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    /// Session elapsed time at the start of the cycle
    pub time_s: f64,

    // Safe mode variables
    /// Determines if the drivetrain is in safe mode.
    pub safe: bool,

    /// Gives the reason for the drivetrain being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // DriveCtrl
    pub drive_ctrl_input: drive_ctrl::InputData,
    pub drive_ctrl_output: Option<drive_ctrl::OutputData>,
    pub drive_ctrl_status_rpt: drive_ctrl::StatusReport,

    // Autonomy
    /// Destination picked by the operator, consumed by the next auto request
    pub destination_selector: DestinationSelector,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Puts the drivetrain into safe mode with the given cause.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);
        }
    }

    /// Attempts to disable the safe mode by clearing the given cause.
    ///
    /// Returns `Ok(())` if this cause was cleared and safe mode was disabled, or `Err(())`
    /// otherwise. To remove safe mode the provided cause must match the initial reason for safe
    /// mode being enabled.
    ///
    /// If safe mode was not enabled `Ok(())` is returned
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), ()> {
        if !self.safe {
            return Ok(());
        }

        match self.safe_cause {
            Some(root_cause) if root_cause != cause => Err(()),
            _ => {
                self.safe = false;
                self.safe_cause = None;
                info!("Make unsafe requested, root cause match, safe mode disabled");
                Ok(())
            }
        }
    }

    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64, time_s: f64) {
        self.is_1_hz_cycle = self.num_cycles % (cycle_frequency_hz as u128).max(1) == 0;

        self.time_s = time_s;
        self.drive_ctrl_input = drive_ctrl::InputData {
            time_s,
            ..drive_ctrl::InputData::default()
        };
        self.drive_ctrl_output = None;
        self.drive_ctrl_status_rpt = drive_ctrl::StatusReport::default();
    }

    /// Perform actions required at the end of input processing, before
    /// drivetrain control runs.
    pub fn inputs_done(&mut self) {
        self.drive_ctrl_input.make_safe = self.safe;
    }
}
