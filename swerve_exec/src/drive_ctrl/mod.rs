//! # Drivetrain control module
//!
//! Drivetrain control turns driver and autonomous demands into wheel module
//! targets each control tick, and keeps the fused field pose up to date.
//!
//! Manual demands pass through the heading lock and skew correction before
//! the kinematics, autonomous demands go straight to the kinematics. Wheel
//! speeds are always desaturated against the active speed limit.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cmd;
mod heading_lock;
mod params;
mod skew;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use cmd::*;
pub use heading_lock::*;
pub use params::*;
pub use skew::*;
pub use state::*;

use crate::{auto::AutoError, kinematics::KinematicsError, loc::PoseEstimatorError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur while building DriveCtrl.
///
/// Once built the controller degrades rather than erroring.
#[derive(Debug, thiserror::Error)]
pub enum DriveCtrlError {
    #[error("Invalid drivetrain parameter {0}: {1}")]
    InvalidParam(&'static str, f64),

    #[error("Invalid module geometry: {0}")]
    Kinematics(#[from] KinematicsError),

    #[error("Could not build the pose estimator: {0}")]
    PoseEstimator(#[from] PoseEstimatorError),

    #[error("Could not build the auto handoff: {0}")]
    Auto(#[from] AutoError),
}
