//! # Localisation module
//!
//! This module provides the drivetrain's best estimate of where it is on the
//! field. Wheel odometry is integrated every tick and corrected by delayed
//! vision measurements, see [`PoseEstimator`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod estimator;
mod odometry;
mod params;
mod pose_history;
mod vision;

pub use estimator::*;
pub use odometry::*;
pub use params::*;
pub use pose_history::*;
pub use vision::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use util::maths::wrap_pi;


// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Below this angle the series expansions of the twist maps are used.
const SMALL_ANGLE_RAD: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose (position and heading) of the robot in the field frame.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose {
    /// The position in the field frame
    ///
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// The field-relative heading, always in (-pi, pi].
    ///
    /// Units: radians
    pub heading_rad: f64,
}

/// An incremental motion expressed in the body frame at its start.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Twist {
    pub dx_m: f64,
    pub dy_m: f64,
    pub dtheta_rad: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while building the pose estimator.
///
/// Only construction can fail, once built the estimator degrades instead of
/// erroring.
#[derive(Debug, Error)]
pub enum PoseEstimatorError {
    #[error("Invalid {0} standard deviations {1:?}, expected finite values >= 0")]
    InvalidStdDevs(&'static str, [f64; 3]),

    #[error("The history window must be positive, found {0} s")]
    InvalidHistoryWindow(f64),

    #[error("The trust table is empty")]
    EmptyTrustTable,

    #[error(
        "Trust band {0} is out of order, distances must increase and standard \
        deviations must not decrease"
    )]
    TrustTableOrder(usize),

    #[error("Trust band {0} contains a negative or non-finite value")]
    InvalidTrustBand(usize),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A source of the robot's heading, normally the gyro.
///
/// Readings return `None` when the sensor has no data this tick, callers must
/// degrade rather than wait.
pub trait HeadingSource: Send + Sync {
    /// Field-relative heading in radians.
    fn heading_rad(&self) -> Option<f64>;

    /// Yaw rate in radians/second, positive anticlockwise.
    fn yaw_rate_rads(&self) -> Option<f64>;

    /// Re-seed the source so that it reports `heading_rad` from now on.
    fn reset_heading(&self, heading_rad: f64);
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad: wrap_pi(heading_rad),
        }
    }

    pub fn x_m(&self) -> f64 {
        self.position_m[0]
    }

    pub fn y_m(&self) -> f64 {
        self.position_m[1]
    }

    /// The rotation from the body frame into the field frame.
    pub fn rotation(&self) -> Rotation2<f64> {
        Rotation2::new(self.heading_rad)
    }

    /// `true` if the position and heading are all finite.
    pub fn is_finite(&self) -> bool {
        self.position_m.iter().all(|v| v.is_finite()) && self.heading_rad.is_finite()
    }

    /// Apply `other`, expressed in this pose's body frame, on top of this
    /// pose.
    pub fn transform_by(&self, other: &Pose) -> Pose {
        Pose {
            position_m: self.position_m + self.rotation() * other.position_m,
            heading_rad: wrap_pi(self.heading_rad + other.heading_rad),
        }
    }

    /// Express this pose in the body frame of `origin`.
    pub fn relative_to(&self, origin: &Pose) -> Pose {
        Pose {
            position_m: origin.rotation().inverse() * (self.position_m - origin.position_m),
            heading_rad: wrap_pi(self.heading_rad - origin.heading_rad),
        }
    }

    /// Move along the constant-curvature arc described by `twist`.
    pub fn exp(&self, twist: &Twist) -> Pose {
        let dtheta = twist.dtheta_rad;
        let (sin_theta, cos_theta) = dtheta.sin_cos();

        let (s, c) = if dtheta.abs() < SMALL_ANGLE_RAD {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        let step = Pose {
            position_m: Vector2::new(
                twist.dx_m * s - twist.dy_m * c,
                twist.dx_m * c + twist.dy_m * s,
            ),
            heading_rad: wrap_pi(dtheta),
        };

        self.transform_by(&step)
    }

    /// The twist which takes this pose to `end`, inverse of [`Pose::exp`].
    pub fn log(&self, end: &Pose) -> Twist {
        let transform = end.relative_to(self);
        let dtheta = transform.heading_rad;
        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = dtheta.cos() - 1.0;

        let half_theta_by_tan_half = if cos_minus_one.abs() < SMALL_ANGLE_RAD {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * dtheta.sin()) / cos_minus_one
        };

        let scale = half_theta_by_tan_half.hypot(half_dtheta);
        let rot = Rotation2::new(f64::atan2(-half_dtheta, half_theta_by_tan_half));
        let translation = rot * transform.position_m * scale;

        Twist {
            dx_m: translation[0],
            dy_m: translation[1],
            dtheta_rad: dtheta,
        }
    }

    /// Interpolate along the twist between this pose and `end`.
    ///
    /// `t` is clamped to [0, 1].
    pub fn interpolate(&self, end: &Pose, t: f64) -> Pose {
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *end;
        }

        self.exp(&self.log(end).scaled(t))
    }
}

impl Twist {
    pub fn new(dx_m: f64, dy_m: f64, dtheta_rad: f64) -> Self {
        Self { dx_m, dy_m, dtheta_rad }
    }

    pub fn scaled(&self, k: f64) -> Self {
        Self::new(self.dx_m * k, self.dy_m * k, self.dtheta_rad * k)
    }
}
