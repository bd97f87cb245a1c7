//! # Swerve kinematics
//!
//! Maps a robot-relative chassis velocity onto the four module states and
//! back. The forward map is exact, the inverse map solves the same linear
//! system in the least-squares sense over the four measured modules.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod desaturate;
pub use desaturate::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Rotation2, SMatrix, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use crate::loc::Twist;
use crate::wheel_module::{ModuleCorner, ModulePosition, ModuleState, NUM_MODULES};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Offsets closer than this are considered coincident.
const GEOMETRY_TOLERANCE_M: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A chassis velocity.
///
/// Whether this is robot-relative or field-relative is given by the function
/// consuming or producing it.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChassisVelocity {
    /// Linear velocity along the x (forward) axis in meters/second.
    pub vx_ms: f64,

    /// Linear velocity along the y (left) axis in meters/second.
    pub vy_ms: f64,

    /// Angular velocity in radians/second, positive anticlockwise.
    pub omega_rads: f64,
}

/// The offsets of the four modules from the chassis rotation centre.
///
/// Units: meters
/// Frame: Robot body, x forward, y left
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleGeometry {
    pub front_left_m: [f64; 2],
    pub front_right_m: [f64; 2],
    pub back_left_m: [f64; 2],
    pub back_right_m: [f64; 2],
}

/// Kinematics for a fixed, validated module geometry.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    offsets_m: [Vector2<f64>; NUM_MODULES],

    /// Maps the chassis velocity to the stacked module velocity vectors.
    forward: SMatrix<f64, 8, 3>,

    /// Least-squares inverse of `forward`.
    inverse: SMatrix<f64, 3, 8>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors from building the kinematics, all of them fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum KinematicsError {
    #[error("The offset of the {0:?} module is not finite")]
    NonFiniteOffset(ModuleCorner),

    #[error("The {0:?} and {1:?} modules are at the same position")]
    CoincidentModules(ModuleCorner, ModuleCorner),

    #[error("All module offsets lie on a single line")]
    CollinearModules,

    #[error("The module geometry cannot be inverted")]
    Degenerate,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChassisVelocity {
    pub fn new(vx_ms: f64, vy_ms: f64, omega_rads: f64) -> Self {
        Self { vx_ms, vy_ms, omega_rads }
    }

    /// Convert a field-relative velocity into the robot frame, given the
    /// robot's field heading.
    pub fn from_field_relative(field: &ChassisVelocity, heading_rad: f64) -> Self {
        let v = Rotation2::new(-heading_rad) * Vector2::new(field.vx_ms, field.vy_ms);
        Self::new(v[0], v[1], field.omega_rads)
    }

    /// Convert this robot-relative velocity into the field frame.
    pub fn to_field_relative(&self, heading_rad: f64) -> Self {
        let v = Rotation2::new(heading_rad) * Vector2::new(self.vx_ms, self.vy_ms);
        Self::new(v[0], v[1], self.omega_rads)
    }

    /// Magnitude of the linear component.
    pub fn linear_speed_ms(&self) -> f64 {
        self.vx_ms.hypot(self.vy_ms)
    }
}

impl ModuleGeometry {
    /// A rectangular chassis with modules at `(+-half_length, +-half_width)`.
    pub fn rectangular(half_length_m: f64, half_width_m: f64) -> Self {
        Self {
            front_left_m: [half_length_m, half_width_m],
            front_right_m: [half_length_m, -half_width_m],
            back_left_m: [-half_length_m, half_width_m],
            back_right_m: [-half_length_m, -half_width_m],
        }
    }

    /// Offsets in [`ModuleCorner::ALL`] order.
    pub fn offsets(&self) -> [[f64; 2]; NUM_MODULES] {
        [self.front_left_m, self.front_right_m, self.back_left_m, self.back_right_m]
    }
}

impl SwerveKinematics {
    /// Build the kinematics, rejecting geometries which cannot be driven.
    pub fn new(geometry: &ModuleGeometry) -> Result<Self, KinematicsError> {
        let raw = geometry.offsets();

        for (corner, o) in ModuleCorner::ALL.iter().zip(raw.iter()) {
            if !o[0].is_finite() || !o[1].is_finite() {
                return Err(KinematicsError::NonFiniteOffset(*corner));
            }
        }

        let offsets_m = raw.map(|o| Vector2::new(o[0], o[1]));

        for i in 0..NUM_MODULES {
            for j in (i + 1)..NUM_MODULES {
                if (offsets_m[i] - offsets_m[j]).norm() < GEOMETRY_TOLERANCE_M {
                    return Err(KinematicsError::CoincidentModules(
                        ModuleCorner::ALL[i],
                        ModuleCorner::ALL[j],
                    ));
                }
            }
        }

        // All points are on the line through the first two if every cross
        // product with that line vanishes
        let dir = offsets_m[1] - offsets_m[0];
        let collinear = offsets_m[2..].iter().all(|p| {
            let rel = p - offsets_m[0];
            (dir[0] * rel[1] - dir[1] * rel[0]).abs() < GEOMETRY_TOLERANCE_M * dir.norm()
        });
        if collinear {
            return Err(KinematicsError::CollinearModules);
        }

        // Each module contributes two rows: [1, 0, -y] and [0, 1, x]
        let mut forward = SMatrix::<f64, 8, 3>::zeros();
        for (i, o) in offsets_m.iter().enumerate() {
            forward[(2 * i, 0)] = 1.0;
            forward[(2 * i, 2)] = -o[1];
            forward[(2 * i + 1, 1)] = 1.0;
            forward[(2 * i + 1, 2)] = o[0];
        }

        let inverse = (forward.transpose() * forward)
            .try_inverse()
            .ok_or(KinematicsError::Degenerate)?
            * forward.transpose();

        Ok(Self { offsets_m, forward, inverse })
    }

    /// The module offsets in [`ModuleCorner::ALL`] order.
    pub fn offsets_m(&self) -> &[Vector2<f64>; NUM_MODULES] {
        &self.offsets_m
    }

    /// Compute the module targets for a robot-relative chassis velocity.
    ///
    /// A module with zero velocity is given an angle of zero, the wheel module
    /// holds its steer angle at low speed so this is never acted on.
    pub fn to_module_states(&self, robot_relative: &ChassisVelocity) -> [ModuleState; NUM_MODULES] {
        let chassis = Vector3::new(
            robot_relative.vx_ms,
            robot_relative.vy_ms,
            robot_relative.omega_rads,
        );
        let module_vecs = self.forward * chassis;

        let mut states = [ModuleState::default(); NUM_MODULES];
        for (i, s) in states.iter_mut().enumerate() {
            let vx = module_vecs[2 * i];
            let vy = module_vecs[2 * i + 1];
            let speed_ms = vx.hypot(vy);

            *s = if speed_ms == 0.0 {
                ModuleState::new(0.0, 0.0)
            } else {
                ModuleState::new(speed_ms, vy.atan2(vx))
            };
        }

        states
    }

    /// Compute the robot-relative chassis velocity from measured module
    /// states.
    pub fn to_chassis_velocity(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisVelocity {
        let v = self.solve(states.map(|s| (s.speed_ms, s.angle_rad)));
        ChassisVelocity::new(v[0], v[1], v[2])
    }

    /// Compute the body-frame twist implied by the change in module
    /// positions.
    ///
    /// `deltas` carry the distance travelled since the last update and the
    /// current module angle.
    pub fn to_twist(&self, deltas: &[ModulePosition; NUM_MODULES]) -> Twist {
        let v = self.solve(deltas.map(|d| (d.distance_m, d.angle_rad)));
        Twist::new(v[0], v[1], v[2])
    }

    fn solve(&self, polar: [(f64, f64); NUM_MODULES]) -> Vector3<f64> {
        let mut b = SMatrix::<f64, 8, 1>::zeros();
        for (i, (mag, angle)) in polar.iter().enumerate() {
            b[2 * i] = mag * angle.cos();
            b[2 * i + 1] = mag * angle.sin();
        }

        self.inverse * b
    }
}
