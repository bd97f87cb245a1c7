//! # Skew correction
//!
//! When the chassis rotates while translating, a robot-relative velocity held
//! constant over a tick sweeps round with the chassis and the path curves. The
//! correction re-expresses the velocity in the frame the chassis will have
//! rotated into, projected ahead by `coefficient` seconds of yaw rate.

use crate::kinematics::ChassisVelocity;

/// Compensates translation for chassis rotation.
#[derive(Debug, Copy, Clone)]
pub struct SkewCorrector {
    coefficient: f64,
}

impl SkewCorrector {
    pub fn new(coefficient: f64) -> Self {
        Self { coefficient }
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Correct a robot-relative velocity given the measured yaw rate and the
    /// current heading.
    ///
    /// Exactly zero projected rotation returns the input untouched.
    pub fn correct(
        &self,
        robot_relative: &ChassisVelocity,
        angular_velocity_rads: f64,
        heading_rad: f64,
    ) -> ChassisVelocity {
        let projected_rad = angular_velocity_rads * self.coefficient;
        if projected_rad == 0.0 {
            return *robot_relative;
        }

        let field = robot_relative.to_field_relative(heading_rad);
        ChassisVelocity::from_field_relative(&field, heading_rad + projected_rad)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_no_rotation_is_no_op() {
        let s = SkewCorrector::new(0.3);

        for v in [
            ChassisVelocity::new(1.0, 0.0, 0.0),
            ChassisVelocity::new(-0.3, 2.1, 0.7),
            ChassisVelocity::new(1e-17, -1e17, 0.0),
        ] {
            assert_eq!(s.correct(&v, 0.0, 1.234), v);
        }
    }

    #[test]
    fn test_rotating_skews_against_rotation() {
        let s = SkewCorrector::new(0.3);
        let v = ChassisVelocity::new(1.0, 0.0, 1.0);

        // Rotating anticlockwise at 1 rad/s projects 0.3 rad ahead, so the
        // command is turned 0.3 rad clockwise in the robot frame
        let c = s.correct(&v, 1.0, 0.5);
        assert_abs_diff_eq!(c.vx_ms, 0.3f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(c.vy_ms, -(0.3f64.sin()), epsilon = 1e-12);
        assert_eq!(c.omega_rads, 1.0);
        assert_abs_diff_eq!(c.linear_speed_ms(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_coefficient() {
        let s = SkewCorrector::new(0.0);
        let v = ChassisVelocity::new(1.0, 1.0, 1.0);
        assert_eq!(s.correct(&v, 2.0, 0.0), v);
    }
}
