//! # Trajectory followers
//!
//! Followers turn the difference between the measured pose and the current
//! trajectory sample into a robot-relative chassis velocity demand.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;
use util::maths::get_ang_dist;

use crate::kinematics::ChassisVelocity;
use crate::loc::Pose;

use super::{params::AutoParams, trajectory::TrajectoryState};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Something which can track a trajectory.
pub trait TrajectoryFollower: Send {
    /// Compute the robot-relative demand which moves `pose` onto `target`.
    fn calculate(&mut self, time_s: f64, pose: &Pose, target: &TrajectoryState) -> ChassisVelocity;

    /// Forget any accumulated state, called before a new trajectory starts.
    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Time at which the previous error was passed in
    prev_time_s: Option<f64>,

    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Derivative gain
    k_d: f64,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64,
}

/// Feedforward plus proportional feedback on each field axis and on heading.
#[derive(Debug, Serialize, Clone)]
pub struct HolonomicFollower {
    x_ctrl: PidController,
    y_ctrl: PidController,
    head_ctrl: PidController,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            integral: 0f64,
            prev_time_s: None,
            prev_error: None,
        }
    }

    /// Get the value of the controller for the given error at `time_s`.
    pub fn get(&mut self, error: f64, time_s: f64) -> f64 {
        let dt = match self.prev_time_s {
            Some(t0) if time_s > t0 => Some(time_s - t0),
            _ => None,
        };

        // No time difference means no integral or derivative contribution,
        // anything else produces a spike on the first call.
        self.integral += match dt {
            Some(t) => error * t,
            None => 0f64,
        };

        let deriv = match (self.prev_error, dt) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0f64,
        };

        let out = self.k_p * error + self.k_i * self.integral + self.k_d * deriv;

        self.prev_error = Some(error);
        self.prev_time_s = Some(time_s);

        out
    }

    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = None;
        self.prev_time_s = None;
    }
}

impl HolonomicFollower {
    pub fn new(params: &AutoParams) -> Self {
        Self {
            x_ctrl: PidController::new(params.translation_k_p, 0.0, 0.0),
            y_ctrl: PidController::new(params.translation_k_p, 0.0, 0.0),
            head_ctrl: PidController::new(params.rotation_k_p, 0.0, 0.0),
        }
    }
}

impl TrajectoryFollower for HolonomicFollower {
    fn calculate(&mut self, time_s: f64, pose: &Pose, target: &TrajectoryState) -> ChassisVelocity {
        let pos_err = target.pose.position_m - pose.position_m;
        let head_err = get_ang_dist(pose.heading_rad, target.pose.heading_rad);

        let field = ChassisVelocity::new(
            target.velocity.vx_ms + self.x_ctrl.get(pos_err[0], time_s),
            target.velocity.vy_ms + self.y_ctrl.get(pos_err[1], time_s),
            target.velocity.omega_rads + self.head_ctrl.get(head_err, time_s),
        );

        ChassisVelocity::from_field_relative(&field, pose.heading_rad)
    }

    fn reset(&mut self) {
        self.x_ctrl.reset();
        self.y_ctrl.reset();
        self.head_ctrl.reset();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_pid() {
        let mut pid = PidController::new(2.0, 1.0, 0.5);

        // First call is proportional only
        assert_abs_diff_eq!(pid.get(1.0, 0.0), 2.0);

        // integral = 0.25, deriv = (0.5 - 1.0) / 0.5 = -1.0
        assert_abs_diff_eq!(pid.get(0.5, 0.5), 1.0 + 0.25 - 0.5);

        pid.reset();
        assert_abs_diff_eq!(pid.get(1.0, 1.0), 2.0);
    }

    #[test]
    fn test_on_target_is_feedforward() {
        let mut follower = HolonomicFollower::new(&AutoParams::default());
        let target = TrajectoryState {
            time_s: 0.0,
            pose: Pose::new(1.0, 2.0, FRAC_PI_2),
            velocity: ChassisVelocity::new(1.0, 0.0, 0.0),
        };

        // Robot facing +y, so field +x is to its right
        let cmd = follower.calculate(0.0, &target.pose, &target);
        assert_abs_diff_eq!(cmd.vx_ms, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cmd.vy_ms, -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cmd.omega_rads, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_corrects_error() {
        let params = AutoParams::default();
        let mut follower = HolonomicFollower::new(&params);
        let target = TrajectoryState {
            time_s: 0.0,
            pose: Pose::new(1.0, 0.0, 0.1),
            velocity: ChassisVelocity::default(),
        };

        let cmd = follower.calculate(0.0, &Pose::default(), &target);
        assert_abs_diff_eq!(cmd.vx_ms, params.translation_k_p, epsilon = 1e-9);
        assert_abs_diff_eq!(cmd.vy_ms, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cmd.omega_rads, 0.1 * params.rotation_k_p, epsilon = 1e-9);
    }
}
