//! # Trajectories
//!
//! A trajectory is a time-parameterised sequence of field poses and the
//! field-relative velocities which carry the robot between them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::Serialize;
use util::maths::{get_ang_dist, wrap_pi};

use crate::kinematics::ChassisVelocity;
use crate::loc::Pose;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Sample spacing of generated trajectories.
const GENERATED_DT_S: f64 = 0.02;

/// Turn rate used when the rotation takes longer than the translation.
const GENERATED_TURN_RATE_RADS: f64 = 1.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One sample of a trajectory.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct TrajectoryState {
    /// Time since the start of the trajectory.
    ///
    /// Units: seconds
    pub time_s: f64,

    pub pose: Pose,

    /// Feedforward velocity.
    ///
    /// Frame: Field
    pub velocity: ChassisVelocity,
}

/// A trajectory, samples are ordered by time and start at zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    states: Vec<TrajectoryState>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Trajectory {
    /// Build a trajectory from samples, returns `None` if there are none or
    /// they are not strictly increasing in time.
    pub fn new(states: Vec<TrajectoryState>) -> Option<Self> {
        if states.is_empty() || states.windows(2).any(|w| w[1].time_s <= w[0].time_s) {
            return None;
        }
        Some(Self { states })
    }

    /// A straight-line trajectory with a trapezoidal speed profile, turning
    /// at a constant rate to the goal heading.
    pub fn straight_line(start: &Pose, goal: &Pose, max_speed_ms: f64, max_accel_mss: f64) -> Self {
        let delta = goal.position_m - start.position_m;
        let distance_m = delta.norm();
        let dir = if distance_m > 0.0 { delta / distance_m } else { Vector2::zeros() };
        let turn_rad = get_ang_dist(start.heading_rad, goal.heading_rad);

        // Triangle profile if there's no room to reach the cruise speed
        let accel_dist = max_speed_ms * max_speed_ms / (2.0 * max_accel_mss);
        let (peak_ms, accel_time_s, cruise_time_s) = if 2.0 * accel_dist >= distance_m {
            let peak = (distance_m * max_accel_mss).sqrt();
            (peak, peak / max_accel_mss, 0.0)
        } else {
            (max_speed_ms, max_speed_ms / max_accel_mss, (distance_m - 2.0 * accel_dist) / max_speed_ms)
        };

        // At least one tick, so pure rotations still have a duration
        let duration_s = (2.0 * accel_time_s + cruise_time_s).max(turn_rad.abs() / GENERATED_TURN_RATE_RADS).max(GENERATED_DT_S);
        let omega_rads = turn_rad / duration_s;

        let profile = |t: f64| -> (f64, f64) {
            if t < accel_time_s {
                (0.5 * max_accel_mss * t * t, max_accel_mss * t)
            } else if t < accel_time_s + cruise_time_s {
                let tc = t - accel_time_s;
                (0.5 * max_accel_mss * accel_time_s * accel_time_s + peak_ms * tc, peak_ms)
            } else {
                let td = (t - accel_time_s - cruise_time_s).min(accel_time_s);
                let s = distance_m - 0.5 * max_accel_mss * (accel_time_s - td).powi(2);
                (s, (peak_ms - max_accel_mss * td).max(0.0))
            }
        };

        let num = (duration_s / GENERATED_DT_S).ceil() as usize;
        let mut states = Vec::with_capacity(num + 1);
        for i in 0..=num {
            let t = (i as f64 * GENERATED_DT_S).min(duration_s);
            let (s, v) = if 2.0 * accel_time_s + cruise_time_s > 0.0 {
                profile(t.min(2.0 * accel_time_s + cruise_time_s))
            } else {
                (0.0, 0.0)
            };
            let w = if i == num { 0.0 } else { omega_rads };
            let vel = dir * v;
            states.push(TrajectoryState {
                time_s: t,
                pose: Pose {
                    position_m: start.position_m + dir * s,
                    heading_rad: wrap_pi(start.heading_rad + omega_rads * t),
                },
                velocity: ChassisVelocity::new(vel[0], vel[1], w),
            });
            if t >= duration_s {
                break;
            }
        }

        // Land exactly on the goal
        if let Some(last) = states.last_mut() {
            last.pose = *goal;
            last.velocity = ChassisVelocity::default();
        }

        Self { states }
    }

    /// Total duration.
    ///
    /// Units: seconds
    pub fn duration_s(&self) -> f64 {
        self.states.last().map(|s| s.time_s).unwrap_or(0.0)
    }

    pub fn initial_state(&self) -> &TrajectoryState {
        &self.states[0]
    }

    pub fn end_state(&self) -> &TrajectoryState {
        &self.states[self.states.len() - 1]
    }

    pub fn states(&self) -> &[TrajectoryState] {
        &self.states
    }

    /// Sample the trajectory at `time_s`, clamped to its duration.
    pub fn sample(&self, time_s: f64) -> TrajectoryState {
        let first = self.initial_state();
        let last = self.end_state();

        if time_s <= first.time_s {
            return *first;
        }
        if time_s >= last.time_s {
            return *last;
        }

        let upper = self.states.partition_point(|s| s.time_s <= time_s);
        let a = &self.states[upper - 1];
        let b = &self.states[upper];
        let k = (time_s - a.time_s) / (b.time_s - a.time_s);

        let lerp = |x: f64, y: f64| x + (y - x) * k;

        TrajectoryState {
            time_s,
            pose: Pose {
                position_m: a.pose.position_m + (b.pose.position_m - a.pose.position_m) * k,
                heading_rad: wrap_pi(a.pose.heading_rad + get_ang_dist(a.pose.heading_rad, b.pose.heading_rad) * k),
            },
            velocity: ChassisVelocity::new(
                lerp(a.velocity.vx_ms, b.velocity.vx_ms),
                lerp(a.velocity.vy_ms, b.velocity.vy_ms),
                lerp(a.velocity.omega_rads, b.velocity.omega_rads),
            ),
        }
    }
}
