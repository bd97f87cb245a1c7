//! # Pose estimator
//!
//! Fuses high-rate wheel odometry with delayed vision measurements.
//!
//! Each accepted vision measurement is stored alongside the odometry pose at
//! its capture time. The current estimate is the newest correction with all
//! odometry since its capture time re-applied on top, so a late measurement
//! corrects the past without discarding the motion that followed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Serialize;

// Internal
use comms_if::eqpt::vision::VisionSourceId;
use super::{Pose, PoseEstimatorError, PoseEstimatorParams, PoseHistory, SwerveOdometry, Twist};
use crate::kinematics::SwerveKinematics;
use crate::wheel_module::{ModulePosition, NUM_MODULES};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A pose measurement from a vision source.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct VisionMeasurement {
    pub source: VisionSourceId,

    pub pose: Pose,

    /// Capture time on the session clock.
    ///
    /// Units: seconds
    pub timestamp_s: f64,

    /// Standard deviations of the measurement in x, y and heading. Smaller is
    /// more trusted, zero snaps the estimate onto the measurement.
    pub std_devs: [f64; 3],
}

/// The fused pose estimator.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    odometry: SwerveOdometry,

    odometry_history: PoseHistory,

    /// Accepted corrections, ordered by capture time.
    vision_updates: Vec<(f64, VisionUpdate)>,

    /// Variance of the odometry state in x, y and heading.
    state_variance: [f64; 3],

    /// Capture time of the last accepted measurement from each source.
    last_accepted_s: [Option<f64>; 2],

    estimate: Pose,
}

/// A correction and the odometry pose it was made against.
#[derive(Debug, Copy, Clone)]
struct VisionUpdate {
    vision_pose: Pose,
    odometry_pose: Pose,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What happened to a vision measurement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum VisionOutcome {
    /// The measurement corrected the estimate.
    Applied,

    /// Not newer than the last accepted measurement from the same source.
    Stale,

    /// Captured before the start of the odometry history.
    OutsideWindow,

    /// No odometry has been recorded yet.
    NoHistory,

    /// The standard deviations were negative or NaN.
    InvalidTrust,

    /// The pose or capture time was not finite.
    InvalidMeasurement,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseEstimator {
    pub fn new(
        params: &PoseEstimatorParams,
        kinematics: SwerveKinematics,
        gyro_rad: Option<f64>,
        positions: &[ModulePosition; NUM_MODULES],
        initial_pose: Pose,
    ) -> Result<Self, PoseEstimatorError> {
        params.validate()?;

        Ok(Self {
            odometry: SwerveOdometry::new(kinematics, gyro_rad, positions, initial_pose),
            odometry_history: PoseHistory::new(params.history_window_s),
            vision_updates: Vec::new(),
            state_variance: params.state_std_devs.map(|s| s * s),
            last_accepted_s: [None; 2],
            estimate: initial_pose,
        })
    }

    /// Integrate this tick's odometry, returning the new estimate.
    pub fn update_odometry(
        &mut self,
        time_s: f64,
        gyro_rad: Option<f64>,
        positions: &[ModulePosition; NUM_MODULES],
    ) -> Pose {
        let odom_pose = self.odometry.update(gyro_rad, positions);
        self.odometry_history.add(time_s, odom_pose);

        self.estimate = match self.vision_updates.last() {
            Some((_, u)) => u.compensate(&odom_pose),
            None => odom_pose
        };

        self.estimate
    }

    /// Apply a vision measurement against the pose history.
    pub fn add_vision_measurement(&mut self, m: &VisionMeasurement) -> VisionOutcome {
        if !m.timestamp_s.is_finite() || !m.pose.is_finite() {
            debug!("Dropping non-finite {} measurement {:?} at {} s", m.source, m.pose, m.timestamp_s);
            return VisionOutcome::InvalidMeasurement;
        }

        if m.std_devs.iter().any(|s| s.is_nan() || *s < 0.0) {
            return VisionOutcome::InvalidTrust;
        }

        if let Some(last) = self.last_accepted_s[m.source.index()] {
            if m.timestamp_s <= last {
                trace!(
                    "Dropping stale {} measurement ({} s <= {} s)", 
                    m.source, m.timestamp_s, last
                );
                return VisionOutcome::Stale;
            }
        }

        let newest_s = match self.odometry_history.last_time_s() {
            Some(t) => t,
            None => return VisionOutcome::NoHistory
        };
        if m.timestamp_s < newest_s - self.odometry_history.window_s() {
            debug!(
                "Dropping {} measurement from {:.3} s, older than the history window",
                m.source, m.timestamp_s
            );
            return VisionOutcome::OutsideWindow;
        }

        self.clean_up_vision_updates();

        let (odometry_sample, vision_sample) = match (
            self.odometry_history.sample(m.timestamp_s), 
            self.pose_at(m.timestamp_s)
        ) {
            (Some(o), Some(v)) => (o, v),
            _ => return VisionOutcome::NoHistory
        };

        let residual = vision_sample.log(&m.pose);
        let gain = self.gains(&m.std_devs);
        let correction = Twist::new(
            residual.dx_m * gain[0],
            residual.dy_m * gain[1],
            residual.dtheta_rad * gain[2],
        );

        let update = VisionUpdate {
            vision_pose: vision_sample.exp(&correction),
            odometry_pose: odometry_sample,
        };

        // Anything captured after this measurement was made against a history
        // which no longer holds
        let keep = self.vision_updates.partition_point(|(t, _)| *t < m.timestamp_s);
        self.vision_updates.truncate(keep);
        self.vision_updates.push((m.timestamp_s, update));

        self.estimate = update.compensate(&self.odometry.pose());
        self.last_accepted_s[m.source.index()] = Some(m.timestamp_s);

        trace!(
            "Applied {} measurement at {:.3} s with gains {:?}, estimate now {:?}",
            m.source, m.timestamp_s, gain, self.estimate
        );

        VisionOutcome::Applied
    }

    /// The current fused pose.
    pub fn get_estimated_pose(&self) -> Pose {
        self.estimate
    }

    /// The fused pose at a past time, `None` before any odometry.
    pub fn pose_at(&self, time_s: f64) -> Option<Pose> {
        if !time_s.is_finite() {
            return None;
        }

        let first_update_s = match self.vision_updates.first() {
            Some((t, _)) => *t,
            None => return self.odometry_history.sample(time_s)
        };

        let oldest = self.odometry_history.first_time_s()?;
        let newest = self.odometry_history.last_time_s()?;
        let t = time_s.clamp(oldest, newest);

        if t < first_update_s {
            return self.odometry_history.sample(t);
        }

        let floor = self.vision_updates.partition_point(|(ut, _)| *ut <= t) - 1;
        let (_, update) = self.vision_updates[floor];

        self.odometry_history.sample(t).map(|p| update.compensate(&p))
    }

    /// Re-seed the estimate, discarding all history.
    pub fn reset_pose(
        &mut self,
        pose: Pose,
        gyro_rad: Option<f64>,
        positions: &[ModulePosition; NUM_MODULES],
    ) {
        self.odometry.reset(pose, gyro_rad, positions);
        self.odometry_history.clear();
        self.vision_updates.clear();
        self.estimate = pose;
    }

    /// The pure odometry pose, without vision corrections.
    pub fn odometry_pose(&self) -> Pose {
        self.odometry.pose()
    }

    /// Per-axis Kalman gain for a measurement with the given standard
    /// deviations.
    fn gains(&self, std_devs: &[f64; 3]) -> [f64; 3] {
        let mut k = [0.0; 3];
        for i in 0..3 {
            let q = self.state_variance[i];
            let r = std_devs[i] * std_devs[i];
            k[i] = if q == 0.0 { 0.0 } else { q / (q + (q * r).sqrt()) };
        }
        k
    }

    /// Drop corrections which can no longer be reached by a new measurement,
    /// keeping the newest one at or before the start of the history.
    fn clean_up_vision_updates(&mut self) {
        let oldest_s = match self.odometry_history.first_time_s() {
            Some(t) => t,
            None => return
        };

        match self.vision_updates.first() {
            Some((t, _)) if oldest_s >= *t => (),
            _ => return
        }

        let newest_needed = self.vision_updates.partition_point(|(t, _)| *t <= oldest_s) - 1;
        self.vision_updates.drain(..newest_needed);
    }
}

impl VisionUpdate {
    /// Re-apply the odometry motion since this correction on top of it.
    fn compensate(&self, pose: &Pose) -> Pose {
        self.vision_pose.transform_by(&pose.relative_to(&self.odometry_pose))
    }
}
