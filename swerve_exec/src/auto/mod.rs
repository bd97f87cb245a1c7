//! # Auto path handoff
//!
//! Given a selected destination and the fused pose, the handoff asks the
//! pathfinder for the best trajectory to that destination and follows it.
//! The request runs on a worker thread, the resulting [`AutoCommand`] is
//! polled once per control tick and never blocks it.
//!
//! Commands can be cancelled cooperatively through an [`AutoCancelHandle`].
//! A cancelled, failed or finished command always leaves the drivetrain
//! stopped, control then returns to manual driving.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod follower;
pub mod params;
pub mod trajectory;
mod worker;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::{Receiver, TryRecvError},
    Arc,
};

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;
use util::maths::get_ang_dist;

use crate::kinematics::ChassisVelocity;
use crate::loc::Pose;

pub use follower::*;
pub use params::*;
pub use trajectory::*;
use worker::WorkerSignal;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Computes trajectories to destinations.
pub trait Pathfinder: Send + Sync {
    /// The best trajectory from `start` over the destination's candidate
    /// paths.
    ///
    /// This may take a long time, it is only ever called from a worker
    /// thread.
    fn best_trajectory(&self, start: &Pose, destination: &Destination) -> Result<Trajectory, AutoError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Builds [`AutoCommand`]s for selected destinations.
pub struct AutoPathHandoff {
    params: AutoParams,
    pathfinder: Option<Arc<dyn Pathfinder>>,
}

/// A cancellable unit of autonomous driving work.
pub struct AutoCommand {
    /// Destination name, `None` for a no-op command.
    name: Option<String>,

    state: AutoState,

    /// Pending path request
    request: Option<Receiver<WorkerSignal>>,

    /// Trajectory being followed and the time it started
    trajectory: Option<(Trajectory, f64)>,

    follower: Box<dyn TrajectoryFollower>,

    cancel: AutoCancelHandle,

    position_tolerance_m: f64,
    heading_tolerance_rad: f64,
    settle_time_s: f64,
}

/// Shared flag used to cancel an [`AutoCommand`] from outside the control
/// tick.
#[derive(Debug, Clone, Default)]
pub struct AutoCancelHandle(Arc<AtomicBool>);

/// One-shot destination selection.
///
/// Selections are 1-based so that zero can mean "nothing selected". Taking
/// a selection resets it.
#[derive(Debug, Clone, Default)]
pub struct DestinationSelector(Arc<AtomicUsize>);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum AutoState {
    /// Waiting on the pathfinder
    Pending,

    /// Driving along the trajectory
    Following,

    Finished,
    Cancelled,
    Failed,
}

/// Output of one tick of an [`AutoCommand`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AutoStep {
    /// Drive at this robot-relative velocity
    Drive(ChassisVelocity),

    /// No trajectory yet, hold still
    Hold,

    /// The command is over, stop and return to manual control
    Done(AutoState),
}

#[derive(Debug, Error)]
pub enum AutoError {
    #[error("Invalid auto parameter {0}: {1}")]
    InvalidParam(&'static str, f64),

    #[error("Destination {0} has no candidate paths")]
    NoCandidates(String),

    #[error("No path to {0} could be found")]
    NoPath(String),

    #[error("Could not start the path request worker: {0}")]
    WorkerSpawn(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AutoPathHandoff {
    /// Create the handoff, `pathfinder` may be `None` when no pathfinder is
    /// available, all commands are then no-ops.
    pub fn new(params: AutoParams, pathfinder: Option<Arc<dyn Pathfinder>>) -> Result<Self, AutoError> {
        let checks = [
            ("translation_k_p", params.translation_k_p),
            ("rotation_k_p", params.rotation_k_p),
            ("position_tolerance_m", params.position_tolerance_m),
            ("heading_tolerance_rad", params.heading_tolerance_rad),
            ("settle_time_s", params.settle_time_s),
        ];
        for &(name, value) in checks.iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(AutoError::InvalidParam(name, value));
            }
        }

        Ok(Self { params, pathfinder })
    }

    /// Build the command which drives to the destination at `destination`
    /// (0-based index into the destination table) from `pose`.
    ///
    /// Returns a no-op command if dynamic pathfinding is disabled, there is
    /// no pathfinder, nothing is selected or the selection is unknown.
    pub fn get_auto_command(&self, destination: Option<usize>, pose: &Pose) -> AutoCommand {
        if !self.params.dynamic_pathfinding_enabled {
            info!("Dynamic pathfinding disabled, auto command is a no-op");
            return AutoCommand::noop();
        }

        let pathfinder = match self.pathfinder {
            Some(ref p) => p.clone(),
            None => {
                warn!("No pathfinder available, auto command is a no-op");
                return AutoCommand::noop();
            }
        };

        let destination = match destination {
            Some(i) => match self.params.destinations.get(i) {
                Some(d) => d.clone(),
                None => {
                    warn!(
                        "Destination {} is not in the table ({} destinations), auto command is a no-op",
                        i,
                        self.params.destinations.len()
                    );
                    return AutoCommand::noop();
                }
            },
            None => return AutoCommand::noop(),
        };

        info!("Requesting auto path to {}", destination.name);

        let mut cmd = AutoCommand::new(&self.params, destination.name.clone());

        match worker::spawn_request(pathfinder, *pose, destination) {
            Ok(r) => cmd.request = Some(r),
            Err(e) => {
                warn!("{}", e);
                cmd.state = AutoState::Failed;
            }
        }

        cmd
    }
}

impl AutoCommand {
    fn new(params: &AutoParams, name: String) -> Self {
        Self {
            name: Some(name),
            state: AutoState::Pending,
            request: None,
            trajectory: None,
            follower: Box::new(HolonomicFollower::new(params)),
            cancel: AutoCancelHandle::default(),
            position_tolerance_m: params.position_tolerance_m,
            heading_tolerance_rad: params.heading_tolerance_rad,
            settle_time_s: params.settle_time_s,
        }
    }

    /// A command that does nothing and is immediately finished.
    pub fn noop() -> Self {
        let mut cmd = Self::new(&AutoParams::default(), String::new());
        cmd.name = None;
        cmd.state = AutoState::Finished;
        cmd
    }

    pub fn is_noop(&self) -> bool {
        self.name.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> AutoState {
        self.state
    }

    pub fn cancel_handle(&self) -> AutoCancelHandle {
        self.cancel.clone()
    }

    /// Cancel the command, takes effect immediately.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.check_cancelled();
    }

    /// The trajectory being followed, if the pathfinder has returned one.
    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.trajectory.as_ref().map(|(t, _)| t)
    }

    /// Advance the command by one control tick.
    pub fn step(&mut self, time_s: f64, pose: &Pose) -> AutoStep {
        self.check_cancelled();

        match self.state {
            AutoState::Pending => self.mode_pending(time_s, pose),
            AutoState::Following => self.mode_following(time_s, pose),
            s => AutoStep::Done(s),
        }
    }

    fn check_cancelled(&mut self) {
        if self.cancel.is_cancelled() && !self.state.is_terminal() {
            info!("Auto command to {} cancelled", self.name.as_deref().unwrap_or("-"));
            self.state = AutoState::Cancelled;
            self.request = None;
        }
    }

    fn mode_pending(&mut self, time_s: f64, pose: &Pose) -> AutoStep {
        let signal = match self.request {
            Some(ref r) => r.try_recv(),
            None => Err(TryRecvError::Disconnected),
        };

        match signal {
            Ok(WorkerSignal::PathFound(traj)) => {
                info!(
                    "Following path to {} ({:.2} s)",
                    self.name.as_deref().unwrap_or("-"),
                    traj.duration_s()
                );
                self.request = None;
                self.trajectory = Some((*traj, time_s));
                self.follower.reset();
                self.state = AutoState::Following;
                self.mode_following(time_s, pose)
            }
            Ok(WorkerSignal::NoPath(e)) => {
                warn!("Auto command failed: {}", e);
                self.request = None;
                self.state = AutoState::Failed;
                AutoStep::Done(self.state)
            }
            Err(TryRecvError::Empty) => AutoStep::Hold,
            Err(TryRecvError::Disconnected) => {
                warn!("Path request worker stopped without a result");
                self.request = None;
                self.state = AutoState::Failed;
                AutoStep::Done(self.state)
            }
        }
    }

    fn mode_following(&mut self, time_s: f64, pose: &Pose) -> AutoStep {
        let (traj, start_s) = match self.trajectory {
            Some((ref t, s)) => (t, s),
            None => {
                self.state = AutoState::Failed;
                return AutoStep::Done(self.state);
            }
        };

        let elapsed_s = time_s - start_s;

        if elapsed_s >= traj.duration_s() {
            let end = traj.end_state().pose;
            let pos_err = (end.position_m - pose.position_m).norm();
            let head_err = get_ang_dist(pose.heading_rad, end.heading_rad).abs();

            if pos_err <= self.position_tolerance_m && head_err <= self.heading_tolerance_rad {
                info!("Auto command to {} finished", self.name.as_deref().unwrap_or("-"));
                self.state = AutoState::Finished;
                return AutoStep::Done(self.state);
            }

            if elapsed_s >= traj.duration_s() + self.settle_time_s {
                warn!(
                    "Auto command to {} ended outside tolerance ({:.3} m, {:.3} rad)",
                    self.name.as_deref().unwrap_or("-"),
                    pos_err,
                    head_err
                );
                self.state = AutoState::Finished;
                return AutoStep::Done(self.state);
            }
        }

        let target = traj.sample(elapsed_s);
        AutoStep::Drive(self.follower.calculate(time_s, pose, &target))
    }
}

impl AutoState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AutoState::Finished | AutoState::Cancelled | AutoState::Failed)
    }
}

impl AutoCancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl DestinationSelector {
    /// Select a destination by its 1-based number, zero clears the
    /// selection.
    pub fn select(&self, number: usize) {
        self.0.store(number, Ordering::SeqCst);
    }

    /// Take the current selection as a 0-based index, resetting it.
    pub fn take(&self) -> Option<usize> {
        match self.0.swap(0, Ordering::SeqCst) {
            0 => None,
            n => Some(n - 1),
        }
    }
}
