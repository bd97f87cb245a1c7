//! Shared set up for the end-to-end scenarios.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use comms_if::eqpt::vision::VisionSourceId;
use swerve_lib::{
    auto::{AutoParams, AutoState},
    drive_ctrl::{DriveCmd, DriveCtrlInitData, DriveCtrlParams, DriveTrainController, InputData, OutputData, StatusReport},
    kinematics::SwerveKinematics,
    loc::{Pose, PoseEstimatorParams, VisionSources},
    sim::{Sim, SimParams},
};
use util::module::State;

/// Control period of the scenarios.
pub const DT: f64 = 0.02;

pub struct Rig {
    pub ctrl: DriveTrainController,
    pub sim: Sim,
}

pub struct RigOptions {
    pub drive: DriveCtrlParams,
    pub pose: PoseEstimatorParams,
    pub auto: AutoParams,
    pub sim: SimParams,
    pub with_vision: bool,
    pub initial_pose: Pose,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            drive: param_file("drive_ctrl.toml"),
            pose: param_file("pose_est.toml"),
            auto: param_file("auto_handoff.toml"),
            sim: SimParams::default(),
            with_vision: false,
            initial_pose: Pose::default(),
        }
    }
}

/// Load one of the checked-in parameter files.
pub fn param_file<P: serde::de::DeserializeOwned>(name: &str) -> P {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../params").join(name);
    util::params::load_from_path(path).unwrap()
}

impl Rig {
    pub fn new(opts: RigOptions) -> Self {
        let kin = SwerveKinematics::new(&opts.drive.geometry).unwrap();
        let sim = Sim::new(opts.sim, kin, opts.initial_pose);

        let vision_sources = if opts.with_vision {
            VisionSources {
                primary: Some(sim.vision_source(VisionSourceId::Primary)),
                secondary: Some(sim.vision_source(VisionSourceId::Secondary)),
            }
        } else {
            VisionSources::default()
        };

        let ctrl = DriveTrainController::init(DriveCtrlInitData {
            params: opts.drive,
            pose_params: opts.pose,
            auto_params: opts.auto,
            hardware: sim.module_hardware(),
            heading_source: sim.gyro(),
            vision_sources,
            pathfinder: Some(sim.pathfinder()),
            initial_pose: opts.initial_pose,
        })
        .unwrap();

        Self { ctrl, sim }
    }

    /// Run one tick then advance the world.
    pub fn tick(&mut self, input: InputData) -> (OutputData, StatusReport) {
        let input = InputData { time_s: self.sim.time_s(), ..input };
        let out = self.ctrl.proc(&input).unwrap();
        self.sim.step(DT);
        out
    }

    /// Run `n` ticks with no new input.
    pub fn run(&mut self, n: usize) -> (OutputData, StatusReport) {
        let mut last = self.tick(InputData::default());
        for _ in 1..n {
            last = self.tick(InputData::default());
        }
        last
    }

    /// Tick until the auto command is no longer pending, sleeping so the
    /// path request worker gets to run.
    pub fn wait_for_path(&mut self) {
        let start = Instant::now();
        while self.ctrl.auto_state() == Some(AutoState::Pending) {
            assert!(start.elapsed() < Duration::from_secs(5), "Path request timed out");
            self.tick(InputData::default());
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn truth(&self) -> Pose {
        self.sim.world().pose
    }
}

pub fn manual(forward_ms: f64, sideways_ms: f64, rot_rads: f64, field_relative: bool) -> InputData {
    InputData {
        cmd: Some(DriveCmd::Manual { forward_ms, sideways_ms, rot_rads, field_relative }),
        ..InputData::default()
    }
}

/// Straight line distance between two poses.
pub fn distance_m(a: &Pose, b: &Pose) -> f64 {
    (a.position_m - b.position_m).norm()
}
