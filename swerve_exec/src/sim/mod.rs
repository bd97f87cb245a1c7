//! # Simulated hardware
//!
//! An ideal simulated drivetrain, used by the executable when no real
//! hardware is fitted and by the end-to-end tests. Modules reach their
//! targets instantly, the chassis moves according to the forward kinematics
//! and the cameras report the true pose after a latency.
//!
//! All the simulated devices share one [`SimWorld`] through a [`Sim`]
//! handle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use serde::Deserialize;
use util::maths::{clamp, wrap_pi};

use comms_if::eqpt::vision::{VisionReading, VisionSourceId};

use crate::auto::{AutoError, Destination, Pathfinder, Trajectory};
use crate::kinematics::SwerveKinematics;
use crate::loc::{HeadingSource, Pose, PoseHistory, Twist, VisionSource};
use crate::wheel_module::{ModuleCorner, ModuleHardware, ModuleState, NUM_MODULES};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Length of true pose history kept for delayed camera readings.
const TRUTH_HISTORY_S: f64 = 2.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the simulation.
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Wheel speed at full drive duty.
    ///
    /// Units: meters/second
    pub max_drive_speed_ms: f64,

    /// Steer rate at full steer duty.
    ///
    /// Units: radians/second
    pub max_steer_rate_rads: f64,

    pub primary_camera: SimCameraParams,
    pub secondary_camera: SimCameraParams,

    /// Profile limits of the straight-line pathfinder.
    ///
    /// Units: meters/second, meters/second^2
    pub path_max_speed_ms: f64,
    pub path_max_accel_mss: f64,
}

/// Parameters of one simulated camera.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimCameraParams {
    /// Time between capture and the reading being available.
    ///
    /// Units: seconds
    pub latency_s: f64,

    /// Time between captures.
    ///
    /// Units: seconds
    pub period_s: f64,

    /// Reported distance to the target.
    ///
    /// Units: meters
    pub target_distance_m: f64,

    /// Constant error added to the reported position until the camera is
    /// re-seeded.
    ///
    /// Units: meters
    pub bias_m: [f64; 2],
}

/// State of one simulated module.
#[derive(Debug, Copy, Clone, Default)]
pub struct SimModule {
    pub speed_ms: f64,
    pub angle_rad: f64,
    pub distance_m: f64,

    /// Open-loop duties, these take over from the closed-loop demands.
    pub drive_duty: Option<f64>,
    pub steer_duty: Option<f64>,

    /// Number of times the module was told to stop.
    pub num_stops: u32,

    /// `false` makes the steer sensor return no data.
    pub steer_sensor_ok: bool,

    /// `false` makes the drive sensor return no data.
    pub drive_sensor_ok: bool,
}

/// State of one simulated camera.
#[derive(Debug, Copy, Clone)]
pub struct SimCamera {
    pub params: SimCameraParams,
    pub connected: bool,

    /// `false` when no target is in view.
    pub target_visible: bool,

    pub bias_m: [f64; 2],
    pub num_reseeds: u32,
}

/// The simulated world.
pub struct SimWorld {
    pub params: SimParams,
    kinematics: SwerveKinematics,

    /// Simulation time.
    ///
    /// Units: seconds
    pub time_s: f64,

    /// True pose of the robot
    pub pose: Pose,

    /// True yaw rate
    ///
    /// Units: radians/second
    pub yaw_rate_rads: f64,

    pub modules: [SimModule; NUM_MODULES],

    /// Gyro reading is the true heading plus this offset.
    pub gyro_offset_rad: f64,
    pub gyro_ok: bool,

    pub cameras: [SimCamera; 2],

    truth: PoseHistory,
}

/// Shared handle to the simulated world.
#[derive(Clone)]
pub struct Sim(Arc<Mutex<SimWorld>>);

/// A simulated module actuator and sensor set.
pub struct SimModuleHardware {
    sim: Sim,
    index: usize,
}

/// A simulated gyro.
pub struct SimGyro {
    sim: Sim,
}

/// A simulated pose camera.
pub struct SimVisionSource {
    sim: Sim,
    id: VisionSourceId,
}

/// A pathfinder which drives straight to the destination's goal.
pub struct SimPathfinder {
    max_speed_ms: f64,
    max_accel_mss: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            max_drive_speed_ms: 4.0,
            max_steer_rate_rads: 10.0,
            primary_camera: SimCameraParams {
                latency_s: 0.1,
                period_s: 0.05,
                target_distance_m: 1.0,
                bias_m: [0.0, 0.0],
            },
            secondary_camera: SimCameraParams {
                latency_s: 0.04,
                period_s: 0.02,
                target_distance_m: 0.0,
                bias_m: [0.0, 0.0],
            },
            path_max_speed_ms: 2.0,
            path_max_accel_mss: 2.0,
        }
    }
}

impl SimCamera {
    fn new(params: SimCameraParams) -> Self {
        Self {
            params,
            connected: true,
            target_visible: true,
            bias_m: params.bias_m,
            num_reseeds: 0,
        }
    }
}

impl Sim {
    pub fn new(params: SimParams, kinematics: SwerveKinematics, initial_pose: Pose) -> Self {
        let mut truth = PoseHistory::new(TRUTH_HISTORY_S);
        truth.add(0.0, initial_pose);

        let module = SimModule {
            steer_sensor_ok: true,
            drive_sensor_ok: true,
            ..SimModule::default()
        };

        Self(Arc::new(Mutex::new(SimWorld {
            cameras: [SimCamera::new(params.primary_camera), SimCamera::new(params.secondary_camera)],
            params,
            kinematics,
            time_s: 0.0,
            pose: initial_pose,
            yaw_rate_rads: 0.0,
            modules: [module; NUM_MODULES],
            gyro_offset_rad: 0.0,
            gyro_ok: true,
            truth,
        })))
    }

    /// Lock the world for inspection or fault injection.
    pub fn world(&self) -> MutexGuard<'_, SimWorld> {
        // A panic while holding the lock leaves the world as it was, which
        // is still usable.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn time_s(&self) -> f64 {
        self.world().time_s
    }

    pub fn module_hardware(&self) -> [Box<dyn ModuleHardware>; NUM_MODULES] {
        ModuleCorner::ALL.map(|c| {
            Box::new(SimModuleHardware { sim: self.clone(), index: c.index() }) as Box<dyn ModuleHardware>
        })
    }

    pub fn gyro(&self) -> Arc<dyn HeadingSource> {
        Arc::new(SimGyro { sim: self.clone() })
    }

    pub fn vision_source(&self, id: VisionSourceId) -> Box<dyn VisionSource> {
        Box::new(SimVisionSource { sim: self.clone(), id })
    }

    pub fn pathfinder(&self) -> Arc<dyn Pathfinder> {
        let w = self.world();
        Arc::new(SimPathfinder {
            max_speed_ms: w.params.path_max_speed_ms,
            max_accel_mss: w.params.path_max_accel_mss,
        })
    }

    /// Advance the world by `dt_s` seconds.
    pub fn step(&self, dt_s: f64) {
        self.world().step(dt_s)
    }

    /// Advance the world up to `time_s`, doing nothing if it is already
    /// there.
    pub fn step_to(&self, time_s: f64) {
        let mut w = self.world();
        let dt_s = time_s - w.time_s;
        if dt_s > 0.0 {
            w.step(dt_s);
        }
    }
}

impl SimWorld {
    fn step(&mut self, dt_s: f64) {
        let max_drive = self.params.max_drive_speed_ms;
        let max_steer = self.params.max_steer_rate_rads;

        for m in self.modules.iter_mut() {
            if let Some(d) = m.drive_duty {
                m.speed_ms = clamp(d, -1.0, 1.0) * max_drive;
            }
            if let Some(s) = m.steer_duty {
                m.angle_rad = wrap_pi(m.angle_rad + clamp(s, -1.0, 1.0) * max_steer * dt_s);
            }
            m.distance_m += m.speed_ms * dt_s;
        }

        let states = self.modules.map(|m| ModuleState::new(m.speed_ms, m.angle_rad));
        let v = self.kinematics.to_chassis_velocity(&states);

        self.pose = self.pose.exp(&Twist::new(v.vx_ms * dt_s, v.vy_ms * dt_s, v.omega_rads * dt_s));
        self.yaw_rate_rads = v.omega_rads;
        self.time_s += dt_s;
        self.truth.add(self.time_s, self.pose);
    }

    fn camera_reading(&self, id: VisionSourceId) -> VisionReading {
        let cam = &self.cameras[id.index()];
        let p = cam.params;

        // Latest capture whose latency has elapsed
        let available_s = self.time_s - p.latency_s;
        if available_s < 0.0 || !cam.target_visible {
            return VisionReading::none(self.time_s);
        }
        let capture_s = (available_s / p.period_s).floor() * p.period_s;

        let truth = match self.truth.sample(capture_s) {
            Some(t) => t,
            None => return VisionReading::none(self.time_s),
        };

        VisionReading {
            x_m: truth.x_m() + cam.bias_m[0],
            y_m: truth.y_m() + cam.bias_m[1],
            heading_rad: truth.heading_rad,
            timestamp_s: capture_s,
            distance_m: p.target_distance_m,
            exists: true,
        }
    }
}

impl ModuleHardware for SimModuleHardware {
    fn set_drive_speed(&mut self, speed_ms: f64) {
        let mut w = self.sim.world();
        let m = &mut w.modules[self.index];
        m.drive_duty = None;
        m.speed_ms = speed_ms;
    }

    fn set_steer_angle(&mut self, angle_rad: f64) {
        let mut w = self.sim.world();
        let m = &mut w.modules[self.index];
        m.steer_duty = None;
        m.angle_rad = wrap_pi(angle_rad);
    }

    fn set_drive_duty(&mut self, duty: f64) {
        self.sim.world().modules[self.index].drive_duty = Some(duty);
    }

    fn set_steer_duty(&mut self, duty: f64) {
        self.sim.world().modules[self.index].steer_duty = Some(duty);
    }

    fn steer_angle_rad(&self) -> Option<f64> {
        let w = self.sim.world();
        let m = &w.modules[self.index];
        if m.steer_sensor_ok {
            Some(m.angle_rad)
        } else {
            None
        }
    }

    fn drive_speed_ms(&self) -> Option<f64> {
        let w = self.sim.world();
        let m = &w.modules[self.index];
        if m.drive_sensor_ok {
            Some(m.speed_ms)
        } else {
            None
        }
    }

    fn drive_distance_m(&self) -> Option<f64> {
        let w = self.sim.world();
        let m = &w.modules[self.index];
        if m.drive_sensor_ok {
            Some(m.distance_m)
        } else {
            None
        }
    }

    fn stop(&mut self) {
        let mut w = self.sim.world();
        let m = &mut w.modules[self.index];
        m.drive_duty = None;
        m.steer_duty = None;
        m.speed_ms = 0.0;
        m.num_stops += 1;
    }
}

impl HeadingSource for SimGyro {
    fn heading_rad(&self) -> Option<f64> {
        let w = self.sim.world();
        if w.gyro_ok {
            Some(wrap_pi(w.pose.heading_rad + w.gyro_offset_rad))
        } else {
            None
        }
    }

    fn yaw_rate_rads(&self) -> Option<f64> {
        let w = self.sim.world();
        if w.gyro_ok {
            Some(w.yaw_rate_rads)
        } else {
            None
        }
    }

    fn reset_heading(&self, heading_rad: f64) {
        let mut w = self.sim.world();
        w.gyro_offset_rad = wrap_pi(heading_rad - w.pose.heading_rad);
    }
}

impl VisionSource for SimVisionSource {
    fn connected(&self) -> bool {
        self.sim.world().cameras[self.id.index()].connected
    }

    fn latest_reading(&self) -> VisionReading {
        self.sim.world().camera_reading(self.id)
    }

    fn reset_pose(&mut self, _pose: &Pose) {
        let mut w = self.sim.world();
        let cam = &mut w.cameras[self.id.index()];
        cam.bias_m = [0.0, 0.0];
        cam.num_reseeds += 1;
    }
}

impl Pathfinder for SimPathfinder {
    fn best_trajectory(&self, start: &Pose, destination: &Destination) -> Result<Trajectory, AutoError> {
        // Every candidate ends at the same goal, and a straight line is the
        // shortest way there.
        let candidate = destination
            .candidate_paths
            .first()
            .ok_or_else(|| AutoError::NoCandidates(destination.name.clone()))?;

        debug!("Pathfinding to {} via {}", destination.name, candidate);

        let g = destination.goal;
        Ok(Trajectory::straight_line(
            start,
            &Pose::new(g[0], g[1], g[2]),
            self.max_speed_ms,
            self.max_accel_mss,
        ))
    }
}
