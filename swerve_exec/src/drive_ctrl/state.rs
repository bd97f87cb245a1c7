//! Implementations for the DriveCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::Arc;

use log::{debug, info, trace, warn};
use serde::Serialize;

// Internal
use super::{
    AutoRequest, DriveCmd, DriveCtrlError, DriveCtrlParams, HeadingLockController, SkewCorrector,
};
use crate::auto::{
    AutoCancelHandle, AutoCommand, AutoParams, AutoPathHandoff, AutoState, AutoStep,
    DestinationSelector, Pathfinder,
};
use crate::kinematics::{desaturate, peak_speed_ms, ChassisVelocity, SwerveKinematics};
use crate::loc::{
    HeadingSource, Pose, PoseEstimator, PoseEstimatorParams, SourcedReading, VisionFusion,
    VisionInbox, VisionReport, VisionSources,
};
use crate::wheel_module::{
    ModuleCorner, ModuleHardware, ModulePosition, ModuleState, WheelModule, NUM_MODULES,
};
use util::{maths::clamp, module::State};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drivetrain control module state
pub struct DriveTrainController {
    params: DriveCtrlParams,

    kinematics: SwerveKinematics,

    modules: [WheelModule; NUM_MODULES],

    heading_source: Arc<dyn HeadingSource>,

    estimator: PoseEstimator,
    vision_sources: VisionSources,
    vision_fusion: VisionFusion,
    vision_inbox: VisionInbox,

    heading_lock: HeadingLockController,
    skew: SkewCorrector,

    auto_handoff: AutoPathHandoff,

    /// Operator selection consumed by [`AutoRequest::GotoSelected`].
    destination_selector: DestinationSelector,

    /// The running autonomous command, if any.
    auto_cmd: Option<AutoCommand>,

    /// The latest drive command, persists until replaced.
    current_cmd: Option<DriveCmd>,

    slow_mode: bool,
    drive_enabled: bool,

    /// Module positions from the last tick they were all available
    last_positions: [ModulePosition; NUM_MODULES],

    gyro_was_available: bool,

    report: StatusReport,
}

/// Everything needed to build the controller.
pub struct DriveCtrlInitData {
    pub params: DriveCtrlParams,
    pub pose_params: PoseEstimatorParams,
    pub auto_params: AutoParams,

    /// Module hardware in FL, FR, BL, BR order.
    pub hardware: [Box<dyn ModuleHardware>; NUM_MODULES],

    pub heading_source: Arc<dyn HeadingSource>,
    pub vision_sources: VisionSources,

    /// `None` if no pathfinder is available, auto commands are then no-ops.
    pub pathfinder: Option<Arc<dyn Pathfinder>>,

    pub initial_pose: Pose,
}

/// Input data to drivetrain control.
#[derive(Debug, Clone, Default)]
pub struct InputData {
    /// Time of this tick on the session clock.
    ///
    /// Units: seconds
    pub time_s: f64,

    /// A new drive command, or `None` to continue with the current one.
    pub cmd: Option<DriveCmd>,

    /// A request to the autonomous handoff.
    pub auto: Option<AutoRequest>,

    /// Runtime configuration changes, `None` leaves the setting unchanged.
    pub heading_lock: Option<bool>,
    pub slow_mode: Option<bool>,
    pub drive_enabled: Option<bool>,

    /// Re-seed the pose to this value before processing.
    pub reset_pose: Option<Pose>,

    /// If `true` all motion stops and commands are ignored this tick.
    pub make_safe: bool,
}

/// Output data from drivetrain control.
#[derive(Debug, Copy, Clone, Serialize)]
pub struct OutputData {
    /// The module states commanded this tick, `None` if the modules were not
    /// given closed-loop targets.
    pub targets: Option<[ModuleState; NUM_MODULES]>,

    /// The fused field pose.
    pub pose: Pose,

    /// The robot-relative chassis velocity commanded before desaturation.
    pub commanded: Option<ChassisVelocity>,

    /// The robot-relative chassis velocity measured from the modules.
    pub measured: Option<ChassisVelocity>,
}

/// Status report for drivetrain control processing.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct StatusReport {
    /// Module speeds were scaled down to the active speed limit.
    pub speed_limited: bool,

    /// The rotation demand was clamped to the maximum angular speed.
    pub ang_speed_limited: bool,

    pub heading_lock_active: bool,
    pub skew_corrected: bool,

    /// The heading source had no data this tick.
    pub gyro_unavailable: bool,

    /// A module position was unavailable so odometry was not updated.
    pub odometry_skipped: bool,

    /// The module is using its last commanded steer angle in place of the
    /// sensor.
    pub steer_sensor_fallback: [bool; NUM_MODULES],

    pub vision: VisionReport,

    /// State of the autonomous command run this tick.
    pub auto_state: Option<AutoState>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for DriveTrainController {
    type InitData = DriveCtrlInitData;
    type InitError = DriveCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = DriveCtrlError;

    /// Build the controller.
    ///
    /// Invalid parameters or geometry are fatal.
    fn init(init_data: Self::InitData) -> Result<Self, Self::InitError> {
        let DriveCtrlInitData {
            params,
            pose_params,
            auto_params,
            hardware,
            heading_source,
            vision_sources,
            pathfinder,
            initial_pose,
        } = init_data;

        params.validate()?;

        let kinematics = SwerveKinematics::new(&params.geometry)?;

        let [fl, fr, bl, br] = hardware;
        let hold = params.steer_hold_speed_ms;
        let mut modules = [
            WheelModule::new(ModuleCorner::FrontLeft, fl, hold),
            WheelModule::new(ModuleCorner::FrontRight, fr, hold),
            WheelModule::new(ModuleCorner::BackLeft, bl, hold),
            WheelModule::new(ModuleCorner::BackRight, br, hold),
        ];

        // Missing positions at startup are taken as zero, the first complete
        // set after that is differenced against them.
        let mut positions = [ModulePosition::default(); NUM_MODULES];
        for (p, m) in positions.iter_mut().zip(modules.iter_mut()) {
            match m.position() {
                Some(pos) => *p = pos,
                None => warn!("{:?} position unavailable at startup", m.corner()),
            }
        }

        let gyro = heading_source.heading_rad();
        if gyro.is_none() {
            warn!("Heading unavailable at startup, odometry will use the wheels alone");
        }

        let estimator = PoseEstimator::new(&pose_params, kinematics.clone(), gyro, &positions, initial_pose)?;
        let vision_fusion = VisionFusion::new(&pose_params)?;
        let auto_handoff = AutoPathHandoff::new(auto_params, pathfinder)?;

        info!(
            "DriveCtrl initialised at {:?}, max speed {} m/s, heading lock {}, skew correction {}",
            initial_pose,
            params.max_speed_ms,
            if params.heading_lock.enabled { "on" } else { "off" },
            if params.skew_correction.enabled { "on" } else { "off" }
        );

        Ok(Self {
            heading_lock: HeadingLockController::new(params.heading_lock, heading_source.clone()),
            skew: SkewCorrector::new(params.skew_correction.coefficient),
            drive_enabled: params.drive_enabled,
            params,
            kinematics,
            modules,
            heading_source,
            estimator,
            vision_sources,
            vision_fusion,
            vision_inbox: VisionInbox::new(),
            auto_handoff,
            destination_selector: DestinationSelector::default(),
            auto_cmd: None,
            current_cmd: None,
            slow_mode: false,
            last_positions: positions,
            gyro_was_available: gyro.is_some(),
            report: StatusReport::default(),
        })
    }

    /// Perform one control tick.
    ///
    /// Processing:
    ///  1. Apply configuration requests
    ///  2. Update the pose from odometry then vision
    ///  3. Handle auto requests and the new command
    ///  4. Execute the running auto command, or the current command
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.report = StatusReport::default();

        if let Some(e) = input_data.heading_lock {
            self.set_heading_lock_enabled(e);
        }
        if let Some(s) = input_data.slow_mode {
            self.set_slow_mode(s);
        }
        if let Some(d) = input_data.drive_enabled {
            self.set_drive_enabled(d);
        }
        if let Some(p) = input_data.reset_pose {
            self.reset_pose(p);
        }

        // ---- LOCALISATION ----

        let gyro_rad = self.read_heading();
        self.update_odometry(input_data.time_s, gyro_rad);
        self.update_vision();

        let pose = self.estimator.get_estimated_pose();
        let measured = self.robot_relative_chassis_velocity();

        for (flag, m) in self.report.steer_sensor_fallback.iter_mut().zip(self.modules.iter()) {
            *flag = !m.steer_sensor_ok();
        }

        if input_data.make_safe {
            self.make_safe();
            return Ok((
                OutputData { targets: None, pose, commanded: None, measured },
                self.report,
            ));
        }

        // ---- COMMANDS ----

        match input_data.auto {
            Some(AutoRequest::Goto(index)) => self.start_auto(index, &pose),
            Some(AutoRequest::GotoSelected) => {
                let index = self.destination_selector.take();
                self.start_auto(index, &pose)
            }
            Some(AutoRequest::Cancel) => self.cancel_auto(),
            None => (),
        }

        if let Some(cmd) = input_data.cmd {
            self.handle_cmd(cmd);
        }

        // ---- EXECUTION ----

        let (targets, commanded) = match self.step_auto(input_data.time_s, &pose) {
            Some(out) => out,
            None => self.exec_current_cmd(&pose),
        };

        trace!("DriveCtrl targets: {:?}", targets);

        Ok((OutputData { targets, pose, commanded, measured }, self.report))
    }
}

impl DriveTrainController {
    /// Stop all modules and cancel any autonomous command.
    pub fn make_safe(&mut self) {
        self.cancel_auto();
        self.current_cmd = None;
        for m in self.modules.iter_mut() {
            m.stop();
        }
    }

    /// Re-seed the pose, along with the gyro heading and the secondary
    /// vision source.
    pub fn reset_pose(&mut self, pose: Pose) {
        info!("Resetting pose to {:?}", pose);

        self.heading_source.reset_heading(pose.heading_rad);
        let gyro = self.heading_source.heading_rad();

        let positions = self.read_positions().unwrap_or(self.last_positions);
        self.last_positions = positions;

        self.estimator.reset_pose(pose, gyro, &positions);

        if let Some(s) = self.vision_sources.secondary.as_mut() {
            s.reset_pose(&pose);
        }

        self.heading_lock.reset();
    }

    pub fn set_heading_lock_enabled(&mut self, enabled: bool) {
        self.heading_lock.set_enabled(enabled);
    }

    pub fn set_slow_mode(&mut self, slow: bool) {
        if slow != self.slow_mode {
            info!("Slow mode {}", if slow { "on" } else { "off" });
        }
        self.slow_mode = slow;
    }

    /// Enable or disable drive commands. Disabling stops the modules,
    /// odometry keeps running.
    pub fn set_drive_enabled(&mut self, enabled: bool) {
        if enabled == self.drive_enabled {
            return;
        }

        info!("Drive {}", if enabled { "enabled" } else { "disabled" });
        self.drive_enabled = enabled;

        if !enabled {
            self.make_safe();
        }
    }

    /// The robot-relative chassis velocity from the measured module states,
    /// `None` if any module has no measurement.
    pub fn robot_relative_chassis_velocity(&mut self) -> Option<ChassisVelocity> {
        let mut states = [ModuleState::default(); NUM_MODULES];
        for (s, m) in states.iter_mut().zip(self.modules.iter_mut()) {
            *s = m.measured_state()?;
        }
        Some(self.kinematics.to_chassis_velocity(&states))
    }

    /// A handle for pushing vision readings from outside the control loop.
    pub fn vision_inbox_sender(&self) -> std::sync::mpsc::Sender<SourcedReading> {
        self.vision_inbox.sender()
    }

    /// Cancel handle of the running autonomous command.
    pub fn auto_cancel_handle(&self) -> Option<AutoCancelHandle> {
        self.auto_cmd.as_ref().map(|c| c.cancel_handle())
    }

    pub fn auto_state(&self) -> Option<AutoState> {
        self.auto_cmd.as_ref().map(|c| c.state())
    }

    pub fn estimated_pose(&self) -> Pose {
        self.estimator.get_estimated_pose()
    }

    pub fn estimator(&self) -> &PoseEstimator {
        &self.estimator
    }

    /// A handle on the destination selector, selections made through it are
    /// consumed by the next [`AutoRequest::GotoSelected`].
    pub fn destination_selector(&self) -> DestinationSelector {
        self.destination_selector.clone()
    }

    pub fn heading_lock(&self) -> &HeadingLockController {
        &self.heading_lock
    }

    pub fn drive_enabled(&self) -> bool {
        self.drive_enabled
    }

    pub fn slow_mode(&self) -> bool {
        self.slow_mode
    }

    /// The current speed limit.
    ///
    /// Units: meters/second
    pub fn max_speed_ms(&self) -> f64 {
        if self.slow_mode {
            self.params.slow_max_speed_ms
        } else {
            self.params.max_speed_ms
        }
    }
}

impl DriveTrainController {
    /// Read the heading, warning on loss or recovery.
    fn read_heading(&mut self) -> Option<f64> {
        let heading = self.heading_source.heading_rad();

        match (heading.is_some(), self.gyro_was_available) {
            (false, true) => warn!("Heading unavailable, odometry using the wheels alone"),
            (true, false) => info!("Heading available again"),
            _ => (),
        }
        self.gyro_was_available = heading.is_some();
        self.report.gyro_unavailable = heading.is_none();

        heading
    }

    /// All module positions, or `None` if any is unavailable.
    fn read_positions(&mut self) -> Option<[ModulePosition; NUM_MODULES]> {
        let mut positions = [ModulePosition::default(); NUM_MODULES];
        for (p, m) in positions.iter_mut().zip(self.modules.iter_mut()) {
            *p = m.position()?;
        }
        Some(positions)
    }

    fn update_odometry(&mut self, time_s: f64, gyro_rad: Option<f64>) {
        match self.read_positions() {
            Some(positions) => {
                self.estimator.update_odometry(time_s, gyro_rad, &positions);
                self.last_positions = positions;
            }
            None => {
                if !self.report.odometry_skipped {
                    debug!("Module position unavailable, skipping odometry");
                }
                self.report.odometry_skipped = true;
            }
        }
    }

    /// Fuse the polled readings then anything queued from outside the loop.
    fn update_vision(&mut self) {
        let mut vision_report = VisionReport::default();

        self.vision_fusion.poll(&mut self.estimator, &mut self.vision_sources, &mut vision_report);

        for r in self.vision_inbox.drain() {
            self.vision_fusion.ingest(
                &mut self.estimator,
                r.source,
                &r.reading,
                &mut self.vision_sources.secondary,
                &mut vision_report,
            );
        }

        self.report.vision = vision_report;
    }

    fn start_auto(&mut self, index: Option<usize>, pose: &Pose) {
        if !self.drive_enabled {
            debug!("Drive disabled, ignoring auto request");
            return;
        }

        self.cancel_auto();

        let cmd = self.auto_handoff.get_auto_command(index, pose);
        if !cmd.is_noop() {
            self.auto_cmd = Some(cmd);
        }
    }

    fn cancel_auto(&mut self) {
        if let Some(mut cmd) = self.auto_cmd.take() {
            cmd.cancel();
            self.report.auto_state = Some(cmd.state());
            self.current_cmd = Some(DriveCmd::Stop);
        }
    }

    fn handle_cmd(&mut self, cmd: DriveCmd) {
        if !self.drive_enabled {
            trace!("Drive disabled, ignoring {:?}", cmd);
            return;
        }

        if self.auto_cmd.is_some() {
            let overrides = cmd.overrides_auto(
                self.params.auto_override_speed_ms,
                self.params.heading_lock.rotation_deadband_rads,
            );
            if !overrides {
                return;
            }
            info!("Driver took control, cancelling auto");
            self.cancel_auto();
        }

        self.current_cmd = Some(cmd);
    }

    /// Run the autonomous command for one tick, `None` if there isn't one.
    fn step_auto(
        &mut self,
        time_s: f64,
        pose: &Pose,
    ) -> Option<(Option<[ModuleState; NUM_MODULES]>, Option<ChassisVelocity>)> {
        let step = self.auto_cmd.as_mut()?.step(time_s, pose);
        self.report.auto_state = self.auto_state();

        let out = match step {
            AutoStep::Drive(v) => {
                let max = self.max_speed_ms();
                (Some(self.drive_robot_relative(&v, max)), Some(v))
            }
            AutoStep::Hold => (Some(self.exec_stop()), None),
            AutoStep::Done(state) => {
                debug!("Auto command done ({:?}), returning to manual", state);
                self.auto_cmd = None;
                self.current_cmd = Some(DriveCmd::Stop);
                (Some(self.exec_stop()), None)
            }
        };

        Some(out)
    }

    fn exec_current_cmd(
        &mut self,
        pose: &Pose,
    ) -> (Option<[ModuleState; NUM_MODULES]>, Option<ChassisVelocity>) {
        let cmd = match self.current_cmd {
            Some(c) => c,
            None => return (None, None),
        };

        match cmd {
            DriveCmd::Manual { forward_ms, sideways_ms, rot_rads, field_relative } => {
                let v = self.manual_velocity(forward_ms, sideways_ms, rot_rads, field_relative, pose);
                let max = self.max_speed_ms();
                (Some(self.drive_robot_relative(&v, max)), Some(v))
            }
            DriveCmd::ChassisSpeeds(v) => {
                let max = self.max_speed_ms();
                (Some(self.drive_robot_relative(&v, max)), Some(v))
            }
            DriveCmd::ModuleStates(states) => (Some(self.drive_module_states(&states)), None),
            DriveCmd::Stop => (Some(self.exec_stop()), None),
            DriveCmd::DirectDrive(duty) => {
                let duty = clamp(duty, -1.0, 1.0);
                for m in self.modules.iter_mut() {
                    m.set_duties(Some(duty), None);
                }
                (None, None)
            }
            DriveCmd::DirectTurn(duty) => {
                let duty = clamp(duty, -1.0, 1.0);
                for m in self.modules.iter_mut() {
                    m.set_duties(None, Some(duty));
                }
                (None, None)
            }
        }
    }

    /// The robot-relative velocity for a manual demand, after the rotation
    /// limit, heading lock and skew correction.
    fn manual_velocity(
        &mut self,
        forward_ms: f64,
        sideways_ms: f64,
        rot_rads: f64,
        field_relative: bool,
        pose: &Pose,
    ) -> ChassisVelocity {
        let max_rot = self.params.max_ang_speed_rads;
        let mut rot = clamp(rot_rads, -max_rot, max_rot);
        if rot != rot_rads {
            self.report.ang_speed_limited = true;
        }

        rot = self.heading_lock.update(forward_ms.hypot(sideways_ms), rot);
        self.report.heading_lock_active = self.heading_lock.is_active();

        // The fused heading is always available, the gyro may not be
        let heading_rad = pose.heading_rad;

        let demand = ChassisVelocity::new(forward_ms, sideways_ms, rot);
        let mut v = if field_relative {
            ChassisVelocity::from_field_relative(&demand, heading_rad)
        } else {
            demand
        };

        if self.params.skew_correction.enabled {
            if let Some(yaw_rate) = self.heading_source.yaw_rate_rads() {
                v = self.skew.correct(&v, yaw_rate, heading_rad);
                self.report.skew_corrected = yaw_rate * self.skew.coefficient() != 0.0;
            }
        }

        v
    }

    fn drive_robot_relative(&mut self, v: &ChassisVelocity, max_speed_ms: f64) -> [ModuleState; NUM_MODULES] {
        let states = self.kinematics.to_module_states(v);
        if peak_speed_ms(&states) > max_speed_ms {
            self.report.speed_limited = true;
        }
        self.set_module_targets(&desaturate(&states, max_speed_ms))
    }

    fn drive_module_states(&mut self, states: &[ModuleState; NUM_MODULES]) -> [ModuleState; NUM_MODULES] {
        let max = self.max_speed_ms();
        if peak_speed_ms(states) > max {
            self.report.speed_limited = true;
        }
        self.set_module_targets(&desaturate(states, max))
    }

    /// Zero speed, the modules hold their steer angles.
    fn exec_stop(&mut self) -> [ModuleState; NUM_MODULES] {
        self.set_module_targets(&[ModuleState::default(); NUM_MODULES])
    }

    fn set_module_targets(&mut self, targets: &[ModuleState; NUM_MODULES]) -> [ModuleState; NUM_MODULES] {
        let mut commanded = [ModuleState::default(); NUM_MODULES];
        for ((c, m), t) in commanded.iter_mut().zip(self.modules.iter_mut()).zip(targets.iter()) {
            *c = m.set_target(t);
        }
        commanded
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auto::Destination;
    use crate::kinematics::ModuleGeometry;
    use crate::sim::{Sim, SimParams};
    use approx::assert_abs_diff_eq;
    use std::time::{Duration, Instant};

    const DT: f64 = 0.02;

    fn build(pose: Pose) -> (DriveTrainController, Sim) {
        build_with(DriveCtrlParams::default(), pose)
    }

    fn build_with(params: DriveCtrlParams, pose: Pose) -> (DriveTrainController, Sim) {
        let kin = SwerveKinematics::new(&params.geometry).unwrap();
        let sim = Sim::new(SimParams::default(), kin, pose);

        let auto_params = AutoParams {
            destinations: vec![Destination {
                name: String::from("Reef1"),
                candidate_paths: vec![String::from("InToReef1")],
                goal: [1.0, 0.5, 0.0],
            }],
            ..AutoParams::default()
        };

        let ctrl = DriveTrainController::init(DriveCtrlInitData {
            params,
            pose_params: PoseEstimatorParams::default(),
            auto_params,
            hardware: sim.module_hardware(),
            heading_source: sim.gyro(),
            vision_sources: VisionSources::default(),
            pathfinder: Some(sim.pathfinder()),
            initial_pose: pose,
        })
        .unwrap();

        (ctrl, sim)
    }

    fn tick(ctrl: &mut DriveTrainController, sim: &Sim, input: InputData) -> (OutputData, StatusReport) {
        let input = InputData { time_s: sim.time_s(), ..input };
        let out = ctrl.proc(&input).unwrap();
        sim.step(DT);
        out
    }

    fn manual(forward_ms: f64, sideways_ms: f64, rot_rads: f64) -> InputData {
        InputData {
            cmd: Some(DriveCmd::Manual { forward_ms, sideways_ms, rot_rads, field_relative: true }),
            ..InputData::default()
        }
    }

    #[test]
    fn test_forward_field_relative() {
        let (mut ctrl, sim) = build(Pose::default());

        let (out, rpt) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        let targets = out.targets.unwrap();

        for t in targets.iter() {
            assert_abs_diff_eq!(t.speed_ms, 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(t.angle_rad, 0.0, epsilon = 1e-9);
        }
        assert!(!rpt.speed_limited);
    }

    #[test]
    fn test_field_relative_rotated() {
        // Facing +y, field-forward is to the robot's right
        let (mut ctrl, sim) = build(Pose::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));

        let (out, _) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        let v = out.commanded.unwrap();
        assert_abs_diff_eq!(v.vx_ms, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v.vy_ms, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_desaturation() {
        let (mut ctrl, sim) = build(Pose::default());

        let (out, rpt) = tick(&mut ctrl, &sim, manual(3.0, 0.0, 3.0));
        assert!(rpt.speed_limited);
        let peak = peak_speed_ms(&out.targets.unwrap());
        assert_abs_diff_eq!(peak, 3.0, epsilon = 1e-9);

        let (out, _) = tick(&mut ctrl, &sim, InputData { slow_mode: Some(true), ..InputData::default() });
        let peak = peak_speed_ms(&out.targets.unwrap());
        assert_abs_diff_eq!(peak, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_rotation_limit() {
        let (mut ctrl, sim) = build(Pose::default());

        let (out, rpt) = tick(&mut ctrl, &sim, manual(0.0, 0.0, 10.0));
        assert!(rpt.ang_speed_limited);
        assert_abs_diff_eq!(out.commanded.unwrap().omega_rads, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_command_persists() {
        let (mut ctrl, sim) = build(Pose::default());

        tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        for _ in 0..49 {
            tick(&mut ctrl, &sim, InputData::default());
        }

        assert_abs_diff_eq!(ctrl.estimated_pose().x_m(), 1.0, epsilon = 0.03);
        assert_abs_diff_eq!(sim.world().pose.x_m(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_drive_disabled() {
        let (mut ctrl, sim) = build(Pose::default());

        let (out, _) = tick(
            &mut ctrl,
            &sim,
            InputData { drive_enabled: Some(false), ..manual(1.0, 0.0, 0.0) },
        );
        assert!(out.targets.is_none());
        assert!(!ctrl.drive_enabled());

        // Pushing the robot still moves the pose
        for m in sim.world().modules.iter_mut() {
            m.speed_ms = 1.0;
        }
        for _ in 0..10 {
            tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        }
        assert!(ctrl.estimated_pose().x_m() > 0.1);
    }

    #[test]
    fn test_heading_lock_holds() {
        let (mut ctrl, sim) = build(Pose::default());

        // Latch
        let (_, rpt) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        assert!(rpt.heading_lock_active);

        // Knock the robot round, the lock should turn it back
        sim.world().pose.heading_rad = 0.1;
        let (out, _) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(out.commanded.unwrap().omega_rads, -0.1, epsilon = 1e-9);

        // Rotating releases it
        let (_, rpt) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.5));
        assert!(!rpt.heading_lock_active);
    }

    #[test]
    fn test_gyro_loss() {
        let (mut ctrl, sim) = build(Pose::default());
        sim.world().gyro_ok = false;

        let (out, rpt) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        assert!(rpt.gyro_unavailable);
        assert!(!rpt.heading_lock_active);
        assert!(!rpt.skew_corrected);
        assert!(out.targets.is_some());
    }

    #[test]
    fn test_skew_correction() {
        let (mut ctrl, sim) = build(Pose::default());

        tick(&mut ctrl, &sim, manual(1.0, 0.0, 1.0));
        let (out, rpt) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 1.0));

        // Measured yaw rate of 1 rad/s projected 0.3 s ahead
        assert!(rpt.skew_corrected);
        let v = out.commanded.unwrap();
        let heading = ctrl.estimated_pose().heading_rad;
        let expected = ChassisVelocity::from_field_relative(
            &ChassisVelocity::new(1.0, 0.0, 1.0),
            heading,
        );
        assert!((v.vx_ms - expected.vx_ms).abs() > 1e-3 || (v.vy_ms - expected.vy_ms).abs() > 1e-3);
        assert_abs_diff_eq!(v.linear_speed_ms(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_skew_correction_disabled() {
        let mut params = DriveCtrlParams::default();
        params.skew_correction.enabled = false;
        let (mut ctrl, sim) = build_with(params, Pose::default());

        tick(&mut ctrl, &sim, manual(1.0, 0.0, 1.0));
        let (_, rpt) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 1.0));
        assert!(!rpt.skew_corrected);
    }

    #[test]
    fn test_make_safe() {
        let (mut ctrl, sim) = build(Pose::default());
        tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));

        let (out, _) = tick(&mut ctrl, &sim, InputData { make_safe: true, ..manual(1.0, 0.0, 0.0) });
        assert!(out.targets.is_none());
        for m in sim.world().modules.iter() {
            assert_eq!(m.speed_ms, 0.0);
            assert!(m.num_stops > 0);
        }

        // Nothing resumes once safe mode ends until a new command
        let (out, _) = tick(&mut ctrl, &sim, InputData::default());
        assert!(out.targets.is_none());
    }

    #[test]
    fn test_reset_pose() {
        let (mut ctrl, sim) = build(Pose::default());
        tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));

        let target = Pose::new(2.0, 3.0, 1.0);
        let (out, _) = tick(&mut ctrl, &sim, InputData { reset_pose: Some(target), ..InputData::default() });

        assert_abs_diff_eq!(out.pose.x_m(), 2.0, epsilon = 0.05);
        assert_abs_diff_eq!(out.pose.y_m(), 3.0, epsilon = 0.05);
        assert_abs_diff_eq!(out.pose.heading_rad, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sim.gyro().heading_rad().unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_steer_sensor_fallback() {
        let (mut ctrl, sim) = build(Pose::default());
        sim.world().modules[2].steer_sensor_ok = false;

        let (out, rpt) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        assert_eq!(rpt.steer_sensor_fallback, [false, false, true, false]);
        assert!(out.targets.is_some());
    }

    #[test]
    fn test_odometry_skipped() {
        let (mut ctrl, sim) = build(Pose::default());
        sim.world().modules[0].drive_sensor_ok = false;

        let (out, rpt) = tick(&mut ctrl, &sim, manual(1.0, 0.0, 0.0));
        assert!(rpt.odometry_skipped);
        assert!(out.measured.is_none());
    }

    #[test]
    fn test_direct_duties() {
        let (mut ctrl, sim) = build(Pose::default());

        let (out, _) = tick(&mut ctrl, &sim, InputData { cmd: Some(DriveCmd::DirectDrive(0.5)), ..InputData::default() });
        assert!(out.targets.is_none());
        assert_eq!(sim.world().modules[0].drive_duty, Some(0.5));

        tick(&mut ctrl, &sim, InputData { cmd: Some(DriveCmd::DirectTurn(2.0)), ..InputData::default() });
        assert_eq!(sim.world().modules[3].steer_duty, Some(1.0));
    }

    #[test]
    fn test_auto_then_manual_override() {
        let (mut ctrl, sim) = build(Pose::default());

        tick(&mut ctrl, &sim, InputData { auto: Some(AutoRequest::Goto(Some(0))), ..InputData::default() });
        assert!(ctrl.auto_state().is_some());

        // Wait for the worker
        let start = Instant::now();
        while ctrl.auto_state() == Some(AutoState::Pending) && start.elapsed() < Duration::from_secs(5) {
            tick(&mut ctrl, &sim, InputData::default());
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ctrl.auto_state(), Some(AutoState::Following));

        // A resting stick doesn't cancel
        tick(&mut ctrl, &sim, manual(0.0, 0.0, 0.0));
        assert_eq!(ctrl.auto_state(), Some(AutoState::Following));

        let (_, rpt) = tick(&mut ctrl, &sim, manual(0.5, 0.0, 0.0));
        assert_eq!(rpt.auto_state, Some(AutoState::Cancelled));
        assert!(ctrl.auto_state().is_none());
    }

    #[test]
    fn test_auto_noop_selection() {
        let (mut ctrl, sim) = build(Pose::default());

        tick(&mut ctrl, &sim, InputData { auto: Some(AutoRequest::Goto(None)), ..InputData::default() });
        assert!(ctrl.auto_state().is_none());

        tick(&mut ctrl, &sim, InputData { auto: Some(AutoRequest::Goto(Some(5))), ..InputData::default() });
        assert!(ctrl.auto_state().is_none());
    }

    #[test]
    fn test_goto_selected_consumes_selection() {
        let (mut ctrl, sim) = build(Pose::default());
        let selector = ctrl.destination_selector();

        // Nothing selected is a no-op
        tick(&mut ctrl, &sim, InputData { auto: Some(AutoRequest::GotoSelected), ..InputData::default() });
        assert!(ctrl.auto_state().is_none());

        selector.select(1);
        tick(&mut ctrl, &sim, InputData { auto: Some(AutoRequest::GotoSelected), ..InputData::default() });
        assert!(ctrl.auto_state().is_some());
        assert_eq!(selector.take(), None);
    }

    #[test]
    fn test_invalid_params() {
        let mut params = DriveCtrlParams::default();
        params.geometry = ModuleGeometry::rectangular(0.0, 0.0);

        let kin = SwerveKinematics::new(&ModuleGeometry::rectangular(0.3, 0.3)).unwrap();
        let sim = Sim::new(SimParams::default(), kin, Pose::default());

        let res = DriveTrainController::init(DriveCtrlInitData {
            params,
            pose_params: PoseEstimatorParams::default(),
            auto_params: AutoParams::default(),
            hardware: sim.module_hardware(),
            heading_source: sim.gyro(),
            vision_sources: VisionSources::default(),
            pathfinder: None,
            initial_pose: Pose::default(),
        });
        assert!(matches!(res, Err(DriveCtrlError::Kinematics(_))));
    }
}
