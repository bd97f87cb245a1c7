//! # Wheel module
//!
//! One steerable, driven wheel. The drivetrain owns four of these in a fixed
//! order given by [`ModuleCorner`], each wrapping the hardware for its corner
//! behind the [`ModuleHardware`] trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

// Internal
use util::maths::{get_ang_dist, wrap_pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of wheel modules on the drivetrain.
pub const NUM_MODULES: usize = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The state (speed and steer angle) of a module, either a target or a
/// measurement.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModuleState {
    /// Signed linear wheel speed.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Wheel heading relative to the chassis, in (-pi, pi].
    ///
    /// Units: radians
    pub angle_rad: f64,
}

/// The cumulative position of a module, used for odometry.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModulePosition {
    /// Cumulative signed distance travelled by the wheel.
    ///
    /// Units: meters
    pub distance_m: f64,

    /// Wheel heading relative to the chassis.
    ///
    /// Units: radians
    pub angle_rad: f64,
}

/// A single wheel module.
pub struct WheelModule {
    corner: ModuleCorner,

    hw: Box<dyn ModuleHardware>,

    /// Below this speed the steer angle is held, to stop the wheel spinning
    /// round to meaningless angles as it comes to rest.
    steer_hold_speed_ms: f64,

    /// The last angle sent to the steer actuator.
    last_cmd_angle_rad: f64,

    /// `false` while the steer sensor is returning no data.
    steer_sensor_ok: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Position of a module on the chassis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleCorner {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The hardware of a single module corner: one drive actuator, one steer
/// actuator and their sensors.
///
/// Sensor reads return `None` when the sensor has no data this tick.
pub trait ModuleHardware: Send {
    /// Closed-loop drive speed demand in meters/second.
    fn set_drive_speed(&mut self, speed_ms: f64);

    /// Closed-loop steer angle demand in radians.
    fn set_steer_angle(&mut self, angle_rad: f64);

    /// Open-loop drive demand in [-1, 1].
    fn set_drive_duty(&mut self, duty: f64);

    /// Open-loop steer demand in [-1, 1].
    fn set_steer_duty(&mut self, duty: f64);

    /// Measured steer angle in radians.
    fn steer_angle_rad(&self) -> Option<f64>;

    /// Measured drive speed in meters/second.
    fn drive_speed_ms(&self) -> Option<f64>;

    /// Cumulative drive distance in meters.
    fn drive_distance_m(&self) -> Option<f64>;

    /// Stop both actuators.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModuleCorner {
    /// All corners, in the order used by every per-module array.
    pub const ALL: [ModuleCorner; NUM_MODULES] = [
        ModuleCorner::FrontLeft,
        ModuleCorner::FrontRight,
        ModuleCorner::BackLeft,
        ModuleCorner::BackRight,
    ];

    pub fn index(&self) -> usize {
        match self {
            ModuleCorner::FrontLeft => 0,
            ModuleCorner::FrontRight => 1,
            ModuleCorner::BackLeft => 2,
            ModuleCorner::BackRight => 3,
        }
    }
}

impl ModuleState {
    pub fn new(speed_ms: f64, angle_rad: f64) -> Self {
        Self {
            speed_ms,
            angle_rad: wrap_pi(angle_rad),
        }
    }

    /// Choose the cheaper of the two equivalent representations of this
    /// target given the current steer angle.
    ///
    /// If reaching the target angle needs more than a quarter turn of the
    /// steer axis the wheel is reversed and pointed the other way instead, so
    /// the steer axis never moves more than 90 degrees.
    pub fn optimise(&self, current_angle_rad: f64) -> ModuleState {
        let delta = get_ang_dist(current_angle_rad, self.angle_rad);

        if delta.abs() > FRAC_PI_2 {
            ModuleState::new(-self.speed_ms, self.angle_rad + PI)
        } else {
            *self
        }
    }
}

impl WheelModule {
    pub fn new(corner: ModuleCorner, hw: Box<dyn ModuleHardware>, steer_hold_speed_ms: f64) -> Self {
        let last_cmd_angle_rad = hw.steer_angle_rad().unwrap_or(0.0);

        Self {
            corner,
            hw,
            steer_hold_speed_ms,
            last_cmd_angle_rad,
            steer_sensor_ok: true,
        }
    }

    pub fn corner(&self) -> ModuleCorner {
        self.corner
    }

    /// Drive the module towards `target`, returning the state actually
    /// commanded.
    pub fn set_target(&mut self, target: &ModuleState) -> ModuleState {
        let current_angle_rad = self.steer_angle_rad();

        let mut cmd = if target.speed_ms.abs() < self.steer_hold_speed_ms {
            ModuleState {
                speed_ms: target.speed_ms,
                angle_rad: self.last_cmd_angle_rad,
            }
        } else {
            *target
        };

        cmd = cmd.optimise(current_angle_rad);

        self.hw.set_steer_angle(cmd.angle_rad);
        self.hw.set_drive_speed(cmd.speed_ms);
        self.last_cmd_angle_rad = cmd.angle_rad;

        trace!(
            "{:?} target {:.3} m/s @ {:.3} rad -> {:.3} m/s @ {:.3} rad",
            self.corner, target.speed_ms, target.angle_rad, cmd.speed_ms, cmd.angle_rad
        );

        cmd
    }

    /// Set open-loop duties on both actuators.
    pub fn set_duties(&mut self, drive: Option<f64>, steer: Option<f64>) {
        if let Some(d) = drive {
            self.hw.set_drive_duty(d);
        }
        if let Some(s) = steer {
            self.hw.set_steer_duty(s);
        }
    }

    /// Stop the module, holding the steer angle.
    pub fn stop(&mut self) {
        self.hw.stop();
    }

    /// The measured state, or `None` if the drive speed is unavailable.
    pub fn measured_state(&mut self) -> Option<ModuleState> {
        let speed_ms = self.hw.drive_speed_ms()?;
        Some(ModuleState::new(speed_ms, self.steer_angle_rad()))
    }

    /// The measured position, or `None` if the drive distance is
    /// unavailable.
    pub fn position(&mut self) -> Option<ModulePosition> {
        let distance_m = self.hw.drive_distance_m()?;
        Some(ModulePosition {
            distance_m,
            angle_rad: self.steer_angle_rad(),
        })
    }

    /// The measured steer angle, falling back to the last commanded angle
    /// if the sensor has no data.
    fn steer_angle_rad(&mut self) -> f64 {
        match self.hw.steer_angle_rad() {
            Some(a) => {
                if !self.steer_sensor_ok {
                    warn!("{:?} steer sensor recovered", self.corner);
                    self.steer_sensor_ok = true;
                }
                wrap_pi(a)
            },
            None => {
                if self.steer_sensor_ok {
                    warn!(
                        "{:?} steer sensor unavailable, using the last commanded angle",
                        self.corner
                    );
                    self.steer_sensor_ok = false;
                }
                self.last_cmd_angle_rad
            }
        }
    }

    /// `false` while the steer sensor is returning no data.
    pub fn steer_sensor_ok(&self) -> bool {
        self.steer_sensor_ok
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        speed: f64,
        angle: f64,
        steer_sensor: Option<f64>,
        stopped: bool,
    }

    struct MockHw(Arc<Mutex<Recorded>>);

    impl ModuleHardware for MockHw {
        fn set_drive_speed(&mut self, speed_ms: f64) { self.0.lock().unwrap().speed = speed_ms; }
        fn set_steer_angle(&mut self, angle_rad: f64) { self.0.lock().unwrap().angle = angle_rad; }
        fn set_drive_duty(&mut self, _: f64) {}
        fn set_steer_duty(&mut self, _: f64) {}
        fn steer_angle_rad(&self) -> Option<f64> { self.0.lock().unwrap().steer_sensor }
        fn drive_speed_ms(&self) -> Option<f64> { Some(self.0.lock().unwrap().speed) }
        fn drive_distance_m(&self) -> Option<f64> { Some(0.0) }
        fn stop(&mut self) { self.0.lock().unwrap().stopped = true; }
    }

    fn module(steer: Option<f64>) -> (WheelModule, Arc<Mutex<Recorded>>) {
        let rec = Arc::new(Mutex::new(Recorded { steer_sensor: steer, ..Default::default() }));
        let m = WheelModule::new(ModuleCorner::FrontLeft, Box::new(MockHw(rec.clone())), 0.01);
        (m, rec)
    }

    #[test]
    fn test_optimise() {
        // 170 degrees away, flip rather than rotating the long way
        let t = ModuleState::new(1.0, 170f64.to_radians());
        let o = t.optimise(0.0);
        assert_abs_diff_eq!(o.speed_ms, -1.0);
        assert_abs_diff_eq!(o.angle_rad, -10f64.to_radians(), epsilon = 1e-12);

        // 80 degrees away, no flip
        let t = ModuleState::new(1.0, 80f64.to_radians());
        assert_eq!(t.optimise(0.0), t);

        // Wrap across +-pi without flipping
        let t = ModuleState::new(1.0, -175f64.to_radians());
        assert_eq!(t.optimise(175f64.to_radians()), t);
    }

    #[test]
    fn test_set_target() {
        let (mut m, rec) = module(Some(0.0));

        let cmd = m.set_target(&ModuleState::new(2.0, PI));
        assert_abs_diff_eq!(cmd.speed_ms, -2.0);
        assert_abs_diff_eq!(cmd.angle_rad, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rec.lock().unwrap().speed, -2.0);

        // Coming to rest holds the last angle
        rec.lock().unwrap().steer_sensor = Some(0.3);
        m.set_target(&ModuleState::new(0.5, 0.3));
        let cmd = m.set_target(&ModuleState::new(0.0, 0.0));
        assert_abs_diff_eq!(cmd.angle_rad, 0.3);

        m.stop();
        assert!(rec.lock().unwrap().stopped);
    }

    #[test]
    fn test_steer_sensor_fallback() {
        let (mut m, _rec) = module(None);

        m.set_target(&ModuleState::new(1.0, 0.5));
        let pos = m.position().unwrap();

        assert!(!m.steer_sensor_ok());
        assert_abs_diff_eq!(pos.angle_rad, 0.5);
    }
}
