//! Swerve wheel odometry

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use util::maths::{get_ang_dist, wrap_pi};

use super::Pose;
use crate::kinematics::SwerveKinematics;
use crate::wheel_module::{ModulePosition, NUM_MODULES};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Integrates module position changes into a field pose.
///
/// The heading comes from the gyro where available, since wheel slip makes the
/// wheel-derived rotation drift. The gyro is never written to by odometry, a
/// re-seed only changes `gyro_offset_rad`.
#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    kinematics: SwerveKinematics,

    pose: Pose,

    prev_positions: [ModulePosition; NUM_MODULES],

    /// Field heading at the previous update.
    prev_heading_rad: f64,

    /// Added to the raw gyro reading to give the field heading.
    gyro_offset_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwerveOdometry {
    pub fn new(
        kinematics: SwerveKinematics,
        gyro_rad: Option<f64>,
        positions: &[ModulePosition; NUM_MODULES],
        initial_pose: Pose,
    ) -> Self {
        let mut odom = Self {
            kinematics,
            pose: initial_pose,
            prev_positions: *positions,
            prev_heading_rad: initial_pose.heading_rad,
            gyro_offset_rad: 0.0,
        };
        odom.reset(initial_pose, gyro_rad, positions);
        odom
    }

    /// Re-seed the odometry at `pose`.
    pub fn reset(
        &mut self, 
        pose: Pose, 
        gyro_rad: Option<f64>, 
        positions: &[ModulePosition; NUM_MODULES]
    ) {
        self.pose = pose;
        self.prev_positions = *positions;
        self.prev_heading_rad = pose.heading_rad;
        if let Some(g) = gyro_rad {
            self.gyro_offset_rad = pose.heading_rad - g;
        }
    }

    /// Integrate the motion since the last update.
    ///
    /// Without a gyro reading the heading change is taken from the wheels.
    pub fn update(
        &mut self, 
        gyro_rad: Option<f64>, 
        positions: &[ModulePosition; NUM_MODULES]
    ) -> Pose {
        let mut deltas = [ModulePosition::default(); NUM_MODULES];
        for (d, (curr, prev)) in deltas
            .iter_mut()
            .zip(positions.iter().zip(self.prev_positions.iter())) 
        {
            d.distance_m = curr.distance_m - prev.distance_m;
            d.angle_rad = curr.angle_rad;
        }

        let mut twist = self.kinematics.to_twist(&deltas);

        let heading_rad = match gyro_rad {
            Some(g) => {
                let h = wrap_pi(g + self.gyro_offset_rad);
                twist.dtheta_rad = get_ang_dist(self.prev_heading_rad, h);
                h
            },
            None => wrap_pi(self.prev_heading_rad + twist.dtheta_rad)
        };

        let mut new_pose = self.pose.exp(&twist);
        new_pose.heading_rad = heading_rad;

        trace!("Odometry twist {:?} -> {:?}", twist, new_pose);

        self.pose = new_pose;
        self.prev_positions = *positions;
        self.prev_heading_rad = heading_rad;

        new_pose
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kinematics::ModuleGeometry;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn odom(gyro: Option<f64>, pose: Pose) -> SwerveOdometry {
        SwerveOdometry::new(
            SwerveKinematics::new(&ModuleGeometry::rectangular(0.5, 0.5)).unwrap(),
            gyro,
            &[ModulePosition::default(); NUM_MODULES],
            pose,
        )
    }

    fn straight(distance_m: f64, angle_rad: f64) -> [ModulePosition; NUM_MODULES] {
        [ModulePosition { distance_m, angle_rad }; NUM_MODULES]
    }

    #[test]
    fn test_drive_forward() {
        let mut o = odom(Some(0.0), Pose::default());

        o.update(Some(0.0), &straight(0.5, 0.0));
        let p = o.update(Some(0.0), &straight(1.0, 0.0));

        assert_abs_diff_eq!(p.x_m(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y_m(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gyro_offset() {
        // Start facing +y with the raw gyro reading zero
        let mut o = odom(Some(0.0), Pose::new(1.0, 1.0, FRAC_PI_2));

        let p = o.update(Some(0.0), &straight(1.0, 0.0));
        assert_abs_diff_eq!(p.x_m(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y_m(), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.heading_rad, FRAC_PI_2, epsilon = 1e-9);

        // Re-seeding only moves the offset
        o.reset(Pose::new(0.0, 0.0, 0.0), Some(0.2), &straight(1.0, 0.0));
        let p = o.update(Some(0.2), &straight(2.0, 0.0));
        assert_abs_diff_eq!(p.x_m(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.heading_rad, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_gyro_uses_wheels() {
        let mut o = odom(None, Pose::default());

        // Spin on the spot by 0.1 rad, each wheel travels r * dtheta
        let r = 0.5f64.hypot(0.5);
        let angles = [
            3.0 * std::f64::consts::FRAC_PI_4,
            std::f64::consts::FRAC_PI_4,
            -3.0 * std::f64::consts::FRAC_PI_4,
            -std::f64::consts::FRAC_PI_4,
        ];
        let positions = angles.map(|a| ModulePosition { distance_m: r * 0.1, angle_rad: a });

        let p = o.update(None, &positions);
        assert_abs_diff_eq!(p.heading_rad, 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(p.x_m(), 0.0, epsilon = 1e-9);
    }
}
