//! Parameters structure for the auto path handoff

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for autonomous driving.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoParams {
    /// If `false` every auto request yields a no-op command.
    pub dynamic_pathfinding_enabled: bool,

    // ---- FOLLOWER ----

    /// Proportional gain on the x and y position errors.
    ///
    /// Units: (meters/second)/meter
    pub translation_k_p: f64,

    /// Proportional gain on the heading error.
    ///
    /// Units: (radians/second)/radian
    pub rotation_k_p: f64,

    /// The trajectory is complete once its time has elapsed and the robot is
    /// within these tolerances of the end pose.
    ///
    /// Units: meters, radians
    pub position_tolerance_m: f64,
    pub heading_tolerance_rad: f64,

    /// Time allowed after the end of the trajectory to settle into tolerance
    /// before the command finishes regardless.
    ///
    /// Units: seconds
    pub settle_time_s: f64,

    // ---- DESTINATIONS ----

    /// Selectable destinations, in selector order.
    pub destinations: Vec<Destination>,
}

/// A destination the robot can be sent to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Destination {
    pub name: String,

    /// Names of the pre-planned approach paths, the pathfinder picks the
    /// best of these from the robot's current pose.
    pub candidate_paths: Vec<String>,

    /// Nominal end pose, [x m, y m, heading rad].
    pub goal: [f64; 3],
}

impl Default for AutoParams {
    fn default() -> Self {
        Self {
            dynamic_pathfinding_enabled: true,
            translation_k_p: 1.35,
            rotation_k_p: 1.5,
            position_tolerance_m: 0.05,
            heading_tolerance_rad: 0.05,
            settle_time_s: 1.0,
            destinations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_param_file() {
        let p: AutoParams = util::params::from_toml_str(
            include_str!("../../../params/auto_handoff.toml")
        ).unwrap();

        assert!(p.dynamic_pathfinding_enabled);
        assert_eq!(p.translation_k_p, 1.35);
        assert_eq!(p.rotation_k_p, 1.5);
        assert_eq!(p.destinations.len(), 8);
        assert_eq!(p.destinations[0].candidate_paths[1], "ClockwiseToReef1");
        assert_eq!(p.destinations[7].name, "HumanPlayer2");
    }
}
