//! # Swerve drivetrain library.
//!
//! This library allows other crates in the workspace (and the integration
//! tests) to access items defined inside the drivetrain crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Autonomous path handoff - requests trajectories and follows them
pub mod auto;

/// Data store - global state of the executable
pub mod data_store;

/// Drivetrain control - converts driver and auto demands into module targets
pub mod drive_ctrl;

/// Swerve kinematics - maps chassis velocities to module states and back
pub mod kinematics;

/// Localisation - fuses wheel odometry and vision into a field pose
pub mod loc;

/// Simulated hardware - stands in for the real modules, gyro and cameras
pub mod sim;

/// Telecommand processor - routes telecommands into the data store
pub mod tc_processor;

/// Wheel module abstraction - one steerable, driven wheel
pub mod wheel_module;
