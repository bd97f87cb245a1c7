//! # Communications interface crate.
//!
//! Provides the common interface types exchanged across the drivetrain's
//! boundary: telecommands from the operator (or a script) and readings from
//! equipment such as the vision cameras.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod tc;

/// Readings produced by equipment (like the vision cameras)
pub mod eqpt;
