//! # Equipment Interface
//!
//! This module defines the structures equipment publishes to the drivetrain.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod vision;
