//! # Equipment interface crate.
//!
//! Provides the interfaces between the fixture control software and the
//! instruments it drives: capacitive position sensors, piezo power supplies,
//! coarse stepper motors, the quantity meter under test, data recorders and
//! the operator.
//!
//! Instrument drivers live outside this workspace and implement these traits.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Collaborator traits and the data they exchange
pub mod eqpt;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use eqpt::*;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of channels in each three point set (actuators, sensors).
pub const NUM_CHANNELS: usize = 3;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// One value per channel, ordered X, Y, Z.
pub type Triple = [f64; NUM_CHANNELS];
