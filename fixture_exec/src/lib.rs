//! # Fixture library.
//!
//! Control software for the CapS three point test fixture. Allows the
//! executable, benchmarks and other crates in the workspace to access the
//! items defined inside the fixture crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Geometry module - three point layouts and the ZTA coordinate transforms
pub mod geometry;

/// Calibration module - compensates for the tilt and eccentricity of the device under test
pub mod calib;

/// Plan module - the targets of an experiment projected onto the actuators and sensors
pub mod plan;

/// Piezo driver - clamps every voltage sent to the piezo supplies
pub mod piezo;

/// Sensor reader - reads the displacement sensors with optional tilt compensation
pub mod sensing;

/// Hold controller - background PID loops holding the fixture at a position
pub mod pid_ctrl;

/// Fixture module - sequences the moves, holds and measurements of an experiment
pub mod fixture;

/// Simulated fixture - plant model implementing all equipment interfaces
pub mod sim;
