//! # Recording equipment

use serde::{Deserialize, Serialize};

use super::EqptError;
use crate::Triple;

/// One measurement taken while the fixture holds a target orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Index of the plan point being held.
    pub point_index: usize,

    /// Repeat number within the hold.
    pub repeat: usize,

    /// Time since the start of the run.
    ///
    /// Units: seconds
    pub elapsed_s: f64,

    /// Measured mean height.
    ///
    /// Units: micrometers
    pub z_um: f64,

    /// Measured tilt magnitude.
    ///
    /// Units: milliradians
    pub theta_mrad: f64,

    /// Measured tilt azimuth.
    ///
    /// Units: degrees, in [0, 360)
    pub alpha_deg: f64,

    /// The quantity read from the meter.
    pub quantity: f64,

    /// Zeroed sensor heights the orientation was computed from.
    ///
    /// Units: micrometers
    pub sensor_um: Triple,
}

/// A sink for measurement samples.
pub trait Recorder: Send {
    /// Publish one sample.
    ///
    /// Failures are reported to the caller, who shall log them and carry on.
    fn publish_sample(&mut self, sample: &Sample) -> Result<(), EqptError>;

    /// Stop recording, flushing anything pending.
    fn stop(&mut self) -> Result<(), EqptError>;
}
