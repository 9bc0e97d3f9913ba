//! # Sensing equipment

use super::EqptError;
use crate::Triple;

/// A set of three displacement sensors, one at each point of the sensor
/// geometry.
pub trait SensorArray: Send {
    /// Measure all three channels.
    ///
    /// Units: micrometers, ordered X, Y, Z.
    fn measure(&mut self) -> Result<Triple, EqptError>;
}

/// The instrument measuring the physical quantity of the device under test,
/// for example a capacitance bridge.
pub trait Meter: Send {
    /// Take one reading of the quantity.
    fn measure(&mut self) -> Result<f64, EqptError>;

    /// Units of the quantity, used for display only.
    fn units(&self) -> &str;
}
