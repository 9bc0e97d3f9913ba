//! # Actuation equipment

use super::EqptError;
use crate::Triple;

/// Power supply channels driving the three piezo actuators.
///
/// Channels are numbered 0 to 2 in actuator order X, Y, Z. Implementations
/// may assume that every voltage they are given has already been clamped into
/// the fixture's safe range.
pub trait PiezoSupply: Send {
    /// Set the output voltage demand of a channel.
    fn set_voltage(&mut self, channel: usize, volts: f64) -> Result<(), EqptError>;

    /// Get the present output voltage of a channel.
    fn get_voltage(&mut self, channel: usize) -> Result<f64, EqptError>;

    /// Enable or disable the output of a channel.
    fn set_enabled(&mut self, channel: usize, enabled: bool) -> Result<(), EqptError>;

    /// Set the rate at which a channel slews to a new demand.
    ///
    /// Units: volts/second
    fn set_slew_rate(&mut self, channel: usize, volts_per_s: f64) -> Result<(), EqptError>;
}

/// The three coarse stepper motors under the actuators.
pub trait CoarseMotors: Send {
    /// Move each motor by the given relative distance.
    ///
    /// Units: micrometers, ordered X, Y, Z.
    fn move_relative(&mut self, move_um: Triple) -> Result<(), EqptError>;
}
