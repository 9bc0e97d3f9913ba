//! # Piezo driver
//!
//! Wraps the piezo power supplies so that every voltage sent to them is
//! first clamped into the safe range of the actuators. Clamping is never an
//! error, it is logged and the clamped voltage is used.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::{lock, EqptError, PiezoSupply, Shared, NUM_CHANNELS};
use log::warn;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const EQPT_NAME: &str = "piezo supply";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Safe output range of the piezo supplies.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoltageLimits {
    /// Units: volts
    pub min_v: f64,

    /// Units: volts
    pub max_v: f64,
}

/// Clamping access to the piezo power supplies.
///
/// Cheap to clone, clones share the same supplies.
#[derive(Clone)]
pub struct PiezoDriver {
    supply: Shared<dyn PiezoSupply>,
    limits: VoltageLimits,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The outcome of clamping a voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clamp {
    Within,
    Over,
    Under,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for VoltageLimits {
    fn default() -> Self {
        Self {
            min_v: 0.0,
            max_v: 100.0,
        }
    }
}

impl VoltageLimits {
    /// Clamp a voltage into the limits.
    pub fn clamp(&self, volts: f64) -> (f64, Clamp) {
        if volts > self.max_v {
            (self.max_v, Clamp::Over)
        } else if volts < self.min_v {
            (self.min_v, Clamp::Under)
        } else {
            (volts, Clamp::Within)
        }
    }

    /// Clamp the voltage for a channel, logging a warning if it was out of
    /// range.
    pub fn check(&self, channel: usize, volts: f64) -> f64 {
        let (clamped, clamp) = self.clamp(volts);
        match clamp {
            Clamp::Over => warn!(
                "Overvoltage clamped on channel {}: {:.2} V -> {:.2} V",
                channel, volts, clamped
            ),
            Clamp::Under => warn!(
                "Undervoltage clamped on channel {}: {:.2} V -> {:.2} V",
                channel, volts, clamped
            ),
            Clamp::Within => (),
        }
        clamped
    }
}

impl PiezoDriver {
    pub fn new(supply: Shared<dyn PiezoSupply>, limits: VoltageLimits) -> Self {
        Self { supply, limits }
    }

    pub fn limits(&self) -> &VoltageLimits {
        &self.limits
    }

    /// Set the voltage of a channel, clamped into the limits.
    ///
    /// Returns the voltage that was actually commanded.
    pub fn set_voltage(&self, channel: usize, volts: f64) -> Result<f64, EqptError> {
        check_channel(channel)?;
        let volts = self.limits.check(channel, volts);
        lock(&self.supply, EQPT_NAME)?.set_voltage(channel, volts)?;
        Ok(volts)
    }

    /// Change the voltage of a channel relative to its present output,
    /// clamped into the limits.
    ///
    /// Returns the voltage that was actually commanded.
    pub fn set_voltage_rel(&self, channel: usize, change_v: f64) -> Result<f64, EqptError> {
        check_channel(channel)?;
        let mut supply = lock(&self.supply, EQPT_NAME)?;
        let volts = self.limits.check(channel, supply.get_voltage(channel)? + change_v);
        supply.set_voltage(channel, volts)?;
        Ok(volts)
    }

    /// Set every channel to the same voltage.
    pub fn set_all(&self, volts: f64) -> Result<(), EqptError> {
        for ch in 0..NUM_CHANNELS {
            self.set_voltage(ch, volts)?;
        }
        Ok(())
    }

    pub fn get_voltage(&self, channel: usize) -> Result<f64, EqptError> {
        check_channel(channel)?;
        lock(&self.supply, EQPT_NAME)?.get_voltage(channel)
    }

    pub fn set_enabled(&self, channel: usize, enabled: bool) -> Result<(), EqptError> {
        check_channel(channel)?;
        lock(&self.supply, EQPT_NAME)?.set_enabled(channel, enabled)
    }

    pub fn set_slew_rate(&self, channel: usize, volts_per_s: f64) -> Result<(), EqptError> {
        check_channel(channel)?;
        lock(&self.supply, EQPT_NAME)?.set_slew_rate(channel, volts_per_s)
    }
}

impl std::fmt::Debug for PiezoDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiezoDriver")
            .field("limits", &self.limits)
            .finish()
    }
}

fn check_channel(channel: usize) -> Result<(), EqptError> {
    if channel < NUM_CHANNELS {
        Ok(())
    } else {
        Err(EqptError::InvalidChannel {
            eqpt: EQPT_NAME.into(),
            channel,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockSupply {
        volts: [f64; 3],
    }

    impl PiezoSupply for MockSupply {
        fn set_voltage(&mut self, channel: usize, volts: f64) -> Result<(), EqptError> {
            self.volts[channel] = volts;
            Ok(())
        }

        fn get_voltage(&mut self, channel: usize) -> Result<f64, EqptError> {
            Ok(self.volts[channel])
        }

        fn set_enabled(&mut self, _: usize, _: bool) -> Result<(), EqptError> {
            Ok(())
        }

        fn set_slew_rate(&mut self, _: usize, _: f64) -> Result<(), EqptError> {
            Ok(())
        }
    }

    #[test]
    fn test_clamp() {
        let limits = VoltageLimits::default();
        assert_eq!(limits.clamp(150.0), (100.0, Clamp::Over));
        assert_eq!(limits.clamp(-5.0), (0.0, Clamp::Under));
        assert_eq!(limits.clamp(42.0), (42.0, Clamp::Within));
        assert_eq!(limits.clamp(100.0), (100.0, Clamp::Within));
    }

    #[test]
    fn test_set_voltage_clamped() {
        let supply = Arc::new(Mutex::new(MockSupply::default()));
        let driver = PiezoDriver::new(supply.clone(), VoltageLimits::default());

        // Over range is clamped and reported as an over voltage, not an error
        assert_eq!(driver.limits().clamp(150.0), (100.0, Clamp::Over));
        assert_eq!(driver.set_voltage(1, 150.0).unwrap(), 100.0);
        assert_eq!(supply.lock().unwrap().volts, [0.0, 100.0, 0.0]);

        assert_eq!(driver.set_voltage(0, 30.0).unwrap(), 30.0);
        assert_eq!(driver.set_voltage_rel(0, -45.0).unwrap(), 0.0);
        assert_eq!(driver.set_voltage_rel(1, -12.5).unwrap(), 87.5);
        assert_eq!(supply.lock().unwrap().volts, [0.0, 87.5, 0.0]);
    }

    #[test]
    fn test_invalid_channel() {
        let driver = PiezoDriver::new(
            Arc::new(Mutex::new(MockSupply::default())),
            VoltageLimits::default(),
        );
        assert!(matches!(
            driver.set_voltage(3, 10.0),
            Err(EqptError::InvalidChannel { channel: 3, .. })
        ));
    }
}
