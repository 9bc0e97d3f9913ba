//! # Sensor reader
//!
//! Reads the displacement sensors, optionally compensating each reading for
//! the over-read a capacitive sensor shows when its target is tilted.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::{lock, EqptError, SensorArray, Shared, Triple, NUM_CHANNELS};
use log::warn;

use crate::geometry::{zta_from_heights, Geometry, MRAD_PER_RAD};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const EQPT_NAME: &str = "sensor array";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Reads the sensor array.
///
/// Cheap to clone, clones share the same sensors.
#[derive(Clone)]
pub struct SensorReader {
    sensors: Shared<dyn SensorArray>,
    geometry: Geometry,
    tilt_compensation: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SensorReader {
    pub fn new(sensors: Shared<dyn SensorArray>, geometry: Geometry, tilt_compensation: bool) -> Self {
        Self {
            sensors,
            geometry,
            tilt_compensation,
        }
    }

    /// Read all three sensors.
    ///
    /// Units: micrometers
    pub fn read(&self) -> Result<Triple, EqptError> {
        let raw = self.read_raw()?;

        if self.tilt_compensation {
            Ok(compensate_tilt(&raw, &self.geometry))
        } else {
            Ok(raw)
        }
    }

    /// Read one sensor.
    pub fn read_channel(&self, channel: usize) -> Result<f64, EqptError> {
        check_channel(channel)?;
        Ok(self.read()?[channel])
    }

    /// Read one sensor without tilt compensation.
    pub fn read_raw_channel(&self, channel: usize) -> Result<f64, EqptError> {
        check_channel(channel)?;
        Ok(self.read_raw()?[channel])
    }

    fn read_raw(&self) -> Result<Triple, EqptError> {
        let raw = lock(&self.sensors, EQPT_NAME)?.measure()?;

        if raw.iter().any(|m| !m.is_finite()) {
            return Err(EqptError::InvalidReading {
                eqpt: EQPT_NAME.into(),
                msg: format!("non-finite reading {:?}", raw),
            });
        }

        Ok(raw)
    }

    /// Difference between the present readings and the setpoints, positive
    /// when the sensor reads above its setpoint.
    pub fn error_to(&self, setpoints: &Triple) -> Result<Triple, EqptError> {
        let mut error = self.read()?;
        for (e, s) in error.iter_mut().zip(setpoints.iter()) {
            *e -= s;
        }
        Ok(error)
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

impl std::fmt::Debug for SensorReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorReader")
            .field("geometry", &self.geometry)
            .field("tilt_compensation", &self.tilt_compensation)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Correct raw readings for the tilt of the target.
///
/// The tilt is estimated from the readings themselves. Readings which are not
/// positive are left as they are, as is every reading if the tilt can't be
/// found or the geometry doesn't give a sensor diameter.
pub fn compensate_tilt(raw: &Triple, geometry: &Geometry) -> Triple {
    let diameter = match geometry.sensor_diameter() {
        Some(d) => d,
        None => {
            warn!("No sensor diameter set, readings are not tilt compensated");
            return *raw;
        }
    };

    let theta_mrad = match zta_from_heights(raw, geometry) {
        Ok(zta) => zta.theta_mrad(),
        Err(e) => {
            warn!("Cannot compensate readings {:?} for tilt: {}", raw, e);
            return *raw;
        }
    };

    let face = (diameter / 1e6 / 2.0).powi(2) * (theta_mrad / MRAD_PER_RAD).tan().powi(2);

    let mut out = *raw;
    for m in out.iter_mut().filter(|m| **m > 0.0) {
        *m *= 1.0 + face / (4.0 * *m / 1e6).powi(2);
    }
    out
}

fn check_channel(channel: usize) -> Result<(), EqptError> {
    if channel >= NUM_CHANNELS {
        return Err(EqptError::InvalidChannel {
            eqpt: EQPT_NAME.into(),
            channel,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
