//! # Calibration module
//!
//! Compensates orientations for the fixed tilt and eccentricity of the device
//! under test. Targets are calibrated before they are projected onto the
//! fixture, and measured orientations have the calibration removed before
//! they are recorded.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::convert::TryFrom;

use eqpt_if::Triple;
use serde::Deserialize;

use crate::geometry::{Zta, MRAD_PER_RAD};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Calibration constants of a device under test.
///
/// The default is the uncalibrated (identity) device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Calibration {
    /// Distance of the device's centre from the fixture axis.
    ///
    /// Units: micrometers
    pub ecc_dist_um: f64,

    /// Direction of the device's centre offset.
    ///
    /// Units: degrees
    pub ecc_dir_deg: f64,

    /// Tilt of the device relative to the fixture.
    ///
    /// Units: milliradians
    pub tip_angle_mrad: f64,

    /// Azimuth of the device's tilt.
    ///
    /// Units: degrees
    pub tip_dir_deg: f64,

    /// Reading of each sensor when the fixture is at its mechanical zero.
    ///
    /// Units: micrometers
    pub sensor_offsets_um: Triple,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Whether a calibration is being applied to a target or removed from a
/// measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalDirection {
    Apply,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CalibError {
    #[error("Calibration direction must be 1 (apply) or -1 (remove), found {0}")]
    InvalidDirection(i32),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Calibration {
    /// Shift `zta` by this calibration in the given direction.
    ///
    /// The tilt is combined as a 2D vector with the device tip. The height is
    /// then corrected for the eccentricity, using the input tilt when applying
    /// and the shifted tilt when removing. The two directions are therefore
    /// only inverse for small tips.
    pub fn calibrate(&self, zta: &Zta, direction: CalDirection) -> Zta {
        let sign = direction.sign();

        let tip_rad = self.tip_dir_deg.to_radians();
        let in_rad = zta.alpha_deg().to_radians();
        let tip_x = zta.theta_mrad() * in_rad.cos() + sign * self.tip_angle_mrad * tip_rad.cos();
        let tip_y = zta.theta_mrad() * in_rad.sin() + sign * self.tip_angle_mrad * tip_rad.sin();

        let theta_mrad = tip_x.hypot(tip_y);
        let alpha_deg = tip_y.atan2(tip_x).to_degrees();

        let z_um = match direction {
            CalDirection::Apply => {
                zta.z_um() + self.ecc_offset_um(zta.theta_mrad(), zta.alpha_deg())
            }
            CalDirection::Remove => zta.z_um() - self.ecc_offset_um(theta_mrad, alpha_deg),
        };

        Zta::new(z_um, theta_mrad, alpha_deg)
    }

    /// Calibrate a target orientation.
    pub fn apply(&self, zta: &Zta) -> Zta {
        self.calibrate(zta, CalDirection::Apply)
    }

    /// Remove the calibration from a measured orientation.
    pub fn remove(&self, zta: &Zta) -> Zta {
        self.calibrate(zta, CalDirection::Remove)
    }

    /// Height change at the device's centre for a tilt.
    fn ecc_offset_um(&self, theta_mrad: f64, alpha_deg: f64) -> f64 {
        (theta_mrad / MRAD_PER_RAD).sin()
            * self.ecc_dist_um
            * (alpha_deg - self.ecc_dir_deg).to_radians().cos()
    }
}

impl CalDirection {
    fn sign(self) -> f64 {
        match self {
            CalDirection::Apply => 1.0,
            CalDirection::Remove => -1.0,
        }
    }
}

impl TryFrom<i32> for CalDirection {
    type Error = CalibError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CalDirection::Apply),
            -1 => Ok(CalDirection::Remove),
            v => Err(CalibError::InvalidDirection(v)),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
