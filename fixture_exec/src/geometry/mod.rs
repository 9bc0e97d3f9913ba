//! # Geometry module
//!
//! Describes the three point layouts of the fixture (actuators and sensors)
//! and the Z/theta/alpha orientation coordinate, and converts between that
//! coordinate and the heights at the three points of a layout.
//!
//! Conventions:
//! - Points are named X, Y, Z going clockwise, the sensor after each actuator
//!   shares its letter.
//! - Angles are in degrees, radii in millimeters, heights in micrometers and
//!   tilts in milliradians.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod transform;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::convert::TryFrom;

use eqpt_if::{Triple, NUM_CHANNELS};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use util::maths::wrap_deg_360;

pub use transform::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of micrometers in a millimeter.
pub const UM_PER_MM: f64 = 1000.0;

/// Two layout angles closer than this are considered the same point.
const ANGLE_EQ_TOL_DEG: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A three point layout of actuators or sensors around the fixture.
///
/// Immutable once built, the angles are guaranteed to be distinct and the
/// radius positive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "GeometryParams")]
pub struct Geometry {
    angles_deg: Triple,
    radius_mm: f64,
    range_um: Option<f64>,
    sensor_diameter: Option<f64>,
}

/// Raw description of a layout as it appears in a parameter file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GeometryParams {
    /// Angular position of the X point.
    ///
    /// Units: degrees
    pub alpha_x_deg: f64,

    /// Angular position of the Y point.
    ///
    /// Units: degrees
    pub alpha_y_deg: f64,

    /// Angular position of the Z point.
    ///
    /// Units: degrees
    pub alpha_z_deg: f64,

    /// Radius of the circle the points lie on.
    ///
    /// Units: millimeters
    pub radius_mm: f64,

    /// Measuring range of each sensor, sensor layouts only.
    ///
    /// Units: micrometers
    #[serde(default)]
    pub range_um: Option<f64>,

    /// Diameter of each sensor's sensing face, sensor layouts only. Used for
    /// tilt compensation of the readings.
    #[serde(default)]
    pub sensor_diameter: Option<f64>,
}

/// An orientation of the fixture.
///
/// The azimuth is always held in `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Zta {
    z_um: f64,
    theta_mrad: f64,
    alpha_deg: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by geometry construction and the coordinate transforms.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("Layout points {0} and {1} share the same angle ({2} deg)")]
    DuplicateAngles(usize, usize, f64),

    #[error("Layout radius must be positive and finite, found {0} mm")]
    InvalidRadius(f64),

    #[error("Sensor range must be positive and finite, found {0} um")]
    InvalidRange(f64),

    #[error("The heights do not define a plane (zero length normal)")]
    Degenerate,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Geometry {
    /// Create a new layout without sensor information.
    pub fn new(angles_deg: Triple, radius_mm: f64) -> Result<Self, GeometryError> {
        if !(radius_mm.is_finite() && radius_mm > 0.0) {
            return Err(GeometryError::InvalidRadius(radius_mm));
        }

        for i in 0..NUM_CHANNELS {
            for j in (i + 1)..NUM_CHANNELS {
                let diff = wrap_deg_360(angles_deg[i] - angles_deg[j]);
                if diff < ANGLE_EQ_TOL_DEG || (360.0 - diff) < ANGLE_EQ_TOL_DEG {
                    return Err(GeometryError::DuplicateAngles(i, j, angles_deg[i]));
                }
            }
        }

        Ok(Self {
            angles_deg,
            radius_mm,
            range_um: None,
            sensor_diameter: None,
        })
    }

    /// Create a new sensor layout with the sensors' range and face diameter.
    pub fn new_sensor(
        angles_deg: Triple,
        radius_mm: f64,
        range_um: f64,
        sensor_diameter: Option<f64>,
    ) -> Result<Self, GeometryError> {
        let mut geom = Self::new(angles_deg, radius_mm)?;
        geom.range_um = Some(check_range(range_um)?);
        geom.sensor_diameter = sensor_diameter;
        Ok(geom)
    }

    /// Angular positions of the three points, X, Y, Z.
    pub fn angles_deg(&self) -> &Triple {
        &self.angles_deg
    }

    /// Angular position of one point.
    pub fn angle_deg(&self, channel: usize) -> f64 {
        self.angles_deg[channel]
    }

    pub fn radius_mm(&self) -> f64 {
        self.radius_mm
    }

    pub fn radius_um(&self) -> f64 {
        self.radius_mm * UM_PER_MM
    }

    pub fn range_um(&self) -> Option<f64> {
        self.range_um
    }

    pub fn sensor_diameter(&self) -> Option<f64> {
        self.sensor_diameter
    }

    /// Cartesian position of a point in the fixture plane, with alpha = 0
    /// along the x axis.
    ///
    /// Units: micrometers
    pub fn point_um(&self, channel: usize) -> Vector2<f64> {
        let angle_rad = self.angles_deg[channel].to_radians();
        Vector2::new(angle_rad.cos(), angle_rad.sin()) * self.radius_um()
    }
}

impl TryFrom<GeometryParams> for Geometry {
    type Error = GeometryError;

    fn try_from(params: GeometryParams) -> Result<Self, Self::Error> {
        let mut geom = Geometry::new(
            [params.alpha_x_deg, params.alpha_y_deg, params.alpha_z_deg],
            params.radius_mm,
        )?;
        geom.range_um = params.range_um.map(check_range).transpose()?;
        geom.sensor_diameter = params.sensor_diameter;
        Ok(geom)
    }
}

fn check_range(range_um: f64) -> Result<f64, GeometryError> {
    if range_um.is_finite() && range_um > 0.0 {
        Ok(range_um)
    } else {
        Err(GeometryError::InvalidRange(range_um))
    }
}

impl Zta {
    /// Create a new orientation, wrapping the azimuth into `[0, 360)`.
    pub fn new(z_um: f64, theta_mrad: f64, alpha_deg: f64) -> Self {
        Self {
            z_um,
            theta_mrad,
            alpha_deg: wrap_deg_360(alpha_deg),
        }
    }

    pub fn z_um(&self) -> f64 {
        self.z_um
    }

    pub fn theta_mrad(&self) -> f64 {
        self.theta_mrad
    }

    pub fn alpha_deg(&self) -> f64 {
        self.alpha_deg
    }
}

impl Default for Zta {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl From<[f64; 3]> for Zta {
    fn from(zta: [f64; 3]) -> Self {
        Self::new(zta[0], zta[1], zta[2])
    }
}

impl From<Zta> for [f64; 3] {
    fn from(zta: Zta) -> Self {
        [zta.z_um, zta.theta_mrad, zta.alpha_deg]
    }
}

impl std::fmt::Display for Zta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[z: {:.3} um, theta: {:.4} mrad, alpha: {:.2} deg]",
            self.z_um, self.theta_mrad, self.alpha_deg
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
