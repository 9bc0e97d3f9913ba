//! Coordinate transforms between orientation (ZTA) and three point heights.
//!
//! The two transforms are only inverse to each other in the small tilt limit.
//! `zta_from_heights` linearises the tilt the same way the capacitive sensors
//! do, so round trips drift as theta grows. This is relied upon and must not
//! be corrected.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::{Triple, NUM_CHANNELS};
use nalgebra::Vector3;
use util::maths::wrap_deg_360;

use super::{Geometry, GeometryError, Zta};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of milliradians in a radian.
pub const MRAD_PER_RAD: f64 = 1000.0;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Calculate the heights at the three points of `geometry` for the given
/// orientation.
///
/// `h_i = z - r * theta * cos(a_i - alpha)`
pub fn heights_from_zta(zta: &Zta, geometry: &Geometry) -> Triple {
    let tilt_rad = zta.theta_mrad() / MRAD_PER_RAD;
    let radius_um = geometry.radius_um();

    let mut heights = [0.0; NUM_CHANNELS];
    for (h, angle_deg) in heights.iter_mut().zip(geometry.angles_deg().iter()) {
        *h = zta.z_um() - radius_um * tilt_rad * (angle_deg - zta.alpha_deg()).to_radians().cos();
    }

    heights
}

/// Calculate the orientation of the plane passing through the three points
/// of `geometry` at the given heights.
///
/// Z is the mean height. The plane normal is found from the cross product of
/// two edges of the triangle, its azimuth gives alpha and the length of its
/// projection onto the fixture plane gives theta, with a small angle
/// correction applied.
pub fn zta_from_heights(heights: &Triple, geometry: &Geometry) -> Result<Zta, GeometryError> {
    let z_um = heights.iter().sum::<f64>() / NUM_CHANNELS as f64;

    // Points in 3D, using the heights as the third axis
    let p = [
        geometry.point_um(0),
        geometry.point_um(1),
        geometry.point_um(2),
    ];
    let edge_01 = Vector3::new(p[0].x - p[1].x, p[0].y - p[1].y, heights[0] - heights[1]);
    let edge_02 = Vector3::new(p[0].x - p[2].x, p[0].y - p[2].y, heights[0] - heights[2]);

    let normal = edge_01.cross(&edge_02);
    let length = normal.norm();

    // Also catches NaN and infinite heights
    if !(length.is_finite() && length > f64::EPSILON) {
        return Err(GeometryError::Degenerate);
    }

    let alpha_deg = wrap_deg_360(normal.y.atan2(normal.x).to_degrees());

    // Project the unit normal onto the fixture plane
    let unit = normal / length;
    let theta_raw = (unit.x.powi(2) + unit.y.powi(2)).sqrt();

    Ok(Zta::new(z_um, theta_raw.sin() * MRAD_PER_RAD, alpha_deg))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
