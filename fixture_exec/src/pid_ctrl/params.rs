//! Hold controller parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the hold controller.
///
/// The same gains are used for all three channels.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CtrlParams {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,

    /// Period of the control loop.
    ///
    /// Units: seconds
    pub interval_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for CtrlParams {
    fn default() -> Self {
        Self {
            k_p: 1.2,
            k_i: 3.0,
            k_d: 0.15,
            interval_s: 0.05,
        }
    }
}
