//! # Operator interaction

use super::EqptError;

/// Request for the operator to reposition a sensor in its collet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorAdjustRequest {
    /// The sensor channel to adjust.
    pub channel: usize,

    /// Lowest acceptable reading once adjusted.
    ///
    /// Units: micrometers
    pub min_um: f64,

    /// Highest acceptable reading once adjusted.
    ///
    /// Units: micrometers
    pub max_um: f64,
}

/// The person running the experiment.
pub trait Operator: Send {
    /// Ask the operator to move a sensor into the given window.
    ///
    /// `live` returns the current reading of the channel and may be polled as
    /// often as needed. This call shall block until the operator confirms the
    /// adjustment is complete.
    fn adjust_sensor(
        &mut self,
        request: &SensorAdjustRequest,
        live: &mut dyn FnMut() -> Result<f64, EqptError>,
    ) -> Result<(), EqptError>;
}
