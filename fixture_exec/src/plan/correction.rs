//! Projection of sensor errors onto actuator commands

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::{Triple, NUM_CHANNELS};

use super::Plan;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Plan {
    /// Calculate the actuator moves which correct a position error expressed
    /// in sensor space.
    ///
    /// `sensor_error` is the reading minus the target for each sensor. The
    /// tilt part of the error is projected onto each actuator's azimuth and
    /// scaled by the ratio of the radii, the mean error is the height error.
    ///
    /// The result is negated: a positive error needs a negative move, so
    /// callers add the result to their current command.
    ///
    /// Units: micrometers in, micrometers out
    pub fn correction(&self, sensor_error: &Triple) -> Triple {
        let z_error = sensor_error.iter().sum::<f64>() / NUM_CHANNELS as f64;
        let ratio = self.actuators.radius_mm() / self.sensors.radius_mm();

        let mut command = [0.0; NUM_CHANNELS];
        for (i, cmd) in command.iter_mut().enumerate() {
            let act_angle = self.actuators.angle_deg(i);

            let raw: f64 = sensor_error
                .iter()
                .zip(self.sensors.angles_deg().iter())
                .map(|(e, sen_angle)| e * (act_angle - sen_angle).to_radians().cos())
                .sum();

            *cmd = -(raw * ratio + z_error);
        }

        command
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
