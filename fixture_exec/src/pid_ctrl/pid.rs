//! # PID controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Instant;

use super::CtrlParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller tracking a fixed setpoint
#[derive(Debug, Clone)]
pub struct PidController {
    /// Previous instant that a measurement was passed in
    prev_time: Option<Instant>,

    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Dervative gain
    k_d: f64,

    /// The value the controller drives the measurement towards
    setpoint: f64,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, k_d: f64, setpoint: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            setpoint,
            integral: 0f64,
            prev_time: None,
            prev_error: None,
        }
    }

    /// Create a new controller using the gains from the parameters.
    pub fn from_params(params: &CtrlParams, setpoint: f64) -> Self {
        Self::new(params.k_p, params.k_i, params.k_d, setpoint)
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Start timing, so that the first measurement integrates over the time
    /// since now.
    pub fn start(&mut self) {
        self.prev_time = Some(Instant::now());
    }

    /// Get the value of the controller for the given measurement.
    ///
    /// This function is time-aware so there is no need to pass in a delta-time
    /// value.
    pub fn get(&mut self, measurement: f64) -> f64 {
        // Get current time
        let curr_time = Instant::now();

        // Calculate dt
        let dt = self
            .prev_time
            .map(|t0| (curr_time - t0).as_secs_f64());

        let out = self.step(self.setpoint - measurement, dt);

        self.prev_time = Some(curr_time);

        out
    }

    /// Advance the controller by `dt` seconds with the given error.
    fn step(&mut self, error: f64, dt: Option<f64>) -> f64 {
        // Filter out a zero time difference as well as a missing one
        let dt = dt.filter(|t| *t > 0.0);

        // Accumulate the integral term.
        //
        // If there's no time difference then we don't accumulate the integral,
        // adding the raw error would produce a large spike.
        self.integral += match dt {
            Some(t) => error * t,
            None => 0f64,
        };

        // Calculate the derivative.
        //
        // With no previous error there is nothing to differentiate against.
        let deriv = match (self.prev_error, dt) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0f64,
        };

        // Calculate the output
        let out = self.k_p * error + self.k_i * self.integral + self.k_d * deriv;

        // Remember the previous error
        self.prev_error = Some(error);

        out
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_proportional() {
        let mut pid = PidController::new(2.0, 0.0, 0.0, 10.0);
        assert_abs_diff_eq!(pid.step(10.0 - 4.0, None), 12.0);
        assert_abs_diff_eq!(pid.step(10.0 - 12.0, Some(0.1)), -4.0);
    }

    #[test]
    fn test_integral_and_derivative() {
        let mut pid = PidController::new(0.0, 1.0, 0.0, 0.0);
        assert_abs_diff_eq!(pid.step(1.0, Some(0.5)), 0.5);
        assert_abs_diff_eq!(pid.step(1.0, Some(0.5)), 1.0);
        assert_abs_diff_eq!(pid.step(-2.0, None), 1.0);

        let mut pid = PidController::new(0.0, 0.0, 1.0, 0.0);
        // No derivative kick on the first error
        assert_abs_diff_eq!(pid.step(5.0, Some(0.1)), 0.0);
        assert_abs_diff_eq!(pid.step(6.0, Some(0.1)), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_get_uses_setpoint() {
        let mut pid = PidController::from_params(
            &CtrlParams {
                k_p: 1.0,
                k_i: 0.0,
                k_d: 0.0,
                interval_s: 0.05,
            },
            100.0,
        );
        assert_eq!(pid.setpoint(), 100.0);
        assert_abs_diff_eq!(pid.get(90.0), 10.0);
    }
}
