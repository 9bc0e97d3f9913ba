//! Fixture and experiment parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::geometry::Zta;
use crate::piezo::VoltageLimits;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Timings and limits of the fixture's move sequences.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FixtureParams {
    /// Number of coarse motor moves made towards each target
    pub coarse_attempts: usize,

    /// Time to wait after each coarse move.
    ///
    /// Units: seconds
    pub coarse_settle_s: f64,

    /// Number of open loop piezo moves made towards each target
    pub fine_iterations: usize,

    /// Time to wait after each fine move for the piezos to slew.
    ///
    /// Units: seconds
    pub fine_settle_s: f64,

    /// Piezo voltage change per micrometer of actuator travel.
    ///
    /// Units: volts/micrometer
    pub volts_per_um: f64,

    /// Voltage the piezos are parked at between coarse moves.
    ///
    /// Units: volts
    pub rest_voltage_v: f64,

    /// Safe range of the piezo voltages
    pub voltage_limits: VoltageLimits,

    /// Slew rate set on the piezo supplies at power up.
    ///
    /// Units: volts/second
    pub slew_rate_v_per_s: f64,

    /// Time to wait for the supplies to reach the rest voltage at power up.
    ///
    /// Units: seconds
    pub power_settle_s: f64,

    /// Time to wait for the supplies to reach zero volts at shutdown.
    ///
    /// Units: seconds
    pub shutdown_settle_s: f64,

    /// Time to wait at the end of a run before stopping the recorders.
    ///
    /// Units: seconds
    pub completion_wait_s: f64,

    /// Number of times the operator is asked to adjust a sensor before
    /// giving up on zeroing it
    pub max_zero_attempts: usize,

    /// Compensate the sensor readings for the tilt of the platform
    pub sensor_tilt_compensation: bool,
}

/// The experiment to run.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ExperimentParams {
    /// Target orientations as `[z_um, theta_mrad, alpha_deg]`
    pub points: Vec<Zta>,

    /// Use the coarse motors to reach each target
    #[serde(default)]
    pub use_motors: bool,

    /// Time to hold each target before measuring.
    ///
    /// Units: seconds
    pub hold_period_s: f64,

    /// Number of samples taken at each target
    pub repeats: usize,

    /// Time between samples.
    ///
    /// Units: seconds
    pub interval_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for FixtureParams {
    fn default() -> Self {
        Self {
            coarse_attempts: 3,
            coarse_settle_s: 0.2,
            fine_iterations: 2,
            fine_settle_s: 0.5,
            volts_per_um: 100.0 / 36.0,
            rest_voltage_v: 50.0,
            voltage_limits: VoltageLimits::default(),
            slew_rate_v_per_s: 500.0,
            power_settle_s: 1.0,
            shutdown_settle_s: 1.0,
            completion_wait_s: 1.0,
            max_zero_attempts: 3,
            sensor_tilt_compensation: true,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
