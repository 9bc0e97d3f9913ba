//! # Simulated fixture
//!
//! A plant model of the test fixture which implements every equipment
//! interface, for dry runs of an experiment and for testing.
//!
//! Each actuator's height is its motor position plus its piezo voltage times
//! the piezo gain. The piezo voltage follows the demand with a first order
//! lag and the supply's slew rate. The platform is the plane through the
//! three actuator points, the sensors read that plane at their own points
//! plus their mechanical zero. The meter reads a parallel plate capacitance
//! across the gap between the platform and a fixed electrode.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, Mutex};
use std::time::Instant;

use eqpt_if::{
    lock, CoarseMotors, EqptError, Meter, Operator, PiezoSupply, Recorder, Sample,
    SensorAdjustRequest, SensorArray, Shared, Triple, NUM_CHANNELS,
};
use log::{debug, info};
use serde::Deserialize;

use crate::fixture::FixtureEqpt;
use crate::geometry::{heights_from_zta, zta_from_heights, Geometry};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const EQPT_NAME: &str = "simulated fixture";

/// Permittivity of free space.
///
/// Units: farads/meter
const EPSILON_0: f64 = 8.854_187_812_8e-12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulated fixture.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Piezo extension per volt.
    ///
    /// Units: micrometers/volt
    pub um_per_volt: f64,

    /// Time constant of the piezo response to a new voltage demand. Zero
    /// gives an instant response.
    ///
    /// Units: seconds
    pub response_time_s: f64,

    /// Reading of each sensor with the platform at zero height.
    ///
    /// Units: micrometers
    pub sensor_zero_um: Triple,

    /// Initial position of each coarse motor.
    ///
    /// Units: micrometers
    pub motor_init_um: Triple,

    /// Gap between the platform at zero height and the meter's electrode.
    ///
    /// Units: micrometers
    pub meter_gap_um: f64,

    /// Area of the meter's electrode.
    ///
    /// Units: square millimeters
    pub meter_area_mm2: f64,
}

/// The state of the simulated fixture.
#[derive(Debug)]
pub struct SimPlant {
    params: SimParams,
    actuators: Geometry,
    sensors: Geometry,

    enabled: [bool; NUM_CHANNELS],
    slew_rate: Triple,
    demand_v: Triple,
    output_v: Triple,
    motors_um: Triple,
    sensor_zero_um: Triple,

    last_update: Instant,

    /// Remaining sensor reads before the sensors start failing
    sensor_fail_after: Option<usize>,
}

/// Handles onto the simulation for inspection after a run.
#[derive(Clone)]
pub struct SimHandle {
    pub plant: Shared<SimPlant>,
    pub samples: Arc<Mutex<Vec<Sample>>>,
}

pub struct SimSensors(Shared<SimPlant>);
pub struct SimPiezos(Shared<SimPlant>);
pub struct SimMotors(Shared<SimPlant>);
pub struct SimMeter(Shared<SimPlant>);

/// Stores every sample it is given.
pub struct MemoryRecorder {
    samples: Arc<Mutex<Vec<Sample>>>,
    stopped: bool,
}

/// An operator who sets each sensor to the middle of the window it is asked
/// for.
pub struct SimOperator(Shared<SimPlant>);

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build a complete set of simulated equipment.
pub fn build(
    params: SimParams,
    actuators: Geometry,
    sensors: Geometry,
    use_motors: bool,
) -> (FixtureEqpt, SimHandle) {
    let plant = Arc::new(Mutex::new(SimPlant::new(params, actuators, sensors)));
    let samples = Arc::new(Mutex::new(Vec::new()));

    let motors: Option<Box<dyn CoarseMotors>> = if use_motors {
        Some(Box::new(SimMotors(plant.clone())))
    } else {
        None
    };

    let eqpt = FixtureEqpt {
        sensors: Arc::new(Mutex::new(SimSensors(plant.clone()))),
        piezos: Arc::new(Mutex::new(SimPiezos(plant.clone()))),
        motors,
        meter: Box::new(SimMeter(plant.clone())),
        recorders: vec![Box::new(MemoryRecorder::new(samples.clone()))],
        operator: Box::new(SimOperator(plant.clone())),
    };

    info!("Simulated fixture built");

    (eqpt, SimHandle { plant, samples })
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            um_per_volt: 0.36,
            response_time_s: 0.1,
            sensor_zero_um: [340.0, 324.0, 327.0],
            motor_init_um: [0.0; NUM_CHANNELS],
            meter_gap_um: 500.0,
            meter_area_mm2: 100.0,
        }
    }
}

impl SimPlant {
    pub fn new(params: SimParams, actuators: Geometry, sensors: Geometry) -> Self {
        Self {
            params,
            actuators,
            sensors,
            enabled: [false; NUM_CHANNELS],
            slew_rate: [0.0; NUM_CHANNELS],
            demand_v: [0.0; NUM_CHANNELS],
            output_v: [0.0; NUM_CHANNELS],
            motors_um: params.motor_init_um,
            sensor_zero_um: params.sensor_zero_um,
            last_update: Instant::now(),
            sensor_fail_after: None,
        }
    }

    /// Make the sensors fail after the given number of further reads.
    pub fn fail_sensors_after(&mut self, reads: usize) {
        self.sensor_fail_after = Some(reads);
    }

    pub fn output_v(&mut self) -> Triple {
        self.update();
        self.output_v
    }

    pub fn enabled(&self) -> [bool; NUM_CHANNELS] {
        self.enabled
    }

    pub fn motors_um(&self) -> Triple {
        self.motors_um
    }

    /// Height of each actuator.
    ///
    /// Units: micrometers
    pub fn actuator_heights(&mut self) -> Triple {
        self.update();
        let mut heights = self.motors_um;
        for (h, v) in heights.iter_mut().zip(self.output_v.iter()) {
            *h += v * self.params.um_per_volt;
        }
        heights
    }

    /// Height of the platform under each sensor, without the sensor zero.
    pub fn platform_at_sensors(&mut self) -> Result<Triple, EqptError> {
        let heights = self.actuator_heights();
        let zta = zta_from_heights(&heights, &self.actuators)
            .map_err(|e| EqptError::InvalidReading {
                eqpt: EQPT_NAME.into(),
                msg: e.to_string(),
            })?;
        Ok(heights_from_zta(&zta, &self.sensors))
    }

    /// Advance the piezo outputs to the present time.
    fn update(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_update).as_secs_f64();
        self.last_update = now;

        let tau = self.params.response_time_s;
        let fraction = if tau > 0.0 { 1.0 - (-dt / tau).exp() } else { 1.0 };

        for ch in 0..NUM_CHANNELS {
            let target = if self.enabled[ch] { self.demand_v[ch] } else { 0.0 };
            let mut delta = (target - self.output_v[ch]) * fraction;

            let max_delta = self.slew_rate[ch] * dt;
            if self.slew_rate[ch] > 0.0 && delta.abs() > max_delta {
                delta = max_delta.copysign(delta);
            }

            self.output_v[ch] += delta;
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
}

impl SensorArray for SimSensors {
    fn measure(&mut self) -> Result<Triple, EqptError> {
        let mut plant = lock(&self.0, EQPT_NAME)?;

        match plant.sensor_fail_after {
            Some(0) => return Err(EqptError::comms("simulated sensors", "no response")),
            Some(ref mut n) => *n -= 1,
            None => (),
        }

        let mut readings = plant.platform_at_sensors()?;
        for (r, z) in readings.iter_mut().zip(plant.sensor_zero_um.iter()) {
            *r += z;
        }
        Ok(readings)
    }
}

impl PiezoSupply for SimPiezos {
    fn set_voltage(&mut self, channel: usize, volts: f64) -> Result<(), EqptError> {
        SimPlant::check_channel(channel)?;
        let mut plant = lock(&self.0, EQPT_NAME)?;
        plant.update();
        plant.demand_v[channel] = volts;
        Ok(())
    }

    fn get_voltage(&mut self, channel: usize) -> Result<f64, EqptError> {
        SimPlant::check_channel(channel)?;
        Ok(lock(&self.0, EQPT_NAME)?.output_v()[channel])
    }

    fn set_enabled(&mut self, channel: usize, enabled: bool) -> Result<(), EqptError> {
        SimPlant::check_channel(channel)?;
        let mut plant = lock(&self.0, EQPT_NAME)?;
        plant.update();
        plant.enabled[channel] = enabled;
        Ok(())
    }

    fn set_slew_rate(&mut self, channel: usize, volts_per_s: f64) -> Result<(), EqptError> {
        SimPlant::check_channel(channel)?;
        let mut plant = lock(&self.0, EQPT_NAME)?;
        plant.update();
        plant.slew_rate[channel] = volts_per_s;
        Ok(())
    }
}

impl CoarseMotors for SimMotors {
    fn move_relative(&mut self, move_um: Triple) -> Result<(), EqptError> {
        let mut plant = lock(&self.0, EQPT_NAME)?;
        for (m, d) in plant.motors_um.iter_mut().zip(move_um.iter()) {
            *m += d;
        }
        debug!("Simulated motors moved by {:?} um", move_um);
        Ok(())
    }
}

impl Meter for SimMeter {
    fn measure(&mut self) -> Result<f64, EqptError> {
        let mut plant = lock(&self.0, EQPT_NAME)?;
        let heights = plant.actuator_heights();
        let gap_um =
            plant.params.meter_gap_um - heights.iter().sum::<f64>() / NUM_CHANNELS as f64;

        if gap_um <= 0.0 {
            return Err(EqptError::InvalidReading {
                eqpt: "simulated meter".into(),
                msg: format!("platform touching the electrode (gap {:.1} um)", gap_um),
            });
        }

        // pF
        Ok(EPSILON_0 * plant.params.meter_area_mm2 * 1e-6 / (gap_um * 1e-6) * 1e12)
    }

    fn units(&self) -> &str {
        "pF"
    }
}

impl MemoryRecorder {
    pub fn new(samples: Arc<Mutex<Vec<Sample>>>) -> Self {
        Self {
            samples,
            stopped: false,
        }
    }
}

impl Recorder for MemoryRecorder {
    fn publish_sample(&mut self, sample: &Sample) -> Result<(), EqptError> {
        if self.stopped {
            return Err(EqptError::comms("memory recorder", "recorder is stopped"));
        }
        lock(&self.samples, "memory recorder")?.push(*sample);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EqptError> {
        self.stopped = true;
        Ok(())
    }
}

impl Operator for SimOperator {
    fn adjust_sensor(
        &mut self,
        request: &SensorAdjustRequest,
        live: &mut dyn FnMut() -> Result<f64, EqptError>,
    ) -> Result<(), EqptError> {
        let before = live()?;

        {
            let mut plant = lock(&self.0, EQPT_NAME)?;
            let platform = plant.platform_at_sensors()?;
            let mid = 0.5 * (request.min_um + request.max_um);
            plant.sensor_zero_um[request.channel] = mid - platform[request.channel];
        }

        info!(
            "Simulated operator moved sensor {} from {:.1} um to {:.1} um",
            request.channel + 1,
            before,
            live()?
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
