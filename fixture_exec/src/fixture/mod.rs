//! # Fixture module
//!
//! Orchestrates an experiment on the test fixture. For every point of the
//! plan the fixture is moved with the coarse motors (if used) then with the
//! piezos in open loop, held in closed loop while samples are taken, and
//! released. Before the first point the sensors are zeroed, after the last
//! the fixture is parked back at the zero position.
//!
//! The fixture runs on the caller's thread and blocks for every move and
//! dwell. The only other thread is the hold controller, which is always
//! stopped before a point's steps return, including when they fail.
//!
//! State changes are published through a [`StatusHandle`] so that other
//! threads can watch the experiment.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod hold;
mod moves;
mod params;
mod power;
mod run;
mod zero;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, RwLock};
use std::time::Instant;

use eqpt_if::{
    CoarseMotors, EqptError, Meter, Operator, PiezoSupply, Recorder, SensorArray, Shared,
    Triple, NUM_CHANNELS,
};
use log::{info, warn};

use crate::{
    geometry::Zta,
    pid_ctrl::{CtrlError, CtrlParams, HoldCtrl},
    piezo::PiezoDriver,
    plan::{Plan, PlanError},
    sensing::SensorReader,
};

pub use params::{ExperimentParams, FixtureParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The equipment the fixture drives.
pub struct FixtureEqpt {
    pub sensors: Shared<dyn SensorArray>,
    pub piezos: Shared<dyn PiezoSupply>,
    pub motors: Option<Box<dyn CoarseMotors>>,
    pub meter: Box<dyn Meter>,
    pub recorders: Vec<Box<dyn Recorder>>,
    pub operator: Box<dyn Operator>,
}

/// The test fixture.
pub struct Fixture {
    params: FixtureParams,
    ctrl_params: CtrlParams,
    plan: Arc<Plan>,

    sensors: SensorReader,
    piezos: PiezoDriver,
    motors: Option<Box<dyn CoarseMotors>>,
    meter: Box<dyn Meter>,
    recorders: Vec<Box<dyn Recorder>>,
    recorders_stopped: bool,
    operator: Box<dyn Operator>,

    /// The running hold controller, if any
    ctrl: Option<HoldCtrl>,

    /// Sensor readings at the zero position
    zero_offsets: Triple,

    status: StatusHandle,
    run_start: Instant,
}

/// A snapshot of the fixture's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureStatus {
    pub state: FixtureState,

    /// Index of the plan point being worked on
    pub point_index: Option<usize>,

    /// Sensor readings the fixture is moving to or holding.
    ///
    /// Units: micrometers
    pub setpoint_um: Triple,

    pub use_motors: bool,

    /// Sensor readings at the zero position.
    ///
    /// Units: micrometers
    pub zero_offsets_um: Triple,

    /// The most recently measured orientation, calibration removed
    pub last_zta: Option<Zta>,
}

/// Shared, read only view of the fixture's status.
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<RwLock<FixtureStatus>>);

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub points_completed: usize,
    pub samples_published: usize,

    /// Samples not taken because the sensor readings did not define a plane
    pub samples_skipped: usize,

    /// Samples which at least one recorder failed to accept
    pub recorder_failures: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The steps of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    Idle,
    PowerUp,
    ZeroSensors,
    CoarseMove,
    FineMove,
    Hold,
    Measure,
    Release,
    Park,
    Complete,
    Shutdown,
    Off,
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("Plan error: {0}")]
    PlanError(PlanError),

    #[error("Equipment error: {0}")]
    EqptError(EqptError),

    #[error("Hold controller error: {0}")]
    CtrlError(CtrlError),

    #[error("Coarse motors were requested but the fixture has none")]
    NoMotors,

    #[error("Could not zero sensor {} after {attempts} adjustments", .channel + 1)]
    ZeroFailed { channel: usize, attempts: usize },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Fixture {
    /// Create a new fixture which will run the given plan.
    ///
    /// The plan must have been run successfully.
    pub fn new(
        params: FixtureParams,
        ctrl_params: CtrlParams,
        plan: Arc<Plan>,
        eqpt: FixtureEqpt,
    ) -> Result<Self, FixtureError> {
        plan.check_planned()?;

        let sensors = SensorReader::new(
            eqpt.sensors,
            *plan.sensors(),
            params.sensor_tilt_compensation,
        );
        let piezos = PiezoDriver::new(eqpt.piezos, params.voltage_limits);

        let zero_offsets = plan.calibration().sensor_offsets_um;

        let status = StatusHandle(Arc::new(RwLock::new(FixtureStatus {
            state: FixtureState::Idle,
            point_index: None,
            setpoint_um: [0.0; NUM_CHANNELS],
            use_motors: eqpt.motors.is_some(),
            zero_offsets_um: zero_offsets,
            last_zta: None,
        })));

        Ok(Self {
            params,
            ctrl_params,
            plan,
            sensors,
            piezos,
            motors: eqpt.motors,
            meter: eqpt.meter,
            recorders: eqpt.recorders,
            recorders_stopped: false,
            operator: eqpt.operator,
            ctrl: None,
            zero_offsets,
            status,
            run_start: Instant::now(),
        })
    }

    /// Get a handle onto the fixture's status.
    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn has_motors(&self) -> bool {
        self.motors.is_some()
    }

    /// Sensor readings at the zero position.
    pub fn zero_offsets(&self) -> &Triple {
        &self.zero_offsets
    }

    /// Read the sensors.
    pub fn read_sensors(&self) -> Result<Triple, FixtureError> {
        Ok(self.sensors.read()?)
    }

    /// True while a hold controller is running.
    pub fn is_holding(&self) -> bool {
        self.ctrl.as_ref().map(|c| c.is_running()).unwrap_or(false)
    }

    fn set_state(&self, state: FixtureState) {
        let prev = self.status.update(|s| std::mem::replace(&mut s.state, state));
        if prev != state {
            info!("Fixture state: {:?} -> {:?}", prev, state);
        }
    }

    /// Stop the recorders, once.
    fn stop_recorders(&mut self) {
        if self.recorders_stopped {
            return;
        }
        for rec in self.recorders.iter_mut() {
            if let Err(e) = rec.stop() {
                warn!("Could not stop a recorder: {}", e);
            }
        }
        self.recorders_stopped = true;
    }
}

impl StatusHandle {
    /// Get a copy of the current status.
    pub fn get(&self) -> FixtureStatus {
        match self.0.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Modify the status, returning whatever the modifier returns.
    fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut FixtureStatus) -> R,
    {
        match self.0.write() {
            Ok(mut s) => f(&mut s),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} points completed, {} samples published, {} skipped, {} not recorded",
            self.points_completed,
            self.samples_published,
            self.samples_skipped,
            self.recorder_failures
        )
    }
}

impl From<PlanError> for FixtureError {
    fn from(e: PlanError) -> Self {
        Self::PlanError(e)
    }
}

impl From<EqptError> for FixtureError {
    fn from(e: EqptError) -> Self {
        Self::EqptError(e)
    }
}

impl From<CtrlError> for FixtureError {
    fn from(e: CtrlError) -> Self {
        Self::CtrlError(e)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::calib::Calibration;
    use crate::geometry::Geometry;
    use crate::sim::{self, SimHandle, SimParams};

    pub(crate) fn actuators() -> Geometry {
        Geometry::new([0.0, 120.0, 240.0], 40.0).unwrap()
    }

    pub(crate) fn cs1() -> Geometry {
        Geometry::new_sensor([70.0, 190.0, 310.0], 65.0, 1000.0, Some(5700.0)).unwrap()
    }

    /// Fixture timings shortened for testing.
    pub(crate) fn fast_params() -> FixtureParams {
        FixtureParams {
            coarse_settle_s: 0.05,
            fine_settle_s: 0.3,
            power_settle_s: 0.6,
            shutdown_settle_s: 0.05,
            completion_wait_s: 0.0,
            sensor_tilt_compensation: false,
            ..Default::default()
        }
    }

    /// A simulated fixture whose platform is at zero height at the rest
    /// voltage, with every sensor reading `zero_um` there.
    pub(crate) fn sim_params(zero_um: Triple) -> SimParams {
        SimParams {
            sensor_zero_um: zero_um,
            motor_init_um: [-18.0; NUM_CHANNELS],
            response_time_s: 0.1,
            ..Default::default()
        }
    }

    /// Build a planned fixture on the simulator.
    pub(crate) fn sim_fixture(
        points: &[Zta],
        offsets_um: Triple,
        sim_zero_um: Triple,
        use_motors: bool,
    ) -> (Fixture, SimHandle) {
        let mut plan = Plan::new(
            actuators(),
            cs1(),
            Calibration {
                sensor_offsets_um: offsets_um,
                ..Default::default()
            },
        )
        .unwrap();
        for p in points {
            plan.add_point(*p);
        }
        plan.run_planner().unwrap();

        let (eqpt, handle) = sim::build(sim_params(sim_zero_um), actuators(), cs1(), use_motors);
        let fixture =
            Fixture::new(fast_params(), CtrlParams::default(), Arc::new(plan), eqpt).unwrap();

        (fixture, handle)
    }

    #[test]
    fn test_unplanned_plan_rejected() {
        let mut plan = Plan::new(actuators(), cs1(), Calibration::default()).unwrap();
        plan.add_point(Zta::default());

        let (eqpt, _) = sim::build(SimParams::default(), actuators(), cs1(), false);
        let res = Fixture::new(FixtureParams::default(), CtrlParams::default(), Arc::new(plan), eqpt);
        assert!(matches!(
            res,
            Err(FixtureError::PlanError(PlanError::NotPlanned))
        ));
    }

    #[test]
    fn test_status_handle() {
        let (fixture, _) = sim_fixture(&[Zta::default()], [100.0; 3], [100.0; 3], false);
        let status = fixture.status();

        let s = status.get();
        assert_eq!(s.state, FixtureState::Idle);
        assert_eq!(s.zero_offsets_um, [100.0; 3]);
        assert!(!s.use_motors);

        fixture.set_state(FixtureState::Park);
        let reader = std::thread::spawn(move || status.get().state);
        assert_eq!(reader.join().unwrap(), FixtureState::Park);
    }

    #[test]
    fn test_hold_and_release() {
        let (mut fixture, _) = sim_fixture(&[Zta::default()], [100.0; 3], [100.0; 3], false);
        fixture.power_up().unwrap();

        // Releasing with nothing held is an error
        assert!(matches!(
            fixture.release(false),
            Err(FixtureError::CtrlError(CtrlError::NotRunning))
        ));

        let sp = [100.0; 3];
        fixture.hold(&sp, &[50.0; 3]).unwrap();
        assert!(fixture.is_holding());
        assert!(matches!(
            fixture.hold(&sp, &[50.0; 3]),
            Err(FixtureError::CtrlError(CtrlError::AlreadyRunning))
        ));

        let volts = fixture.release(false).unwrap();
        assert!(!fixture.is_holding());
        for v in volts.iter() {
            assert!(*v >= 0.0 && *v <= 100.0);
        }

        fixture.shutdown().unwrap();
    }
}
