//! # Hold controller module
//!
//! Holds the fixture at a position using three PID loops, one per sensor,
//! running on a background thread. The loop outputs are in sensor space, so
//! they are projected onto the actuators with the plan's correction before
//! being applied to the piezo voltages.
//!
//! Only one controller may run at a time. It is started with the voltages the
//! fine move finished at and hands the voltages it last commanded back when
//! it is stopped. Stopping waits for the sample in progress to finish, which
//! takes at most one control interval.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod pid;
mod worker;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{channel, Sender},
    Arc,
};
use std::thread::{self, JoinHandle};

use eqpt_if::{EqptError, Triple};
use log::{info, warn};

use crate::{piezo::PiezoDriver, plan::Plan, sensing::SensorReader};
use worker::{worker_thread, CtrlSignal, Worker};

pub use params::CtrlParams;
pub use pid::PidController;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A running hold controller.
///
/// Dropping a running controller stops it.
pub struct HoldCtrl {
    worker_jh: Option<JoinHandle<Result<Triple, CtrlError>>>,
    worker_sender: Sender<CtrlSignal>,
    running: Arc<AtomicBool>,
    setpoints: Triple,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CtrlError {
    #[error("Could not start the hold controller thread: {0}")]
    SpawnError(std::io::Error),

    #[error("Equipment error in the hold loop: {source}")]
    Eqpt {
        source: EqptError,
        last_voltages: Triple,
    },

    #[error("The hold controller thread panicked")]
    ThreadPanic,

    #[error("A hold controller is already running")]
    AlreadyRunning,

    #[error("No hold controller is running")]
    NotRunning,

    #[error("Invalid control interval: {0} s")]
    InvalidInterval(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HoldCtrl {
    /// Start holding the sensors at `setpoints`, starting from
    /// `init_voltages`.
    pub fn start(
        params: &CtrlParams,
        plan: Arc<Plan>,
        sensors: SensorReader,
        piezos: PiezoDriver,
        setpoints: Triple,
        init_voltages: Triple,
    ) -> Result<Self, CtrlError> {
        if !(params.interval_s.is_finite() && params.interval_s > 0.0) {
            return Err(CtrlError::InvalidInterval(params.interval_s));
        }

        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            plan,
            sensors,
            piezos,
            pids: [
                PidController::from_params(params, setpoints[0]),
                PidController::from_params(params, setpoints[1]),
                PidController::from_params(params, setpoints[2]),
            ],
            voltages: init_voltages,
            interval: util::time::secs_to_duration(params.interval_s),
            running: running.clone(),
        };

        let (worker_sender, rx) = channel();

        let worker_jh = thread::Builder::new()
            .name("pid_ctrl::worker".into())
            .spawn(move || worker_thread(worker, rx))
            .map_err(CtrlError::SpawnError)?;

        info!("Holding sensors at {:?} um", setpoints);

        Ok(Self {
            worker_jh: Some(worker_jh),
            worker_sender,
            running,
            setpoints,
        })
    }

    /// True until the control loop exits, either because it was stopped or
    /// because it failed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn setpoints(&self) -> &Triple {
        &self.setpoints
    }

    /// Stop the controller, returning the voltage last commanded on each
    /// channel.
    ///
    /// If the loop failed while running its error is returned here.
    pub fn stop(mut self) -> Result<Triple, CtrlError> {
        self.join()
    }

    fn join(&mut self) -> Result<Triple, CtrlError> {
        let jh = match self.worker_jh.take() {
            Some(jh) => jh,
            None => return Err(CtrlError::NotRunning),
        };

        // The worker may have already exited on an error, in which case the
        // send fails and there is nothing to stop
        self.worker_sender.send(CtrlSignal::Stop).ok();

        match jh.join() {
            Ok(r) => r,
            Err(_) => Err(CtrlError::ThreadPanic),
        }
    }
}

impl Drop for HoldCtrl {
    fn drop(&mut self) {
        if self.worker_jh.is_some() {
            if let Err(e) = self.join() {
                warn!("Hold controller stopped on drop with an error: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for HoldCtrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoldCtrl")
            .field("running", &self.is_running())
            .field("setpoints", &self.setpoints)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use eqpt_if::{PiezoSupply, SensorArray};

    use crate::calib::Calibration;
    use crate::geometry::Geometry;
    use crate::piezo::VoltageLimits;

    /// Sensors reading a fixed height per volt on each channel, with the
    /// actuators and sensors sharing the same layout.
    struct Direct {
        volts: Triple,
        fail: bool,
    }

    struct DirectSensors(Arc<Mutex<Direct>>);
    struct DirectSupply(Arc<Mutex<Direct>>);

    impl SensorArray for DirectSensors {
        fn measure(&mut self) -> Result<Triple, EqptError> {
            let d = self.0.lock().unwrap();
            if d.fail {
                return Err(EqptError::comms("sensors", "timed out"));
            }
            Ok([d.volts[0] * 0.36, d.volts[1] * 0.36, d.volts[2] * 0.36])
        }
    }

    impl PiezoSupply for DirectSupply {
        fn set_voltage(&mut self, channel: usize, volts: f64) -> Result<(), EqptError> {
            self.0.lock().unwrap().volts[channel] = volts;
            Ok(())
        }

        fn get_voltage(&mut self, channel: usize) -> Result<f64, EqptError> {
            Ok(self.0.lock().unwrap().volts[channel])
        }

        fn set_enabled(&mut self, _: usize, _: bool) -> Result<(), EqptError> {
            Ok(())
        }

        fn set_slew_rate(&mut self, _: usize, _: f64) -> Result<(), EqptError> {
            Ok(())
        }
    }

    fn setup(volts: Triple) -> (Arc<Mutex<Direct>>, Arc<Plan>, SensorReader, PiezoDriver) {
        let state = Arc::new(Mutex::new(Direct { volts, fail: false }));
        let geom = Geometry::new_sensor([0.0, 120.0, 240.0], 40.0, 100.0, None).unwrap();
        let plan = Arc::new(Plan::new(geom, geom, Calibration::default()).unwrap());
        let sensors = SensorReader::new(
            Arc::new(Mutex::new(DirectSensors(state.clone()))),
            geom,
            false,
        );
        let piezos = PiezoDriver::new(
            Arc::new(Mutex::new(DirectSupply(state.clone()))),
            VoltageLimits::default(),
        );
        (state, plan, sensors, piezos)
    }

    fn slow_gains() -> CtrlParams {
        CtrlParams {
            k_p: 0.5,
            k_i: 0.0,
            k_d: 0.0,
            interval_s: 0.01,
        }
    }

    #[test]
    fn test_hold_moves_towards_setpoint() {
        let (state, plan, sensors, piezos) = setup([50.0; 3]);

        let ctrl = HoldCtrl::start(
            &slow_gains(),
            plan,
            sensors,
            piezos,
            [20.0, 20.0, 20.0],
            [50.0; 3],
        )
        .unwrap();
        assert!(ctrl.is_running());

        std::thread::sleep(Duration::from_millis(600));
        let volts = ctrl.stop().unwrap();

        // Converged on 20 um = 55.6 V
        for ch in 0..3 {
            assert!((volts[ch] - 20.0 / 0.36).abs() < 0.5, "{:?}", volts);
            assert_eq!(volts[ch], state.lock().unwrap().volts[ch]);
        }
    }

    #[test]
    fn test_stop_is_prompt() {
        let (_, plan, sensors, piezos) = setup([50.0; 3]);
        let params = CtrlParams {
            interval_s: 0.2,
            ..slow_gains()
        };

        let ctrl = HoldCtrl::start(&params, plan, sensors, piezos, [18.0; 3], [50.0; 3]).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let t0 = Instant::now();
        let volts = ctrl.stop().unwrap();
        assert!(t0.elapsed() < Duration::from_millis(200));

        // Stopped before the first sample
        assert_eq!(volts, [50.0; 3]);
    }

    #[test]
    fn test_sensor_failure_stops_loop() {
        let (state, plan, sensors, piezos) = setup([50.0; 3]);

        let ctrl =
            HoldCtrl::start(&slow_gains(), plan, sensors, piezos, [18.0; 3], [50.0; 3]).unwrap();
        state.lock().unwrap().fail = true;

        let t0 = Instant::now();
        while ctrl.is_running() && t0.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!ctrl.is_running());

        match ctrl.stop() {
            Err(CtrlError::Eqpt { last_voltages, .. }) => {
                assert_eq!(last_voltages, state.lock().unwrap().volts)
            }
            r => panic!("Expected an equipment error, got {:?}", r),
        }
    }

    #[test]
    fn test_voltages_clamped() {
        let (state, plan, sensors, piezos) = setup([50.0; 3]);

        // Unreachable setpoint drives the output into the top limit
        let ctrl =
            HoldCtrl::start(&slow_gains(), plan, sensors, piezos, [1000.0; 3], [50.0; 3]).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        let volts = ctrl.stop().unwrap();

        assert_eq!(volts, [100.0; 3]);
        assert_eq!(state.lock().unwrap().volts, [100.0; 3]);
    }

    #[test]
    fn test_invalid_interval() {
        let (_, plan, sensors, piezos) = setup([50.0; 3]);
        let params = CtrlParams {
            interval_s: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            HoldCtrl::start(&params, plan, sensors, piezos, [0.0; 3], [0.0; 3]),
            Err(CtrlError::InvalidInterval(_))
        ));
    }
}
