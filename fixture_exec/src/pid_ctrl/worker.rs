//! Background thread running the hold control loop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, RecvTimeoutError},
    Arc,
};

use eqpt_if::{Triple, NUM_CHANNELS};
use log::{debug, trace};

use super::{CtrlError, PidController};
use crate::{piezo::PiezoDriver, plan::Plan, sensing::SensorReader};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything the worker owns while it runs.
pub(super) struct Worker {
    pub plan: Arc<Plan>,
    pub sensors: SensorReader,
    pub piezos: PiezoDriver,
    pub pids: [PidController; NUM_CHANNELS],
    pub voltages: Triple,
    pub interval: std::time::Duration,
    pub running: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(super) enum CtrlSignal {
    /// The worker should finish its current sample and stop
    Stop,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Run the control loop until a stop signal is received or the main thread
/// hangs up.
///
/// Returns the voltages last commanded on each channel.
pub(super) fn worker_thread(
    mut worker: Worker,
    main_reciever: Receiver<CtrlSignal>,
) -> Result<Triple, CtrlError> {
    let result = worker.run(&main_reciever);
    worker.running.store(false, Ordering::SeqCst);
    result
}

impl Worker {
    fn run(&mut self, main_reciever: &Receiver<CtrlSignal>) -> Result<Triple, CtrlError> {
        for pid in self.pids.iter_mut() {
            pid.start();
        }

        loop {
            // Wait out the interval, waking early to stop
            match main_reciever.recv_timeout(self.interval) {
                Ok(CtrlSignal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => (),
            }

            if let Err(e) = self.step() {
                return Err(CtrlError::Eqpt {
                    source: e,
                    last_voltages: self.voltages,
                });
            }
        }

        debug!("Hold loop stopped at {:?} V", self.voltages);

        Ok(self.voltages)
    }

    /// One iteration of the loop.
    fn step(&mut self) -> Result<(), eqpt_if::EqptError> {
        let measurement = self.sensors.read()?;

        let mut outputs = [0.0; NUM_CHANNELS];
        for ch in 0..NUM_CHANNELS {
            outputs[ch] = self.pids[ch].get(measurement[ch]);
        }

        // The correction is negated, so subtracting it moves towards the
        // setpoint
        let command = self.plan.correction(&outputs);
        for ch in 0..NUM_CHANNELS {
            self.voltages[ch] = self.piezos.set_voltage(ch, self.voltages[ch] - command[ch])?;
        }

        trace!(
            "Hold: measured {:?} um, output {:?}, voltages {:?} V",
            measurement,
            outputs,
            self.voltages
        );

        Ok(())
    }
}
