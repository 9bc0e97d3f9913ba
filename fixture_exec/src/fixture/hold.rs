//! Holding a position and sampling while held

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::thread;
use std::time::Duration;

use eqpt_if::{Sample, Triple, NUM_CHANNELS};
use log::{debug, info, warn};

use super::{Fixture, FixtureError, FixtureState, RunReport};
use crate::geometry::zta_from_heights;
use crate::pid_ctrl::{CtrlError, HoldCtrl};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Fixture {
    /// Start holding the sensors at `setpoints` in closed loop, starting from
    /// the given voltages.
    ///
    /// Fails if the fixture is already holding.
    pub fn hold(&mut self, setpoints: &Triple, init_voltages: &Triple) -> Result<(), FixtureError> {
        if self.ctrl.is_some() {
            return Err(CtrlError::AlreadyRunning.into());
        }

        self.set_state(FixtureState::Hold);
        self.status.update(|s| s.setpoint_um = *setpoints);

        self.ctrl = Some(HoldCtrl::start(
            &self.ctrl_params,
            self.plan.clone(),
            self.sensors.clone(),
            self.piezos.clone(),
            *setpoints,
            *init_voltages,
        )?);

        Ok(())
    }

    /// Stop holding. If the coarse motors are in use the piezos are returned
    /// to the rest voltage, otherwise they are left where the hold left them.
    ///
    /// Returns the voltages the hold controller last commanded.
    pub fn release(&mut self, use_motors: bool) -> Result<Triple, FixtureError> {
        self.set_state(FixtureState::Release);

        let ctrl = self.ctrl.take().ok_or(CtrlError::NotRunning)?;
        let volts = ctrl.stop()?;
        debug!("Released at {:?} V", volts);

        if use_motors {
            self.piezos.set_all(self.params.rest_voltage_v)?;
        }

        Ok(volts)
    }

    /// Take `repeats` samples of the held position, `interval` apart.
    ///
    /// Samples whose readings do not define a plane are skipped. Recorder
    /// failures are logged and counted but do not stop the sampling. A failed
    /// hold controller or sensor is an error.
    pub fn measure(
        &mut self,
        point_index: usize,
        repeats: usize,
        interval: Duration,
        report: &mut RunReport,
    ) -> Result<(), FixtureError> {
        self.set_state(FixtureState::Measure);

        for repeat in 0..repeats {
            // If the hold loop died its error is more useful than a stale
            // sample
            if !self.is_holding() {
                if let Some(ctrl) = self.ctrl.take() {
                    ctrl.stop()?;
                }
                return Err(CtrlError::NotRunning.into());
            }

            let mut position = self.sensors.read()?;
            for ch in 0..NUM_CHANNELS {
                position[ch] -= self.zero_offsets[ch];
            }

            let zta = match zta_from_heights(&position, self.plan.sensors()) {
                Ok(zta) => self.plan.calibration().remove(&zta),
                Err(e) => {
                    warn!(
                        "Point {} sample {}: skipping readings {:?}: {}",
                        point_index + 1,
                        repeat + 1,
                        position,
                        e
                    );
                    report.samples_skipped += 1;
                    thread::sleep(interval);
                    continue;
                }
            };

            let quantity = self.meter.measure()?;
            self.status.update(|s| s.last_zta = Some(zta));

            let sample = Sample {
                point_index,
                repeat,
                elapsed_s: self.run_start.elapsed().as_secs_f64(),
                z_um: zta.z_um(),
                theta_mrad: zta.theta_mrad(),
                alpha_deg: zta.alpha_deg(),
                quantity,
                sensor_um: position,
            };

            let mut failed = false;
            for rec in self.recorders.iter_mut() {
                if let Err(e) = rec.publish_sample(&sample) {
                    warn!("A recorder failed to accept a sample: {}", e);
                    failed = true;
                }
            }
            if failed {
                report.recorder_failures += 1;
            }
            report.samples_published += 1;

            info!(
                "Point {} sample {}: {} {:.4} {}",
                point_index + 1,
                repeat + 1,
                zta,
                quantity,
                self.meter.units()
            );

            thread::sleep(interval);
        }

        Ok(())
    }
}
