//! Power up and shutdown of the piezo supplies

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::thread;

use eqpt_if::NUM_CHANNELS;
use log::{error, info, warn};

use super::{Fixture, FixtureError, FixtureState};
use util::time::secs_to_duration;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Fixture {
    /// Enable the piezo supplies and slew them to the rest voltage.
    pub fn power_up(&mut self) -> Result<(), FixtureError> {
        self.set_state(FixtureState::PowerUp);
        info!("Slewing power supplies to {} V", self.params.rest_voltage_v);

        for ch in 0..NUM_CHANNELS {
            self.piezos.set_enabled(ch, true)?;
            self.piezos.set_slew_rate(ch, self.params.slew_rate_v_per_s)?;
            self.piezos.set_voltage(ch, self.params.rest_voltage_v)?;
        }

        thread::sleep(secs_to_duration(self.params.power_settle_s));

        self.set_state(FixtureState::Idle);
        Ok(())
    }

    /// Make the fixture safe: stop any hold, ramp the piezos to zero volts
    /// and disable them.
    ///
    /// Every step is attempted even if an earlier one fails, the first
    /// failure is returned. Safe to call at any time and more than once.
    pub fn shutdown(&mut self) -> Result<(), FixtureError> {
        self.set_state(FixtureState::Shutdown);

        let mut first_err: Option<FixtureError> = None;
        let mut keep = |e: FixtureError| {
            error!("Shutdown: {}", e);
            if first_err.is_none() {
                first_err = Some(e);
            }
        };

        if let Some(ctrl) = self.ctrl.take() {
            warn!("Hold controller still running at shutdown, stopping it");
            if let Err(e) = ctrl.stop() {
                keep(e.into());
            }
        }

        for ch in 0..NUM_CHANNELS {
            if let Err(e) = self.piezos.set_voltage(ch, 0.0) {
                keep(e.into());
            }
        }

        thread::sleep(secs_to_duration(self.params.shutdown_settle_s));

        for ch in 0..NUM_CHANNELS {
            if let Err(e) = self.piezos.set_enabled(ch, false) {
                keep(e.into());
            }
        }

        self.stop_recorders();

        self.set_state(FixtureState::Off);
        info!("Power supplies shut down");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::super::test::sim_fixture;
    use super::*;
    use crate::geometry::Zta;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_power_up_and_shutdown() {
        let (mut fixture, sim) = sim_fixture(&[Zta::default()], [100.0; 3], [100.0; 3], false);

        fixture.power_up().unwrap();
        {
            let mut plant = sim.plant.lock().unwrap();
            assert_eq!(plant.enabled(), [true; 3]);
            for v in plant.output_v().iter() {
                assert_abs_diff_eq!(*v, 50.0, epsilon = 0.5);
            }
        }

        fixture.shutdown().unwrap();
        assert_eq!(sim.plant.lock().unwrap().enabled(), [false; 3]);
        assert_eq!(fixture.status().get().state, FixtureState::Off);

        // Shutting down an already safe fixture is fine
        fixture.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_stops_hold() {
        let (mut fixture, _) = sim_fixture(&[Zta::default()], [100.0; 3], [100.0; 3], false);
        fixture.power_up().unwrap();
        fixture.hold(&[100.0; 3], &[50.0; 3]).unwrap();

        fixture.shutdown().unwrap();
        assert!(!fixture.is_holding());
    }
}
