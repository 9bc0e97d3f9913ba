//! Coarse and fine moves

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::thread;

use eqpt_if::{Triple, NUM_CHANNELS};
use log::debug;

use super::{Fixture, FixtureError, FixtureState};
use crate::geometry::Zta;
use util::time::secs_to_duration;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Fixture {
    /// Move towards the given sensor readings with the coarse motors.
    ///
    /// A fixed number of moves is made without checking for convergence, the
    /// remaining error is left for the fine move.
    pub fn coarse_move(&mut self, setpoints: &Triple) -> Result<(), FixtureError> {
        self.set_state(FixtureState::CoarseMove);
        self.status.update(|s| s.setpoint_um = *setpoints);

        let motors = self.motors.as_mut().ok_or(FixtureError::NoMotors)?;

        for attempt in 0..self.params.coarse_attempts {
            let error = self.sensors.error_to(setpoints)?;
            let move_um = self.plan.correction(&error);
            debug!(
                "Coarse move {}: error {:?} um, moving {:?} um",
                attempt + 1,
                error,
                move_um
            );

            motors.move_relative(move_um)?;
            thread::sleep(secs_to_duration(self.params.coarse_settle_s));
        }

        Ok(())
    }

    /// Move to an orientation with the coarse motors.
    ///
    /// The orientation is calibrated and projected onto the sensors in the
    /// same way as the plan's targets.
    pub fn coarse_move_zta(&mut self, zta: &Zta) -> Result<(), FixtureError> {
        let setpoints = self.plan.project_to_sensors(zta);
        self.coarse_move(&setpoints)
    }

    /// Move towards the given sensor readings with the piezos, in open loop.
    ///
    /// Returns the voltages commanded by the last move.
    pub fn fine_move(&mut self, setpoints: &Triple) -> Result<Triple, FixtureError> {
        self.set_state(FixtureState::FineMove);
        self.status.update(|s| s.setpoint_um = *setpoints);

        let mut volts = [0.0; NUM_CHANNELS];
        for ch in 0..NUM_CHANNELS {
            volts[ch] = self.piezos.get_voltage(ch)?;
        }

        for iteration in 0..self.params.fine_iterations {
            let error = self.sensors.error_to(setpoints)?;
            let move_um = self.plan.correction(&error);

            for ch in 0..NUM_CHANNELS {
                volts[ch] = self
                    .piezos
                    .set_voltage_rel(ch, move_um[ch] * self.params.volts_per_um)?;
            }
            debug!(
                "Fine move {}: error {:?} um, voltages {:?} V",
                iteration + 1,
                error,
                volts
            );

            // Let the supplies slew before measuring again
            thread::sleep(secs_to_duration(self.params.fine_settle_s));
        }

        Ok(volts)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::super::test::sim_fixture;
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_coarse_move_needs_motors() {
        let (mut fixture, _) = sim_fixture(&[Zta::default()], [100.0; 3], [100.0; 3], false);
        fixture.power_up().unwrap();

        assert!(matches!(
            fixture.coarse_move_zta(&Zta::new(30.0, 0.0, 0.0)),
            Err(FixtureError::NoMotors)
        ));

        fixture.shutdown().unwrap();
    }

    #[test]
    fn test_coarse_move_zta() {
        let (mut fixture, sim) = sim_fixture(&[Zta::default()], [100.0; 3], [100.0; 3], true);
        fixture.power_up().unwrap();

        // A pure height move is corrected in a single step
        fixture.coarse_move_zta(&Zta::new(30.0, 0.0, 0.0)).unwrap();

        let reading = fixture.read_sensors().unwrap();
        for r in reading.iter() {
            assert_abs_diff_eq!(*r, 130.0, epsilon = 0.1);
        }
        for m in sim.plant.lock().unwrap().motors_um().iter() {
            assert_abs_diff_eq!(*m, 12.0, epsilon = 0.1);
        }
        assert_eq!(fixture.status().get().state, FixtureState::CoarseMove);

        fixture.shutdown().unwrap();
    }
}
