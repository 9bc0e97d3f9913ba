//! Zeroing of the sensors

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::{SensorAdjustRequest, NUM_CHANNELS};
use log::{info, warn};

use super::{Fixture, FixtureError, FixtureState};
use crate::plan::PlanError;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Fixture {
    /// Record the present sensor readings as the zero position.
    ///
    /// The fixture must be at its zero position. A reading is accepted if the
    /// plan's travel from it stays inside the sensor's range, otherwise the
    /// operator is asked to adjust the sensor in its collet and the reading
    /// is taken again. Readings are taken without tilt compensation.
    pub fn zero_sensors(&mut self) -> Result<(), FixtureError> {
        self.set_state(FixtureState::ZeroSensors);
        info!("Zeroing sensors");

        let range_um = self
            .plan
            .sensors()
            .range_um()
            .ok_or(PlanError::NoSensorRange)?;

        for ch in 0..NUM_CHANNELS {
            let min = self.plan.sensor_min()[ch];
            let max = self.plan.sensor_max()[ch];

            let mut attempts = 0;
            loop {
                let current = self.sensors.read_raw_channel(ch)?;

                if current + min >= 0.0 && current + max <= range_um {
                    self.zero_offsets[ch] = current;
                    info!("Sensor {} zeroed at {:.2} um", ch + 1, current);
                    break;
                }

                if attempts >= self.params.max_zero_attempts {
                    return Err(FixtureError::ZeroFailed {
                        channel: ch,
                        attempts,
                    });
                }
                attempts += 1;

                let request = SensorAdjustRequest {
                    channel: ch,
                    min_um: (-min).max(0.0),
                    max_um: range_um - max,
                };
                warn!(
                    "Sensor {} reads {:.2} um, it must be adjusted to between {:.2} and {:.2} um",
                    ch + 1,
                    current,
                    request.min_um,
                    request.max_um
                );

                let sensors = self.sensors.clone();
                let mut live = move || sensors.read_raw_channel(ch);
                self.operator.adjust_sensor(&request, &mut live)?;
            }
        }

        let zero_offsets = self.zero_offsets;
        self.status.update(|s| s.zero_offsets_um = zero_offsets);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::super::test::{actuators, cs1, fast_params, sim_fixture, sim_params};
    use super::super::FixtureParams;
    use super::*;
    use crate::calib::Calibration;
    use crate::geometry::Zta;
    use crate::pid_ctrl::CtrlParams;
    use crate::plan::Plan;
    use crate::sim;
    use eqpt_if::{EqptError, Operator};
    use std::sync::Arc;

    /// An operator who confirms without touching anything.
    struct IdleOperator(usize);

    impl Operator for IdleOperator {
        fn adjust_sensor(
            &mut self,
            _: &SensorAdjustRequest,
            live: &mut dyn FnMut() -> Result<f64, EqptError>,
        ) -> Result<(), EqptError> {
            live()?;
            self.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn test_zero_in_range() {
        let (mut fixture, _) =
            sim_fixture(&[Zta::new(50.0, 2.0, 90.0)], [100.0; 3], [120.0, 130.0, 140.0], false);
        fixture.power_up().unwrap();
        fixture.zero_sensors().unwrap();

        for (z, e) in fixture.zero_offsets().iter().zip([120.0, 130.0, 140.0].iter()) {
            assert!((z - e).abs() < 0.1, "{:?}", fixture.zero_offsets());
        }
        assert_eq!(fixture.status().get().zero_offsets_um, *fixture.zero_offsets());
    }

    #[test]
    fn test_zero_with_operator() {
        // Sensor Y is too close to the end of its range
        let (mut fixture, _) =
            sim_fixture(&[Zta::new(50.0, 2.0, 90.0)], [100.0; 3], [100.0, 900.0, 100.0], false);
        fixture.power_up().unwrap();
        fixture.zero_sensors().unwrap();

        let max = fixture.plan().sensor_max()[1];
        let zero = fixture.zero_offsets()[1];
        assert!(zero >= 0.0 && zero + max <= 1000.0, "zeroed at {}", zero);
    }

    #[test]
    fn test_zero_gives_up() {
        let (mut fixture, _) =
            sim_fixture(&[Zta::new(50.0, 2.0, 90.0)], [100.0; 3], [100.0, 900.0, 100.0], false);
        fixture.operator = Box::new(IdleOperator(0));
        fixture.power_up().unwrap();

        match fixture.zero_sensors() {
            Err(FixtureError::ZeroFailed { channel, attempts }) => {
                assert_eq!(channel, 1);
                assert_eq!(attempts, 3);
            }
            r => panic!("Expected zeroing to fail, got {:?}", r),
        }
    }

    #[test]
    fn test_zero_uses_raw_readings() {
        // A plan needing no travel accepts any reading inside the range
        let mut plan = Plan::new(actuators(), cs1(), Calibration::default()).unwrap();
        plan.add_point(Zta::default());
        plan.run_planner().unwrap();

        let raw = [50.0, 500.0, 950.0];
        let (eqpt, _sim) = sim::build(sim_params(raw), actuators(), cs1(), false);
        let params = FixtureParams {
            sensor_tilt_compensation: true,
            ..fast_params()
        };
        let mut fixture = Fixture::new(params, CtrlParams::default(), Arc::new(plan), eqpt).unwrap();

        fixture.power_up().unwrap();
        fixture.zero_sensors().unwrap();

        // The spread of the readings looks like a tilt, which the compensated
        // reading of sensor X over-reads by more than half a micrometer
        let zero = fixture.zero_offsets()[0];
        assert!((zero - fixture.sensors.read_raw_channel(0).unwrap()).abs() < 0.05);
        assert!(fixture.read_sensors().unwrap()[0] - zero > 0.3);

        fixture.shutdown().unwrap();
    }
}
