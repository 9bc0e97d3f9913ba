//! Running an experiment

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::thread;
use std::time::Instant;

use log::{error, info};

use super::{ExperimentParams, Fixture, FixtureError, FixtureState, RunReport};
use util::time::secs_to_duration;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Fixture {
    /// Run the experiment over every point of the plan.
    ///
    /// The fixture must be powered up and at its zero position. It is not
    /// shut down at the end, callers shall call [`Fixture::shutdown`]
    /// whether or not the run succeeds.
    pub fn run_experiment(&mut self, exp: &ExperimentParams) -> Result<RunReport, FixtureError> {
        if exp.use_motors && self.motors.is_none() {
            return Err(FixtureError::NoMotors);
        }
        self.plan.check_planned()?;

        self.run_start = Instant::now();
        self.status.update(|s| s.use_motors = exp.use_motors);

        let mut report = RunReport::default();

        self.zero_sensors()?;

        let num_points = self.plan.point_count();
        for point in 0..num_points {
            info!("Measuring point {} of {}", point + 1, num_points);
            self.status.update(|s| s.point_index = Some(point));

            self.run_point(point, exp, &mut report)?;
            report.points_completed += 1;
        }

        // Return to the zero position
        if exp.use_motors {
            self.set_state(FixtureState::Park);
            let zero = self.zero_offsets;
            self.coarse_move(&zero)?;
        }

        info!("Experiment complete: {}", report);
        thread::sleep(secs_to_duration(self.params.completion_wait_s));
        self.stop_recorders();

        self.set_state(FixtureState::Complete);

        Ok(report)
    }

    /// Move to, hold and measure one point.
    ///
    /// The hold is always released before returning, an error while holding
    /// takes priority over one while releasing.
    fn run_point(
        &mut self,
        point: usize,
        exp: &ExperimentParams,
        report: &mut RunReport,
    ) -> Result<(), FixtureError> {
        let setpoints = self.plan.sensor_points()[point];

        if exp.use_motors {
            self.coarse_move(&setpoints)?;
        }
        let init_voltages = self.fine_move(&setpoints)?;

        let held = self.hold(&setpoints, &init_voltages).and_then(|_| {
            thread::sleep(secs_to_duration(exp.hold_period_s));
            self.measure(point, exp.repeats, secs_to_duration(exp.interval_s), report)
        });

        // Nothing to release if the hold never started
        if self.ctrl.is_none() {
            return held;
        }

        let released = self.release(exp.use_motors);
        match (held, released) {
            (Err(e), Err(r)) => {
                error!("Could not release point {} after an error: {}", point + 1, r);
                Err(e)
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Ok(_), Ok(_)) => Ok(()),
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
    use crate::pid_ctrl::CtrlError;
    use crate::sensing::SensorReader;
    use approx::assert_abs_diff_eq;
    use eqpt_if::{EqptError, Recorder, Sample, SensorArray, Shared};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn experiment(points: &[Zta], use_motors: bool) -> ExperimentParams {
        ExperimentParams {
            points: points.to_vec(),
            use_motors,
            hold_period_s: 1.0,
            repeats: 3,
            interval_s: 0.05,
        }
    }

    fn assert_near(sample: &Sample, target: &Zta) {
        assert_abs_diff_eq!(sample.z_um, target.z_um(), epsilon = 0.5);
        assert_abs_diff_eq!(sample.theta_mrad, target.theta_mrad(), epsilon = 0.05);
        if target.theta_mrad() > 0.5 {
            assert_abs_diff_eq!(sample.alpha_deg, target.alpha_deg(), epsilon = 2.0);
        }
    }

    #[test]
    fn test_run_with_motors() {
        let points = [Zta::new(0.0, 0.0, 0.0), Zta::new(50.0, 2.0, 90.0)];
        let (mut fixture, sim) = sim_fixture(&points, [100.0; 3], [100.0; 3], true);
        let exp = experiment(&points, true);

        fixture.power_up().unwrap();
        let report = fixture.run_experiment(&exp);
        fixture.shutdown().unwrap();
        let report = report.unwrap();

        assert_eq!(
            report,
            RunReport {
                points_completed: 2,
                samples_published: 6,
                samples_skipped: 0,
                recorder_failures: 0,
            }
        );

        let samples = sim.samples.lock().unwrap();
        assert_eq!(samples.len(), 6);
        assert_eq!(samples[3].point_index, 1);
        assert_eq!(samples[5].repeat, 2);
        assert_near(&samples[2], &points[0]);
        assert_near(&samples[5], &points[1]);

        // Parked back at the zero position, then powered off
        let status = fixture.status().get();
        assert_eq!(status.state, FixtureState::Off);
        assert!(status.use_motors);
        assert_eq!(status.point_index, Some(1));
        assert_eq!(sim.plant.lock().unwrap().enabled(), [false; 3]);
    }

    #[test]
    fn test_run_piezos_only() {
        let points = [Zta::new(10.0, 0.1, 30.0), Zta::new(5.0, 0.05, 200.0)];
        let (mut fixture, sim) = sim_fixture(&points, [100.0; 3], [100.0; 3], false);

        fixture.power_up().unwrap();
        let report = fixture.run_experiment(&experiment(&points, false)).unwrap();
        assert_eq!(report.points_completed, 2);

        // Motors never moved
        assert_eq!(sim.plant.lock().unwrap().motors_um(), [-18.0; 3]);

        let samples = sim.samples.lock().unwrap();
        assert_near(&samples[2], &points[0]);
        assert_near(&samples[5], &points[1]);
        assert_eq!(fixture.status().get().state, FixtureState::Complete);
        drop(samples);

        fixture.shutdown().unwrap();
    }

    #[test]
    fn test_motors_required() {
        let points = [Zta::default()];
        let (mut fixture, _) = sim_fixture(&points, [100.0; 3], [100.0; 3], false);

        assert!(matches!(
            fixture.run_experiment(&experiment(&points, true)),
            Err(FixtureError::NoMotors)
        ));
    }

    #[test]
    fn test_sensor_failure_releases_hold() {
        let points = [Zta::new(10.0, 0.1, 30.0)];
        let (mut fixture, sim) = sim_fixture(&points, [100.0; 3], [100.0; 3], false);

        fixture.power_up().unwrap();

        // Zeroing and the fine move read the sensors 5 times, fail during the
        // hold
        sim.plant.lock().unwrap().fail_sensors_after(10);

        match fixture.run_experiment(&experiment(&points, false)) {
            Err(FixtureError::CtrlError(CtrlError::Eqpt { .. }))
            | Err(FixtureError::EqptError(EqptError::Comms { .. })) => (),
            r => panic!("Expected a sensor failure, got {:?}", r),
        }

        assert!(!fixture.is_holding());
        assert!(fixture.ctrl.is_none());
        fixture.shutdown().unwrap();
    }

    struct BrokenRecorder;

    impl Recorder for BrokenRecorder {
        fn publish_sample(&mut self, _: &Sample) -> Result<(), EqptError> {
            Err(EqptError::comms("broken recorder", "disk full"))
        }

        fn stop(&mut self) -> Result<(), EqptError> {
            Err(EqptError::comms("broken recorder", "disk full"))
        }
    }

    #[test]
    fn test_recorder_failure_not_fatal() {
        let points = [Zta::new(10.0, 0.1, 30.0)];
        let (mut fixture, sim) = sim_fixture(&points, [100.0; 3], [100.0; 3], false);
        fixture.recorders.push(Box::new(BrokenRecorder));

        fixture.power_up().unwrap();
        let report = fixture.run_experiment(&experiment(&points, false)).unwrap();
        fixture.shutdown().unwrap();

        assert_eq!(report.samples_published, 3);
        assert_eq!(report.recorder_failures, 3);
        assert_eq!(sim.samples.lock().unwrap().len(), 3);
    }

    /// Sensors whose readings are finite but too large to define a plane.
    struct OverflowSensors;

    impl SensorArray for OverflowSensors {
        fn measure(&mut self) -> Result<[f64; 3], EqptError> {
            Ok([1e200, -1e200, 0.0])
        }
    }

    #[test]
    fn test_degenerate_samples_skipped() {
        let points = [Zta::default()];
        let (mut fixture, sim) = sim_fixture(&points, [100.0; 3], [100.0; 3], false);

        fixture.power_up().unwrap();
        fixture.hold(&[100.0; 3], &[50.0; 3]).unwrap();

        // Only the sampling sees the bad readings, the hold loop keeps its own
        let sensors: Shared<dyn SensorArray> = Arc::new(Mutex::new(OverflowSensors));
        fixture.sensors = SensorReader::new(sensors, *fixture.plan.sensors(), false);

        let mut report = RunReport::default();
        fixture
            .measure(0, 3, Duration::from_millis(10), &mut report)
            .unwrap();

        assert_eq!(report.samples_skipped, 3);
        assert_eq!(report.samples_published, 0);
        assert!(sim.samples.lock().unwrap().is_empty());
        assert!(fixture.status().get().last_zta.is_none());

        fixture.release(false).unwrap();
        fixture.shutdown().unwrap();
    }
}
