//! # Plan module
//!
//! The motion plan for an experiment. Holds the list of target orientations
//! at which measurements will be taken, projects them onto the actuators and
//! sensors, and checks that the sensors have enough range for the planned
//! motion.
//!
//! A plan is built once, by adding every target and then running the
//! planner. After that it is read only and is shared between the fixture and
//! its hold controller.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod correction;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::{Triple, NUM_CHANNELS};
use log::{debug, info};

use crate::calib::Calibration;
use crate::geometry::{heights_from_zta, Geometry, Zta};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The motion plan.
#[derive(Debug, Clone)]
pub struct Plan {
    actuators: Geometry,
    sensors: Geometry,
    calibration: Calibration,

    /// Targets as given by the experimenter
    targets: Vec<Zta>,

    /// Targets with the calibration applied
    calibrated: Vec<Zta>,

    /// Sensor readings expected at each target
    sensor_points: Vec<Triple>,

    /// Actuator heights at each target
    actuator_points: Vec<Triple>,

    sensor_min: Triple,
    sensor_max: Triple,
    actuator_min: Triple,
    actuator_max: Triple,

    planned: bool,
}

/// A sensor channel which does not have the range the plan needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeViolation {
    pub channel: usize,

    /// Units: micrometers
    pub required_um: f64,

    /// Units: micrometers
    pub range_um: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("The plan exceeds the range of the sensors: {}", format_violations(.0))]
    RangeExceeded(Vec<RangeViolation>),

    #[error("The sensor geometry does not specify a measuring range")]
    NoSensorRange,

    #[error("The plan has not been run")]
    NotPlanned,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Plan {
    /// Create a new empty plan.
    ///
    /// The sensor geometry must specify its range.
    pub fn new(
        actuators: Geometry,
        sensors: Geometry,
        calibration: Calibration,
    ) -> Result<Self, PlanError> {
        if sensors.range_um().is_none() {
            return Err(PlanError::NoSensorRange);
        }

        Ok(Self {
            actuators,
            sensors,
            calibration,
            targets: Vec::new(),
            calibrated: Vec::new(),
            sensor_points: Vec::new(),
            actuator_points: Vec::new(),
            sensor_min: [0.0; NUM_CHANNELS],
            sensor_max: [0.0; NUM_CHANNELS],
            actuator_min: [0.0; NUM_CHANNELS],
            actuator_max: [0.0; NUM_CHANNELS],
            planned: false,
        })
    }

    /// Add a target to the end of the plan.
    ///
    /// The plan must be run again before it is used.
    pub fn add_point(&mut self, zta: Zta) {
        self.targets.push(zta);
        self.planned = false;
    }

    /// Run the planner.
    ///
    /// Every derived sequence is rebuilt from the current targets, so running
    /// the planner more than once is harmless. Fails if any sensor channel
    /// needs more travel than its range, listing every such channel.
    pub fn run_planner(&mut self) -> Result<(), PlanError> {
        info!("Calculating moves for {} targets", self.targets.len());

        let calibration = self.calibration;
        self.calibrated = self.targets.iter().map(|t| calibration.apply(t)).collect();

        self.sensor_points = self
            .calibrated
            .iter()
            .map(|zta| self.sensor_heights(zta))
            .collect();
        self.actuator_points = self
            .calibrated
            .iter()
            .map(|zta| heights_from_zta(zta, &self.actuators))
            .collect();

        let (mut sensor_min, sensor_max) = min_max(&self.sensor_points);
        let (actuator_min, actuator_max) = min_max(&self.actuator_points);

        // The fixture has to be able to return to the sensor zero at the end
        for min in sensor_min.iter_mut() {
            if *min > 0.0 {
                *min = 0.0;
            }
        }

        self.sensor_min = sensor_min;
        self.sensor_max = sensor_max;
        self.actuator_min = actuator_min;
        self.actuator_max = actuator_max;

        info!("{} measurement points were generated", self.point_count());
        debug!(
            "Sensor travel: min {:?} um, max {:?} um",
            self.sensor_min, self.sensor_max
        );
        debug!(
            "Actuator travel: min {:?} um, max {:?} um",
            self.actuator_min, self.actuator_max
        );

        let range_um = self.sensors.range_um().ok_or(PlanError::NoSensorRange)?;
        let violations: Vec<RangeViolation> = (0..NUM_CHANNELS)
            .map(|channel| RangeViolation {
                channel,
                required_um: self.sensor_max[channel] - self.sensor_min[channel],
                range_um,
            })
            .filter(|v| v.required_um > v.range_um)
            .collect();

        if !violations.is_empty() {
            self.planned = false;
            return Err(PlanError::RangeExceeded(violations));
        }

        self.planned = true;
        Ok(())
    }

    /// Expected sensor readings for a target, including the calibration.
    pub fn project_to_sensors(&self, target: &Zta) -> Triple {
        self.sensor_heights(&self.calibration.apply(target))
    }

    /// Sensor readings for an already calibrated orientation.
    fn sensor_heights(&self, calibrated: &Zta) -> Triple {
        let mut heights = heights_from_zta(calibrated, &self.sensors);
        for (h, offset) in heights
            .iter_mut()
            .zip(self.calibration.sensor_offsets_um.iter())
        {
            *h += offset;
        }
        heights
    }

    /// Returns `Err(PlanError::NotPlanned)` unless the planner has run
    /// successfully since the last target was added.
    pub fn check_planned(&self) -> Result<(), PlanError> {
        if self.planned {
            Ok(())
        } else {
            Err(PlanError::NotPlanned)
        }
    }

    pub fn is_planned(&self) -> bool {
        self.planned
    }

    /// Number of planned points.
    pub fn point_count(&self) -> usize {
        self.calibrated.len()
    }

    pub fn targets(&self) -> &[Zta] {
        &self.targets
    }

    pub fn calibrated_points(&self) -> &[Zta] {
        &self.calibrated
    }

    pub fn sensor_points(&self) -> &[Triple] {
        &self.sensor_points
    }

    pub fn actuator_points(&self) -> &[Triple] {
        &self.actuator_points
    }

    /// Lowest reading required of each sensor, never above zero.
    pub fn sensor_min(&self) -> &Triple {
        &self.sensor_min
    }

    pub fn sensor_max(&self) -> &Triple {
        &self.sensor_max
    }

    pub fn actuator_min(&self) -> &Triple {
        &self.actuator_min
    }

    pub fn actuator_max(&self) -> &Triple {
        &self.actuator_max
    }

    pub fn actuators(&self) -> &Geometry {
        &self.actuators
    }

    pub fn sensors(&self) -> &Geometry {
        &self.sensors
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Per channel minimum and maximum of a list of points, zero if the list is
/// empty.
fn min_max(points: &[Triple]) -> (Triple, Triple) {
    if points.is_empty() {
        return ([0.0; NUM_CHANNELS], [0.0; NUM_CHANNELS]);
    }

    let mut min = [std::f64::INFINITY; NUM_CHANNELS];
    let mut max = [std::f64::NEG_INFINITY; NUM_CHANNELS];

    for point in points {
        for ch in 0..NUM_CHANNELS {
            min[ch] = min[ch].min(point[ch]);
            max[ch] = max[ch].max(point[ch]);
        }
    }

    (min, max)
}

fn format_violations(violations: &[RangeViolation]) -> String {
    violations
        .iter()
        .map(|v| {
            format!(
                "sensor {} needs {:.1} um of {:.1} um",
                v.channel + 1,
                v.required_um,
                v.range_um
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    pub(crate) fn cs02_plan() -> Plan {
        Plan::new(
            Geometry::new([0.0, 120.0, 240.0], 40.0).unwrap(),
            Geometry::new_sensor([45.0, 165.0, 285.0], 65.0, 200.0, Some(2300.0)).unwrap(),
            Calibration::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_plan() {
        let mut plan = cs02_plan();
        plan.run_planner().unwrap();

        assert_eq!(plan.point_count(), 0);
        assert!(plan.is_planned());
        assert_eq!(plan.sensor_min(), &[0.0; 3]);
        assert_eq!(plan.sensor_max(), &[0.0; 3]);
    }

    #[test]
    fn test_two_point_plan() {
        let mut plan = cs02_plan();
        plan.add_point(Zta::new(0.0, 0.0, 0.0));
        plan.add_point(Zta::new(50.0, 2.0, 90.0));
        assert!(!plan.is_planned());
        assert_eq!(plan.check_planned(), Err(PlanError::NotPlanned));

        plan.run_planner().unwrap();

        assert_eq!(plan.point_count(), 2);
        assert_eq!(plan.sensor_points().len(), 2);
        assert_eq!(plan.actuator_points().len(), 2);
        assert!(plan.check_planned().is_ok());

        // Second point, sensor X at 45 deg sees 50 - 130 * cos(-45)
        let expected = 50.0 - 65_000.0 * 0.002 * (-45f64).to_radians().cos();
        assert_abs_diff_eq!(plan.sensor_points()[1][0], expected, epsilon = 1e-9);
        assert_abs_diff_eq!(plan.sensor_min()[0], expected, epsilon = 1e-9);

        // Sensor minimums are clamped to zero
        for ch in 0..3 {
            assert!(plan.sensor_min()[ch] <= 0.0);
            assert!(plan.sensor_max()[ch] - plan.sensor_min()[ch] <= 200.0);
        }
    }

    #[test]
    fn test_run_planner_idempotent() {
        let mut plan = cs02_plan();
        plan.add_point(Zta::new(10.0, 1.0, 30.0));
        plan.run_planner().unwrap();
        plan.run_planner().unwrap();

        assert_eq!(plan.point_count(), 1);
        assert_eq!(plan.calibrated_points().len(), 1);
        assert_eq!(plan.sensor_points().len(), 1);
        assert_eq!(plan.actuator_points().len(), 1);
    }

    #[test]
    fn test_range_exceeded() {
        // Tilting away from sensor Z raises it by 208 um, the others drop by
        // half that
        let mut plan = cs02_plan();
        plan.add_point(Zta::new(0.0, 3.2, 105.0));

        match plan.run_planner() {
            Err(PlanError::RangeExceeded(v)) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].channel, 2);
                assert_abs_diff_eq!(v[0].required_um, 208.0, epsilon = 1e-6);
                assert_eq!(v[0].range_um, 200.0);
            }
            r => panic!("Expected a range error, got {:?}", r),
        }
        assert!(!plan.is_planned());

        // Pure height exceeds every channel
        let mut plan = cs02_plan();
        plan.add_point(Zta::new(250.0, 0.0, 0.0));
        match plan.run_planner() {
            Err(PlanError::RangeExceeded(v)) => {
                let channels: Vec<usize> = v.iter().map(|v| v.channel).collect();
                assert_eq!(channels, vec![0, 1, 2]);
            }
            r => panic!("Expected a range error, got {:?}", r),
        }
    }

    #[test]
    fn test_sensor_offsets() {
        let mut plan = Plan::new(
            Geometry::new([0.0, 120.0, 240.0], 40.0).unwrap(),
            Geometry::new_sensor([70.0, 190.0, 310.0], 65.0, 1000.0, None).unwrap(),
            Calibration {
                sensor_offsets_um: [340.0, 324.0, 327.0],
                ..Default::default()
            },
        )
        .unwrap();
        plan.add_point(Zta::new(0.0, 0.0, 0.0));
        plan.run_planner().unwrap();

        assert_eq!(plan.sensor_points()[0], [340.0, 324.0, 327.0]);
        assert_eq!(plan.actuator_points()[0], [0.0, 0.0, 0.0]);
        assert_eq!(plan.project_to_sensors(&Zta::default()), [340.0, 324.0, 327.0]);

        // Offsets count towards the travel needed from zero
        assert_eq!(plan.sensor_max(), &[340.0, 324.0, 327.0]);
        assert_eq!(plan.sensor_min(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sensors_without_range() {
        let res = Plan::new(
            Geometry::new([0.0, 120.0, 240.0], 40.0).unwrap(),
            Geometry::new([45.0, 165.0, 285.0], 65.0).unwrap(),
            Calibration::default(),
        );
        assert!(matches!(res, Err(PlanError::NoSensorRange)));
    }

    #[test]
    fn test_error_message() {
        let err = PlanError::RangeExceeded(vec![RangeViolation {
            channel: 0,
            required_um: 250.0,
            range_um: 200.0,
        }]);
        assert_eq!(
            err.to_string(),
            "The plan exceeds the range of the sensors: sensor 1 needs 250.0 um of 200.0 um"
        );
    }
}
