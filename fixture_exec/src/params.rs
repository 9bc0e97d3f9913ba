//! # Fixture Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;

use serde::Deserialize;

use fixture_lib::{
    calib::Calibration, fixture::FixtureParams, geometry::Geometry, pid_ctrl::CtrlParams,
    sim::SimParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
pub struct FixtureExecParams {
    /// Name of the installed sensor set, one of the keys of `sensor_sets`
    pub sensor_set: String,

    /// Layout of the actuators
    pub actuators: Geometry,

    /// Layouts of every sensor set the fixture can be fitted with
    pub sensor_sets: BTreeMap<String, Geometry>,

    /// Calibration of the device under test
    pub calibration: Calibration,

    /// Hold controller gains and rate
    #[serde(default)]
    pub ctrl: CtrlParams,

    /// Fixture timings and limits
    #[serde(default)]
    pub fixture: FixtureParams,

    /// Simulated fixture used for dry runs
    #[serde(default)]
    pub sim: SimParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FixtureExecParams {
    /// Get the layout of the installed sensor set.
    pub fn sensors(&self) -> Option<&Geometry> {
        self.sensor_sets.get(&self.sensor_set)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use fixture_lib::fixture::ExperimentParams;

    #[test]
    fn test_shipped_params() {
        let params: FixtureExecParams =
            util::params::from_str(include_str!("../../params/fixture.toml")).unwrap();

        let sensors = params.sensors().unwrap();
        assert_eq!(sensors.range_um(), Some(1000.0));
        assert_eq!(params.sensor_sets["CS02"].range_um(), Some(200.0));
        assert_eq!(params.actuators.angles_deg(), &[0.0, 120.0, 240.0]);
        assert_eq!(params.calibration.sensor_offsets_um, [340.0, 324.0, 327.0]);
        assert_eq!(params.ctrl, CtrlParams::default());
        assert_eq!(params.fixture.rest_voltage_v, 50.0);

        let exp: ExperimentParams =
            util::params::from_str(include_str!("../../params/experiment.toml")).unwrap();
        assert!(!exp.points.is_empty());
    }
}
