//! # Fixture Control Executable
//!
//! Runs an experiment on the CapS test fixture:
//! - Loads the fixture parameters and the experiment
//! - Builds and validates the motion plan
//! - Powers up the fixture, runs every point of the plan and shuts the
//!   fixture down again, even if the run fails
//!
//! Instrument drivers are not part of this workspace, the experiment is run
//! against the simulated fixture. Samples are written to the session
//! directory.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Terminal operator for sensor adjustments.
mod operator;

/// Parameters for the fixture executable.
mod params;

/// Sample file recorder.
mod recorder;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{error, info};
use std::sync::Arc;
use structopt::StructOpt;

// Internal
use fixture_lib::{
    fixture::{ExperimentParams, Fixture},
    plan::Plan,
    sim,
};
use operator::TermOperator;
use params::FixtureExecParams;
use recorder::JsonRecorder;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Run an experiment on the CapS test fixture.
#[derive(Debug, StructOpt)]
#[structopt(name = "fixture_exec")]
struct Cli {
    /// Fixture parameter file, relative to the params directory
    #[structopt(long, default_value = "fixture.toml")]
    fixture_params: String,

    /// Experiment parameter file, relative to the params directory
    #[structopt(long, default_value = "experiment.toml")]
    experiment: String,

    /// Validate and print the plan without moving the fixture
    #[structopt(long)]
    plan_only: bool,

    /// Minimum level of log messages, at least as verbose as info
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("fixture_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(cli.log_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Fixture Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: FixtureExecParams = util::params::load(&cli.fixture_params)
        .wrap_err_with(|| format!("Failed to load fixture parameters from {}", cli.fixture_params))?;
    let exp: ExperimentParams = util::params::load(&cli.experiment)
        .wrap_err_with(|| format!("Failed to load the experiment from {}", cli.experiment))?;

    let sensors = *params
        .sensors()
        .ok_or_else(|| eyre!("Unknown sensor set \"{}\"", params.sensor_set))?;

    info!("Parameters loaded, using sensor set {}", params.sensor_set);

    // ---- PLAN ----

    let mut plan = Plan::new(params.actuators, sensors, params.calibration)
        .wrap_err("Failed to create the plan")?;
    for point in exp.points.iter() {
        plan.add_point(*point);
    }
    plan.run_planner().wrap_err("The plan is not valid")?;

    log_plan(&plan);

    if cli.plan_only {
        info!("Plan only requested, exiting");
        return Ok(());
    }

    // ---- EQUIPMENT ----

    let (mut eqpt, _sim) = sim::build(params.sim, params.actuators, sensors, exp.use_motors);

    let mut samples_path = session.session_root.clone();
    samples_path.push("samples.jsonl");
    eqpt.recorders.push(Box::new(
        JsonRecorder::new(&samples_path).wrap_err("Failed to create the sample file")?,
    ));
    eqpt.operator = Box::new(TermOperator);

    let mut fixture = Fixture::new(params.fixture, params.ctrl, Arc::new(plan), eqpt)
        .wrap_err("Failed to initialise the fixture")?;

    info!("Initialisation complete");

    // ---- RUN ----

    let result = fixture
        .power_up()
        .and_then(|_| fixture.run_experiment(&exp));

    // The fixture is always made safe, whatever happened to the run
    if let Err(e) = fixture.shutdown() {
        error!("Fixture shutdown reported an error: {}", e);
    }

    let report = result.wrap_err("The experiment failed")?;
    info!("Run report: {}", report);

    Ok(())
}

/// Log the targets and projections of the plan.
fn log_plan(plan: &Plan) {
    info!("Plan of {} points:", plan.point_count());
    for (i, target) in plan.targets().iter().enumerate() {
        info!(
            "  {:3}: target {}, calibrated {}",
            i + 1,
            target,
            plan.calibrated_points()[i]
        );
        info!(
            "       sensors {:?} um, actuators {:?} um",
            plan.sensor_points()[i],
            plan.actuator_points()[i]
        );
    }
    info!(
        "Sensor travel: min {:?} um, max {:?} um",
        plan.sensor_min(),
        plan.sensor_max()
    );
    info!(
        "Actuator travel: min {:?} um, max {:?} um",
        plan.actuator_min(),
        plan.actuator_max()
    );
}
