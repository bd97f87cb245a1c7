//! Main drivetrain executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop:
//!         - Simulation step up to the cycle time
//!         - Telecommand processing and handling
//!         - Drivetrain control processing:
//!             - Odometry and vision fusion
//!             - Auto handoff
//!             - Module target calculation
//!
//! # Usage
//!
//! `swerve_exec [script]`, where `script` is a TC script. With no argument the
//! demo script in `<root>/scripts` is run.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use comms_if::eqpt::vision::VisionSourceId;
use swerve_lib::{
    auto::AutoParams,
    data_store::{DataStore, SafeModeCause},
    drive_ctrl::{DriveCtrlInitData, DriveCtrlParams, DriveTrainController},
    kinematics::SwerveKinematics,
    loc::{Pose, PoseEstimatorParams, VisionSources},
    sim::{Sim, SimParams},
    tc_processor,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    host,
    raise_error,
    logger::{logger_init, LevelFilter},
    module::State,
    script_interpreter::{PendingTcs, ScriptInterpreter},
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.02;

/// Number of cycles per second
const CYCLE_FREQUENCY_HZ: f64 = 1.0 / CYCLE_PERIOD_S;

/// Consecutive overruns after which the simulation can no longer keep time.
const MAX_CONSEC_CYCLE_OVERRUNS: u64 = 500;

/// Script run when none is given on the command line.
const DEFAULT_SCRIPT: &str = "scripts/demo.script";

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("swerve_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    info!("Swerve Drivetrain Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let drive_params: DriveCtrlParams =
        util::params::load("drive_ctrl.toml").wrap_err("Could not load drive_ctrl params")?;
    let pose_params: PoseEstimatorParams =
        util::params::load("pose_est.toml").wrap_err("Could not load pose_est params")?;
    let auto_params: AutoParams =
        util::params::load("auto_handoff.toml").wrap_err("Could not load auto_handoff params")?;
    let sim_params: SimParams = util::params::load("sim.toml").wrap_err("Could not load sim params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE TC SOURCE ----

    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    let script_path = match args.len() {
        1 => {
            let mut p = host::get_swerve_sw_root().wrap_err("The software root is not set")?;
            p.push(DEFAULT_SCRIPT);
            p
        }
        2 => args[1].clone().into(),
        n => return Err(eyre!("Expected either zero or one argument, found {}", n - 1)),
    };

    info!("Loading script from {:?}", script_path);

    let mut script = ScriptInterpreter::new(&script_path).wrap_err("Failed to load script")?;

    info!(
        "Loaded script lasts {:.02} s and contains {} TCs\n",
        script.get_duration(),
        script.get_num_tcs()
    );

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let initial_pose = Pose::default();

    let kinematics =
        SwerveKinematics::new(&drive_params.geometry).wrap_err("Invalid drivetrain geometry")?;
    let sim = Sim::new(sim_params, kinematics, initial_pose);

    let mut drive_ctrl = DriveTrainController::init(DriveCtrlInitData {
        params: drive_params,
        pose_params,
        auto_params,
        hardware: sim.module_hardware(),
        heading_source: sim.gyro(),
        vision_sources: VisionSources {
            primary: Some(sim.vision_source(VisionSourceId::Primary)),
            secondary: Some(sim.vision_source(VisionSourceId::Secondary)),
        },
        pathfinder: Some(sim.pathfinder()),
        initial_pose,
    })
    .wrap_err("Failed to initialise DriveCtrl")?;
    info!("DriveCtrl init complete");

    let mut ds = DataStore {
        destination_selector: drive_ctrl.destination_selector(),
        ..DataStore::default()
    };

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();
        let time_s = session::get_elapsed_seconds();

        // Bring the world up to now
        sim.step_to(time_s);

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(CYCLE_FREQUENCY_HZ, time_s);

        // ---- TELECOMMAND PROCESSING ----

        match script.get_pending_tcs() {
            PendingTcs::None => (),
            PendingTcs::Some(tcs) => {
                for tc in tcs.iter() {
                    tc_processor::exec(&mut ds, tc);
                }
            }
            PendingTcs::EndOfScript => {
                info!("End of TC script reached, stopping");
                break;
            }
        }

        ds.inputs_done();

        // ---- CONTROL ALGORITHM PROCESSING ----

        match drive_ctrl.proc(&ds.drive_ctrl_input) {
            Ok((o, r)) => {
                ds.drive_ctrl_output = Some(o);
                ds.drive_ctrl_status_rpt = r;
            }
            Err(e) => {
                warn!("Error during DriveCtrl processing: {}", e);
                ds.make_safe(SafeModeCause::DriveCtrlFault);
            }
        }

        if ds.is_1_hz_cycle {
            if let Some(ref o) = ds.drive_ctrl_output {
                info!(
                    "Pose: ({:.3}, {:.3}) m, {:.3} rad, auto: {:?}",
                    o.pose.x_m(),
                    o.pose.y_m(),
                    o.pose.heading_rad,
                    ds.drive_ctrl_status_rpt.auto_state
                );
            }
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                );
                ds.num_consec_cycle_overruns += 1;

                if ds.num_consec_cycle_overruns > MAX_CONSEC_CYCLE_OVERRUNS {
                    drive_ctrl.make_safe();
                    raise_error!(
                        "More than {} consecutive cycle overruns!",
                        MAX_CONSEC_CYCLE_OVERRUNS
                    );
                }
            }
        }

        ds.num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    drive_ctrl.make_safe();

    let truth = sim.world().pose;
    let estimate = drive_ctrl.estimated_pose();
    info!(
        "Final pose estimate ({:.3}, {:.3}, {:.3}), truth ({:.3}, {:.3}, {:.3})",
        estimate.x_m(),
        estimate.y_m(),
        estimate.heading_rad,
        truth.x_m(),
        truth.y_m(),
        truth.heading_rad
    );

    info!("End of execution");

    Ok(())
}
