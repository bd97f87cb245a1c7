//! Telecommand scripts driving the controller through the data store, the
//! way the executable's main loop does.

mod common;

use comms_if::tc::Tc;
use common::*;
use swerve_lib::{data_store::DataStore, tc_processor};
use util::{
    module::State,
    script_interpreter::{PendingTcs, ScriptInterpreter},
};

const SCRIPT: &str = r#"
0.0: {"type": "Drive", "payload": {"forward_ms": 1.0, "sideways_ms": 0.0, "rot_rads": 0.0, "field_relative": true}};
1.0: {"type": "Stop"};
1.5: {"type": "MakeSafe"};
1.6: {"type": "Drive", "payload": {"forward_ms": 1.0, "sideways_ms": 0.0, "rot_rads": 0.0, "field_relative": true}};
2.0: {"type": "MakeUnsafe"};
2.5: {"type": "SetSlowMode", "payload": true};
2.5: {"type": "Drive", "payload": {"forward_ms": 0.0, "sideways_ms": 3.0, "rot_rads": 0.0, "field_relative": false}};
3.5: {"type": "Stop"};
"#;

#[test]
fn script_runs_through_the_data_store() {
    let mut rig = Rig::new(RigOptions::default());
    let mut script = ScriptInterpreter::from_str(SCRIPT).unwrap();
    let mut ds = DataStore::default();

    let mut x_when_safe = None;
    let mut saw_speed_limit = false;

    loop {
        let time_s = rig.sim.time_s();
        ds.cycle_start(1.0 / DT, time_s);

        match script.get_pending_tcs_at(time_s) {
            PendingTcs::None => (),
            PendingTcs::Some(tcs) => {
                for tc in tcs.iter() {
                    tc_processor::exec(&mut ds, tc);
                }
            }
            PendingTcs::EndOfScript => break,
        }

        ds.inputs_done();

        let (out, status) = rig.ctrl.proc(&ds.drive_ctrl_input).unwrap();

        if ds.safe {
            assert!(out.targets.is_none());
            x_when_safe.get_or_insert(rig.truth().x_m());
        }
        saw_speed_limit |= status.speed_limited;

        ds.drive_ctrl_output = Some(out);
        ds.drive_ctrl_status_rpt = status;
        ds.num_cycles += 1;

        rig.sim.step(DT);
    }

    assert!(!ds.safe);
    assert!(saw_speed_limit);
    assert!(rig.ctrl.slow_mode());

    let truth = rig.truth();

    // The drive sent while safe was dropped, so the only forward motion is
    // the first second
    let x_when_safe = x_when_safe.unwrap();
    assert!((x_when_safe - 1.0).abs() < 0.05, "x when safe {}", x_when_safe);
    assert!((truth.x_m() - x_when_safe).abs() < 0.05);

    // One second sideways at the slow mode limit
    let slow_max = rig.ctrl.max_speed_ms();
    assert!((truth.y_m() - slow_max).abs() < 0.1, "y {} with limit {}", truth.y_m(), slow_max);

    assert!(rig.sim.world().modules.iter().all(|m| m.num_stops > 0));
}

#[test]
fn auto_goto_tc_is_taken_by_the_controller() {
    let mut rig = Rig::new(RigOptions::default());
    let mut ds = DataStore {
        destination_selector: rig.ctrl.destination_selector(),
        ..DataStore::default()
    };

    ds.cycle_start(1.0 / DT, rig.sim.time_s());
    tc_processor::exec(&mut ds, &Tc::AutoGoto { destination: 1 });
    ds.inputs_done();
    rig.ctrl.proc(&ds.drive_ctrl_input).unwrap();

    assert!(rig.ctrl.auto_state().is_some());
    assert_eq!(ds.destination_selector.take(), None);

    // Cancelling goes through the same path
    ds.cycle_start(1.0 / DT, rig.sim.time_s());
    tc_processor::exec(&mut ds, &Tc::CancelAuto);
    ds.inputs_done();
    rig.ctrl.proc(&ds.drive_ctrl_input).unwrap();
    assert!(rig.ctrl.auto_state().is_none());
}
