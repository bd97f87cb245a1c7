//! End-to-end autonomous path handoff scenarios.

mod common;

use common::*;
use swerve_lib::{
    auto::AutoState,
    drive_ctrl::{AutoRequest, InputData},
    loc::Pose,
};
use util::maths::wrap_pi;

const START: (f64, f64, f64) = (1.5, 4.0, 0.0);

fn rig() -> Rig {
    Rig::new(RigOptions {
        initial_pose: Pose::new(START.0, START.1, START.2),
        ..RigOptions::default()
    })
}

fn goto(destination: Option<usize>) -> InputData {
    InputData {
        auto: Some(AutoRequest::Goto(destination)),
        ..InputData::default()
    }
}

#[test]
fn drives_to_the_selected_destination() {
    let mut rig = rig();

    // Reef1, goal (3.2, 4.0, 0.0)
    let (_, status) = rig.tick(goto(Some(0)));
    assert!(matches!(status.auto_state, Some(AutoState::Pending) | Some(AutoState::Following)));

    rig.wait_for_path();
    assert_eq!(rig.ctrl.auto_state(), Some(AutoState::Following));

    let mut last_state = None;
    for _ in 0..500 {
        let (_, status) = rig.tick(InputData::default());
        if rig.ctrl.auto_state().is_none() {
            last_state = status.auto_state;
            break;
        }
    }

    assert_eq!(last_state, Some(AutoState::Finished));

    let truth = rig.truth();
    let goal = Pose::new(3.2, 4.0, 0.0);
    assert!(distance_m(&truth, &goal) < 0.05, "ended at {:?}", truth);
    assert!(wrap_pi(truth.heading_rad - goal.heading_rad).abs() < 0.05);

    // Back in manual with the modules stopped
    rig.run(5);
    for m in rig.sim.world().modules.iter() {
        assert_eq!(m.speed_ms, 0.0);
    }
}

#[test]
fn driver_input_overrides_auto() {
    let mut rig = rig();

    rig.tick(goto(Some(0)));
    rig.wait_for_path();
    rig.run(10);
    assert_eq!(rig.ctrl.auto_state(), Some(AutoState::Following));

    // Below the override threshold the driver is ignored
    let (_, status) = rig.tick(manual(0.01, 0.0, 0.0, true));
    assert_eq!(status.auto_state, Some(AutoState::Following));

    let (out, status) = rig.tick(manual(0.0, 1.0, 0.0, true));
    assert_eq!(status.auto_state, Some(AutoState::Cancelled));
    assert!(rig.ctrl.auto_state().is_none());

    // The driver's command took effect this tick, in either steer sense
    let targets = out.targets.unwrap();
    for t in targets.iter() {
        assert!((t.speed_ms.abs() - 1.0).abs() < 0.05);
    }
}

#[test]
fn cancel_request_stops_the_robot() {
    let mut rig = rig();

    rig.tick(goto(Some(1)));
    rig.wait_for_path();
    rig.run(20);

    let handle = rig.ctrl.auto_cancel_handle().unwrap();
    handle.cancel();

    let (_, status) = rig.tick(InputData::default());
    assert_eq!(status.auto_state, Some(AutoState::Cancelled));
    assert!(rig.ctrl.auto_state().is_none());

    rig.run(2);
    for m in rig.sim.world().modules.iter() {
        assert_eq!(m.speed_ms, 0.0);
    }

    // And via the request path
    rig.tick(goto(Some(1)));
    rig.wait_for_path();
    let (_, status) = rig.tick(InputData { auto: Some(AutoRequest::Cancel), ..InputData::default() });
    assert_eq!(status.auto_state, Some(AutoState::Cancelled));
}

#[test]
fn no_selection_is_a_noop() {
    let mut rig = rig();

    let (out, status) = rig.tick(goto(None));
    assert_eq!(status.auto_state, None);
    assert!(rig.ctrl.auto_state().is_none());
    assert!(out.targets.is_none());

    // Past the end of the table
    let (_, status) = rig.tick(goto(Some(42)));
    assert_eq!(status.auto_state, None);

    rig.run(10);
    assert!(distance_m(&rig.truth(), &Pose::new(START.0, START.1, START.2)) < 1e-9);
}
