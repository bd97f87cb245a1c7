//! End-to-end localisation scenarios, odometry corrected by the simulated
//! cameras.

mod common;

use comms_if::eqpt::vision::{VisionReading, VisionSourceId};
use common::*;
use swerve_lib::{drive_ctrl::InputData, loc::{Pose, SourcedReading}, sim::SimParams};

/// Add `slip_m` to every wheel's distance without moving the robot.
fn slip_wheels(rig: &Rig, slip_m: f64) {
    let mut w = rig.sim.world();
    for m in w.modules.iter_mut() {
        m.distance_m += slip_m;
    }
}

#[test]
fn vision_corrects_wheel_slip() {
    let mut rig = Rig::new(RigOptions { with_vision: true, ..RigOptions::default() });

    rig.tick(manual(1.0, 0.0, 0.0, true));
    rig.run(50);

    slip_wheels(&rig, 0.2);
    rig.tick(InputData::default());

    // Straight after the slip odometry is ahead of the truth
    let err = distance_m(&rig.ctrl.estimated_pose(), &rig.truth());
    assert!(err > 0.1, "error after slip was {}", err);

    let (_, status) = rig.run(100);

    assert!(status.vision.num_applied.iter().sum::<u32>() > 0);
    let err = distance_m(&rig.ctrl.estimated_pose(), &rig.truth());
    assert!(err < 0.01, "error after fusion was {}", err);
}

#[test]
fn primary_reseeds_biased_secondary() {
    let mut params = SimParams::default();
    params.secondary_camera.bias_m = [0.05, -0.05];

    let mut rig = Rig::new(RigOptions {
        sim: params,
        with_vision: true,
        ..RigOptions::default()
    });

    let mut reseeded = false;
    for _ in 0..100 {
        let (_, status) = rig.tick(InputData::default());
        reseeded |= status.vision.secondary_reseeded;
    }

    assert!(reseeded);
    {
        let w = rig.sim.world();
        let cam = &w.cameras[VisionSourceId::Secondary.index()];
        assert!(cam.num_reseeds > 0);
        assert_eq!(cam.bias_m, [0.0, 0.0]);
    }

    let err = distance_m(&rig.ctrl.estimated_pose(), &rig.truth());
    assert!(err < 0.005, "error after re-seed was {}", err);
}

#[test]
fn disconnected_camera_is_reported_and_odometry_continues() {
    let mut rig = Rig::new(RigOptions { with_vision: true, ..RigOptions::default() });

    rig.sim.world().cameras[VisionSourceId::Primary.index()].connected = false;

    rig.tick(manual(1.0, 0.0, 0.0, true));
    let (out, status) = rig.run(20);

    assert!(status.vision.primary_disconnected);
    assert!(!status.vision.secondary_disconnected);
    assert_eq!(status.vision.num_applied[VisionSourceId::Primary.index()], 0);
    assert!(out.targets.is_some());
    assert!(distance_m(&rig.ctrl.estimated_pose(), &rig.truth()) < 1e-3);

    // Back online
    rig.sim.world().cameras[VisionSourceId::Primary.index()].connected = true;
    let (_, status) = rig.run(10);
    assert!(!status.vision.primary_disconnected);
}

#[test]
fn readings_pushed_from_another_thread_are_fused() {
    let mut rig = Rig::new(RigOptions::default());

    rig.run(10);
    let now_s = rig.sim.time_s();

    let tx = rig.ctrl.vision_inbox_sender();
    let handle = std::thread::spawn(move || {
        tx.send(SourcedReading {
            source: VisionSourceId::Primary,
            reading: VisionReading {
                x_m: 0.1,
                y_m: 0.0,
                heading_rad: 0.0,
                timestamp_s: now_s - 0.05,
                distance_m: 0.5,
                exists: true,
            },
        })
        .unwrap();
    });
    handle.join().unwrap();

    let (_, status) = rig.tick(InputData::default());

    assert_eq!(status.vision.num_applied[VisionSourceId::Primary.index()], 1);
    let est = rig.ctrl.estimated_pose();
    assert!(est.x_m() > 0.09, "estimate {:?}", est);
}

#[test]
fn reset_pose_reseeds_the_secondary() {
    let mut rig = Rig::new(RigOptions { with_vision: true, ..RigOptions::default() });

    // Cameras offline so the reset is the only re-seed
    for cam in rig.sim.world().cameras.iter_mut() {
        cam.connected = false;
    }

    rig.run(10);
    let target = Pose::new(2.0, 3.0, 0.5);
    let (out, _) = rig.tick(InputData { reset_pose: Some(target), ..InputData::default() });

    assert!(distance_m(&out.pose, &target) < 1e-9);
    assert!((out.pose.heading_rad - 0.5).abs() < 1e-9);
    assert_eq!(rig.sim.world().cameras[VisionSourceId::Secondary.index()].num_reseeds, 1);
}
