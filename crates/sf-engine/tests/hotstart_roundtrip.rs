//! Hot-start persistence: saving routing state mid-run and resuming a
//! later run from it.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use sf_core::error::codes;
use sf_engine::{Engine, NodeProp, SystemProp};

fn engine_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

// a tank draining through an orifice: no time-dependent forcing, so a
// resumed run must retrace the uninterrupted one
const NETWORK: &str = r#"
options:
  start_date: "2024-01-01 00:00:00"
  end_date: "2024-01-01 01:00:00"
  report_step_s: 600
  route_step_s: 10.0
  routing_model: kinematic_wave
nodes:
  - { type: storage, id: T1, invert: 10.0, max_depth: 10.0, init_depth: 4.0, surface_area: 300.0 }
  - { type: outfall, id: O1, invert: 0.0 }
links:
  - { type: orifice, id: R1, from: T1, to: O1, cd: 0.65, area: 0.25 }
"#;

fn write_project(dir: &std::path::Path) -> (PathBuf, PathBuf, PathBuf) {
    let inp = dir.join("project.yaml");
    std::fs::write(&inp, NETWORK).unwrap();
    (inp, dir.join("project.rpt"), dir.join("project.out"))
}

fn run_to_horizon(engine: &mut Engine) {
    while engine.step().unwrap() > 0.0 {}
}

#[test]
fn resumed_run_matches_the_uninterrupted_one() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(dir.path());
    let snapshot = dir.path().join("state.hsf");
    let half_day = sf_core::datetime::parse("2024-01-01 00:30:00").unwrap();

    // cold reference: 0 -> 3600 s in one pass
    let mut engine = Engine::new();
    engine.open(&inp, &rpt, &out).unwrap();
    engine.start(false).unwrap();
    run_to_horizon(&mut engine);
    let depth_cold = engine.get_value(NodeProp::Depth as u16, 0).unwrap();
    engine.end().unwrap();
    engine.close().unwrap();

    // first half: 0 -> 1800 s, then snapshot
    let mut engine = Engine::new();
    engine.open(&inp, &rpt, &out).unwrap();
    engine
        .set_value(SystemProp::EndDate as u16, 0, half_day)
        .unwrap();
    engine.start(false).unwrap();
    run_to_horizon(&mut engine);
    engine
        .save_hot_start(snapshot.to_str().unwrap())
        .unwrap();
    engine.end().unwrap();
    engine.close().unwrap();

    // second half: load the snapshot, simulate another 1800 s
    let mut engine = Engine::new();
    engine.open(&inp, &rpt, &out).unwrap();
    engine
        .set_value(SystemProp::EndDate as u16, 0, half_day)
        .unwrap();
    engine.use_hot_start(snapshot.to_str().unwrap()).unwrap();
    engine.start(false).unwrap();
    // the loaded state replaces the cold-start initial depth
    let resumed_depth = engine.get_value(NodeProp::Depth as u16, 0).unwrap();
    assert!(resumed_depth < 4.0, "snapshot applied, got {resumed_depth}");
    run_to_horizon(&mut engine);
    let depth_warm = engine.get_value(NodeProp::Depth as u16, 0).unwrap();
    engine.end().unwrap();
    engine.close().unwrap();

    assert!(
        (depth_warm - depth_cold).abs() < 1e-6,
        "cold {depth_cold} vs warm {depth_warm}"
    );
}

#[test]
fn scheduled_saves_fire_at_their_times() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let inp = dir.path().join("project.yaml");
    std::fs::write(
        &inp,
        format!(
            r#"
options:
  start_date: "2024-01-01 00:00:00"
  end_date: "2024-01-01 01:00:00"
  report_step_s: 600
  route_step_s: 10.0
  routing_model: kinematic_wave
  hotstart_saves:
    - {{ at: "2024-01-01 00:10:00", file: "{}" }}
    - {{ at: "2024-01-01 00:20:00", file: "{}" }}
nodes:
  - {{ type: storage, id: T1, invert: 10.0, max_depth: 10.0, init_depth: 4.0, surface_area: 300.0 }}
  - {{ type: outfall, id: O1, invert: 0.0 }}
links:
  - {{ type: orifice, id: R1, from: T1, to: O1, cd: 0.65, area: 0.25 }}
"#,
            dir.path().join("at600.hsf").display(),
            dir.path().join("at1200.hsf").display(),
        ),
    )
    .unwrap();

    let mut engine = Engine::new();
    engine
        .open(&inp, &dir.path().join("p.rpt"), &dir.path().join("p.out"))
        .unwrap();
    engine.start(false).unwrap();
    run_to_horizon(&mut engine);
    engine.end().unwrap();
    engine.close().unwrap();

    assert!(dir.path().join("at600.hsf").exists());
    assert!(dir.path().join("at1200.hsf").exists());
}

#[test]
fn arming_a_bad_snapshot_is_rejected_up_front() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(dir.path());
    let junk = dir.path().join("junk.hsf");
    std::fs::write(&junk, b"definitely not a snapshot").unwrap();

    let mut engine = Engine::new();
    engine.open(&inp, &rpt, &out).unwrap();
    let err = engine.use_hot_start(junk.to_str().unwrap()).unwrap_err();
    assert_eq!(err.code(), codes::HOTSTART_OPEN);
    engine.close().unwrap();
}

#[test]
fn topology_mismatch_fails_the_start() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(dir.path());
    let snapshot = dir.path().join("state.hsf");

    // snapshot taken on the two-node network
    let mut engine = Engine::new();
    engine.open(&inp, &rpt, &out).unwrap();
    engine.start(false).unwrap();
    engine.step().unwrap();
    engine.save_hot_start(snapshot.to_str().unwrap()).unwrap();
    engine.end().unwrap();
    engine.close().unwrap();

    // a different network arms it (validation alone cannot see the
    // mismatch) and must fail at start when the topology is checked
    let other_inp = dir.path().join("other.yaml");
    std::fs::write(
        &other_inp,
        r#"
options:
  start_date: "2024-01-01 00:00:00"
  end_date: "2024-01-01 01:00:00"
nodes:
  - { type: junction, id: J1, invert: 0.0 }
"#,
    )
    .unwrap();
    let mut engine = Engine::new();
    engine
        .open(&other_inp, &dir.path().join("o.rpt"), &dir.path().join("o.out"))
        .unwrap();
    engine.use_hot_start(snapshot.to_str().unwrap()).unwrap();
    let err = engine.start(false).unwrap_err();
    assert_eq!(err.code(), codes::HOTSTART_TOPOLOGY);
    assert_eq!(engine.error_code(), codes::HOTSTART_TOPOLOGY);
    engine.end().unwrap();
    engine.close().unwrap();
}
