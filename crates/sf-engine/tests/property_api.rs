//! The typed property interface: read/write contracts and lifecycle
//! gating.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use sf_core::error::codes;
use sf_core::ObjectKind;
use sf_engine::{Engine, GaugeProp, LinkProp, NodeProp, SubcatchProp, SystemProp};

fn engine_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

const NETWORK: &str = r#"
options:
  start_date: "2024-01-01 00:00:00"
  end_date: "2024-01-01 01:00:00"
  report_step_s: 600
  route_step_s: 10.0
  routing_model: kinematic_wave
raingauges:
  - { id: G1 }
subcatchments:
  - { id: S1, raingauge: G1, outlet: J1, area: 5.0, width: 500.0, slope: 0.01 }
nodes:
  - { type: junction, id: J1, invert: 10.0, max_depth: 6.0 }
  - { type: outfall, id: O1, invert: 2.0 }
links:
  - { type: conduit, id: C1, from: J1, to: O1, length: 400.0, roughness: 0.013, max_depth: 2.0 }
  - { type: pump, id: P1, from: J1, to: O1, design_flow: 1.0 }
"#;

fn open_engine(dir: &std::path::Path) -> (Engine, PathBuf) {
    let inp = dir.join("project.yaml");
    std::fs::write(&inp, NETWORK).unwrap();
    let mut engine = Engine::new();
    engine
        .open(&inp, &dir.join("project.rpt"), &dir.join("project.out"))
        .unwrap();
    (engine, inp)
}

#[test]
fn gauge_override_reaches_assigned_subcatchments() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, _inp) = open_engine(dir.path());
    engine.start(true).unwrap();

    engine
        .set_value(GaugeProp::Rainfall as u16, 0, 3.6)
        .unwrap();
    engine.step().unwrap();

    let gauge = engine.get_value(GaugeProp::Rainfall as u16, 0).unwrap();
    assert!((gauge - 3.6).abs() < 1e-9);
    let subcatch = engine
        .get_value(SubcatchProp::Rainfall as u16, 0)
        .unwrap();
    assert!((subcatch - 3.6).abs() < 1e-9, "got {subcatch}");

    engine.end().unwrap();
    engine.close().unwrap();
}

#[test]
fn outfall_stage_override_and_object_type_gate() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, _inp) = open_engine(dir.path());

    // node 1 is the outfall with invert 2.0: head reads H + invert
    engine
        .set_value(NodeProp::Head as u16, 1, 5.0)
        .unwrap();
    let head = engine.get_value(NodeProp::Head as u16, 1).unwrap();
    assert!((head - 7.0).abs() < 1e-9, "got {head}");

    // a junction rejects the stage override
    let err = engine.set_value(NodeProp::Head as u16, 0, 5.0).unwrap_err();
    assert_eq!(err.code(), codes::OBJECT_TYPE);

    // the override also holds while the simulation runs
    engine.start(false).unwrap();
    engine.step().unwrap();
    let head = engine.get_value(NodeProp::Head as u16, 1).unwrap();
    assert!((head - 7.0).abs() < 1e-9);

    engine.end().unwrap();
    engine.close().unwrap();
}

#[test]
fn writability_follows_the_lifecycle_phase() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, _inp) = open_engine(dir.path());

    // all pre-start writes are legal now
    engine
        .set_value(SystemProp::ReportStep as u16, 0, 300.0)
        .unwrap();
    engine
        .set_value(SubcatchProp::Area as u16, 0, 7.5)
        .unwrap();
    engine
        .set_value(NodeProp::MaxDepth as u16, 0, 8.0)
        .unwrap();

    engine.start(false).unwrap();

    // time bounds and geometry freeze during the run
    assert_eq!(
        engine
            .set_value(SystemProp::EndDate as u16, 0, 45_000.0)
            .unwrap_err()
            .code(),
        codes::NOT_ENDED
    );
    assert_eq!(
        engine
            .set_value(SubcatchProp::Area as u16, 0, 9.0)
            .unwrap_err()
            .code(),
        codes::NOT_ENDED
    );
    assert_eq!(
        engine
            .set_value(NodeProp::MaxDepth as u16, 0, 9.0)
            .unwrap_err()
            .code(),
        codes::NOT_ENDED
    );

    // the routing step stays live
    engine
        .set_value(SystemProp::RouteStep as u16, 0, 5.0)
        .unwrap();
    assert_eq!(
        engine.get_value(SystemProp::RouteStep as u16, 0).unwrap(),
        5.0
    );

    // node lateral inflow stays live
    engine
        .set_value(NodeProp::LateralInflow as u16, 0, 2.0)
        .unwrap();

    engine.end().unwrap();
    engine.close().unwrap();
}

#[test]
fn invalid_codes_indices_and_values_are_rejected() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, _inp) = open_engine(dir.path());

    assert_eq!(
        engine.get_value(999, 0).unwrap_err().code(),
        codes::PROPERTY_CODE
    );
    assert_eq!(
        engine
            .get_value(NodeProp::Depth as u16, 42)
            .unwrap_err()
            .code(),
        codes::OBJECT_INDEX
    );
    assert_eq!(
        engine
            .set_value(SystemProp::RouteStep as u16, 0, 0.0)
            .unwrap_err()
            .code(),
        codes::PROPERTY_VALUE
    );
    assert_eq!(
        engine
            .set_value(SystemProp::RouteStep as u16, 0, -4.0)
            .unwrap_err()
            .code(),
        codes::PROPERTY_VALUE
    );
    assert_eq!(
        engine
            .set_value(GaugeProp::Rainfall as u16, 0, -1.0)
            .unwrap_err()
            .code(),
        codes::PROPERTY_VALUE
    );

    // per-pollutant reads need a sub-index (none defined here)
    assert_eq!(
        engine
            .get_value_ex(ObjectKind::Node, NodeProp::PollutantConcentration as u16, 0, Some(0))
            .unwrap_err()
            .code(),
        codes::SUB_INDEX
    );

    engine.close().unwrap();
}

#[test]
fn legacy_and_expanded_forms_agree() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (engine, _inp) = open_engine(dir.path());

    let legacy = engine.get_value(NodeProp::InvertElev as u16, 1).unwrap();
    let expanded = engine
        .get_value_ex(ObjectKind::Node, NodeProp::InvertElev as u16, 1, None)
        .unwrap();
    assert_eq!(legacy, expanded);
    assert_eq!(legacy, 2.0);

    let mut engine = engine;
    engine.close().unwrap();
}

#[test]
fn si_unit_round_trip_within_tolerance() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let inp = dir.path().join("project.yaml");
    std::fs::write(
        &inp,
        r#"
options:
  flow_units: CMS
nodes:
  - { type: junction, id: J1, invert: 1.0, max_depth: 3.0 }
"#,
    )
    .unwrap();
    let mut engine = Engine::new();
    engine
        .open(&inp, &dir.path().join("p.rpt"), &dir.path().join("p.out"))
        .unwrap();

    // write 2.5 m, read 2.5 m back (stored internally in feet)
    engine
        .set_value(NodeProp::MaxDepth as u16, 0, 2.5)
        .unwrap();
    let depth = engine.get_value(NodeProp::MaxDepth as u16, 0).unwrap();
    assert!((depth - 2.5).abs() < 1e-12);

    engine.close().unwrap();
}

#[test]
fn link_setting_contract() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, _inp) = open_engine(dir.path());
    engine.start(false).unwrap();

    // conduits have no setting to override
    assert_eq!(
        engine
            .set_value(LinkProp::Setting as u16, 0, 0.5)
            .unwrap_err()
            .code(),
        codes::OBJECT_TYPE
    );

    // pump speed: stored as target, applied by the next step
    engine
        .set_value(LinkProp::Setting as u16, 1, 0.0)
        .unwrap();
    engine.step().unwrap();
    assert_eq!(engine.get_value(LinkProp::Setting as u16, 1).unwrap(), 0.0);

    // reopening stamps the transition time; time-closed starts counting
    engine
        .set_value(LinkProp::Setting as u16, 1, 1.0)
        .unwrap();
    engine.step().unwrap();
    assert_eq!(engine.get_value(LinkProp::Setting as u16, 1).unwrap(), 1.0);

    engine.end().unwrap();
    engine.close().unwrap();
}

#[test]
fn getters_are_pure_between_steps() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, _inp) = open_engine(dir.path());
    engine.start(false).unwrap();
    engine.step().unwrap();

    let first = engine.get_value(NodeProp::Depth as u16, 0).unwrap();
    for _ in 0..5 {
        assert_eq!(engine.get_value(NodeProp::Depth as u16, 0).unwrap(), first);
    }

    engine.end().unwrap();
    engine.close().unwrap();
}
