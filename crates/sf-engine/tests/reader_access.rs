//! Reading computed results back: through a standalone reader handle and
//! through the engine's saved-value API between end and close.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use sf_engine::{run, Engine, LinkProp, NodeProp, SystemProp};
use sf_output::{ElementType, OutputReader};

fn engine_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

const NETWORK: &str = r#"
title: Reader fixture
options:
  start_date: "2024-01-01 06:00:00"
  end_date: "2024-01-01 07:00:00"
  report_step_s: 600
  route_step_s: 10.0
  routing_model: kinematic_wave
nodes:
  - { type: storage, id: T1, invert: 10.0, max_depth: 10.0, init_depth: 4.0, surface_area: 300.0 }
  - { type: outfall, id: O1, invert: 0.0 }
links:
  - { type: orifice, id: R1, from: T1, to: O1, cd: 0.65, area: 0.25 }
"#;

fn completed_run(dir: &std::path::Path) -> PathBuf {
    let inp = dir.join("project.yaml");
    std::fs::write(&inp, NETWORK).unwrap();
    let out = dir.join("project.out");
    let code = run(&inp, &dir.join("project.rpt"), &out);
    assert_eq!(code, 0);
    out
}

#[test]
fn period_dates_step_by_the_report_interval() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let out = completed_run(dir.path());

    let mut reader = OutputReader::open(&out).unwrap();
    let start = reader.start_date();
    let step_days = f64::from(reader.report_step_s()) / 86_400.0;
    for p in 0..reader.n_periods() as usize {
        let date = reader.period_date(p).unwrap();
        let expected = start + (p as f64 + 1.0) * step_days;
        assert!((date - expected).abs() < 1e-9, "period {p}");
    }
}

#[test]
fn series_equals_concatenated_attribute_queries() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let out = completed_run(dir.path());

    let mut reader = OutputReader::open(&out).unwrap();
    let periods = reader.n_periods() as usize;

    let series = reader
        .series(ElementType::Link, 0, 0, 0, periods)
        .unwrap();
    assert_eq!(series.len(), periods);

    let mut concatenated = Vec::with_capacity(periods);
    for p in 0..periods {
        let flows = reader.attribute(ElementType::Link, 0, p).unwrap();
        concatenated.push(flows[0]);
    }
    assert_eq!(series, concatenated);

    // a draining tank: flows fall monotonically across periods
    assert!(series.windows(2).all(|w| w[1] <= w[0]));
    assert!(series[0] > 0.0);
}

#[test]
fn element_names_round_trip() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let out = completed_run(dir.path());

    let mut reader = OutputReader::open(&out).unwrap();
    assert_eq!(reader.element_name(ElementType::Node, 0).unwrap(), "T1");
    assert_eq!(reader.element_name(ElementType::Node, 1).unwrap(), "O1");
    assert_eq!(reader.element_name(ElementType::Link, 0).unwrap(), "R1");
}

#[test]
fn saved_values_match_the_reader_between_end_and_close() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let inp = dir.path().join("project.yaml");
    std::fs::write(&inp, NETWORK).unwrap();
    let out = dir.path().join("project.out");

    let mut engine = Engine::new();
    engine
        .open(&inp, &dir.path().join("project.rpt"), &out)
        .unwrap();
    engine.start(true).unwrap();
    while engine.step().unwrap() > 0.0 {}

    // saved values are not available while the run is in flight
    assert!(engine
        .get_saved_value(NodeProp::Depth as u16, 0, 0)
        .is_err());

    engine.end().unwrap();

    let depth0 = engine
        .get_saved_value(NodeProp::Depth as u16, 0, 0)
        .unwrap();
    let flow2 = engine
        .get_saved_value(LinkProp::Flow as u16, 0, 2)
        .unwrap();
    let date1 = engine
        .get_saved_value(SystemProp::CurrentDate as u16, 0, 1)
        .unwrap();

    engine.close().unwrap();

    let mut reader = OutputReader::open(&out).unwrap();
    let depths = reader.attribute(ElementType::Node, 0, 0).unwrap();
    let flows = reader.attribute(ElementType::Link, 0, 2).unwrap();
    assert_eq!(depth0, f64::from(depths[0]));
    assert_eq!(flow2, f64::from(flows[0]));
    assert_eq!(date1, reader.period_date(1).unwrap());
}

#[test]
fn mass_balance_errors_available_after_end() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let inp = dir.path().join("project.yaml");
    std::fs::write(&inp, NETWORK).unwrap();

    let mut engine = Engine::new();
    engine
        .open(
            &inp,
            &dir.path().join("project.rpt"),
            &dir.path().join("project.out"),
        )
        .unwrap();
    engine.start(true).unwrap();
    assert_eq!(engine.mass_balance_errors(), (0.0, 0.0, 0.0));
    while engine.step().unwrap() > 0.0 {}
    engine.end().unwrap();

    let (runoff_err, flow_err, qual_err) = engine.mass_balance_errors();
    assert_eq!(runoff_err, 0.0); // no subcatchments
    assert!(flow_err >= 0.0 && flow_err < 100.0);
    assert_eq!(qual_err, 0.0);

    engine.close().unwrap();
}
