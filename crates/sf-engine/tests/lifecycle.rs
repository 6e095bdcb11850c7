//! Lifecycle state-machine behavior, end to end.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use sf_core::error::codes;
use sf_engine::{run, Engine, EngineError, Phase};
use sf_output::OutputReader;

// One project may be open per process, so tests serialize on a lock.
fn engine_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

fn write_project(dir: &std::path::Path, yaml: &str) -> (PathBuf, PathBuf, PathBuf) {
    let inp = dir.join("project.yaml");
    std::fs::write(&inp, yaml).unwrap();
    (inp, dir.join("project.rpt"), dir.join("project.out"))
}

const EMPTY_NETWORK: &str = r#"
title: Empty network
options:
  start_date: "2024-01-01 00:00:00"
  end_date: "2024-01-01 01:00:00"
  report_step_s: 600
"#;

const SMALL_NETWORK: &str = r#"
title: Draining tank
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

#[test]
fn operations_out_of_order_fail_with_specific_codes() {
    let _guard = engine_lock();
    let mut engine = Engine::new();

    assert_eq!(
        engine.step().unwrap_err().code(),
        codes::NOT_OPEN,
        "step before open"
    );
    assert_eq!(engine.start(true).unwrap_err().code(), codes::NOT_OPEN);
    assert_eq!(engine.end().unwrap_err().code(), codes::NOT_OPEN);

    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(dir.path(), EMPTY_NETWORK);
    engine.open(&inp, &rpt, &out).unwrap();
    assert_eq!(engine.phase(), Phase::Open);

    // step without start
    assert_eq!(engine.step().unwrap_err().code(), codes::NOT_STARTED);
    // report before end
    assert_eq!(engine.report().unwrap_err().code(), codes::NOT_ENDED);

    engine.start(true).unwrap();
    assert_eq!(engine.phase(), Phase::Started);
    // start twice
    assert_eq!(engine.start(true).unwrap_err().code(), codes::NOT_ENDED);

    engine.end().unwrap();
    assert_eq!(engine.phase(), Phase::Ended);
    // end is idempotent
    engine.end().unwrap();
    engine.report().unwrap();
    engine.close().unwrap();
    assert_eq!(engine.phase(), Phase::Closed);
}

#[test]
fn empty_network_run_writes_six_zero_periods() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(dir.path(), EMPTY_NETWORK);

    let mut engine = Engine::new();
    engine.open(&inp, &rpt, &out).unwrap();
    engine.start(true).unwrap();

    let mut steps = 0;
    loop {
        let elapsed = engine.step().unwrap();
        steps += 1;
        if elapsed == 0.0 {
            break;
        }
        assert!(steps < 1000, "run failed to terminate");
    }
    engine.end().unwrap();
    engine.report().unwrap();
    engine.close().unwrap();

    let mut reader = OutputReader::open(&out).unwrap();
    assert_eq!(reader.n_periods(), 6);
    assert_eq!(reader.counts(), [0, 0, 0, 0]);
    for p in 0..6 {
        let sys = reader.result(sf_output::ElementType::System, 0, p).unwrap();
        assert!(sys.iter().all(|&v| v == 0.0), "period {p}: {sys:?}");
    }
}

#[test]
fn end_not_after_start_date_terminates_on_first_step() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(
        dir.path(),
        r#"
options:
  start_date: "2024-01-01 00:00:00"
  end_date: "2024-01-01 00:00:00"
"#,
    );

    let mut engine = Engine::new();
    engine.open(&inp, &rpt, &out).unwrap();
    engine.start(false).unwrap();
    assert_eq!(engine.step().unwrap(), 0.0);
    engine.end().unwrap();
    engine.close().unwrap();
}

#[test]
fn only_one_project_open_per_process() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(dir.path(), EMPTY_NETWORK);

    let mut first = Engine::new();
    first.open(&inp, &rpt, &out).unwrap();

    let dir2 = tempfile::tempdir().unwrap();
    let (inp2, rpt2, out2) = write_project(dir2.path(), EMPTY_NETWORK);
    let mut second = Engine::new();
    assert!(matches!(
        second.open(&inp2, &rpt2, &out2),
        Err(EngineError::IsRunning)
    ));

    first.close().unwrap();
    // the slot is free again
    second.open(&inp2, &rpt2, &out2).unwrap();
    second.close().unwrap();
}

#[test]
fn facade_and_manual_sequence_write_identical_files() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt_a, out_a) = write_project(dir.path(), SMALL_NETWORK);

    let code = run(&inp, &rpt_a, &out_a);
    assert_eq!(code, 0);

    let rpt_b = dir.path().join("manual.rpt");
    let out_b = dir.path().join("manual.out");
    let mut engine = Engine::new();
    engine.open(&inp, &rpt_b, &out_b).unwrap();
    engine.start(true).unwrap();
    while engine.step().unwrap() > 0.0 {}
    engine.end().unwrap();
    engine.report().unwrap();
    engine.close().unwrap();

    let bytes_a = std::fs::read(&out_a).unwrap();
    let bytes_b = std::fs::read(&out_b).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn facade_reports_progress_up_to_one() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(dir.path(), SMALL_NETWORK);

    let mut fractions = Vec::new();
    let code = sf_engine::run_with_callback(&inp, &rpt, &out, |f| fractions.push(f));
    assert_eq!(code, 0);
    assert!(!fractions.is_empty());
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "monotone");
    assert!((fractions.last().unwrap() - 1.0).abs() < 1e-12);
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
}

#[test]
fn error_latches_and_short_circuits_stepping() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let (inp, rpt, out) = write_project(dir.path(), SMALL_NETWORK);

    let mut engine = Engine::new();
    engine.open(&inp, &rpt, &out).unwrap();
    engine.start(true).unwrap();

    // a canceling progress callback latches a sticky error
    engine.set_progress_callback(Box::new(|_| false));
    let err = engine.step().unwrap_err();
    assert_eq!(err.code(), codes::SIMULATION_CANCELED);
    assert_eq!(engine.error_code(), codes::SIMULATION_CANCELED);

    // subsequent steps short-circuit with the same code
    let err = engine.step().unwrap_err();
    assert_eq!(err.code(), codes::SIMULATION_CANCELED);

    // end and close still run cleanup
    engine.end().unwrap();
    engine.close().unwrap();
    assert!(engine.error_message().unwrap().contains("204"));
}

#[test]
fn open_failure_reports_input_error_code() {
    let _guard = engine_lock();
    let dir = tempfile::tempdir().unwrap();
    let inp = dir.path().join("missing.yaml");
    let mut engine = Engine::new();
    let err = engine
        .open(&inp, &dir.path().join("x.rpt"), &dir.path().join("x.out"))
        .unwrap_err();
    assert_eq!(err.code(), codes::INPUT_FILE_READ);
    // a failed open leaves the slot free for the next attempt
    let (inp2, rpt2, out2) = write_project(dir.path(), EMPTY_NETWORK);
    let mut engine2 = Engine::new();
    engine2.open(&inp2, &rpt2, &out2).unwrap();
    engine2.close().unwrap();
}
