//! Top-level run facade: batch execution over the full lifecycle.

use std::path::Path;

use tracing::info;

use crate::engine::Engine;

/// Run a complete simulation: open, start, step to the horizon, end,
/// report, close. Returns the engine's final error code (0 = success,
/// 10 = completed with warnings).
pub fn run(inp: &Path, rpt: &Path, out: &Path) -> u16 {
    run_with(inp, rpt, out, None::<fn(f64)>)
}

/// Same loop, invoking `callback` with the fractional completion after
/// every successful step.
pub fn run_with_callback<F: FnMut(f64)>(inp: &Path, rpt: &Path, out: &Path, callback: F) -> u16 {
    run_with(inp, rpt, out, Some(callback))
}

fn run_with<F: FnMut(f64)>(inp: &Path, rpt: &Path, out: &Path, mut callback: Option<F>) -> u16 {
    let mut engine = Engine::new();

    if engine.open(inp, rpt, out).is_ok() {
        if engine.start(true).is_ok() {
            info!("simulation started");
            loop {
                match engine.step() {
                    Ok(elapsed) => {
                        if let Some(cb) = callback.as_mut() {
                            let clock = engine.clock();
                            let progress = if clock.total_duration_ms > 0.0 {
                                (clock.new_routing_time_ms / clock.total_duration_ms).min(1.0)
                            } else {
                                1.0
                            };
                            cb(progress);
                        }
                        if elapsed <= 0.0 {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
        let _ = engine.end();
        if engine.error_code() == 0 {
            let _ = engine.report();
        }
    }
    let _ = engine.close();

    let code = engine.error_code();
    if code == 0 && engine.warnings() > 0 {
        return sf_core::error::codes::WARNINGS_ISSUED;
    }
    code
}
