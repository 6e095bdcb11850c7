//! The lifecycle state machine and the stepwise routing controller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use sf_core::datetime::{DateTime, MSEC_PER_DAY, SEC_PER_DAY};
use sf_core::error::{codes, ErrorContext};
use sf_core::units::Quantity;
use sf_core::ObjectKind;
use sf_output::{OutputReader, OutputWriter, ResultsFrame};
use sf_project::Project;
use sf_sim::{Climate, MassBalance, RoutingProcessor, RunoffProcessor, Statistics};

use crate::callback::{CallbackSet, EventCallback, ProgressCallback, RateLimiter};
use crate::callback::{LifecyclePhase, When, PROGRESS_CALLS_PER_SECOND};
use crate::clock::SimClock;
use crate::report::ReportWriter;
use crate::{hotstart, message_for, EngineError, EngineResult};

/// One engine may hold an open project per process.
static ENGINE_OPEN: AtomicBool = AtomicBool::new(false);

/// Engine version number (major * 10000 + minor * 1000 + build).
pub const VERSION: i32 = sf_output::ENGINE_VERSION;

/// Lifecycle states. Every API entry point validates the current state
/// and fails with a specific 400-range code when called out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Open,
    Started,
    Ended,
    Closed,
}

pub struct Engine {
    phase: Phase,
    pub(crate) project: Option<Project>,
    pub(crate) clock: SimClock,
    pub(crate) error: ErrorContext,
    pub(crate) warnings: u32,
    save_results: bool,
    do_runoff: bool,
    do_routing: bool,
    climate: Option<Climate>,
    runoff: Option<RunoffProcessor>,
    pub(crate) routing: Option<RoutingProcessor>,
    massbal: Option<MassBalance>,
    stats: Option<Statistics>,
    writer: Option<OutputWriter>,
    saved: Option<OutputReader>,
    pub(crate) report: ReportWriter,
    callbacks: CallbackSet,
    /// Reentrancy guard for the step body.
    in_step: bool,
    /// Directory of the input file, for relative-path resolution.
    inp_dir: PathBuf,
    out_path: PathBuf,
    slot_held: bool,
    mass_bal_errors: (f64, f64, f64),
    last_routing_step_s: f64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
            project: None,
            clock: SimClock::default(),
            error: ErrorContext::new(message_for),
            warnings: 0,
            save_results: true,
            do_runoff: false,
            do_routing: false,
            climate: None,
            runoff: None,
            routing: None,
            massbal: None,
            stats: None,
            writer: None,
            saved: None,
            report: ReportWriter::closed(),
            callbacks: CallbackSet::default(),
            in_step: false,
            inp_dir: PathBuf::new(),
            out_path: PathBuf::new(),
            slot_held: false,
            mass_bal_errors: (0.0, 0.0, 0.0),
            last_routing_step_s: 0.0,
        }
    }

    // ------------------------------------------------------------------
    // lifecycle operations
    // ------------------------------------------------------------------

    /// Open a project: parse and validate the input file, open the report
    /// file, and record the input directory for relative-path resolution.
    pub fn open(&mut self, inp: &Path, rpt: &Path, out: &Path) -> EngineResult<()> {
        if self.in_step {
            return Err(EngineError::IsRunning);
        }
        match self.phase {
            Phase::Uninitialized | Phase::Closed => {}
            Phase::Started => return Err(EngineError::NotEnded),
            Phase::Open | Phase::Ended => return Err(EngineError::IsRunning),
        }
        if ENGINE_OPEN
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::IsRunning);
        }
        self.slot_held = true;

        self.callbacks.fire(LifecyclePhase::Open, When::Before);
        self.error.clear();
        self.warnings = 0;

        let result = self.open_inner(inp, rpt, out);
        if let Err(err) = &result {
            self.error.set(err.code());
            self.release_slot();
        } else {
            self.phase = Phase::Open;
        }
        self.callbacks.fire(LifecyclePhase::Open, When::After);
        result
    }

    fn open_inner(&mut self, inp: &Path, rpt: &Path, out: &Path) -> EngineResult<()> {
        let project = sf_project::load(inp)?;

        self.inp_dir = inp
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        self.out_path = out.to_path_buf();

        self.report = ReportWriter::open(rpt).map_err(EngineError::ReportFile)?;
        self.report.write_logo();
        self.report.write_title(&project);

        debug!(
            subcatchments = project.subcatchments.len(),
            nodes = project.nodes.len(),
            links = project.links.len(),
            "project opened"
        );
        self.project = Some(project);
        Ok(())
    }

    /// Initialize all kernels and arm the clock for stepping.
    pub fn start(&mut self, save_results: bool) -> EngineResult<()> {
        self.check_fault()?;
        match self.phase {
            Phase::Open | Phase::Ended => {}
            Phase::Uninitialized | Phase::Closed => return Err(EngineError::NotOpen),
            Phase::Started => return Err(EngineError::NotEnded),
        }
        self.callbacks.fire(LifecyclePhase::Start, When::Before);
        let result = self.start_inner(save_results);
        if let Err(err) = &result {
            self.error.set(err.code());
        } else {
            self.phase = Phase::Started;
        }
        self.callbacks.fire(LifecyclePhase::Start, When::After);
        result
    }

    fn start_inner(&mut self, save_results: bool) -> EngineResult<()> {
        self.save_results = save_results;

        let project = self.project.as_mut().expect("phase is Open");
        let options = &project.options;

        // report options ahead of any kernel output
        if !options.report.disabled {
            self.report.write_options(project);
        }

        let report_offset_ms =
            ((options.report_start - options.start_datetime) * SEC_PER_DAY * 1000.0).max(0.0);
        self.clock.start(
            options.total_duration_ms(),
            report_offset_ms,
            options.report_step_s,
        );
        self.last_routing_step_s = 0.0;
        self.mass_bal_errors = (0.0, 0.0, 0.0);

        project.init_state();
        self.climate = Some(Climate::open(&project.options));

        self.do_runoff = !project.subcatchments.is_empty();
        self.do_routing = !project.nodes.is_empty() && !project.options.ignore_routing;

        if save_results {
            self.writer = match OutputWriter::open(&self.out_path, project) {
                Ok(writer) => Some(writer),
                Err(_) => {
                    return Err(EngineError::Faulted {
                        code: codes::OUTPUT_FILE,
                    })
                }
            };
        } else {
            self.writer = None;
        }
        self.saved = None;

        self.runoff = self.do_runoff.then(RunoffProcessor::open);

        // hot-start state loads before the routing processor opens
        if let Some(file) = project.options.hotstart_use.clone() {
            let path = resolve_in(&self.inp_dir, &file);
            hotstart::load(&path, project)?;
        }

        self.routing = if self.do_routing {
            Some(RoutingProcessor::open(project)?)
        } else {
            None
        };

        self.massbal = Some(MassBalance::open(project));
        self.stats = Some(Statistics::open(project));

        if !project.options.report.disabled && project.options.report.controls {
            self.report.write_control_actions_heading();
        }
        Ok(())
    }

    /// Advance the simulation by one adaptive routing step.
    ///
    /// Returns elapsed time in decimal days; exactly 0.0 once the horizon
    /// has been reached, which is the termination signal to step loops.
    pub fn step(&mut self) -> EngineResult<f64> {
        self.check_fault()?;
        self.check_started()?;
        if self.in_step {
            return Err(EngineError::IsRunning);
        }
        self.in_step = true;
        self.callbacks.fire(LifecyclePhase::Step, When::Before);
        let result = self.step_inner();
        if let Err(err) = &result {
            self.error.set(err.code());
        }
        self.callbacks.fire(LifecyclePhase::Step, When::After);
        self.in_step = false;
        result
    }

    fn step_inner(&mut self) -> EngineResult<f64> {
        if !self.clock.horizon_reached() {
            self.exec_routing()?;
        }

        if self.save_results {
            self.save_results_period()?;
        }

        self.save_scheduled_hotstarts()?;

        if !self.clock.horizon_reached() {
            self.clock.elapsed_time_days = self.clock.new_routing_time_ms / MSEC_PER_DAY;
        } else {
            self.clock.elapsed_time_days = 0.0;
        }

        let fraction = if self.clock.total_duration_ms > 0.0 {
            self.clock.new_routing_time_ms / self.clock.total_duration_ms
        } else {
            1.0
        };
        if !self.callbacks.fire_progress(fraction) {
            return Err(EngineError::Faulted {
                code: codes::SIMULATION_CANCELED,
            });
        }

        Ok(self.clock.elapsed_time_days)
    }

    /// One pass of the routing loop: pick the step, drive runoff up to
    /// the next routing instant, then route.
    fn exec_routing(&mut self) -> EngineResult<()> {
        self.clock.total_step_count += 1;

        let project = self.project.as_mut().expect("phase is Started");

        let mut routing_step_s = if !self.do_routing {
            project
                .options
                .wet_step_s
                .min(f64::from(project.options.report_step_s))
        } else {
            let routing = self.routing.as_ref().expect("routing enabled");
            routing.routing_step(project, project.options.route_step_s)
        };
        if routing_step_s <= 0.0 {
            return Err(sf_sim::SimError::RoutingStepTooSmall.into());
        }

        let mut next_routing_time = self.clock.new_routing_time_ms + 1000.0 * routing_step_s;
        if next_routing_time > self.clock.routing_duration_ms {
            routing_step_s =
                ((self.clock.routing_duration_ms - self.clock.new_routing_time_ms) / 1000.0)
                    .max(0.001);
            next_routing_time = self.clock.routing_duration_ms;
        }

        if self.do_runoff {
            let runoff = self.runoff.as_mut().expect("runoff enabled");
            let climate = self.climate.as_ref().expect("climate open");
            let massbal = self.massbal.as_mut().expect("massbal open");
            while runoff.new_runoff_time_ms < next_routing_time {
                let used_s = runoff.execute(project, climate)?;
                massbal.update_runoff(project, used_s);
            }
            self.clock.new_runoff_time_ms = runoff.new_runoff_time_ms;
        } else {
            let date = self
                .clock
                .date_at(project.options.start_datetime, self.clock.new_routing_time_ms);
            self.climate
                .as_mut()
                .expect("climate open")
                .set_state(date, &project.options);
        }

        if self.do_routing {
            let routing = self.routing.as_mut().expect("routing enabled");
            let totals = routing.execute(project, routing_step_s)?;
            self.massbal
                .as_mut()
                .expect("massbal open")
                .update_routing(&totals);
            self.stats
                .as_mut()
                .expect("stats open")
                .update(project, routing_step_s);
        }
        self.clock.new_routing_time_ms = next_routing_time;
        self.last_routing_step_s = routing_step_s;
        Ok(())
    }

    /// Emit a reporting period when the routing time has met the next
    /// reporting deadline; in averaging mode keep the running averages
    /// current either way.
    fn save_results_period(&mut self) -> EngineResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let project = self.project.as_ref().expect("phase is Started");
        let averages = project.options.report.averages;

        if self.clock.new_routing_time_ms >= self.clock.report_time_ms {
            let frame = build_frame(
                project,
                if self.do_routing {
                    self.last_routing_step_s
                } else {
                    0.0
                },
            );
            if averages {
                // fold in the endpoint sample only when we land exactly
                // on the reporting instant
                if self.clock.new_routing_time_ms == self.clock.report_time_ms {
                    writer.update_averages(&frame);
                }
                let date = self
                    .clock
                    .date_at(project.options.start_datetime, self.clock.report_time_ms);
                writer.write_period(date, &frame)?;
                if self.clock.new_routing_time_ms > self.clock.report_time_ms {
                    writer.update_averages(&frame);
                }
            } else {
                let date = self
                    .clock
                    .date_at(project.options.start_datetime, self.clock.report_time_ms);
                writer.write_period(date, &frame)?;
            }
            self.clock.report_time_ms += f64::from(project.options.report_step_s) * 1000.0;
            self.clock.report_step_count += 1;
        } else if averages {
            let frame = build_frame(
                project,
                if self.do_routing {
                    self.last_routing_step_s
                } else {
                    0.0
                },
            );
            writer.update_averages(&frame);
        }
        Ok(())
    }

    /// Write any hot-start snapshots scheduled at or before the current
    /// routing time.
    fn save_scheduled_hotstarts(&mut self) -> EngineResult<()> {
        let project = self.project.as_mut().expect("phase is Started");
        let now_ms = self.clock.new_routing_time_ms;
        let pending: Vec<String> = project
            .options
            .hotstart_saves
            .iter_mut()
            .filter(|save| !save.done && save.at_ms <= now_ms)
            .map(|save| {
                save.done = true;
                save.file.clone()
            })
            .collect();
        for file in pending {
            let path = self.resolve_path(&file);
            let project = self.project.as_ref().expect("phase is Started");
            hotstart::save(&path, project, now_ms)?;
        }
        Ok(())
    }

    /// Advance the simulation by a fixed number of seconds, regardless of
    /// the solver's natural step. Temporarily caps both the routing
    /// horizon and the routing step; restores them on exit.
    pub fn stride(&mut self, stride_seconds: f64) -> EngineResult<f64> {
        self.check_fault()?;
        self.check_started()?;
        if stride_seconds <= 0.0 {
            return Err(EngineError::PropertyValue);
        }

        let project = self.project.as_mut().expect("phase is Started");
        let real_route_step = project.options.route_step_s;

        self.clock.routing_duration_ms = (self.clock.new_routing_time_ms
            + 1000.0 * stride_seconds)
            .min(self.clock.total_duration_ms);
        if stride_seconds < real_route_step {
            project.options.route_step_s = stride_seconds;
        }

        let mut result = Ok(0.0);
        loop {
            match self.step() {
                Ok(elapsed) if elapsed > 0.0 => {}
                other => {
                    result = other;
                    break;
                }
            }
        }

        let project = self.project.as_mut().expect("phase is Started");
        project.options.route_step_s = real_route_step;
        self.clock.routing_duration_ms = self.clock.total_duration_ms;

        // elapsed is re-derived against the true horizon
        if self.clock.new_routing_time_ms < self.clock.total_duration_ms {
            self.clock.elapsed_time_days = self.clock.new_routing_time_ms / MSEC_PER_DAY;
        } else {
            self.clock.elapsed_time_days = 0.0;
        }
        result.map(|_| self.clock.elapsed_time_days)
    }

    /// Finalize the output file, report continuity and statistics, and
    /// close every kernel opened by `start`. Idempotent once ended.
    pub fn end(&mut self) -> EngineResult<()> {
        match self.phase {
            Phase::Uninitialized | Phase::Closed => return Err(EngineError::NotOpen),
            Phase::Open | Phase::Ended => return Ok(()),
            Phase::Started => {}
        }
        self.callbacks.fire(LifecyclePhase::End, When::Before);

        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.end(self.error.code());
        }

        let project = self.project.as_ref().expect("phase is Started");
        if let Some(massbal) = self.massbal.as_mut() {
            massbal.close(project);
            self.mass_bal_errors = (
                massbal.runoff_error_pct(),
                massbal.flow_error_pct(),
                massbal.quality_error_pct(),
            );
        }

        if !self.error.is_set() && !project.options.report.disabled {
            if let Some(massbal) = &self.massbal {
                self.report.write_mass_balance(project, massbal);
            }
            if let Some(stats) = &self.stats {
                self.report.write_statistics(project, stats);
            }
        }

        if let Some(routing) = self.routing.as_mut() {
            if routing.non_converge_count > 0 {
                self.warnings += 1;
                warn!(
                    steps = routing.non_converge_count,
                    "routing steps did not converge"
                );
            }
            routing.close();
        }
        if let Some(runoff) = self.runoff.as_mut() {
            runoff.close();
        }
        self.runoff = None;
        self.routing = None;
        self.climate = None;

        self.phase = Phase::Ended;
        self.callbacks.fire(LifecyclePhase::End, When::After);
        Ok(())
    }

    /// Write the closing sections of the text report.
    pub fn report(&mut self) -> EngineResult<()> {
        match self.phase {
            Phase::Uninitialized | Phase::Closed => return Err(EngineError::NotOpen),
            Phase::Ended => {}
            Phase::Open | Phase::Started => return Err(EngineError::NotEnded),
        }
        self.check_fault()?;
        self.callbacks.fire(LifecyclePhase::Report, When::Before);
        let periods = self.writer.as_ref().map_or(0, OutputWriter::n_periods);
        self.report.write_line("");
        self.report
            .write_line(&format!("  Reporting periods written: {periods}"));
        self.callbacks.fire(LifecyclePhase::Report, When::After);
        Ok(())
    }

    /// Release every project resource and reset the engine slot.
    pub fn close(&mut self) -> EngineResult<()> {
        self.callbacks.fire(LifecyclePhase::Close, When::Before);
        self.writer = None;
        self.saved = None;
        self.runoff = None;
        self.routing = None;
        self.climate = None;
        self.massbal = None;
        self.stats = None;
        self.report.write_sys_time();
        self.report.close();
        self.project = None;
        self.release_slot();
        self.phase = Phase::Closed;
        self.callbacks.fire(LifecyclePhase::Close, When::After);
        Ok(())
    }

    // ------------------------------------------------------------------
    // hot-start operations
    // ------------------------------------------------------------------

    /// Arm a hot-start file as the initial routing state for the next
    /// `start`. The file is validated now; topology is checked at load.
    pub fn use_hot_start(&mut self, file: &str) -> EngineResult<()> {
        self.check_fault()?;
        match self.phase {
            Phase::Open | Phase::Ended => {}
            Phase::Uninitialized | Phase::Closed => return Err(EngineError::NotOpen),
            Phase::Started => return Err(EngineError::NotEnded),
        }
        let path = self.resolve_path(file);
        hotstart::validate(&path)?;
        let project = self.project.as_mut().expect("phase is Open");
        project.options.hotstart_use = Some(path.to_string_lossy().into_owned());
        Ok(())
    }

    /// Save a hot-start snapshot at the current simulation time.
    pub fn save_hot_start(&mut self, file: &str) -> EngineResult<()> {
        self.check_fault()?;
        self.check_started()?;
        let path = self.resolve_path(file);
        let project = self.project.as_ref().expect("phase is Started");
        hotstart::save(&path, project, self.clock.new_routing_time_ms)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // object inventory and saved-results access
    // ------------------------------------------------------------------

    pub fn count(&self, kind: ObjectKind) -> EngineResult<usize> {
        let project = self.open_project()?;
        Ok(project.count(kind))
    }

    pub fn object_name(&self, kind: ObjectKind, index: usize) -> EngineResult<String> {
        let project = self.open_project()?;
        project
            .object_name(kind, index)
            .map(str::to_owned)
            .ok_or(EngineError::ObjectIndex)
    }

    pub fn index_of(&self, kind: ObjectKind, id: &str) -> EngineResult<usize> {
        let project = self.open_project()?;
        project.find_object(kind, id).ok_or(EngineError::ObjectIndex)
    }

    /// Upstream and downstream node indices of a link.
    pub fn link_endpoints(&self, index: usize) -> EngineResult<(usize, usize)> {
        let project = self.open_project()?;
        let link = project.links.get(index).ok_or(EngineError::ObjectIndex)?;
        Ok((link.from_node, link.to_node))
    }

    /// Read back a computed value at a reporting period (0-based) from
    /// the binary results file. Valid between `end` and `close`.
    pub fn get_saved_value(
        &mut self,
        property: u16,
        index: usize,
        period: usize,
    ) -> EngineResult<f64> {
        if self.phase != Phase::Ended {
            return Err(if self.phase == Phase::Started {
                EngineError::NotEnded
            } else {
                EngineError::NotOpen
            });
        }
        if self.saved.is_none() {
            self.saved = Some(OutputReader::open(&self.out_path)?);
        }
        let reader = self.saved.as_mut().expect("reader just opened");
        crate::property::read_saved(reader, property, index, period)
    }

    /// Runoff, flow, and quality continuity errors (percent) for the
    /// last run; zeros unless the run has ended.
    pub fn mass_balance_errors(&self) -> (f64, f64, f64) {
        if self.phase == Phase::Ended {
            self.mass_bal_errors
        } else {
            (0.0, 0.0, 0.0)
        }
    }

    pub fn version(&self) -> i32 {
        VERSION
    }

    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    pub fn error_code(&self) -> u16 {
        self.error.code()
    }

    /// Freshly-allocated message for the latched error, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.check()
    }

    /// Append one line to the text report file.
    pub fn write_report_line(&mut self, line: &str) {
        if self.phase != Phase::Uninitialized && self.phase != Phase::Closed {
            self.report.write_line(line);
        }
    }

    // ------------------------------------------------------------------
    // callbacks
    // ------------------------------------------------------------------

    pub fn set_event_callback(&mut self, callback: EventCallback) {
        self.callbacks.event = Some(callback);
    }

    /// Install a progress callback, rate-limited to at most
    /// [`PROGRESS_CALLS_PER_SECOND`] invocations per wall-clock second.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.callbacks.progress = Some((callback, RateLimiter::new(PROGRESS_CALLS_PER_SECOND)));
    }

    // ------------------------------------------------------------------
    // shared accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Current simulation date.
    pub fn current_date(&self) -> EngineResult<DateTime> {
        let project = self.open_project()?;
        Ok(project.options.start_datetime + self.clock.elapsed_time_days)
    }

    pub(crate) fn open_project(&self) -> EngineResult<&Project> {
        self.project.as_ref().ok_or(EngineError::NotOpen)
    }

    pub(crate) fn open_project_mut(&mut self) -> EngineResult<&mut Project> {
        self.project.as_mut().ok_or(EngineError::NotOpen)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.phase == Phase::Started
    }

    pub(crate) fn check_fault(&self) -> EngineResult<()> {
        if self.error.is_set() {
            Err(EngineError::Faulted {
                code: self.error.code(),
            })
        } else {
            Ok(())
        }
    }

    fn check_started(&self) -> EngineResult<()> {
        match self.phase {
            Phase::Started => Ok(()),
            Phase::Uninitialized | Phase::Closed => Err(EngineError::NotOpen),
            Phase::Open | Phase::Ended => Err(EngineError::NotStarted),
        }
    }

    pub(crate) fn resolve_path(&self, file: &str) -> PathBuf {
        resolve_in(&self.inp_dir, file)
    }

    fn release_slot(&mut self) {
        if self.slot_held {
            ENGINE_OPEN.store(false, Ordering::Release);
            self.slot_held = false;
        }
    }
}

/// Resolve a possibly-relative file name against the input directory.
fn resolve_in(inp_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() || inp_dir.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        inp_dir.join(path)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.release_slot();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("phase", &self.phase)
            .field("error", &self.error.code())
            .field("clock", &self.clock)
            .finish()
    }
}

/// Snapshot of the current state in user units, ordered exactly as the
/// output-file variable tables declare.
fn build_frame(project: &Project, routing_step_s: f64) -> ResultsFrame {
    let u = |q: Quantity| project.options.ucf(q);
    let npollut = project.pollutants.len();

    let mut frame = ResultsFrame::default();

    frame.subcatch.reserve(project.subcatchments.len() * (4 + npollut));
    for sc in &project.subcatchments {
        frame.subcatch.push((sc.rainfall * u(Quantity::Rainfall)) as f32);
        frame.subcatch.push((sc.evap_loss * u(Quantity::EvapRate)) as f32);
        frame.subcatch.push((sc.infil_loss * u(Quantity::Rainfall)) as f32);
        frame.subcatch.push((sc.runoff * u(Quantity::Flow)) as f32);
        for k in 0..npollut {
            frame.subcatch.push(sc.runoff_qual[k] as f32);
        }
    }

    frame.node.reserve(project.nodes.len() * (6 + npollut));
    for node in &project.nodes {
        frame.node.push((node.depth * u(Quantity::Length)) as f32);
        frame.node.push((node.head() * u(Quantity::Length)) as f32);
        frame.node.push((node.volume * u(Quantity::Volume)) as f32);
        frame.node.push((node.lateral_inflow * u(Quantity::Flow)) as f32);
        frame.node.push((node.inflow * u(Quantity::Flow)) as f32);
        frame.node.push((node.overflow * u(Quantity::Flow)) as f32);
        for k in 0..npollut {
            frame.node.push(node.qual[k] as f32);
        }
    }

    frame.link.reserve(project.links.len() * (5 + npollut));
    for link in &project.links {
        frame.link.push((link.flow * u(Quantity::Flow)) as f32);
        frame.link.push((link.depth * u(Quantity::Length)) as f32);
        frame.link.push((link.velocity * u(Quantity::Length)) as f32);
        frame.link.push((link.volume * u(Quantity::Volume)) as f32);
        frame.link.push(link.setting as f32);
        for k in 0..npollut {
            frame.link.push(link.qual[k] as f32);
        }
    }

    let total_runoff: f64 = project.subcatchments.iter().map(|s| s.runoff).sum();
    let avg_rainfall: f64 = if project.subcatchments.is_empty() {
        0.0
    } else {
        project.subcatchments.iter().map(|s| s.rainfall).sum::<f64>()
            / project.subcatchments.len() as f64
    };
    let total_lateral: f64 = project.nodes.iter().map(|n| n.lateral_inflow).sum();
    let total_external: f64 = project.nodes.iter().map(|n| n.api_ext_inflow).sum();
    let total_flooding: f64 = project.nodes.iter().map(|n| n.overflow).sum();
    let total_outflow: f64 = project
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, sf_project::NodeKind::Outfall { .. }))
        .map(|n| n.inflow)
        .sum();
    let total_stored: f64 = project.nodes.iter().map(|n| n.volume).sum();

    frame.sys = vec![
        0.0, // air temperature (no climate file support)
        (avg_rainfall * u(Quantity::Rainfall)) as f32,
        (total_runoff * u(Quantity::Flow)) as f32,
        (total_lateral * u(Quantity::Flow)) as f32,
        (total_external * u(Quantity::Flow)) as f32,
        (total_flooding * u(Quantity::Flow)) as f32,
        (total_outflow * u(Quantity::Flow)) as f32,
        (total_stored * u(Quantity::Volume)) as f32,
        (project.options.evap_rate * u(Quantity::EvapRate)) as f32,
        routing_step_s as f32,
    ];

    frame
}
