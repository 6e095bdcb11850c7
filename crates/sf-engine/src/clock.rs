//! The simulation clock owned by the lifecycle controller.

use sf_core::datetime::{DateTime, MSEC_PER_DAY};

/// Advancing cursors and counters for one simulation.
///
/// All times are milliseconds from the start date. Invariant within a
/// step: `new_runoff_time_ms >= new_routing_time_ms` once runoff has been
/// driven up to the next routing instant. `elapsed_time_days` is the
/// user-visible cursor and is reset to 0 when the horizon is reached,
/// which is the termination signal to step loops.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    /// True horizon length, msec.
    pub total_duration_ms: f64,
    /// Effective horizon for the current stepping run; stride shortens
    /// this temporarily, never beyond the true horizon.
    pub routing_duration_ms: f64,
    pub new_routing_time_ms: f64,
    pub new_runoff_time_ms: f64,
    /// Next reporting deadline, msec.
    pub report_time_ms: f64,
    pub elapsed_time_days: f64,
    pub total_step_count: u64,
    pub report_step_count: u32,
}

impl SimClock {
    /// Reset every cursor for a fresh run.
    pub fn start(
        &mut self,
        total_duration_ms: f64,
        report_offset_ms: f64,
        report_step_s: u32,
    ) -> &mut Self {
        self.total_duration_ms = total_duration_ms;
        self.routing_duration_ms = total_duration_ms;
        self.new_routing_time_ms = 0.0;
        self.new_runoff_time_ms = 0.0;
        self.report_time_ms = report_offset_ms + f64::from(report_step_s) * 1000.0;
        self.elapsed_time_days = 0.0;
        self.total_step_count = 0;
        self.report_step_count = 0;
        self
    }

    /// Calendar date at an elapsed-millisecond offset.
    pub fn date_at(&self, start_datetime: DateTime, elapsed_ms: f64) -> DateTime {
        start_datetime + elapsed_ms / MSEC_PER_DAY
    }

    pub fn horizon_reached(&self) -> bool {
        self.new_routing_time_ms >= self.routing_duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_resets_cursors() {
        let mut clock = SimClock::default();
        clock.new_routing_time_ms = 5000.0;
        clock.total_step_count = 12;
        clock.start(3_600_000.0, 0.0, 600);
        assert_eq!(clock.new_routing_time_ms, 0.0);
        assert_eq!(clock.report_time_ms, 600_000.0);
        assert_eq!(clock.total_step_count, 0);
        assert!(!clock.horizon_reached());
    }

    #[test]
    fn zero_duration_is_immediately_at_horizon() {
        let mut clock = SimClock::default();
        clock.start(0.0, 0.0, 600);
        assert!(clock.horizon_reached());
    }
}
