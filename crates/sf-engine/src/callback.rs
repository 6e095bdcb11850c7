//! Lifecycle and progress callbacks.
//!
//! Callbacks run on the caller's thread between kernel invocations. They
//! receive no engine handle, so re-entering the API from inside one is
//! ruled out structurally; a callback that needs to abort the run does so
//! by returning `false` from a progress callback, which latches a sticky
//! error on the engine.

use std::time::{Duration, Instant};

/// Named phase boundaries at which lifecycle callbacks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Initialize,
    Open,
    Start,
    Step,
    End,
    Report,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    Before,
    After,
}

/// Invoked at each phase boundary.
pub type EventCallback = Box<dyn FnMut(LifecyclePhase, When) + Send>;

/// Invoked with fractional completion in [0, 1]; return `false` to
/// request a cooperative abort.
pub type ProgressCallback = Box<dyn FnMut(f64) -> bool + Send>;

/// Default ceiling on progress-callback invocations per wall-clock second.
pub const PROGRESS_CALLS_PER_SECOND: f64 = 2.0;

/// Simple wall-clock rate limiter for progress reporting.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(calls_per_second: f64) -> Self {
        let per_sec = calls_per_second.max(0.001);
        Self {
            min_interval: Duration::from_secs_f64(1.0 / per_sec),
            last: None,
        }
    }

    /// True when enough wall-clock time has passed since the last
    /// permitted call; updates the internal clock when it fires.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Let the next `ready` call fire regardless of elapsed time.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Default)]
pub struct CallbackSet {
    pub event: Option<EventCallback>,
    pub progress: Option<(ProgressCallback, RateLimiter)>,
}

impl CallbackSet {
    pub fn fire(&mut self, phase: LifecyclePhase, when: When) {
        if let Some(cb) = &mut self.event {
            cb(phase, when);
        }
    }

    /// Invoke the progress callback if the rate limit allows; returns
    /// `false` when the callback requested an abort.
    pub fn fire_progress(&mut self, fraction: f64) -> bool {
        if let Some((cb, limiter)) = &mut self.progress {
            if limiter.ready() {
                return cb(fraction.clamp(0.0, 1.0));
            }
        }
        true
    }
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("event", &self.event.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_throttles_consecutive_calls() {
        let mut limiter = RateLimiter::new(2.0);
        assert!(limiter.ready());
        // immediately after a permitted call the limiter holds
        assert!(!limiter.ready());
        limiter.reset();
        assert!(limiter.ready());
    }

    #[test]
    fn progress_clamped_to_unit_interval() {
        let mut set = CallbackSet::default();
        // the callback rejects anything outside [0, 1]
        set.progress = Some((
            Box::new(|f| (0.0..=1.0).contains(&f)),
            RateLimiter::new(1000.0),
        ));
        assert!(set.fire_progress(1.7));
        assert!(set.fire_progress(-0.2));
    }
}
