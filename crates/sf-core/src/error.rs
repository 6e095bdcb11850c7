//! Numeric error taxonomy and the sticky per-consumer error context.
//!
//! Error numbers are wire-compatible constants grouped into disjoint
//! ranges; every consumer (the engine, each output-file reader handle)
//! owns one [`ErrorContext`] that latches the first nonzero code it sees.

use thiserror::Error;

/// Wire-compatible error code ranges.
///
/// 0 success | 10 warnings | 100s input | 200s numerical | 300s file I/O |
/// 400-409 lifecycle | 410-429 API values | 430-439 output-file format.
pub mod codes {
    /// Run completed but issued warnings.
    pub const WARNINGS_ISSUED: u16 = 10;

    // --- input / validation (fatal for the run, surfaced from open)
    pub const INPUT_FILE_READ: u16 = 101;
    pub const INPUT_PARSE: u16 = 102;
    pub const DUPLICATE_ID: u16 = 111;
    pub const UNKNOWN_REFERENCE: u16 = 112;
    pub const OPTION_VALUE: u16 = 113;
    pub const LINK_ENDPOINT: u16 = 114;

    // --- simulation numerical
    pub const ROUTING_STEP_TOO_SMALL: u16 = 201;
    pub const NON_CONVERGENCE_LIMIT: u16 = 202;
    pub const UNSTABLE_SOLUTION: u16 = 203;
    /// A progress callback requested a cooperative abort.
    pub const SIMULATION_CANCELED: u16 = 204;

    // --- file I/O
    pub const REPORT_FILE: u16 = 301;
    pub const OUTPUT_FILE: u16 = 302;
    pub const HOTSTART_OPEN: u16 = 303;
    pub const HOTSTART_VERSION: u16 = 304;
    pub const HOTSTART_TOPOLOGY: u16 = 305;
    pub const HOTSTART_WRITE: u16 = 306;

    // --- API lifecycle (state unchanged)
    pub const NOT_OPEN: u16 = 401;
    pub const NOT_STARTED: u16 = 402;
    pub const NOT_ENDED: u16 = 403;
    pub const IS_RUNNING: u16 = 404;

    // --- API values (state unchanged)
    pub const OBJECT_TYPE: u16 = 410;
    pub const OBJECT_INDEX: u16 = 411;
    pub const PROPERTY_CODE: u16 = 412;
    pub const PROPERTY_VALUE: u16 = 413;
    pub const PERIOD_RANGE: u16 = 414;
    pub const SUB_INDEX: u16 = 415;

    // --- output-file format (fatal on the reader handle)
    pub const OUT_CANNOT_OPEN: u16 = 431;
    pub const OUT_INVALID_FILE: u16 = 432;
    pub const OUT_NO_RESULTS: u16 = 433;
    pub const OUT_SHORT_READ: u16 = 434;
    pub const OUT_ELEMENT_TYPE: u16 = 435;
    pub const OUT_ATTRIBUTE_CODE: u16 = 436;
}

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid calendar date {year}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("Invalid time of day {hour:02}:{minute:02}:{second:02}")]
    InvalidTime { hour: u32, minute: u32, second: u32 },

    #[error("Unparseable date/time string: {text}")]
    DateParse { text: String },
}

/// Message lookup attached to a context. The engine and the output reader
/// share the context structure but ship different message tables.
pub type MessageLookup = fn(u16) -> &'static str;

/// Single-slot sticky error holder.
///
/// Setting a nonzero code latches it until [`ErrorContext::clear`];
/// setting 0 is a no-op so hot paths can write `ctx.set(f())` without
/// clobbering a prior failure.
#[derive(Debug)]
pub struct ErrorContext {
    code: u16,
    lookup: MessageLookup,
}

impl ErrorContext {
    pub fn new(lookup: MessageLookup) -> Self {
        Self { code: 0, lookup }
    }

    /// Latch `code` if it is nonzero and nothing is latched yet.
    /// Returns the code passed in, so call sites can propagate it.
    pub fn set(&mut self, code: u16) -> u16 {
        if code != 0 && self.code == 0 {
            self.code = code;
        }
        code
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn is_set(&self) -> bool {
        self.code != 0
    }

    /// Produce a freshly-allocated message for the latched code, if any.
    pub fn check(&self) -> Option<String> {
        if self.code == 0 {
            None
        } else {
            Some((self.lookup)(self.code).to_string())
        }
    }

    pub fn clear(&mut self) {
        self.code = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(code: u16) -> &'static str {
        match code {
            codes::NOT_OPEN => "not open",
            _ => "unspecified",
        }
    }

    #[test]
    fn zero_set_is_noop() {
        let mut ctx = ErrorContext::new(lookup);
        assert_eq!(ctx.set(0), 0);
        assert!(!ctx.is_set());
        assert!(ctx.check().is_none());
    }

    #[test]
    fn first_code_sticks() {
        let mut ctx = ErrorContext::new(lookup);
        ctx.set(codes::NOT_OPEN);
        ctx.set(codes::OBJECT_INDEX);
        assert_eq!(ctx.code(), codes::NOT_OPEN);
        assert_eq!(ctx.check().as_deref(), Some("not open"));
        ctx.clear();
        assert_eq!(ctx.code(), 0);
    }
}
