//! sf-output: the binary results file.
//!
//! The writer appends one fixed-size block per reporting period while a
//! simulation runs; the reader opens the finalized file afterwards and
//! serves random-access queries by pure offset arithmetic. The format is
//! little-endian with 4-byte records and 8-byte dates; the header magic
//! must match the epilogue magic for a file to be valid.

pub mod reader;
pub mod writer;

use sf_core::error::codes;
use thiserror::Error;

pub use reader::{ElementType, OutputReader};
pub use writer::{OutputWriter, ResultsFrame};

/// File signature, written first and last.
pub const MAGIC: i32 = 0x5346_4F31; // "SFO1"
/// Engine version stamped into the header.
pub const ENGINE_VERSION: i32 = 51_000;
pub const RECORD_SIZE: u64 = 4;
pub const DATE_SIZE: u64 = 8;

/// Computed variables per subcatchment: rainfall, evaporation,
/// infiltration, runoff, then one concentration per pollutant.
pub const SUBCATCH_VAR_BASE: usize = 4;
/// Computed variables per node: depth, head, volume, lateral inflow,
/// total inflow, overflow, then pollutants.
pub const NODE_VAR_BASE: usize = 6;
/// Computed variables per link: flow, depth, velocity, volume,
/// capacity (setting), then pollutants.
pub const LINK_VAR_BASE: usize = 5;
/// System-wide variables per period.
pub const SYS_VARS: usize = 10;

/// Input properties stored per object in the object-property block.
pub const SUBCATCH_PROPS: usize = 1;
pub const NODE_PROPS: usize = 3;
pub const LINK_PROPS: usize = 5;

pub type OutputResult<T> = Result<T, OutputError>;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Unable to open output file: {0}")]
    CannotOpen(std::io::Error),

    #[error("Invalid file: header magic does not match epilogue magic")]
    InvalidFile,

    #[error("File contains no results")]
    NoResults,

    #[error("I/O failure on output file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid element type")]
    ElementType,

    #[error("Invalid attribute code")]
    AttributeCode,

    #[error("Element index out of range")]
    ObjectIndex,

    #[error("Reporting period out of range")]
    PeriodRange,
}

impl OutputError {
    pub fn code(&self) -> u16 {
        match self {
            Self::CannotOpen(_) => codes::OUT_CANNOT_OPEN,
            Self::InvalidFile => codes::OUT_INVALID_FILE,
            Self::NoResults => codes::OUT_NO_RESULTS,
            Self::Io(_) => codes::OUT_SHORT_READ,
            Self::ElementType => codes::OUT_ELEMENT_TYPE,
            Self::AttributeCode => codes::OUT_ATTRIBUTE_CODE,
            Self::ObjectIndex => codes::OBJECT_INDEX,
            Self::PeriodRange => codes::PERIOD_RANGE,
        }
    }
}

/// Message table for reader error contexts.
pub fn message_for(code: u16) -> &'static str {
    match code {
        codes::WARNINGS_ISSUED => "Warning: model run issued warnings",
        codes::OUT_CANNOT_OPEN => "File error: unable to open binary output file",
        codes::OUT_INVALID_FILE => "File error: invalid file - not created by this engine",
        codes::OUT_NO_RESULTS => "File error: invalid file - contains no results",
        codes::OUT_SHORT_READ => "File error: premature end of binary output file",
        codes::OUT_ELEMENT_TYPE => "Input error: invalid element type",
        codes::OUT_ATTRIBUTE_CODE => "Input error: invalid attribute code",
        codes::OBJECT_INDEX => "Input error: element index out of range",
        codes::PERIOD_RANGE => "Input error: reporting period index out of range",
        _ => "An unspecified error has occurred",
    }
}
