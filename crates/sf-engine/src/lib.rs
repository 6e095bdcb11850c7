//! sf-engine: the simulation lifecycle and its control surface.
//!
//! An [`Engine`] walks the open → start → (step | stride)* → end →
//! report → close state machine, composing the project graph, the runoff
//! and routing kernels, the results writer, and the hot-start manager.
//! State is observed and mutated through the typed property interface;
//! failures latch a sticky numeric code that short-circuits later steps
//! while still letting `end` and `close` release resources.

pub mod callback;
mod clock;
pub mod engine;
pub mod hotstart;
pub mod property;
mod report;
pub mod run;

use sf_core::error::codes;
use thiserror::Error;

pub use callback::{LifecyclePhase, RateLimiter, When};
pub use clock::SimClock;
pub use engine::{Engine, Phase};
pub use hotstart::HotstartError;
pub use property::{GaugeProp, LinkProp, NodeProp, SubcatchProp, SystemProp};
pub use run::{run, run_with_callback};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("A project has not been opened")]
    NotOpen,

    #[error("A simulation has not been started")]
    NotStarted,

    #[error("The current simulation has not ended")]
    NotEnded,

    #[error("The engine is busy with another operation")]
    IsRunning,

    #[error("Engine faulted with error code {code}")]
    Faulted { code: u16 },

    #[error("Invalid object type")]
    ObjectType,

    #[error("Object index out of range")]
    ObjectIndex,

    #[error("Invalid property code")]
    PropertyCode,

    #[error("Invalid property value")]
    PropertyValue,

    #[error("Reporting period out of range")]
    PeriodRange,

    #[error("Property sub-index out of range")]
    SubIndex,

    #[error("Cannot write report file: {0}")]
    ReportFile(std::io::Error),

    #[error(transparent)]
    Project(#[from] sf_project::ProjectError),

    #[error(transparent)]
    Sim(#[from] sf_sim::SimError),

    #[error(transparent)]
    Output(#[from] sf_output::OutputError),

    #[error(transparent)]
    Hotstart(#[from] hotstart::HotstartError),
}

impl EngineError {
    /// Wire-compatible numeric code.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotOpen => codes::NOT_OPEN,
            Self::NotStarted => codes::NOT_STARTED,
            Self::NotEnded => codes::NOT_ENDED,
            Self::IsRunning => codes::IS_RUNNING,
            Self::Faulted { code } => *code,
            Self::ObjectType => codes::OBJECT_TYPE,
            Self::ObjectIndex => codes::OBJECT_INDEX,
            Self::PropertyCode => codes::PROPERTY_CODE,
            Self::PropertyValue => codes::PROPERTY_VALUE,
            Self::PeriodRange => codes::PERIOD_RANGE,
            Self::SubIndex => codes::SUB_INDEX,
            Self::ReportFile(_) => codes::REPORT_FILE,
            Self::Project(e) => e.code(),
            Self::Sim(e) => e.code(),
            Self::Output(e) => e.code(),
            Self::Hotstart(e) => e.code(),
        }
    }
}

/// Message table for the engine's error context.
pub fn message_for(code: u16) -> &'static str {
    match code {
        0 => "",
        codes::WARNINGS_ISSUED => "Warning: simulation issued warnings",
        codes::INPUT_FILE_READ => "Error 101: cannot read the project input file",
        codes::INPUT_PARSE => "Error 102: project input file could not be parsed",
        codes::DUPLICATE_ID => "Error 111: duplicate object id in project",
        codes::UNKNOWN_REFERENCE => "Error 112: unresolved object reference in project",
        codes::OPTION_VALUE => "Error 113: invalid analysis option value",
        codes::LINK_ENDPOINT => "Error 114: invalid link endpoints",
        codes::ROUTING_STEP_TOO_SMALL => "Error 201: routing time step shrank below the minimum",
        codes::NON_CONVERGENCE_LIMIT => "Error 202: routing failed to converge",
        codes::UNSTABLE_SOLUTION => "Error 203: unstable routing solution",
        codes::SIMULATION_CANCELED => "Error 204: simulation canceled by callback",
        codes::REPORT_FILE => "Error 301: cannot open the report file",
        codes::OUTPUT_FILE => "Error 302: cannot open the binary output file",
        codes::HOTSTART_OPEN => "Error 303: cannot open the hot-start file",
        codes::HOTSTART_VERSION => "Error 304: hot-start file has an unsupported version",
        codes::HOTSTART_TOPOLOGY => "Error 305: hot-start file does not match project topology",
        codes::HOTSTART_WRITE => "Error 306: cannot write the hot-start file",
        codes::NOT_OPEN => "API error 401: a project has not been opened",
        codes::NOT_STARTED => "API error 402: a simulation has not been started",
        codes::NOT_ENDED => "API error 403: the current simulation has not ended",
        codes::IS_RUNNING => "API error 404: the engine is busy with another operation",
        codes::OBJECT_TYPE => "API error 410: invalid object type",
        codes::OBJECT_INDEX => "API error 411: object index out of range",
        codes::PROPERTY_CODE => "API error 412: invalid property code",
        codes::PROPERTY_VALUE => "API error 413: invalid property value",
        codes::PERIOD_RANGE => "API error 414: reporting period out of range",
        codes::SUB_INDEX => "API error 415: property sub-index out of range",
        codes::OUT_CANNOT_OPEN
        | codes::OUT_INVALID_FILE
        | codes::OUT_NO_RESULTS
        | codes::OUT_SHORT_READ
        | codes::OUT_ELEMENT_TYPE
        | codes::OUT_ATTRIBUTE_CODE => sf_output::message_for(code),
        _ => "An unspecified error has occurred",
    }
}
