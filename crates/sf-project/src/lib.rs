//! sf-project: input schema and the runtime project object graph.
//!
//! The YAML schema in [`schema`] is the on-disk face of a project; loading
//! resolves every by-name reference into a stable index and produces the
//! [`model::Project`] graph that the kernels and the property interface
//! operate on. Indices are the canonical references for the lifetime of
//! the project.

pub mod model;
pub mod schema;
pub mod validate;

use std::path::Path;

use sf_core::error::codes;
use thiserror::Error;

pub use model::*;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Cannot read project file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Project file parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Unknown {kind} reference '{id}' in {context}")]
    UnknownReference {
        kind: &'static str,
        id: String,
        context: String,
    },

    #[error("Invalid option value: {what}")]
    OptionValue { what: String },

    #[error("Link {link} endpoints are invalid")]
    LinkEndpoint { link: String },

    #[error(transparent)]
    Date(#[from] sf_core::CoreError),
}

impl ProjectError {
    /// Wire-compatible numeric code (100-range: input / validation).
    pub fn code(&self) -> u16 {
        match self {
            Self::Io(_) => codes::INPUT_FILE_READ,
            Self::Yaml(_) => codes::INPUT_PARSE,
            Self::DuplicateId { .. } => codes::DUPLICATE_ID,
            Self::UnknownReference { .. } => codes::UNKNOWN_REFERENCE,
            Self::OptionValue { .. } | Self::Date(_) => codes::OPTION_VALUE,
            Self::LinkEndpoint { .. } => codes::LINK_ENDPOINT,
        }
    }
}

/// Read, resolve, and validate a project file.
pub fn load(path: &Path) -> ProjectResult<Project> {
    let text = std::fs::read_to_string(path)?;
    let file: schema::ProjectFile = serde_yaml::from_str(&text)?;
    let project = model::Project::from_schema(file)?;
    validate::validate(&project)?;
    Ok(project)
}
