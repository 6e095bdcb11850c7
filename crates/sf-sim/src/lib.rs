//! sf-sim: the physical kernels composed by the simulation lifecycle.
//!
//! Each processor is opened by the lifecycle in a fixed order, driven once
//! per routing step, and closed in `end`. The models are deliberately
//! reduced (nonlinear-reservoir runoff, level-pool routing with explicit
//! link equations) but honor the contracts the lifecycle depends on:
//! runoff runs ahead of routing, routing owns the adaptive step, and every
//! quantity is kept in internal units.

pub mod climate;
pub mod massbal;
pub mod routing;
pub mod runoff;
pub mod stats;

use sf_core::error::codes;
use thiserror::Error;

pub use climate::Climate;
pub use massbal::MassBalance;
pub use routing::RoutingProcessor;
pub use runoff::RunoffProcessor;
pub use stats::Statistics;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Routing time step shrank below the minimum")]
    RoutingStepTooSmall,

    #[error("Routing failed to converge in {limit} consecutive steps")]
    NonConvergenceLimit { limit: u32 },

    #[error("Unstable solution at {what}")]
    Unstable { what: String },
}

impl SimError {
    /// Wire-compatible numeric code (200-range: simulation numerical).
    pub fn code(&self) -> u16 {
        match self {
            Self::RoutingStepTooSmall => codes::ROUTING_STEP_TOO_SMALL,
            Self::NonConvergenceLimit { .. } => codes::NON_CONVERGENCE_LIMIT,
            Self::Unstable { .. } => codes::UNSTABLE_SOLUTION,
        }
    }
}
