//! sf-core: stable foundation for stormflow.
//!
//! Contains:
//! - datetime (decimal-day encoding with a fixed epoch)
//! - units (internal-to-user conversion tables)
//! - ids (stable compact IDs for project objects)
//! - error (numeric error taxonomy + sticky error context)

pub mod datetime;
pub mod error;
pub mod ids;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use datetime::DateTime;
pub use error::{codes, CoreError, CoreResult, ErrorContext};
pub use ids::*;
pub use units::{FlowUnits, Quantity, UnitSystem};
