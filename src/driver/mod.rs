//! The autotuning driver: a chain of `Pass`es that fan a `Program` out into
//! candidate variants and fold the search back down to the single fastest
//! one a `crate::backend::Backend` reports.

pub mod optimizer;
pub mod pass;

pub use optimizer::{tune, TuneConfig, TuneCtx};
pub use pass::Pass;
