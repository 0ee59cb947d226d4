//! Spectral models, the shared parameter table, and model ↔ dataset bindings.
//!
//! Models are small, pure evaluation functions over a parameter slice so the
//! fitter and the flux-point estimator can stay generic.

pub mod overrides;
pub mod registry;
pub mod set;
pub mod spectral;
pub mod units;

pub use overrides::*;
pub use registry::*;
pub use set::*;
pub use spectral::*;
pub use units::*;
