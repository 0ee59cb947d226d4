//! Joint likelihood fitting.
//!
//! Responsibilities:
//!
//! - sum heterogeneous per-dataset statistics into one objective
//! - map the shared parameter table onto a scaled free-parameter vector
//! - minimize, estimate the covariance and report convergence explicitly

pub mod fitter;
pub mod free;
pub mod likelihood;
pub mod result;

pub use fitter::*;
pub use free::*;
pub use likelihood::*;
pub use result::*;
