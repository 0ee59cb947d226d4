//! Data reduction: observations to spectrum datasets, and stacking.

pub mod spectrum;
pub mod stack;

pub use spectrum::*;
pub use stack::*;
