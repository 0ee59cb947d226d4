//! Estimators derived from a fitted model set.

pub mod flux_points;

pub use flux_points::*;
