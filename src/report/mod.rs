//! Reporting utilities: terminal tables for datasets, fits and flux points.

pub mod format;

pub use format::*;
