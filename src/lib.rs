//! `joint-sed` library crate.
//!
//! Multi-instrument gamma-ray spectral analysis: reflected-region ON/OFF
//! reduction, a joint likelihood fit over heterogeneous datasets sharing one
//! spectral model, and per-band flux points.
//!
//! The binary (`jsed`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the reduction, fit and estimation stages can be driven separately

pub mod app;
pub mod background;
pub mod cli;
pub mod data;
pub mod datasets;
pub mod domain;
pub mod error;
pub mod estimators;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod reduce;
pub mod report;
