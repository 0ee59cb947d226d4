//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - energy binning (`EnergyAxis`) and sky geometry (`SkyCoord`, `CircleRegion`, `OnRegion`)
//! - observations and their tabulated response (`Observation`, `Irfs`)
//! - configuration enums and the run configuration (`RunConfig`)

pub mod energy;
pub mod irf;
pub mod observation;
pub mod sky;
pub mod types;

pub use energy::*;
pub use irf::*;
pub use observation::*;
pub use sky::*;
pub use types::*;
