//! Input/output helpers.
//!
//! - observation data store (`datastore`)
//! - pre-reduced spectrum datasets, JSON (`datasets`)
//! - flux-point tables, CSV (`flux_points`)
//! - model definition files, YAML (`models`)

pub mod datasets;
pub mod datastore;
pub mod flux_points;
pub mod models;

pub use datasets::*;
pub use datastore::*;
pub use flux_points::*;
pub use models::*;
