//! Background estimation for single-pointing spectroscopy.

pub mod reflected;

pub use reflected::*;
