//! Numerical building blocks: interpolation, fit statistics, the bounded
//! simplex minimizer, finite-difference Hessians and scalar root finding.

pub mod hessian;
pub mod interp;
pub mod roots;
pub mod simplex;
pub mod stat;

pub use hessian::*;
pub use interp::*;
pub use roots::*;
pub use simplex::*;
pub use stat::*;
