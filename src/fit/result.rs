//! Joint-fit outputs.

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::models::Unit;

/// One free parameter after the fit.
#[derive(Debug, Clone, Serialize)]
pub struct FittedParameter {
    pub name: String,
    pub value: f64,
    pub unit: Unit,
    /// `sqrt` of the covariance diagonal, if the covariance exists.
    pub error: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Statistic contribution of one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStat {
    pub name: String,
    pub stat_sum: f64,
    pub stat_per_bin: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct FitResult {
    pub parameters: Vec<FittedParameter>,
    /// Covariance of `parameters` (physical units), `None` if the Hessian
    /// could not be inverted.
    pub covariance: Option<DMatrix<f64>>,
    pub converged: bool,
    pub message: String,
    pub n_iter: usize,
    pub n_fev: usize,
    pub total_stat: f64,
    pub datasets: Vec<DatasetStat>,
}

impl FitResult {
    pub fn parameter(&self, name: &str) -> Option<&FittedParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Turn a non-converged result into an error carrying the last state.
    pub fn ensure_converged(&self) -> Result<(), AnalysisError> {
        if self.converged {
            return Ok(());
        }
        Err(AnalysisError::FitNonConvergence {
            message: self.message.clone(),
            stat: self.total_stat,
            n_iter: self.n_iter,
            parameters: self.parameters.iter().map(|p| (p.name.clone(), p.value)).collect(),
        })
    }
}
