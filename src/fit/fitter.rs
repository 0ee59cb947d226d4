//! Joint maximum-likelihood fit across heterogeneous datasets.
//!
//! Given:
//! - an ordered dataset collection
//! - a model set whose sky models name the datasets they apply to
//!
//! we:
//! - validate parameter bounds and model bindings (before touching anything)
//! - build the deduplicated free-parameter vector
//! - minimize the summed statistic with the bounded simplex
//! - estimate the covariance from the finite-difference Hessian
//!
//! Best-fit values, errors and covariance are written back into the model set
//! only when the optimizer reports convergence.

use crate::datasets::Datasets;
use crate::error::AnalysisError;
use crate::fit::free::FreeParameters;
use crate::fit::likelihood::{stat_breakdown, total_stat};
use crate::fit::result::{FitResult, FittedParameter};
use crate::math::{DEFAULT_REL_STEP, SimplexOptions, covariance_from_stat_hessian, hessian, minimize};
use crate::models::{BindingMode, ModelBindingRegistry, ModelSet, ParameterCovariance};

#[derive(Debug, Clone, Default)]
pub struct JointLikelihoodFitter {
    pub options: SimplexOptions,
}

impl JointLikelihoodFitter {
    pub fn new(options: SimplexOptions) -> Self {
        Self { options }
    }

    /// Fit `models` to `datasets`.
    ///
    /// A non-converged fit is returned as `Ok` with `converged == false` and
    /// the model set untouched; use [`FitResult::ensure_converged`] to turn it
    /// into an error.
    pub fn run(&self, datasets: &Datasets, models: &mut ModelSet) -> Result<FitResult, AnalysisError> {
        if datasets.is_empty() {
            return Err(AnalysisError::InvalidInput("no datasets to fit".to_string()));
        }
        models.validate()?;
        let registry = ModelBindingRegistry::build(models, &datasets.names(), BindingMode::Strict)?;

        let free = FreeParameters::collect(models, &registry);
        let x0 = free.scaled_values(models);
        let bounds = free.scaled_bounds(models);

        log::info!(
            "joint fit: {} dataset(s), {} free parameter(s)",
            datasets.len(),
            free.len()
        );

        let mut work = models.clone();
        let min = minimize(
            |x| {
                free.apply(&mut work, x);
                total_stat(datasets, &work, &registry)
            },
            &x0,
            &bounds,
            &self.options,
        );
        log::debug!(
            "optimizer stopped after {} iterations / {} evaluations: {}",
            min.n_iter,
            min.n_fev,
            min.message
        );

        let h = hessian(
            |x| {
                free.apply(&mut work, x);
                total_stat(datasets, &work, &registry)
            },
            &min.x,
            &bounds,
            DEFAULT_REL_STEP,
        );
        // Back to physical units: cov_ij · s_i · s_j.
        let covariance = covariance_from_stat_hessian(&h).map(|mut cov| {
            for i in 0..free.len() {
                for j in 0..free.len() {
                    cov[(i, j)] *= free.scales[i] * free.scales[j];
                }
            }
            cov
        });
        if covariance.is_none() {
            log::warn!("Hessian at the best fit is singular; no covariance available");
        }

        free.apply(&mut work, &min.x);
        let breakdown = stat_breakdown(datasets, &work, &registry);
        for d in &breakdown {
            log::debug!("  {:<24} stat = {:.4}", d.name, d.stat_sum);
        }
        let total: f64 = breakdown.iter().map(|d| d.stat_sum).sum();

        let parameters: Vec<FittedParameter> = free
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let p = work.parameter(*id);
                FittedParameter {
                    name: free.names[i].clone(),
                    value: p.value,
                    unit: p.unit,
                    error: covariance.as_ref().map(|c| c[(i, i)].sqrt()),
                    min: p.min,
                    max: p.max,
                }
            })
            .collect();

        if min.converged {
            for (id, fitted) in free.ids.iter().zip(&parameters) {
                let p = models.parameter_mut(*id);
                p.value = fitted.value;
                p.error = fitted.error;
            }
            models.set_covariance(covariance.clone().map(|matrix| ParameterCovariance {
                parameters: free.names.clone(),
                matrix,
            }));
            log::info!("joint fit converged: total stat = {total:.4}");
        } else {
            log::warn!("joint fit did not converge: {}", min.message);
        }

        Ok(FitResult {
            parameters,
            covariance,
            converged: min.converged,
            message: min.message,
            n_iter: min.n_iter,
            n_fev: min.n_fev,
            total_stat: total,
            datasets: breakdown,
        })
    }
}
