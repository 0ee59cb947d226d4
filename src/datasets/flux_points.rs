//! Published flux measurements used as a Gaussian-likelihood dataset.
//!
//! The model is evaluated at each row's reference energy and compared with the
//! measured `dN/dE` using the error on the side the model falls. Rows flagged
//! as upper limits are handled per [`UpperLimitTreatment`].

use serde::{Deserialize, Serialize};

use crate::domain::UpperLimitTreatment;
use crate::error::AnalysisError;
use crate::math::{chi2_asymmetric, chi2_upper_limit};
use crate::models::{ModelSet, ReferenceShape};

/// Default number of σ a flux upper limit corresponds to.
pub const DEFAULT_UL_N_SIGMA: f64 = 2.0;

/// One measured band (TeV, cm-2 s-1 TeV-1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxPointRow {
    pub e_ref: f64,
    pub e_min: f64,
    pub e_max: f64,
    pub dnde: f64,
    pub dnde_errn: f64,
    pub dnde_errp: f64,
    pub is_ul: bool,
    pub dnde_ul: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxPointsDataset {
    pub name: String,
    pub rows: Vec<FluxPointRow>,
    /// Shape used to convert a normalization-type table, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceShape>,
    #[serde(default)]
    pub ul_treatment: UpperLimitTreatment,
    #[serde(default = "default_ul_n_sigma")]
    pub ul_n_sigma: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mask_fit: Option<Vec<bool>>,
}

fn default_ul_n_sigma() -> f64 {
    DEFAULT_UL_N_SIGMA
}

impl FluxPointsDataset {
    pub fn new(name: impl Into<String>, rows: Vec<FluxPointRow>) -> Self {
        Self {
            name: name.into(),
            rows,
            reference: None,
            ul_treatment: UpperLimitTreatment::default(),
            ul_n_sigma: DEFAULT_UL_N_SIGMA,
            mask_fit: None,
        }
    }

    pub fn set_mask_fit(&mut self, mask: Option<Vec<bool>>) -> Result<(), AnalysisError> {
        if let Some(m) = &mask {
            if m.len() != self.rows.len() {
                return Err(AnalysisError::MaskLength {
                    dataset: self.name.clone(),
                    expected: self.rows.len(),
                    found: m.len(),
                });
            }
        }
        self.mask_fit = mask;
        Ok(())
    }

    /// Rows entering the statistic.
    ///
    /// Upper-limit rows only count under [`UpperLimitTreatment::Penalize`];
    /// rows without a finite measurement never count.
    pub fn mask(&self) -> Vec<bool> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let fit = self.mask_fit.as_ref().is_none_or(|m| m[i]);
                let usable = if row.is_ul {
                    self.ul_treatment == UpperLimitTreatment::Penalize && row.dnde_ul.is_finite()
                } else {
                    row.dnde.is_finite()
                };
                fit && usable
            })
            .collect()
    }

    pub fn e_ref(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.e_ref).collect()
    }

    /// Summed `dN/dE` of the given sky models at each row's reference energy.
    pub fn prediction(&self, models: &ModelSet, sky: &[usize]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| sky.iter().map(|&mi| models.dnde(mi, row.e_ref)).sum())
            .collect()
    }

    /// Per-row χ² for a given prediction; rows outside `mask` are 0.
    pub fn stat_array(&self, prediction: &[f64], mask: &[bool]) -> Vec<f64> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                if !mask[i] {
                    return 0.0;
                }
                if row.is_ul {
                    chi2_upper_limit(row.dnde_ul, prediction[i], row.dnde_ul / self.ul_n_sigma)
                } else {
                    chi2_asymmetric(row.dnde, prediction[i], row.dnde_errn, row.dnde_errp)
                }
            })
            .collect()
    }
}
