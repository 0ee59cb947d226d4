//! Binned one-dimensional spectrum datasets.
//!
//! Forward folding: the predicted signal in reco bin `j` is
//!
//! `npred_j = Σ_i edisp[i, j] · exposure_i · ∫_{bin i} dN/dE dE`
//!
//! summed over every sky model bound to the dataset. The statistic depends on
//! the background form: WStat for ON/OFF data, Cash otherwise.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::EnergyAxis;
use crate::error::AnalysisError;
use crate::math::{cash, wstat, wstat_mu_bkg};
use crate::models::ModelSet;

/// Background knowledge attached to a spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Background {
    /// No background: pure Cash on the signal.
    None,
    /// Known expected background counts per reco bin.
    Model { counts: Vec<f64> },
    /// OFF counts per reco bin and the per-bin ON/OFF exposure ratio.
    OnOff { counts_off: Vec<f64>, alpha: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumDataset {
    pub name: String,
    pub energy_axis: EnergyAxis,
    pub energy_axis_true: EnergyAxis,
    /// ON counts per reco bin.
    pub counts: Vec<f64>,
    /// Exposure per true bin (cm² s).
    pub exposure: Vec<f64>,
    /// Migration probabilities, true × reco.
    pub edisp: DMatrix<f64>,
    pub background: Background,
    mask_safe: Vec<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mask_fit: Option<Vec<bool>>,
    /// Live time (s).
    pub livetime: f64,
    #[serde(default)]
    pub obs_ids: Vec<String>,
}

impl SpectrumDataset {
    pub fn new(
        name: impl Into<String>,
        energy_axis: EnergyAxis,
        energy_axis_true: EnergyAxis,
        counts: Vec<f64>,
        exposure: Vec<f64>,
        edisp: DMatrix<f64>,
        background: Background,
        livetime: f64,
    ) -> Result<Self, AnalysisError> {
        let nbin = energy_axis.nbin();
        let dataset = Self {
            name: name.into(),
            energy_axis,
            energy_axis_true,
            counts,
            exposure,
            edisp,
            background,
            mask_safe: vec![true; nbin],
            mask_fit: None,
            livetime,
            obs_ids: Vec::new(),
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Shape and value checks; run after construction and after loading.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let nreco = self.energy_axis.nbin();
        let ntrue = self.energy_axis_true.nbin();
        let shape_error = |what: &str, expected: usize, found: usize| {
            AnalysisError::IncompatibleGeometry(format!(
                "dataset {}: {what} has length {found}, expected {expected}",
                self.name
            ))
        };
        if self.counts.len() != nreco {
            return Err(shape_error("counts", nreco, self.counts.len()));
        }
        if self.exposure.len() != ntrue {
            return Err(shape_error("exposure", ntrue, self.exposure.len()));
        }
        if self.edisp.nrows() != ntrue || self.edisp.ncols() != nreco {
            return Err(AnalysisError::IncompatibleGeometry(format!(
                "dataset {}: edisp is {}x{}, expected {ntrue}x{nreco}",
                self.name,
                self.edisp.nrows(),
                self.edisp.ncols()
            )));
        }
        if self.mask_safe.len() != nreco {
            return Err(AnalysisError::MaskLength {
                dataset: self.name.clone(),
                expected: nreco,
                found: self.mask_safe.len(),
            });
        }
        if let Some(mask) = &self.mask_fit {
            if mask.len() != nreco {
                return Err(AnalysisError::MaskLength {
                    dataset: self.name.clone(),
                    expected: nreco,
                    found: mask.len(),
                });
            }
        }
        match &self.background {
            Background::None => {}
            Background::Model { counts } => {
                if counts.len() != nreco {
                    return Err(shape_error("background", nreco, counts.len()));
                }
            }
            Background::OnOff { counts_off, alpha } => {
                if counts_off.len() != nreco {
                    return Err(shape_error("counts_off", nreco, counts_off.len()));
                }
                if alpha.len() != nreco {
                    return Err(shape_error("alpha", nreco, alpha.len()));
                }
                if let Some(bad) = alpha.iter().zip(self.mask_safe.iter()).position(|(a, m)| *m && !(*a > 0.0)) {
                    return Err(AnalysisError::InvalidInput(format!(
                        "dataset {}: alpha must be > 0 in bin {bad}",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn mask_safe(&self) -> &[bool] {
        &self.mask_safe
    }

    /// Narrow the safe mask; bins can be removed but never re-enabled.
    pub fn restrict_safe(&mut self, mask: &[bool]) -> Result<(), AnalysisError> {
        self.check_mask_len(mask.len())?;
        for (safe, keep) in self.mask_safe.iter_mut().zip(mask.iter()) {
            *safe = *safe && *keep;
        }
        Ok(())
    }

    pub fn mask_fit(&self) -> Option<&[bool]> {
        self.mask_fit.as_deref()
    }

    pub fn set_mask_fit(&mut self, mask: Option<Vec<bool>>) -> Result<(), AnalysisError> {
        if let Some(m) = &mask {
            self.check_mask_len(m.len())?;
        }
        self.mask_fit = mask;
        Ok(())
    }

    /// Bins entering the statistic: safe and (if set) fit mask.
    pub fn mask(&self) -> Vec<bool> {
        match &self.mask_fit {
            None => self.mask_safe.clone(),
            Some(fit) => self.mask_safe.iter().zip(fit.iter()).map(|(s, f)| *s && *f).collect(),
        }
    }

    fn check_mask_len(&self, found: usize) -> Result<(), AnalysisError> {
        let expected = self.energy_axis.nbin();
        if found != expected {
            return Err(AnalysisError::MaskLength {
                dataset: self.name.clone(),
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Predicted signal counts per reco bin from the given sky models.
    pub fn npred_signal(&self, models: &ModelSet, sky: &[usize]) -> Vec<f64> {
        let ntrue = self.energy_axis_true.nbin();
        let mut flux = DVector::<f64>::zeros(ntrue);
        for &mi in sky {
            let integrals = models.integrals(mi, self.energy_axis_true.edges());
            for (i, integral) in integrals.iter().enumerate() {
                flux[i] += integral * self.exposure[i];
            }
        }
        let folded = self.edisp.tr_mul(&flux);
        folded.iter().copied().collect()
    }

    /// Per-bin statistic for a given predicted signal; bins outside `mask` are 0.
    pub fn stat_array(&self, mu_sig: &[f64], mask: &[bool]) -> Vec<f64> {
        (0..self.counts.len())
            .map(|j| {
                if !mask[j] {
                    return 0.0;
                }
                let n_on = self.counts[j];
                match &self.background {
                    Background::None => cash(n_on, mu_sig[j]),
                    Background::Model { counts } => cash(n_on, mu_sig[j] + counts[j]),
                    Background::OnOff { counts_off, alpha } => wstat(n_on, counts_off[j], alpha[j], mu_sig[j]),
                }
            })
            .collect()
    }

    /// Expected background counts in the ON region per bin, given the signal.
    pub fn npred_background(&self, mu_sig: &[f64]) -> Vec<f64> {
        match &self.background {
            Background::None => vec![0.0; self.counts.len()],
            Background::Model { counts } => counts.clone(),
            Background::OnOff { counts_off, alpha } => (0..self.counts.len())
                .map(|j| alpha[j] * wstat_mu_bkg(self.counts[j], counts_off[j], alpha[j], mu_sig[j].max(0.0)))
                .collect(),
        }
    }

    /// `counts - alpha · counts_off` (or minus the background model).
    pub fn excess(&self) -> Vec<f64> {
        match &self.background {
            Background::None => self.counts.clone(),
            Background::Model { counts } => self.counts.iter().zip(counts).map(|(n, b)| n - b).collect(),
            Background::OnOff { counts_off, alpha } => (0..self.counts.len())
                .map(|j| self.counts[j] - alpha[j] * counts_off[j])
                .collect(),
        }
    }
}

/// Dispersion matrix mapping each true bin onto the reco bin containing its centre.
pub fn edisp_diagonal(true_axis: &EnergyAxis, reco_axis: &EnergyAxis) -> DMatrix<f64> {
    let mut m = DMatrix::<f64>::zeros(true_axis.nbin(), reco_axis.nbin());
    for i in 0..true_axis.nbin() {
        if let Some(j) = reco_axis.bin_of(true_axis.center(i)) {
            m[(i, j)] = 1.0;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpectralKind;
    use crate::models::units::Unit;
    use crate::models::Parameter;

    fn linear_axis() -> EnergyAxis {
        EnergyAxis::from_edges(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap()
    }

    fn constant_model(value: f64) -> ModelSet {
        let mut models = ModelSet::new();
        let sid = models
            .add_spectral(SpectralKind::Constant, vec![Parameter::new("const", value, Unit::FluxPerTeV)])
            .unwrap();
        models.add_sky("src", sid, None).unwrap();
        models
    }

    fn dataset() -> SpectrumDataset {
        let axis = linear_axis();
        SpectrumDataset::new(
            "onoff",
            axis.clone(),
            axis.clone(),
            vec![50.0, 40.0, 30.0, 20.0, 10.0],
            vec![1000.0; 5],
            edisp_diagonal(&axis, &axis),
            Background::OnOff {
                counts_off: vec![20.0, 15.0, 10.0, 5.0, 5.0],
                alpha: vec![0.2; 5],
            },
            3600.0,
        )
        .unwrap()
    }

    #[test]
    fn npred_is_flux_times_exposure() {
        let ds = dataset();
        let npred = ds.npred_signal(&constant_model(0.01), &[0]);
        for v in npred {
            assert!((v - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn excess_and_masked_stat() {
        let ds = dataset();
        let excess = ds.excess();
        assert!((excess.iter().sum::<f64>() - 139.0).abs() < 1e-9);

        let mut mask = vec![true; 5];
        mask[4] = false;
        let stat = ds.stat_array(&[10.0; 5], &mask);
        assert_eq!(stat[4], 0.0);
        assert!(stat[..4].iter().all(|s| *s > 0.0));
    }

    #[test]
    fn safe_mask_can_only_shrink() {
        let mut ds = dataset();
        ds.restrict_safe(&[true, true, false, true, true]).unwrap();
        ds.restrict_safe(&[true, true, true, true, false]).unwrap();
        assert_eq!(ds.mask_safe(), &[true, true, false, true, false]);
        assert!(ds.set_mask_fit(Some(vec![true; 3])).is_err());
        ds.set_mask_fit(Some(vec![false, true, true, true, true])).unwrap();
        assert_eq!(ds.mask(), vec![false, true, false, true, false]);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let axis = linear_axis();
        let err = SpectrumDataset::new(
            "bad",
            axis.clone(),
            axis.clone(),
            vec![1.0; 4],
            vec![1.0; 5],
            edisp_diagonal(&axis, &axis),
            Background::None,
            1.0,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::IncompatibleGeometry(_)));
    }
}
