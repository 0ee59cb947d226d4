//! Tabulated instrument response functions.
//!
//! Three components are modelled, each tabulated against field-of-view offset
//! (degrees from the pointing direction):
//! - effective area vs true energy (m²)
//! - energy dispersion: migration (`E_reco / E_true`) probability density vs true energy
//! - `rad_max`: the energy-dependent angular cut defining a point-like ON region
//!
//! Offsets are interpolated linearly; energies in `ln E`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::energy::EnergyAxis;
use crate::error::AnalysisError;
use crate::math::{bracket_clamped, interp_clamped, interp_log_x_clamped, interp_log_x_or_zero, nearest_index};

/// m² → cm².
pub const M2_TO_CM2: f64 = 1e4;

/// Effective area table, `data[offset][energy]` in m².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveArea2D {
    /// True-energy nodes (TeV), increasing.
    pub energy_true: Vec<f64>,
    /// Offset nodes (deg), increasing.
    pub offset: Vec<f64>,
    pub data: Vec<Vec<f64>>,
}

impl EffectiveArea2D {
    /// Effective area (m²); zero outside the tabulated energy range.
    pub fn evaluate(&self, energy_true: f64, offset: f64) -> f64 {
        let (i, u) = bracket_clamped(&self.offset, offset);
        let lo = interp_log_x_or_zero(&self.energy_true, &self.data[i], energy_true);
        if self.offset.len() < 2 {
            return lo.max(0.0);
        }
        let hi = interp_log_x_or_zero(&self.energy_true, &self.data[i + 1], energy_true);
        (lo + u * (hi - lo)).max(0.0)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        validate_table("aeff", &self.energy_true, &self.offset, self.data.iter().map(|r| r.len()))
    }
}

/// Energy-dependent angular cut, `data[offset][energy]` in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadMax2D {
    /// Reconstructed-energy nodes (TeV).
    pub energy: Vec<f64>,
    pub offset: Vec<f64>,
    pub data: Vec<Vec<f64>>,
}

impl RadMax2D {
    /// A cut that does not depend on energy or offset.
    pub fn constant(radius: f64) -> Self {
        Self {
            energy: vec![1e-3, 1e3],
            offset: vec![0.0],
            data: vec![vec![radius, radius]],
        }
    }

    /// Cut radius (deg), clamped to the tabulated range in both axes.
    pub fn evaluate(&self, energy: f64, offset: f64) -> f64 {
        let (i, u) = bracket_clamped(&self.offset, offset);
        let lo = interp_log_x_clamped(&self.energy, &self.data[i], energy);
        if self.offset.len() < 2 {
            return lo;
        }
        let hi = interp_log_x_clamped(&self.energy, &self.data[i + 1], energy);
        lo + u * (hi - lo)
    }

    /// Radius at each bin centre of `axis`.
    pub fn on_axis(&self, axis: &EnergyAxis, offset: f64) -> Vec<f64> {
        axis.centers().iter().map(|e| self.evaluate(*e, offset)).collect()
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        validate_table("rad_max", &self.energy, &self.offset, self.data.iter().map(|r| r.len()))
    }
}

/// Migration probability density, `pdf[offset][energy_true][migra_bin]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyDispersion2D {
    pub energy_true: Vec<f64>,
    /// Migration bin edges (`E_reco / E_true`), increasing.
    pub migra_edges: Vec<f64>,
    pub offset: Vec<f64>,
    pub pdf: Vec<Vec<Vec<f64>>>,
}

impl EnergyDispersion2D {
    /// Gaussian migration with relative resolution `sigma` and relative `bias`,
    /// identical at every true energy and offset node.
    pub fn gaussian(energy_true: Vec<f64>, offset: Vec<f64>, sigma: f64, bias: f64) -> Self {
        let migra_edges: Vec<f64> = (0..=56).map(|k| 0.2 + 0.05 * k as f64).collect();
        let centers: Vec<f64> = migra_edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let width = 0.05;

        let raw: Vec<f64> = centers
            .iter()
            .map(|m| {
                let z = (m - (1.0 + bias)) / sigma;
                (-0.5 * z * z).exp()
            })
            .collect();
        let norm: f64 = raw.iter().sum::<f64>() * width;
        let row: Vec<f64> = raw.iter().map(|v| v / norm).collect();

        let pdf = offset
            .iter()
            .map(|_| energy_true.iter().map(|_| row.clone()).collect())
            .collect();

        Self {
            energy_true,
            migra_edges,
            offset,
            pdf,
        }
    }

    /// Resample onto a (true × reco) probability matrix at the given offset.
    ///
    /// Row `i` holds the probability for an event in true bin `i` to be
    /// reconstructed in each reco bin; rows sum to at most 1 (the remainder
    /// migrates outside the reco axis).
    pub fn to_matrix(&self, offset: f64, true_axis: &EnergyAxis, reco_axis: &EnergyAxis) -> DMatrix<f64> {
        let off_idx = nearest_index(&self.offset, offset);
        let table = &self.pdf[off_idx];
        let n_migra = self.migra_edges.len() - 1;
        let widths: Vec<f64> = self.migra_edges.windows(2).map(|w| w[1] - w[0]).collect();

        let mut matrix = DMatrix::<f64>::zeros(true_axis.nbin(), reco_axis.nbin());
        for i in 0..true_axis.nbin() {
            let e_true = true_axis.center(i);

            // pdf at this true energy, interpolated per migration bin.
            let pdf_row: Vec<f64> = (0..n_migra)
                .map(|m| {
                    let column: Vec<f64> = table.iter().map(|r| r[m]).collect();
                    interp_log_x_clamped(&self.energy_true, &column, e_true).max(0.0)
                })
                .collect();

            let mut cdf = Vec::with_capacity(n_migra + 1);
            cdf.push(0.0);
            for m in 0..n_migra {
                let prev = cdf[m];
                cdf.push(prev + pdf_row[m] * widths[m]);
            }

            for j in 0..reco_axis.nbin() {
                let lo = interp_clamped(&self.migra_edges, &cdf, reco_axis.lo(j) / e_true);
                let hi = interp_clamped(&self.migra_edges, &cdf, reco_axis.hi(j) / e_true);
                matrix[(i, j)] = (hi - lo).max(0.0);
            }
        }
        matrix
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.migra_edges.len() < 2 || self.migra_edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidInput(
                "edisp migration edges must be strictly increasing".to_string(),
            ));
        }
        let n_migra = self.migra_edges.len() - 1;
        validate_table("edisp", &self.energy_true, &self.offset, self.pdf.iter().map(|r| r.len()))?;
        if self
            .pdf
            .iter()
            .flat_map(|per_offset| per_offset.iter())
            .any(|row| row.len() != n_migra)
        {
            return Err(AnalysisError::InvalidInput(
                "edisp pdf rows must match the migration axis".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_table(
    label: &str,
    energy: &[f64],
    offset: &[f64],
    row_lengths: impl Iterator<Item = usize>,
) -> Result<(), AnalysisError> {
    if energy.is_empty() || offset.is_empty() {
        return Err(AnalysisError::InvalidInput(format!("{label}: empty node axis")));
    }
    if energy.windows(2).any(|w| w[1] <= w[0]) || offset.windows(2).any(|w| w[1] <= w[0]) {
        return Err(AnalysisError::InvalidInput(format!(
            "{label}: node axes must be strictly increasing"
        )));
    }
    let lengths: Vec<usize> = row_lengths.collect();
    if lengths.len() != offset.len() || lengths.iter().any(|l| *l != energy.len()) {
        return Err(AnalysisError::InvalidInput(format!(
            "{label}: table shape does not match its node axes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aeff_interpolates_offset_and_vanishes_outside_energy_range() {
        let aeff = EffectiveArea2D {
            energy_true: vec![0.01, 1.0, 100.0],
            offset: vec![0.0, 1.0],
            data: vec![vec![100.0, 1000.0, 1000.0], vec![50.0, 500.0, 500.0]],
        };
        assert!((aeff.evaluate(1.0, 0.5) - 750.0).abs() < 1e-9);
        assert_eq!(aeff.evaluate(500.0, 0.5), 0.0);
        assert_eq!(aeff.evaluate(0.001, 0.0), 0.0);
    }

    #[test]
    fn gaussian_dispersion_rows_are_normalized() {
        let edisp = EnergyDispersion2D::gaussian(vec![0.01, 100.0], vec![0.0, 1.0], 0.1, 0.0);
        edisp.validate().unwrap();
        let true_axis = EnergyAxis::log_spaced(0.1, 10.0, 8).unwrap();
        let reco_axis = EnergyAxis::log_spaced(0.01, 100.0, 40).unwrap();
        let m = edisp.to_matrix(0.4, &true_axis, &reco_axis);
        for i in 0..true_axis.nbin() {
            let row_sum: f64 = (0..reco_axis.nbin()).map(|j| m[(i, j)]).sum();
            assert!((row_sum - 1.0).abs() < 1e-6, "row {i} sums to {row_sum}");
        }
    }

    #[test]
    fn rad_max_constant_everywhere() {
        let cut = RadMax2D::constant(0.14);
        assert!((cut.evaluate(0.05, 0.4) - 0.14).abs() < 1e-12);
        assert!((cut.evaluate(50.0, 2.0) - 0.14).abs() < 1e-12);
    }
}
