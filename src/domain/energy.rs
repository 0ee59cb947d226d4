//! Energy axes.
//!
//! All energies are in TeV. An axis is an ordered list of bin edges; bin
//! centres are geometric means (the natural centre of a log-spaced bin).

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Relative tolerance used when comparing energies against bin edges.
const EDGE_RTOL: f64 = 1e-6;

/// Ordered energy bin edges (TeV), strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct EnergyAxis {
    edges: Vec<f64>,
}

impl EnergyAxis {
    /// Build an axis from explicit edges.
    pub fn from_edges(edges: Vec<f64>) -> Result<Self, AnalysisError> {
        if edges.len() < 2 {
            return Err(AnalysisError::InvalidEnergyAxis(format!(
                "need at least 2 edges, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite() || *e <= 0.0) {
            return Err(AnalysisError::InvalidEnergyAxis(
                "edges must be finite and > 0".to_string(),
            ));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidEnergyAxis(
                "edges must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { edges })
    }

    /// `nbin` log-spaced bins between `e_min` and `e_max` (edges inclusive).
    pub fn log_spaced(e_min: f64, e_max: f64, nbin: usize) -> Result<Self, AnalysisError> {
        if !(e_min.is_finite() && e_max.is_finite() && e_min > 0.0 && e_max > e_min) {
            return Err(AnalysisError::InvalidEnergyAxis(format!(
                "invalid range: e_min={e_min}, e_max={e_max} (must be finite, >0, and e_max>e_min)"
            )));
        }
        if nbin == 0 {
            return Err(AnalysisError::InvalidEnergyAxis("nbin must be >= 1".to_string()));
        }

        let ln_min = e_min.ln();
        let ln_max = e_max.ln();
        let step = (ln_max - ln_min) / nbin as f64;

        let mut edges = Vec::with_capacity(nbin + 1);
        edges.push(e_min);
        for i in 1..nbin {
            edges.push((ln_min + step * i as f64).exp());
        }
        // Pin the last edge so `e_max` round-trips exactly.
        edges.push(e_max);
        Self::from_edges(edges)
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn nbin(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn e_min(&self) -> f64 {
        self.edges[0]
    }

    pub fn e_max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn lo(&self, i: usize) -> f64 {
        self.edges[i]
    }

    pub fn hi(&self, i: usize) -> f64 {
        self.edges[i + 1]
    }

    /// Geometric bin centre.
    pub fn center(&self, i: usize) -> f64 {
        (self.edges[i] * self.edges[i + 1]).sqrt()
    }

    pub fn centers(&self) -> Vec<f64> {
        (0..self.nbin()).map(|i| self.center(i)).collect()
    }

    pub fn widths(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Index of the bin containing `energy` (`[lo, hi)`, last bin closed).
    pub fn bin_of(&self, energy: f64) -> Option<usize> {
        if !energy.is_finite() || energy < self.e_min() || energy > self.e_max() {
            return None;
        }
        let idx = self.edges.partition_point(|e| *e <= energy);
        Some(idx.saturating_sub(1).min(self.nbin() - 1))
    }

    /// Bins lying entirely inside `[e_min, e_max]`.
    ///
    /// Edges are compared with a small relative tolerance so that a range
    /// that coincides with bin edges selects those bins.
    pub fn mask_within(&self, e_min: f64, e_max: f64) -> Vec<bool> {
        (0..self.nbin())
            .map(|i| {
                self.lo(i) >= e_min * (1.0 - EDGE_RTOL) && self.hi(i) <= e_max * (1.0 + EDGE_RTOL)
            })
            .collect()
    }

    /// Bins whose centre falls in `[e_lo, e_hi)`.
    pub fn mask_centers_in(&self, e_lo: f64, e_hi: f64) -> Vec<bool> {
        (0..self.nbin())
            .map(|i| {
                let c = self.center(i);
                c >= e_lo && c < e_hi
            })
            .collect()
    }

    /// Same binning as `other` (edge-by-edge, relative tolerance).
    pub fn is_compatible(&self, other: &EnergyAxis) -> bool {
        self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(other.edges.iter())
                .all(|(a, b)| (a - b).abs() <= EDGE_RTOL * a.abs().max(b.abs()))
    }
}

impl TryFrom<Vec<f64>> for EnergyAxis {
    type Error = AnalysisError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        EnergyAxis::from_edges(value)
    }
}

impl From<EnergyAxis> for Vec<f64> {
    fn from(value: EnergyAxis) -> Self {
        value.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_spaced_includes_endpoints() {
        let axis = EnergyAxis::log_spaced(0.01, 100.0, 20).unwrap();
        assert_eq!(axis.nbin(), 20);
        assert!((axis.e_min() - 0.01).abs() < 1e-15);
        assert!((axis.e_max() - 100.0).abs() < 1e-12);
        // 5 bins per decade.
        assert!((axis.hi(4) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_increasing_edges() {
        assert!(EnergyAxis::from_edges(vec![1.0, 1.0, 2.0]).is_err());
        assert!(EnergyAxis::from_edges(vec![2.0, 1.0]).is_err());
        assert!(EnergyAxis::from_edges(vec![1.0]).is_err());
    }

    #[test]
    fn safe_range_selects_contained_bins() {
        // 10 GeV - 100 TeV, 20 bins: the 80 GeV - 20 TeV safe range keeps
        // bins from the 100 GeV edge up to the 15.8 TeV edge.
        let axis = EnergyAxis::log_spaced(0.01, 100.0, 20).unwrap();
        let mask = axis.mask_within(0.08, 20.0);
        let first = mask.iter().position(|m| *m).unwrap();
        let last = mask.iter().rposition(|m| *m).unwrap();
        assert!((axis.lo(first) - 0.1).abs() < 1e-12);
        assert!((axis.hi(last) - 10f64.powf(1.2)).abs() < 1e-9);
        assert_eq!(mask.iter().filter(|m| **m).count(), 11);
    }

    #[test]
    fn bin_lookup_handles_edges() {
        let axis = EnergyAxis::from_edges(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(axis.bin_of(1.0), Some(0));
        assert_eq!(axis.bin_of(1.999), Some(0));
        assert_eq!(axis.bin_of(2.0), Some(1));
        assert_eq!(axis.bin_of(3.0), Some(1));
        assert_eq!(axis.bin_of(0.5), None);
        assert_eq!(axis.bin_of(3.5), None);
    }
}
