//! Datasets entering the joint likelihood.
//!
//! Two kinds are supported:
//! - [`SpectrumDataset`]: forward-folded counts (Cash or WStat)
//! - [`FluxPointsDataset`]: published fluxes (Gaussian χ²)
//!
//! [`Datasets`] is an ordered collection with unique names; its order fixes
//! the order of the free-parameter vector and of the per-dataset statistics.

pub mod flux_points;
pub mod spectrum;

pub use flux_points::*;
pub use spectrum::*;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::models::ModelSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dataset {
    Spectrum(SpectrumDataset),
    FluxPoints(FluxPointsDataset),
}

impl Dataset {
    pub fn name(&self) -> &str {
        match self {
            Dataset::Spectrum(d) => &d.name,
            Dataset::FluxPoints(d) => &d.name,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Dataset::Spectrum(_) => "spectrum",
            Dataset::FluxPoints(_) => "flux_points",
        }
    }

    /// Bins (or rows) entering the statistic.
    pub fn mask(&self) -> Vec<bool> {
        match self {
            Dataset::Spectrum(d) => d.mask(),
            Dataset::FluxPoints(d) => d.mask(),
        }
    }

    /// Representative energy per bin: reco bin centre or row reference energy.
    pub fn bin_energies(&self) -> Vec<f64> {
        match self {
            Dataset::Spectrum(d) => d.energy_axis.centers(),
            Dataset::FluxPoints(d) => d.e_ref(),
        }
    }

    /// Model prediction per bin: signal counts or `dN/dE` at `e_ref`.
    pub fn prediction(&self, models: &ModelSet, sky: &[usize]) -> Vec<f64> {
        match self {
            Dataset::Spectrum(d) => d.npred_signal(models, sky),
            Dataset::FluxPoints(d) => d.prediction(models, sky),
        }
    }

    pub fn stat_array(&self, prediction: &[f64], mask: &[bool]) -> Vec<f64> {
        match self {
            Dataset::Spectrum(d) => d.stat_array(prediction, mask),
            Dataset::FluxPoints(d) => d.stat_array(prediction, mask),
        }
    }

    /// Observed counts per bin (spectra only).
    pub fn counts(&self) -> Option<&[f64]> {
        match self {
            Dataset::Spectrum(d) => Some(&d.counts),
            Dataset::FluxPoints(_) => None,
        }
    }

    /// Predicted total counts (signal plus background) per bin (spectra only).
    pub fn npred_total(&self, prediction: &[f64]) -> Option<Vec<f64>> {
        match self {
            Dataset::Spectrum(d) => {
                let bkg = d.npred_background(prediction);
                Some(prediction.iter().zip(bkg).map(|(s, b)| s + b).collect())
            }
            Dataset::FluxPoints(_) => None,
        }
    }
}

impl From<SpectrumDataset> for Dataset {
    fn from(value: SpectrumDataset) -> Self {
        Dataset::Spectrum(value)
    }
}

impl From<FluxPointsDataset> for Dataset {
    fn from(value: FluxPointsDataset) -> Self {
        Dataset::FluxPoints(value)
    }
}

/// Ordered dataset collection with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Datasets {
    items: Vec<Dataset>,
}

impl Datasets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dataset: impl Into<Dataset>) -> Result<(), AnalysisError> {
        let dataset = dataset.into();
        if self.index_of(dataset.name()).is_some() {
            return Err(AnalysisError::InvalidInput(format!(
                "duplicate dataset name '{}'",
                dataset.name()
            )));
        }
        self.items.push(dataset);
        Ok(())
    }

    pub fn extend<I, D>(&mut self, datasets: I) -> Result<(), AnalysisError>
    where
        I: IntoIterator<Item = D>,
        D: Into<Dataset>,
    {
        for d in datasets {
            self.push(d)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dataset> {
        self.items.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|d| d.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.index_of(name).map(|i| &self.items[i])
    }

    /// Sub-collection of the named datasets, in the requested order.
    pub fn select(&self, names: &[String]) -> Result<Datasets, AnalysisError> {
        let mut out = Datasets::new();
        for name in names {
            let dataset = self
                .get(name)
                .ok_or_else(|| AnalysisError::InvalidInput(format!("no dataset named '{name}'")))?;
            out.push(dataset.clone())?;
        }
        Ok(out)
    }

    /// Spectrum datasets whose names are in `names`.
    pub fn spectra(&self, names: &[String]) -> Vec<&SpectrumDataset> {
        self.items
            .iter()
            .filter_map(|d| match d {
                Dataset::Spectrum(s) if names.contains(&s.name) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Datasets {
    type Item = &'a Dataset;
    type IntoIter = std::slice::Iter<'a, Dataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_ordered() {
        let mut datasets = Datasets::new();
        datasets.push(FluxPointsDataset::new("HAWC", Vec::new())).unwrap();
        datasets.push(FluxPointsDataset::new("other", Vec::new())).unwrap();
        assert!(datasets.push(FluxPointsDataset::new("HAWC", Vec::new())).is_err());
        assert_eq!(datasets.names(), vec!["HAWC".to_string(), "other".to_string()]);

        let sub = datasets.select(&["other".to_string()]).unwrap();
        assert_eq!(sub.len(), 1);
        assert!(datasets.select(&["missing".to_string()]).is_err());
    }
}
