//! Shared domain types and the run configuration.
//!
//! These types are kept serializable so they can be:
//!
//! - loaded from a YAML run configuration
//! - passed between the reduction, fit and estimation stages
//! - echoed into reports

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::background::FinderConfig;
use crate::domain::energy::EnergyAxis;
use crate::domain::sky::{CircleRegion, SkyCoord};
use crate::error::AnalysisError;
use crate::estimators::EstimatorConfig;
use crate::math::SimplexOptions;
use crate::models::{ModelOverrides, ReferenceShape};

/// Instrument response components an observation may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrfKind {
    Aeff,
    Edisp,
    RadMax,
}

impl IrfKind {
    pub const ALL: [IrfKind; 3] = [IrfKind::Aeff, IrfKind::Edisp, IrfKind::RadMax];

    pub fn label(self) -> &'static str {
        match self {
            IrfKind::Aeff => "aeff",
            IrfKind::Edisp => "edisp",
            IrfKind::RadMax => "rad_max",
        }
    }
}

/// How flux-point rows flagged as upper limits enter the χ² statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UpperLimitTreatment {
    /// Upper-limit rows are excluded from the statistic.
    #[default]
    Ignore,
    /// One-sided penalty when the model exceeds the limit.
    Penalize,
}

/// Statistic value an upper limit is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UlReference {
    /// `stat(norm = 0)`.
    #[default]
    Null,
    /// `stat(best-fit norm)`.
    BestFit,
}

/// A log-spaced energy binning (TeV).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub e_min: f64,
    pub e_max: f64,
    pub nbin: usize,
}

impl AxisSpec {
    pub fn to_axis(&self) -> Result<EnergyAxis, AnalysisError> {
        EnergyAxis::log_spaced(self.e_min, self.e_max, self.nbin)
    }
}

/// Closed energy interval (TeV).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyRange {
    pub e_min: f64,
    pub e_max: f64,
}

/// Input/output locations, relative to the `--input` / `--output` directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Observation data store directory (contains `obs-index.json`).
    pub data_store: PathBuf,
    /// Pre-reduced spectrum datasets (JSON).
    pub prereduced_datasets: PathBuf,
    /// Published flux-point table (CSV).
    pub flux_points_table: PathBuf,
    /// Dataset name given to the flux-point table.
    pub flux_points_name: String,
    /// Reference shape used to convert `norm`-type tables.
    pub flux_points_reference: Option<ReferenceShape>,
    /// Model definition (YAML).
    pub models: PathBuf,
    /// Fitted model output (YAML, with covariance).
    pub fitted_models: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_store: PathBuf::from("magic"),
            prereduced_datasets: PathBuf::from("fermi/fermi_datasets.json"),
            flux_points_table: PathBuf::from("hawc/hawc_flux_points.csv"),
            flux_points_name: "HAWC".to_string(),
            flux_points_reference: Some(ReferenceShape::CrabMeyer),
            models: PathBuf::from("fermi/crab_models.yaml"),
            fitted_models: PathBuf::from("results/crab_multi_instrument_fit.yaml"),
        }
    }
}

/// Which models see which datasets in the joint fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Full source model (first entry of the model file).
    pub source_model: String,
    /// Datasets the full source model is restricted to.
    pub source_datasets: Vec<String>,
    /// Name of the extra model that shares the source's spectral model.
    pub spectrum_only_model: String,
    /// Datasets of the spectrum-only model; `None` binds it to every reduced run.
    pub spectrum_only_datasets: Option<Vec<String>>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            source_model: "Crab Nebula".to_string(),
            source_datasets: vec!["Fermi-LAT".to_string(), "HAWC".to_string()],
            spectrum_only_model: "crab-nebula-spectrum-only".to_string(),
            spectrum_only_datasets: None,
        }
    }
}

/// Datasets a flux-point job runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FluxPointsInput {
    /// Named datasets of the joint collection, used as they are.
    Datasets { names: Vec<String> },
    /// All reduced runs stacked into one dataset; `model` is re-bound to it.
    StackedRuns { name: String, model: String },
}

/// One flux-point computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluxPointsJob {
    pub label: String,
    pub input: FluxPointsInput,
    /// Model whose normalization is floated.
    pub source: String,
    pub edges: AxisSpec,
    /// Output CSV, relative to the output directory.
    pub output: PathBuf,
}

/// A full run's configuration.
///
/// `Default` reproduces the Crab multi-instrument analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub paths: PathsConfig,

    /// ON-region centre (ICRS, deg).
    pub target: SkyCoord,
    /// ON-region radius (deg); `None` means point-like with `rad_max(E)`.
    pub on_radius: Option<f64>,

    pub energy_axis: AxisSpec,
    pub energy_axis_true: AxisSpec,
    /// Bins fully inside this range form the safe mask.
    pub safe_range: EnergyRange,
    pub required_irfs: Vec<IrfKind>,

    pub background: FinderConfig,
    pub exclusions: Vec<CircleRegion>,

    pub overrides: ModelOverrides,
    pub bindings: BindingConfig,
    pub ul_treatment: UpperLimitTreatment,

    pub optimizer: SimplexOptions,
    pub estimator: EstimatorConfig,
    pub flux_points: Vec<FluxPointsJob>,

    /// Compute flux points even when the joint fit did not converge.
    pub continue_on_fit_failure: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            target: SkyCoord::new(83.63, 22.01),
            on_radius: None,
            energy_axis: AxisSpec {
                e_min: 0.01,
                e_max: 100.0,
                nbin: 20,
            },
            energy_axis_true: AxisSpec {
                e_min: 0.01,
                e_max: 100.0,
                nbin: 28,
            },
            safe_range: EnergyRange {
                e_min: 0.08,
                e_max: 20.0,
            },
            required_irfs: IrfKind::ALL.to_vec(),
            background: FinderConfig::default(),
            exclusions: Vec::new(),
            overrides: ModelOverrides::default(),
            bindings: BindingConfig::default(),
            ul_treatment: UpperLimitTreatment::default(),
            optimizer: SimplexOptions::default(),
            estimator: EstimatorConfig::default(),
            flux_points: vec![
                FluxPointsJob {
                    label: "fermi".to_string(),
                    input: FluxPointsInput::Datasets {
                        names: vec!["Fermi-LAT".to_string()],
                    },
                    source: "Crab Nebula".to_string(),
                    edges: AxisSpec {
                        e_min: 0.01,
                        e_max: 2.0,
                        nbin: 5,
                    },
                    output: PathBuf::from("flux_points/crab_fermi_flux_points.csv"),
                },
                FluxPointsJob {
                    label: "magic".to_string(),
                    input: FluxPointsInput::StackedRuns {
                        name: "magic_stacked".to_string(),
                        model: "crab-nebula-spectrum-only".to_string(),
                    },
                    source: "crab-nebula-spectrum-only".to_string(),
                    edges: AxisSpec {
                        e_min: 0.08,
                        e_max: 20.0,
                        nbin: 6,
                    },
                    output: PathBuf::from("flux_points/crab_magic_flux_points.csv"),
                },
            ],
            continue_on_fit_failure: false,
        }
    }
}

impl RunConfig {
    /// Load a YAML configuration; absent keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, AnalysisError> {
        let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        serde_yaml::from_str(&text).map_err(|e| AnalysisError::parse(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_axes_match_reduction_setup() {
        let cfg = RunConfig::default();
        let reco = cfg.energy_axis.to_axis().unwrap();
        let etrue = cfg.energy_axis_true.to_axis().unwrap();
        assert_eq!(reco.nbin(), 20);
        assert_eq!(etrue.nbin(), 28);
        assert!((reco.e_min() - 0.01).abs() < 1e-12);
        assert!((etrue.e_max() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: RunConfig = serde_yaml::from_str(
            "continue_on_fit_failure: true\nul_treatment: penalize\nsafe_range:\n  e_min: 0.1\n  e_max: 10.0\n",
        )
        .unwrap();
        assert!(cfg.continue_on_fit_failure);
        assert_eq!(cfg.ul_treatment, UpperLimitTreatment::Penalize);
        assert!((cfg.safe_range.e_min - 0.1).abs() < 1e-12);
        assert_eq!(cfg.energy_axis.nbin, 20);
        assert_eq!(cfg.flux_points.len(), 2);
        assert_eq!(cfg.bindings.source_model, "Crab Nebula");
    }
}
