//! Flux points: per-band normalization of a fitted source model.
//!
//! For each band `[e_lo, e_hi)` the spectral shape of the source is frozen
//! and a scalar `norm` multiplies its predicted contribution. Using only the
//! dataset bins whose representative energy falls inside the band:
//! - `norm` is fitted on `[0, norm_max]`
//! - `TS = stat(norm = 0) - stat(best)`
//! - errors are the `Δstat = n_sigma²` crossings of the profile
//! - the upper limit is the `Δstat = ul_delta` crossing above the best fit
//!
//! Bands below the TS threshold are flagged as upper limits. Bands with no
//! usable bins or no predicted source signal are reported as unconstrained
//! upper limits (NaN values), never dropped.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::datasets::{Dataset, Datasets};
use crate::domain::{EnergyAxis, UlReference};
use crate::error::AnalysisError;
use crate::fit::FreeParameters;
use crate::math::{SimplexOptions, bisect, bracket_upwards, minimize};
use crate::models::{BindingMode, ModelBindingRegistry, ModelSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Minimum TS for a band to be reported as a measurement.
    pub ts_threshold: f64,
    /// Error bars are the `Δstat = n_sigma²` crossings.
    pub n_sigma: f64,
    /// `Δstat` defining the upper limit.
    pub ul_delta: f64,
    /// Compute upper limits at all.
    pub selection_ul: bool,
    /// Re-fit the free parameters of the other bound models in every band.
    pub reoptimize: bool,
    pub norm_max: f64,
    pub ul_reference: UlReference,
    pub optimizer: SimplexOptions,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            ts_threshold: 4.0,
            n_sigma: 1.0,
            ul_delta: 2.71,
            selection_ul: true,
            reoptimize: false,
            norm_max: 1e3,
            ul_reference: UlReference::Null,
            optimizer: SimplexOptions {
                ftol: 1e-10,
                ..SimplexOptions::default()
            },
        }
    }
}

/// One band. Energies in TeV, fluxes in cm-2 s-1 TeV-1 (`e2dnde` in TeV cm-2 s-1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxPoint {
    pub e_ref: f64,
    pub e_min: f64,
    pub e_max: f64,
    pub norm: f64,
    pub norm_errp: f64,
    pub norm_errn: f64,
    pub norm_ul: f64,
    pub ts: f64,
    pub sqrt_ts: f64,
    pub is_ul: bool,
    pub dnde: f64,
    pub dnde_errp: f64,
    pub dnde_errn: f64,
    pub dnde_ul: f64,
    pub e2dnde: f64,
    pub e2dnde_errp: f64,
    pub e2dnde_errn: f64,
    pub e2dnde_ul: f64,
    /// Predicted counts at the best norm (spectrum datasets only).
    pub npred: f64,
    /// Observed counts (spectrum datasets only).
    pub counts: f64,
    pub unconstrained: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FluxPoints {
    pub source: String,
    pub points: Vec<FluxPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct FluxPointEstimator {
    pub config: EstimatorConfig,
}

/// One dataset's contribution to a band.
#[derive(Clone)]
struct Term<'a> {
    dataset: &'a Dataset,
    /// Bins of this dataset inside the band and its mask.
    mask: Vec<bool>,
    /// Prediction of the source model at norm = 1.
    source: Vec<f64>,
    /// Prediction of every other bound model.
    other: Vec<f64>,
    other_sky: Vec<usize>,
}

impl Term<'_> {
    fn stat(&self, other: &[f64], norm: f64) -> f64 {
        let prediction: Vec<f64> = other
            .iter()
            .zip(&self.source)
            .map(|(o, s)| o + norm * s)
            .collect();
        self.dataset.stat_array(&prediction, &self.mask).iter().sum()
    }
}

struct Reoptimize<'a> {
    models: &'a ModelSet,
    free: FreeParameters,
}

struct BandProfile<'a> {
    terms: Vec<Term<'a>>,
    reoptimize: Option<Reoptimize<'a>>,
    options: &'a SimplexOptions,
}

impl BandProfile<'_> {
    fn stat(&self, norm: f64) -> f64 {
        match &self.reoptimize {
            None => self.terms.iter().map(|t| t.stat(&t.other, norm)).sum(),
            Some(re) => {
                let mut work = re.models.clone();
                let x0 = re.free.scaled_values(&work);
                let bounds = re.free.scaled_bounds(&work);
                let min = minimize(
                    |x| {
                        re.free.apply(&mut work, x);
                        self.terms
                            .iter()
                            .map(|t| t.stat(&t.dataset.prediction(&work, &t.other_sky), norm))
                            .sum()
                    },
                    &x0,
                    &bounds,
                    self.options,
                );
                min.fval
            }
        }
    }
}

impl FluxPointEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Estimate flux points of `source` over `edges` from `datasets`.
    ///
    /// Models bound to datasets outside `datasets` are ignored.
    pub fn run(
        &self,
        datasets: &Datasets,
        models: &ModelSet,
        source: &str,
        edges: &EnergyAxis,
    ) -> Result<FluxPoints, AnalysisError> {
        let source_idx = models.sky_index(source)?;
        let registry = ModelBindingRegistry::build(models, &datasets.names(), BindingMode::IgnoreMissing)?;
        let bound = registry.datasets_for(source_idx);
        if bound.is_empty() {
            return Err(AnalysisError::InvalidInput(format!(
                "model '{source}' is not bound to any of: {}",
                datasets.names().join(", ")
            )));
        }

        let datasets_vec: Vec<&Dataset> = datasets.iter().collect();
        let base_terms: Vec<Term> = bound
            .iter()
            .map(|&di| {
                let dataset = datasets_vec[di];
                let other_sky: Vec<usize> = registry
                    .models_for(di)
                    .iter()
                    .copied()
                    .filter(|&mi| mi != source_idx)
                    .collect();
                Term {
                    dataset,
                    mask: dataset.mask(),
                    source: dataset.prediction(models, &[source_idx]),
                    other: dataset.prediction(models, &other_sky),
                    other_sky,
                }
            })
            .collect();

        let reoptimize_ids = if self.config.reoptimize {
            let source_params = &models.spectral(models.sky_models()[source_idx].spectral).params;
            registry
                .free_parameters(models)
                .into_iter()
                .filter(|id| !source_params.contains(id))
                .collect()
        } else {
            Vec::new()
        };

        let points: Vec<FluxPoint> = (0..edges.nbin())
            .into_par_iter()
            .map(|b| {
                let (e_lo, e_hi) = (edges.lo(b), edges.hi(b));
                let terms: Vec<Term> = base_terms
                    .iter()
                    .map(|t| {
                        let mut term = t.clone();
                        let energies = t.dataset.bin_energies();
                        for (m, e) in term.mask.iter_mut().zip(energies) {
                            *m = *m && e >= e_lo && e < e_hi;
                        }
                        term
                    })
                    .collect();
                let reoptimize = (!reoptimize_ids.is_empty()).then(|| Reoptimize {
                    models,
                    free: FreeParameters::from_ids(models, reoptimize_ids.clone()),
                });
                let profile = BandProfile {
                    terms,
                    reoptimize,
                    options: &self.config.optimizer,
                };
                let ref_dnde = models.dnde(source_idx, edges.center(b));
                self.estimate_band(&profile, e_lo, edges.center(b), e_hi, ref_dnde)
            })
            .collect();

        log::info!(
            "flux points for '{}': {} band(s), {} upper limit(s)",
            source,
            points.len(),
            points.iter().filter(|p| p.is_ul).count()
        );
        Ok(FluxPoints {
            source: source.to_string(),
            points,
        })
    }

    fn estimate_band(&self, profile: &BandProfile, e_min: f64, e_ref: f64, e_max: f64, ref_dnde: f64) -> FluxPoint {
        let cfg = &self.config;

        let n_usable: usize = profile
            .terms
            .iter()
            .map(|t| t.mask.iter().filter(|m| **m).count())
            .sum();
        let source_signal: f64 = profile
            .terms
            .iter()
            .map(|t| {
                t.source
                    .iter()
                    .zip(&t.mask)
                    .filter(|(_, m)| **m)
                    .map(|(s, _)| s.abs())
                    .sum::<f64>()
            })
            .sum();
        if n_usable == 0 || source_signal.is_nan() || source_signal <= 0.0 {
            let reason = if n_usable == 0 {
                "no usable bins".to_string()
            } else {
                "no predicted source signal (zero exposure)".to_string()
            };
            log::warn!("{}", AnalysisError::UnderConstrainedBin { e_min, e_max, reason });
            return unconstrained_point(e_min, e_ref, e_max);
        }

        let min = minimize(|x| profile.stat(x[0]), &[1.0], &[(0.0, cfg.norm_max)], &cfg.optimizer);
        let norm = min.x[0];
        let stat_best = min.fval;
        let stat_null = profile.stat(0.0);
        let ts = (stat_null - stat_best).max(0.0);

        let xtol = 1e-6 * norm.max(1e-3);
        let step = 0.1 * norm.max(0.1);

        let delta = cfg.n_sigma * cfg.n_sigma;
        let rise = |n: f64| profile.stat(n) - (stat_best + delta);
        let norm_errp = bracket_upwards(rise, norm, step, cfg.norm_max)
            .and_then(|(lo, hi)| bisect(rise, lo, hi, xtol, 200))
            .map(|root| root - norm)
            .unwrap_or(f64::NAN);
        let norm_errn = if rise(0.0) <= 0.0 {
            norm
        } else {
            bisect(rise, 0.0, norm, xtol, 200)
                .map(|root| norm - root)
                .unwrap_or(f64::NAN)
        };

        let norm_ul = if cfg.selection_ul {
            let reference = match cfg.ul_reference {
                UlReference::Null => stat_null,
                UlReference::BestFit => stat_best,
            };
            let above = |n: f64| profile.stat(n) - (reference + cfg.ul_delta);
            let ul = bracket_upwards(above, norm, step, cfg.norm_max).and_then(|(lo, hi)| bisect(above, lo, hi, xtol, 200));
            if ul.is_none() {
                log::warn!("no upper-limit crossing below norm_max in [{e_min:.4}, {e_max:.4}] TeV");
            }
            ul.unwrap_or(f64::NAN)
        } else {
            f64::NAN
        };

        let (counts, npred) = band_counts(profile, norm);
        let e2 = e_ref * e_ref;
        FluxPoint {
            e_ref,
            e_min,
            e_max,
            norm,
            norm_errp,
            norm_errn,
            norm_ul,
            ts,
            sqrt_ts: ts.sqrt(),
            is_ul: ts < cfg.ts_threshold,
            dnde: norm * ref_dnde,
            dnde_errp: norm_errp * ref_dnde,
            dnde_errn: norm_errn * ref_dnde,
            dnde_ul: norm_ul * ref_dnde,
            e2dnde: e2 * norm * ref_dnde,
            e2dnde_errp: e2 * norm_errp * ref_dnde,
            e2dnde_errn: e2 * norm_errn * ref_dnde,
            e2dnde_ul: e2 * norm_ul * ref_dnde,
            npred,
            counts,
            unconstrained: false,
        }
    }
}

/// Observed and predicted counts of the spectrum datasets in the band.
fn band_counts(profile: &BandProfile, norm: f64) -> (f64, f64) {
    let mut counts = 0.0;
    let mut npred = 0.0;
    let mut any = false;
    for t in &profile.terms {
        let Some(observed) = t.dataset.counts() else {
            continue;
        };
        let prediction: Vec<f64> = t.other.iter().zip(&t.source).map(|(o, s)| o + norm * s).collect();
        let Some(total) = t.dataset.npred_total(&prediction) else {
            continue;
        };
        for (j, in_band) in t.mask.iter().enumerate() {
            if *in_band {
                counts += observed[j];
                npred += total[j];
                any = true;
            }
        }
    }
    if any { (counts, npred) } else { (f64::NAN, f64::NAN) }
}

fn unconstrained_point(e_min: f64, e_ref: f64, e_max: f64) -> FluxPoint {
    FluxPoint {
        e_ref,
        e_min,
        e_max,
        norm: f64::NAN,
        norm_errp: f64::NAN,
        norm_errn: f64::NAN,
        norm_ul: f64::NAN,
        ts: f64::NAN,
        sqrt_ts: f64::NAN,
        is_ul: true,
        dnde: f64::NAN,
        dnde_errp: f64::NAN,
        dnde_errn: f64::NAN,
        dnde_ul: f64::NAN,
        e2dnde: f64::NAN,
        e2dnde_errp: f64::NAN,
        e2dnde_errn: f64::NAN,
        e2dnde_ul: f64::NAN,
        npred: f64::NAN,
        counts: f64::NAN,
        unconstrained: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{Background, SpectrumDataset, edisp_diagonal};
    use crate::fit::JointLikelihoodFitter;
    use crate::models::{Parameter, SpectralKind, Unit};

    fn linear_axis() -> EnergyAxis {
        EnergyAxis::from_edges(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap()
    }

    fn on_off(on: Vec<f64>, off: Vec<f64>, exposure: Vec<f64>) -> Datasets {
        let axis = linear_axis();
        let ds = SpectrumDataset::new(
            "onoff",
            axis.clone(),
            axis.clone(),
            on,
            exposure,
            edisp_diagonal(&axis, &axis),
            Background::OnOff {
                counts_off: off,
                alpha: vec![0.2; 5],
            },
            1.0,
        )
        .unwrap();
        let mut datasets = Datasets::new();
        datasets.push(ds).unwrap();
        datasets
    }

    fn constant(value: f64) -> ModelSet {
        let mut models = ModelSet::new();
        let sid = models
            .add_spectral(
                SpectralKind::Constant,
                vec![Parameter::new("const", value, Unit::FluxPerTeV).bounded(Some(0.0), None)],
            )
            .unwrap();
        models.add_sky("src", sid, None).unwrap();
        models
    }

    #[test]
    fn per_bin_refit_flags_upper_limits_by_ts() {
        let datasets = on_off(
            vec![50.0, 40.0, 30.0, 20.0, 1.0],
            vec![20.0, 15.0, 10.0, 5.0, 5.0],
            vec![1000.0; 5],
        );
        let mut models = constant(0.01);
        let fit = JointLikelihoodFitter::default().run(&datasets, &mut models).unwrap();
        assert!(fit.converged);

        let estimator = FluxPointEstimator::default();
        let fp = estimator.run(&datasets, &models, "src", &linear_axis()).unwrap();
        assert_eq!(fp.points.len(), 5);

        let c = models.parameter(models.spectral_parameter("src", "const").unwrap()).value;
        for p in &fp.points {
            assert_eq!(p.is_ul, p.ts < estimator.config.ts_threshold);
            assert!(!p.unconstrained);
            assert!(p.norm_ul > p.norm);
        }
        // First band: excess 46 over 1000 cm² s · 1 TeV.
        let first = &fp.points[0];
        assert!(!first.is_ul);
        assert!((first.dnde * 1000.0 - 46.0).abs() < first.dnde_errn * 1000.0 + 1.0);
        assert!((first.dnde - first.norm * c).abs() < 1e-12);
        assert!(first.norm_errn > 0.0 && first.norm_errp > 0.0);
        assert!((first.counts - 50.0).abs() < 1e-9);

        // Last band: 1 ON count over an expected background of 1.
        let last = &fp.points[4];
        assert!(last.is_ul);
        assert!(last.norm_ul.is_finite());
    }

    #[test]
    fn ts_grows_with_injected_signal() {
        let mut previous = -1.0;
        for signal in [0.0, 5.0, 10.0, 20.0, 40.0] {
            let on = vec![10.0 + signal; 5];
            let datasets = on_off(on, vec![50.0; 5], vec![1000.0; 5]);
            let models = constant(0.01);
            let edges = EnergyAxis::from_edges(vec![1.0, 6.0]).unwrap();
            let fp = FluxPointEstimator::default().run(&datasets, &models, "src", &edges).unwrap();
            let ts = fp.points[0].ts;
            assert!(ts >= previous, "TS {ts} after {previous}");
            previous = ts;
        }
        assert!(previous > 25.0);
    }

    #[test]
    fn zero_exposure_band_is_unconstrained() {
        let datasets = on_off(
            vec![50.0, 40.0, 30.0, 20.0, 10.0],
            vec![20.0, 15.0, 10.0, 5.0, 5.0],
            vec![1000.0, 1000.0, 1000.0, 1000.0, 0.0],
        );
        let models = constant(0.02);
        let fp = FluxPointEstimator::default()
            .run(&datasets, &models, "src", &linear_axis())
            .unwrap();
        let last = &fp.points[4];
        assert!(last.unconstrained && last.is_ul);
        assert!(last.norm.is_nan());

        // Band outside the dataset's energy range.
        let edges = EnergyAxis::from_edges(vec![10.0, 20.0]).unwrap();
        let fp = FluxPointEstimator::default().run(&datasets, &models, "src", &edges).unwrap();
        assert!(fp.points[0].unconstrained);
    }

    #[test]
    fn unbound_source_is_rejected() {
        let datasets = on_off(vec![1.0; 5], vec![1.0; 5], vec![1.0; 5]);
        let mut models = constant(0.01);
        models.set_datasets("src", Some(vec!["elsewhere".to_string()])).unwrap();
        assert!(FluxPointEstimator::default()
            .run(&datasets, &models, "src", &linear_axis())
            .is_err());
    }

    #[test]
    fn config_reads_back_from_yaml() {
        let config = EstimatorConfig {
            ul_reference: UlReference::BestFit,
            ..EstimatorConfig::default()
        };
        let text = serde_yaml::to_string(&config).unwrap();
        let back: EstimatorConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, config);

        let partial: EstimatorConfig = serde_yaml::from_str("ts_threshold: 9.0\n").unwrap();
        assert!((partial.ts_threshold - 9.0).abs() < 1e-12);
        assert_eq!(partial.optimizer, EstimatorConfig::default().optimizer);
    }
}
