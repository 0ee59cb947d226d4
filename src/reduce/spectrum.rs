//! Observation → ON/OFF spectrum dataset.
//!
//! Per observation:
//! 1) check the required response components and their table shapes
//! 2) count ON events per reco bin inside the ON region
//! 3) place OFF regions and count OFF events (reflected background)
//! 4) exposure per true bin from the effective area at the ON offset
//! 5) resample the energy dispersion onto the true × reco axes
//! 6) safe mask from the configured energy range
//!
//! Observations are independent; [`SpectrumReducer::reduce_all`] runs them in
//! parallel and keeps per-observation failures as exclusions.

use rayon::prelude::*;

use crate::background::{FinderConfig, ReflectedRegionsBackgroundEstimator};
use crate::datasets::{Background, SpectrumDataset};
use crate::domain::{CircleRegion, EnergyAxis, EnergyRange, IrfKind, M2_TO_CM2, Observation, OnRegion};
use crate::error::AnalysisError;

/// ON region plus the two energy axes of the output datasets.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralGeometry {
    pub on_region: OnRegion,
    pub energy_axis: EnergyAxis,
    pub energy_axis_true: EnergyAxis,
}

#[derive(Debug, Clone)]
pub struct SpectrumReducer {
    pub geometry: SpectralGeometry,
    pub safe_range: EnergyRange,
    pub required: Vec<IrfKind>,
    pub finder: FinderConfig,
    pub exclusions: Vec<CircleRegion>,
}

/// Result of reducing a batch of observations.
#[derive(Debug)]
pub struct ReductionOutcome {
    /// Reduced datasets, in observation order.
    pub datasets: Vec<SpectrumDataset>,
    /// Observations that could not be reduced, with the reason.
    pub excluded: Vec<(String, AnalysisError)>,
}

impl SpectrumReducer {
    pub fn reduce(&self, obs: &Observation) -> Result<SpectrumDataset, AnalysisError> {
        let missing = obs.missing_components(&self.required);
        if !missing.is_empty() {
            return Err(AnalysisError::MissingResponseComponent {
                obs_id: obs.obs_id.clone(),
                missing,
            });
        }
        obs.irfs
            .validate()
            .map_err(|e| AnalysisError::InvalidInput(format!("observation {}: {e}", obs.obs_id)))?;

        let reco = &self.geometry.energy_axis;
        let etrue = &self.geometry.energy_axis_true;
        let on_center = self.geometry.on_region.center();
        let offset = obs.offset_of(&on_center);

        let on_radii = match &self.geometry.on_region {
            OnRegion::Circle { region } => vec![region.radius; reco.nbin()],
            OnRegion::Point { .. } => {
                let rad_max = obs.irfs.rad_max.as_ref().ok_or_else(|| missing_one(obs, IrfKind::RadMax))?;
                rad_max.on_axis(reco, offset)
            }
        };

        let mut counts = vec![0.0; reco.nbin()];
        for event in &obs.events {
            if let Some(j) = reco.bin_of(event.energy) {
                if on_center.separation(&event.position) < on_radii[j] {
                    counts[j] += 1.0;
                }
            }
        }

        let estimator = ReflectedRegionsBackgroundEstimator::new(&self.finder, &self.exclusions);
        let bkg = estimator.run(&obs.obs_id, &on_center, &on_radii, &obs.pointing, &obs.events, reco)?;

        let aeff = obs.irfs.aeff.as_ref().ok_or_else(|| missing_one(obs, IrfKind::Aeff))?;
        let exposure: Vec<f64> = etrue
            .centers()
            .iter()
            .map(|e| aeff.evaluate(*e, offset) * M2_TO_CM2 * obs.livetime)
            .collect();

        let edisp = obs
            .irfs
            .edisp
            .as_ref()
            .ok_or_else(|| missing_one(obs, IrfKind::Edisp))?
            .to_matrix(offset, etrue, reco);

        let mut dataset = SpectrumDataset::new(
            obs.obs_id.clone(),
            reco.clone(),
            etrue.clone(),
            counts,
            exposure,
            edisp,
            Background::OnOff {
                counts_off: bkg.counts_off,
                alpha: bkg.alpha,
            },
            obs.livetime,
        )?;
        dataset.obs_ids = vec![obs.obs_id.clone()];
        dataset.restrict_safe(&reco.mask_within(self.safe_range.e_min, self.safe_range.e_max))?;

        log::debug!(
            "reduced observation {}: {} ON, {} OFF in {} region(s)",
            obs.obs_id,
            dataset.counts.iter().sum::<f64>(),
            match &dataset.background {
                Background::OnOff { counts_off, .. } => counts_off.iter().sum::<f64>(),
                _ => 0.0,
            },
            bkg.off_regions.len()
        );
        Ok(dataset)
    }

    /// Reduce every observation in parallel; failures become exclusions.
    pub fn reduce_all(&self, observations: &[Observation]) -> ReductionOutcome {
        let results: Vec<(String, Result<SpectrumDataset, AnalysisError>)> = observations
            .par_iter()
            .map(|obs| (obs.obs_id.clone(), self.reduce(obs)))
            .collect();

        let mut datasets = Vec::new();
        let mut excluded = Vec::new();
        for (obs_id, result) in results {
            match result {
                Ok(d) => datasets.push(d),
                Err(err) => {
                    log::warn!("excluding observation {obs_id}: {err}");
                    excluded.push((obs_id, err));
                }
            }
        }
        ReductionOutcome { datasets, excluded }
    }
}

fn missing_one(obs: &Observation, kind: IrfKind) -> AnalysisError {
    AnalysisError::MissingResponseComponent {
        obs_id: obs.obs_id.clone(),
        missing: vec![kind],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::WobbleRegionsFinder;
    use crate::domain::{EffectiveArea2D, EnergyDispersion2D, Event, Irfs, RadMax2D, SkyCoord};
    use chrono::{TimeZone, Utc};

    fn observation(obs_id: &str, with_rad_max: bool) -> Observation {
        let target = SkyCoord::new(83.63, 22.01);
        let pointing = SkyCoord::new(83.63, 22.41);
        let off = target.rotate_about(&pointing, 180.0);
        let mut events = Vec::new();
        // 3 ON events and 1 OFF event at 1 TeV, 1 ON event outside the reco axis.
        for k in 0..3 {
            events.push(Event {
                time: k as f64,
                energy: 1.0,
                position: target,
            });
        }
        events.push(Event {
            time: 5.0,
            energy: 1.0,
            position: off,
        });
        events.push(Event {
            time: 6.0,
            energy: 500.0,
            position: target,
        });

        Observation {
            obs_id: obs_id.to_string(),
            pointing,
            livetime: 1000.0,
            tstart: Utc.with_ymd_and_hms(2013, 11, 29, 23, 0, 0).unwrap(),
            tstop: Utc.with_ymd_and_hms(2013, 11, 29, 23, 20, 0).unwrap(),
            events,
            irfs: Irfs {
                aeff: Some(EffectiveArea2D {
                    energy_true: vec![0.01, 100.0],
                    offset: vec![0.0, 1.0],
                    data: vec![vec![1e4, 1e4], vec![1e4, 1e4]],
                }),
                edisp: Some(EnergyDispersion2D::gaussian(vec![0.01, 100.0], vec![0.0, 1.0], 0.1, 0.0)),
                rad_max: with_rad_max.then(|| RadMax2D::constant(0.1)),
            },
        }
    }

    fn reducer() -> SpectrumReducer {
        SpectrumReducer {
            geometry: SpectralGeometry {
                on_region: OnRegion::Point {
                    center: SkyCoord::new(83.63, 22.01),
                },
                energy_axis: EnergyAxis::log_spaced(0.01, 100.0, 20).unwrap(),
                energy_axis_true: EnergyAxis::log_spaced(0.01, 100.0, 28).unwrap(),
            },
            safe_range: EnergyRange { e_min: 0.08, e_max: 20.0 },
            required: IrfKind::ALL.to_vec(),
            finder: FinderConfig::Wobble(WobbleRegionsFinder { n_off_regions: 1 }),
            exclusions: Vec::new(),
        }
    }

    #[test]
    fn reduces_on_off_counts_and_exposure() {
        let ds = reducer().reduce(&observation("5029747", true)).unwrap();
        assert_eq!(ds.name, "5029747");
        assert!((ds.counts.iter().sum::<f64>() - 3.0).abs() < 1e-12);
        match &ds.background {
            Background::OnOff { counts_off, alpha } => {
                assert!((counts_off.iter().sum::<f64>() - 1.0).abs() < 1e-12);
                assert!(alpha.iter().all(|a| (a - 1.0).abs() < 1e-12));
            }
            other => panic!("unexpected background {other:?}"),
        }
        // 1e4 m² · 1e4 cm²/m² · 1000 s
        assert!(ds.exposure.iter().all(|e| (e - 1e11).abs() < 1.0));
        // 10 GeV .. 100 TeV in 20 bins: 5 bins per decade, safe 80 GeV .. 20 TeV.
        let n_safe = ds.mask_safe().iter().filter(|m| **m).count();
        assert_eq!(n_safe, 11);
        assert!(!ds.mask_safe()[0]);
    }

    #[test]
    fn missing_rad_max_is_excluded() {
        let outcome = reducer().reduce_all(&[observation("5029747", true), observation("5029749", false)]);
        assert_eq!(outcome.datasets.len(), 1);
        assert_eq!(outcome.excluded.len(), 1);
        assert_eq!(outcome.excluded[0].0, "5029749");
        assert!(matches!(
            outcome.excluded[0].1,
            AnalysisError::MissingResponseComponent { ref missing, .. } if missing == &vec![IrfKind::RadMax]
        ));
    }

    #[test]
    fn malformed_table_excludes_only_its_observation() {
        let mut broken = observation("5029748", true);
        if let Some(aeff) = broken.irfs.aeff.as_mut() {
            aeff.data.truncate(1);
        }
        let outcome = reducer().reduce_all(&[observation("5029747", true), broken]);
        assert_eq!(outcome.datasets.len(), 1);
        assert_eq!(outcome.datasets[0].name, "5029747");
        assert_eq!(outcome.excluded.len(), 1);
        assert_eq!(outcome.excluded[0].0, "5029748");
        assert!(matches!(outcome.excluded[0].1, AnalysisError::InvalidInput(_)));
    }

    #[test]
    fn absent_dispersion_is_never_replaced_by_a_default() {
        let mut obs = observation("5029747", true);
        obs.irfs.edisp = None;
        let mut r = reducer();
        r.required = vec![IrfKind::Aeff, IrfKind::RadMax];
        let err = r.reduce(&obs).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MissingResponseComponent { ref missing, .. } if missing == &vec![IrfKind::Edisp]
        ));
    }
}
