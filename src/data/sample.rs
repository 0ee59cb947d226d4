//! Synthetic input tree for the Crab multi-instrument analysis.
//!
//! Everything is drawn from one "true" log-parabola (the MAGIC Crab fit) so a
//! joint fit over the generated inputs should recover it:
//! - MAGIC-like data store: three wobble runs with point-like responses; the
//!   last run carries no `rad_max` table and is excluded at load time
//! - Fermi-LAT-like pre-reduced dataset with a known background model
//! - HAWC-like flux-point table (normalization type when a reference shape is
//!   configured), last band an upper limit
//! - a starting model file with the source component
//!
//! Generation is deterministic for a given seed.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, Poisson};

use crate::datasets::{Background, SpectrumDataset, edisp_diagonal};
use crate::domain::{
    EffectiveArea2D, EnergyAxis, EnergyDispersion2D, Event, Irfs, M2_TO_CM2, Observation, RadMax2D, RunConfig,
    SkyCoord,
};
use crate::error::AnalysisError;
use crate::io::{write_data_store, write_models, write_spectrum_datasets};
use crate::models::{ModelSet, Parameter, ReferenceShape, SpectralKind, Unit};

/// Run ids and whether the run carries a `rad_max` table.
const MAGIC_RUNS: [(&str, bool); 3] = [("5029747", true), ("5029748", true), ("5029749", false)];
/// Live time per run (s).
const RUN_LIVETIME: f64 = 2400.0;
/// Wobble offset of the pointing from the target (deg).
const WOBBLE_OFFSET: f64 = 0.4;
const RAD_MAX: f64 = 0.14;
/// Background events are spread uniformly over this radius around the pointing (deg).
const FOV_RADIUS: f64 = 1.5;
/// Background events per deg² per run.
const BKG_DENSITY: f64 = 600.0;
const BKG_INDEX: f64 = 2.7;
const BKG_E_MIN: f64 = 0.03;
const BKG_E_MAX: f64 = 100.0;
/// Relative energy resolution of the simulated telescope.
const EDISP_SIGMA: f64 = 0.2;
/// 2020-11-18T23:00:00Z
const FIRST_RUN_START: i64 = 1_605_740_400;

const FERMI_EXPOSURE: f64 = 3e11;
const FERMI_LIVETIME: f64 = 3.15e8;
const HAWC_REL_ERROR: f64 = 0.06;

/// What was written.
#[derive(Debug, Clone)]
pub struct SampleSummary {
    /// `(obs_id, number of events)` per generated run.
    pub runs: Vec<(String, usize)>,
    pub files: Vec<PathBuf>,
}

/// The spectrum every synthetic input is drawn from.
pub fn true_crab_models() -> Result<ModelSet, AnalysisError> {
    let mut models = ModelSet::new();
    let sid = models.add_spectral(
        SpectralKind::LogParabola,
        vec![
            Parameter::new("amplitude", 3.23e-11, Unit::FluxPerTeV),
            Parameter::new("reference", 1.0, Unit::TeV).frozen(),
            Parameter::new("alpha", 2.47, Unit::Dimensionless),
            Parameter::new("beta", 0.24 / std::f64::consts::LN_10, Unit::Dimensionless),
        ],
    )?;
    models.add_sky("truth", sid, None)?;
    Ok(models)
}

/// Write a complete input tree under `dir`, at the locations named in `config.paths`.
pub fn write_sample_inputs(dir: &Path, config: &RunConfig, seed: u64) -> Result<SampleSummary, AnalysisError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| AnalysisError::InvalidInput(format!("noise distribution: {e}")))?;
    let truth = true_crab_models()?;
    let paths = &config.paths;
    let mut files = Vec::new();

    // MAGIC-like runs.
    let mut observations = Vec::with_capacity(MAGIC_RUNS.len());
    let mut tstart = FIRST_RUN_START;
    for (k, &(obs_id, with_rad_max)) in MAGIC_RUNS.iter().enumerate() {
        let position_angle = [0.0, 180.0, 90.0][k % 3];
        let pointing = config.target.offset_by(position_angle, WOBBLE_OFFSET);
        let plan = RunPlan {
            obs_id,
            target: config.target,
            pointing,
            tstart,
            with_rad_max,
        };
        let obs = simulate_run(&mut rng, &normal, &truth, &plan)?;
        log::info!("simulated run {obs_id}: {} events", obs.events.len());
        observations.push(obs);
        tstart += RUN_LIVETIME as i64 + 300;
    }
    let store_dir = dir.join(&paths.data_store);
    write_data_store(&store_dir, &observations)?;
    files.push(store_dir);

    // Fermi-LAT-like dataset.
    let fermi = fermi_dataset(&mut rng, &truth, "Fermi-LAT")?;
    let fermi_path = dir.join(&paths.prereduced_datasets);
    write_spectrum_datasets(&fermi_path, &[fermi])?;
    files.push(fermi_path);

    // HAWC-like flux points.
    let hawc_path = dir.join(&paths.flux_points_table);
    write_flux_point_table(&mut rng, &normal, &truth, &hawc_path, paths.flux_points_reference)?;
    files.push(hawc_path);

    // Starting model, deliberately away from the truth.
    let models_path = dir.join(&paths.models);
    write_models(&models_path, &starting_models(&config.bindings.source_model)?)?;
    files.push(models_path);

    Ok(SampleSummary {
        runs: observations
            .iter()
            .map(|o| (o.obs_id.clone(), o.events.len()))
            .collect(),
        files,
    })
}

fn starting_models(name: &str) -> Result<ModelSet, AnalysisError> {
    let mut models = ModelSet::new();
    let sid = models.add_spectral(
        SpectralKind::LogParabola,
        vec![
            Parameter::new("amplitude", 1e-12, Unit::FluxPerTeV),
            Parameter::new("reference", 1.0, Unit::TeV).frozen(),
            Parameter::new("alpha", 2.0, Unit::Dimensionless),
            Parameter::new("beta", 0.1, Unit::Dimensionless),
        ],
    )?;
    models.add_sky(name, sid, None)?;
    Ok(models)
}

fn magic_irfs(with_rad_max: bool) -> Irfs {
    let energy_true: Vec<f64> = (0..=40).map(|k| 0.01 * 10f64.powf(0.1 * k as f64)).collect();
    let offset = vec![0.0, 0.5, 1.0, 1.5, 2.5];
    let data = offset
        .iter()
        .map(|o| {
            energy_true
                .iter()
                .map(|e| aeff_m2(*e) * (-0.5_f64 * o * o).exp())
                .collect()
        })
        .collect();
    Irfs {
        aeff: Some(EffectiveArea2D {
            energy_true: energy_true.clone(),
            offset: offset.clone(),
            data,
        }),
        edisp: Some(EnergyDispersion2D::gaussian(energy_true, offset, EDISP_SIGMA, 0.0)),
        rad_max: with_rad_max.then(|| RadMax2D::constant(RAD_MAX)),
    }
}

/// On-axis effective area (m²) with a low-energy threshold around 150 GeV.
fn aeff_m2(energy: f64) -> f64 {
    1e5 / (1.0 + (0.15 / energy).powi(3))
}

struct RunPlan<'a> {
    obs_id: &'a str,
    target: SkyCoord,
    pointing: SkyCoord,
    /// Unix seconds.
    tstart: i64,
    with_rad_max: bool,
}

fn simulate_run(
    rng: &mut StdRng,
    normal: &Normal<f64>,
    truth: &ModelSet,
    plan: &RunPlan,
) -> Result<Observation, AnalysisError> {
    let irfs = magic_irfs(plan.with_rad_max);
    let offset = plan.pointing.separation(&plan.target);
    let mut events = Vec::new();

    // Source photons: point-like responses count only events inside the cut,
    // so every signal event lands within rad_max of the target.
    let fine = EnergyAxis::log_spaced(0.02, 60.0, 240)?;
    let integrals = truth.integrals(0, fine.edges());
    for (i, flux) in integrals.iter().enumerate() {
        let aeff_cm2 = irfs
            .aeff
            .as_ref()
            .map_or(0.0, |a| a.evaluate(fine.center(i), offset))
            * M2_TO_CM2;
        let n = poisson(rng, flux * aeff_cm2 * RUN_LIVETIME) as usize;
        for _ in 0..n {
            let e_true = log_uniform(rng, fine.lo(i), fine.hi(i));
            events.push(Event {
                time: rng.r#gen::<f64>() * RUN_LIVETIME,
                energy: smear(rng, normal, e_true),
                position: uniform_disk(rng, &plan.target, 0.9 * RAD_MAX),
            });
        }
    }

    // Isotropic hadronic background.
    let area = std::f64::consts::PI * FOV_RADIUS * FOV_RADIUS;
    let n_bkg = poisson(rng, BKG_DENSITY * area) as usize;
    for _ in 0..n_bkg {
        let e_true = power_law_draw(rng, BKG_INDEX, BKG_E_MIN, BKG_E_MAX);
        events.push(Event {
            time: rng.r#gen::<f64>() * RUN_LIVETIME,
            energy: smear(rng, normal, e_true),
            position: uniform_disk(rng, &plan.pointing, FOV_RADIUS),
        });
    }
    events.sort_by(|a, b| a.time.total_cmp(&b.time));

    Ok(Observation {
        obs_id: plan.obs_id.to_string(),
        pointing: plan.pointing,
        livetime: RUN_LIVETIME,
        tstart: timestamp(plan.tstart)?,
        tstop: timestamp(plan.tstart + RUN_LIVETIME as i64)?,
        events,
        irfs,
    })
}

fn fermi_dataset(rng: &mut StdRng, truth: &ModelSet, name: &str) -> Result<SpectrumDataset, AnalysisError> {
    let axis = EnergyAxis::log_spaced(0.01, 2.0, 12)?;
    let n = axis.nbin();
    let mut dataset = SpectrumDataset::new(
        name,
        axis.clone(),
        axis.clone(),
        vec![0.0; n],
        vec![FERMI_EXPOSURE; n],
        edisp_diagonal(&axis, &axis),
        Background::Model { counts: vec![0.0; n] },
        FERMI_LIVETIME,
    )?;
    let signal = dataset.npred_signal(truth, &[0]);
    let background: Vec<f64> = signal.iter().map(|s| 0.05 * s + 2.0).collect();
    dataset.counts = signal
        .iter()
        .zip(&background)
        .map(|(s, b)| poisson(rng, s + b))
        .collect();
    dataset.background = Background::Model { counts: background };
    Ok(dataset)
}

fn write_flux_point_table(
    rng: &mut StdRng,
    normal: &Normal<f64>,
    truth: &ModelSet,
    path: &Path,
    reference: Option<ReferenceShape>,
) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| AnalysisError::parse(path, e))?;
    let prefix = if reference.is_some() { "norm" } else { "dnde" };
    let header = [
        "e_min".to_string(),
        "e_max".to_string(),
        "e_ref".to_string(),
        prefix.to_string(),
        format!("{prefix}_errn"),
        format!("{prefix}_errp"),
        "is_ul".to_string(),
        format!("{prefix}_ul"),
    ];
    writer.write_record(&header).map_err(|e| AnalysisError::parse(path, e))?;

    let axis = EnergyAxis::log_spaced(1.0, 100.0, 8)?;
    for i in 0..axis.nbin() {
        let e_ref = axis.center(i);
        let scale = reference.map_or(1.0, |shape| shape.dnde(e_ref));
        let true_value = truth.dnde(0, e_ref) / scale;
        let err = HAWC_REL_ERROR * true_value;
        let last = i + 1 == axis.nbin();
        let record = if last {
            vec![
                fmt(axis.lo(i)),
                fmt(axis.hi(i)),
                fmt(e_ref),
                String::new(),
                String::new(),
                String::new(),
                "true".to_string(),
                fmt(1.8 * true_value),
            ]
        } else {
            let measured = true_value + err * normal.sample(rng);
            vec![
                fmt(axis.lo(i)),
                fmt(axis.hi(i)),
                fmt(e_ref),
                fmt(measured),
                fmt(err),
                fmt(err),
                "false".to_string(),
                String::new(),
            ]
        };
        writer.write_record(&record).map_err(|e| AnalysisError::parse(path, e))?;
    }
    writer.flush().map_err(|e| AnalysisError::io(path, e))
}

fn fmt(v: f64) -> String {
    format!("{v:e}")
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AnalysisError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| AnalysisError::InvalidInput(format!("invalid timestamp {secs}")))
}

fn poisson(rng: &mut StdRng, mean: f64) -> f64 {
    match Poisson::new(mean) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

fn log_uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    (lo.ln() + rng.r#gen::<f64>() * (hi / lo).ln()).exp()
}

/// Inverse-CDF draw from `E^-index` on `[e_min, e_max]`.
fn power_law_draw(rng: &mut StdRng, index: f64, e_min: f64, e_max: f64) -> f64 {
    let g = 1.0 - index;
    let u: f64 = rng.r#gen();
    let lo = e_min.powf(g);
    let hi = e_max.powf(g);
    (lo + u * (hi - lo)).powf(1.0 / g)
}

fn smear(rng: &mut StdRng, normal: &Normal<f64>, e_true: f64) -> f64 {
    (e_true * (1.0 + EDISP_SIGMA * normal.sample(rng))).max(1e-3)
}

fn uniform_disk(rng: &mut StdRng, center: &SkyCoord, radius: f64) -> SkyCoord {
    let position_angle = 360.0 * rng.r#gen::<f64>();
    let separation = radius * rng.r#gen::<f64>().sqrt();
    center.offset_by(position_angle, separation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IrfKind;
    use crate::io::{DataStore, read_flux_points_table, read_models, read_spectrum_datasets};

    #[test]
    fn writes_a_loadable_input_tree() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::default();
        let summary = write_sample_inputs(dir.path(), &config, 7).unwrap();
        assert_eq!(summary.runs.len(), 3);
        assert!(summary.runs.iter().all(|(_, n)| *n > 100));

        let store = DataStore::from_dir(&dir.path().join(&config.paths.data_store)).unwrap();
        let selection = store.observations(&IrfKind::ALL).unwrap();
        assert_eq!(selection.observations.len(), 2);
        assert_eq!(selection.excluded, vec![("5029749".to_string(), vec![IrfKind::RadMax])]);

        let fermi = read_spectrum_datasets(&dir.path().join(&config.paths.prereduced_datasets)).unwrap();
        assert_eq!(fermi[0].name, "Fermi-LAT");
        assert!(fermi[0].counts.iter().sum::<f64>() > 100.0);

        let table = read_flux_points_table(
            &dir.path().join(&config.paths.flux_points_table),
            &config.paths.flux_points_name,
            config.paths.flux_points_reference,
        )
        .unwrap();
        assert_eq!(table.dataset.rows.len(), 8);
        assert_eq!(table.dataset.rows.iter().filter(|r| r.is_ul).count(), 1);

        let models = read_models(&dir.path().join(&config.paths.models)).unwrap();
        assert!(models.sky_index(&config.bindings.source_model).is_ok());
    }

    #[test]
    fn same_seed_same_counts() {
        let truth = true_crab_models().unwrap();
        let a = fermi_dataset(&mut StdRng::seed_from_u64(3), &truth, "f").unwrap();
        let b = fermi_dataset(&mut StdRng::seed_from_u64(3), &truth, "f").unwrap();
        assert_eq!(a.counts, b.counts);
    }

    #[test]
    fn power_law_draw_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let e = power_law_draw(&mut rng, BKG_INDEX, BKG_E_MIN, BKG_E_MAX);
            assert!((BKG_E_MIN..=BKG_E_MAX * (1.0 + 1e-12)).contains(&e));
        }
    }
}
