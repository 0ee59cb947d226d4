//! Shared analysis pipeline used by the `run` and `fit` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! data store -> reduction -> joint collection -> model bindings -> joint fit -> flux points
//!
//! The CLI layer only decides which stages to run and how to print results.

use std::path::{Path, PathBuf};

use crate::datasets::{Datasets, SpectrumDataset};
use crate::domain::{CircleRegion, FluxPointsInput, FluxPointsJob, OnRegion, RunConfig};
use crate::error::AnalysisError;
use crate::estimators::{FluxPointEstimator, FluxPoints};
use crate::fit::{FitResult, JointLikelihoodFitter};
use crate::io::{
    DataStore, read_flux_points_table, read_models, read_spectrum_datasets, write_flux_points_csv, write_models,
};
use crate::models::ModelSet;
use crate::reduce::{SpectralGeometry, SpectrumReducer, stack_reduce};

/// The joint collection and the bound model set, ready to fit.
#[derive(Debug, Clone)]
pub struct JointAnalysis {
    pub datasets: Datasets,
    pub models: ModelSet,
    /// Names of the datasets reduced from the data store.
    pub reduced: Vec<String>,
    /// Observations left out, with the reason.
    pub excluded: Vec<(String, String)>,
}

/// Flux points of one job and where they were written.
#[derive(Debug, Clone)]
pub struct FluxPointsOutput {
    pub label: String,
    pub points: FluxPoints,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fit,
    FluxPoints,
}

/// All computed outputs of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub analysis: JointAnalysis,
    pub fit: FitResult,
    pub fitted_models: PathBuf,
    pub flux_points: Vec<FluxPointsOutput>,
}

/// Execute the pipeline up to `stage`.
///
/// A non-converged fit aborts before anything is written unless
/// `config.continue_on_fit_failure` is set.
pub fn run_pipeline(config: &RunConfig, input: &Path, output: &Path, stage: Stage) -> Result<RunOutput, AnalysisError> {
    let mut analysis = prepare(config, input)?;
    let fit = fit(&mut analysis, config)?;
    if !fit.converged {
        if config.continue_on_fit_failure {
            log::warn!("continuing with the starting parameters: {}", fit.message);
        } else {
            fit.ensure_converged()?;
        }
    }

    let fitted_models = output.join(&config.paths.fitted_models);
    write_models(&fitted_models, &analysis.models)?;

    let flux_points = match stage {
        Stage::Fit => Vec::new(),
        Stage::FluxPoints => config
            .flux_points
            .iter()
            .map(|job| run_flux_points_job(&analysis, config, job, output))
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(RunOutput {
        analysis,
        fit,
        fitted_models,
        flux_points,
    })
}

/// Load every input, reduce the observations and bind the models.
pub fn prepare(config: &RunConfig, input: &Path) -> Result<JointAnalysis, AnalysisError> {
    let paths = &config.paths;

    // 1) Observations with every required response component.
    let store = DataStore::from_dir(&input.join(&paths.data_store))?;
    let selection = store.observations(&config.required_irfs)?;
    let mut excluded: Vec<(String, String)> = Vec::new();
    for (obs_id, missing) in selection.excluded {
        let err = AnalysisError::MissingResponseComponent {
            obs_id: obs_id.clone(),
            missing,
        };
        log::warn!("excluding observation {obs_id}: {err}");
        excluded.push((obs_id, err.to_string()));
    }
    excluded.extend(selection.unreadable.into_iter().map(|(id, err)| (id, err.to_string())));

    // 2) ON/OFF reduction, one dataset per run.
    let reducer = reducer_from_config(config)?;
    log::info!("reducing {} observation(s)", selection.observations.len());
    let outcome = reducer.reduce_all(&selection.observations);
    excluded.extend(outcome.excluded.into_iter().map(|(id, err)| (id, err.to_string())));
    let reduced: Vec<String> = outcome.datasets.iter().map(|d| d.name.clone()).collect();

    // 3) External datasets.
    let mut table = read_flux_points_table(
        &input.join(&paths.flux_points_table),
        &paths.flux_points_name,
        paths.flux_points_reference,
    )?
    .dataset;
    table.ul_treatment = config.ul_treatment;
    let prereduced = read_spectrum_datasets(&input.join(&paths.prereduced_datasets))?;

    let mut datasets = Datasets::new();
    datasets.push(table)?;
    datasets.extend(prereduced)?;
    datasets.extend(outcome.datasets)?;

    // 4) Models, overrides and bindings.
    let mut models = read_models(&input.join(&paths.models))?;
    config.overrides.apply(&mut models)?;
    bind_models(&mut models, config, &reduced)?;

    log::info!(
        "joint collection: {} dataset(s) ({} reduced run(s), {} excluded)",
        datasets.len(),
        reduced.len(),
        excluded.len()
    );
    Ok(JointAnalysis {
        datasets,
        models,
        reduced,
        excluded,
    })
}

pub fn fit(analysis: &mut JointAnalysis, config: &RunConfig) -> Result<FitResult, AnalysisError> {
    JointLikelihoodFitter::new(config.optimizer.clone()).run(&analysis.datasets, &mut analysis.models)
}

fn reducer_from_config(config: &RunConfig) -> Result<SpectrumReducer, AnalysisError> {
    let on_region = match config.on_radius {
        Some(radius) => OnRegion::Circle {
            region: CircleRegion::new(config.target, radius),
        },
        None => OnRegion::Point { center: config.target },
    };
    Ok(SpectrumReducer {
        geometry: SpectralGeometry {
            on_region,
            energy_axis: config.energy_axis.to_axis()?,
            energy_axis_true: config.energy_axis_true.to_axis()?,
        },
        safe_range: config.safe_range,
        required: config.required_irfs.clone(),
        finder: config.background.clone(),
        exclusions: config.exclusions.clone(),
    })
}

/// Restrict the source model to its datasets and add the spectrum-only model
/// that shares the source spectrum with the reduced runs.
fn bind_models(models: &mut ModelSet, config: &RunConfig, reduced: &[String]) -> Result<(), AnalysisError> {
    let b = &config.bindings;
    models.set_datasets(&b.source_model, Some(b.source_datasets.clone()))?;
    let targets = b.spectrum_only_datasets.clone().unwrap_or_else(|| reduced.to_vec());
    if models.sky_index(&b.spectrum_only_model).is_ok() {
        models.set_datasets(&b.spectrum_only_model, Some(targets))?;
    } else {
        models.share_spectrum(&b.source_model, &b.spectrum_only_model, Some(targets))?;
    }
    Ok(())
}

fn run_flux_points_job(
    analysis: &JointAnalysis,
    config: &RunConfig,
    job: &FluxPointsJob,
    output: &Path,
) -> Result<FluxPointsOutput, AnalysisError> {
    let edges = job.edges.to_axis()?;
    let estimator = FluxPointEstimator::new(config.estimator.clone());
    let points = match &job.input {
        FluxPointsInput::Datasets { names } => {
            let subset = analysis.datasets.select(names)?;
            estimator.run(&subset, &analysis.models, &job.source, &edges)?
        }
        FluxPointsInput::StackedRuns { name, model } => {
            let runs: Vec<&SpectrumDataset> = analysis.datasets.spectra(&analysis.reduced);
            let stacked = stack_reduce(&runs, name)?;
            log::info!("stacked {} run(s) into {name}", runs.len());
            let mut subset = Datasets::new();
            subset.push(stacked)?;
            let mut models = analysis.models.clone();
            models.set_datasets(model, Some(vec![name.clone()]))?;
            estimator.run(&subset, &models, &job.source, &edges)?
        }
    };
    let path = output.join(&job.output);
    write_flux_points_csv(&path, &points)?;
    Ok(FluxPointsOutput {
        label: job.label.clone(),
        points,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::write_sample_inputs;

    #[test]
    fn synthetic_crab_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        let config = RunConfig::default();
        write_sample_inputs(&input, &config, 42).unwrap();

        let run = run_pipeline(&config, &input, &output, Stage::FluxPoints).unwrap();
        assert!(run.fit.converged, "{}", run.fit.message);

        // The run without rad_max is excluded, the other two are reduced.
        assert_eq!(run.analysis.reduced, vec!["5029747".to_string(), "5029748".to_string()]);
        assert!(run.analysis.excluded.iter().any(|(id, _)| id == "5029749"));
        assert_eq!(run.analysis.datasets.names()[..2], ["HAWC".to_string(), "Fermi-LAT".to_string()]);

        // Shared spectrum: one free parameter set for all instruments.
        assert_eq!(run.fit.parameters.len(), 3);
        let alpha = run.fit.parameter("Crab Nebula.alpha").unwrap().value;
        assert!(alpha > 2.0 && alpha < 2.7, "alpha = {alpha}");

        let written = read_models(&run.fitted_models).unwrap();
        assert!(written.covariance().is_some());
        assert!(written.sky_index("crab-nebula-spectrum-only").is_ok());

        assert_eq!(run.flux_points.len(), 2);
        let fermi = &run.flux_points[0];
        assert_eq!(fermi.points.points.len(), 5);
        let magic = &run.flux_points[1];
        assert_eq!(magic.points.points.len(), 6);
        for out in &run.flux_points {
            let table = read_flux_points_table(&out.path, &out.label, None).unwrap();
            assert!(table.row_errors.is_empty(), "{:?}", table.row_errors);
            assert_eq!(table.dataset.rows.len(), out.points.points.len());
        }
        assert!(fermi.points.points.iter().any(|p| !p.is_ul));
        assert!(magic.points.points.iter().any(|p| !p.is_ul));
    }

    #[test]
    fn non_convergence_stops_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        let mut config = RunConfig::default();
        write_sample_inputs(&input, &config, 1).unwrap();
        config.optimizer.max_iter = 1;
        config.optimizer.restarts = 0;

        let err = run_pipeline(&config, &input, &output, Stage::FluxPoints).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!output.join(&config.paths.fitted_models).exists());
    }
}
