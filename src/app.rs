//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and loads the run configuration
//! - runs the joint analysis pipeline
//! - prints reports
//! - writes synthetic input trees

use std::path::Path;

use clap::Parser;

use crate::cli::{Command, RunArgs, SimulateArgs};
use crate::domain::RunConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `jsed` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args, pipeline::Stage::FluxPoints),
        Command::Fit(args) => handle_run(args, pipeline::Stage::Fit),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_run(args: RunArgs, stage: pipeline::Stage) -> Result<(), AppError> {
    let config = config_from_args(&args)?;
    let run = pipeline::run_pipeline(&config, &args.input, &args.output, stage)?;

    for (obs_id, reason) in &run.analysis.excluded {
        println!("excluded {obs_id}: {reason}");
    }
    println!("{}", crate::report::format_datasets(&run.analysis.datasets));
    println!("{}", crate::report::format_fit_summary(&run.fit));
    println!("{}", crate::report::format_parameter_table(&run.fit));
    println!("Fitted models written to {}", run.fitted_models.display());

    for out in &run.flux_points {
        println!("{}", crate::report::format_flux_points(&out.label, &out.points));
        println!("Written to {}", out.path.display());
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = load_config(args.config.as_deref())?;
    let summary = crate::data::write_sample_inputs(&args.output, &config, args.seed)?;
    for (obs_id, n_events) in &summary.runs {
        println!("run {obs_id}: {n_events} events");
    }
    for file in &summary.files {
        println!("wrote {}", file.display());
    }
    Ok(())
}

/// Config file (or built-in defaults) with the CLI overrides applied.
pub fn config_from_args(args: &RunArgs) -> Result<RunConfig, AppError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(treatment) = args.ul_treatment {
        config.ul_treatment = treatment;
    }
    config.continue_on_fit_failure |= args.continue_on_fit_failure;
    Ok(config)
}

fn load_config(path: Option<&Path>) -> Result<RunConfig, AppError> {
    match path {
        Some(path) => {
            log::info!("loading run configuration from {}", path.display());
            Ok(RunConfig::from_yaml_file(path)?)
        }
        None => Ok(RunConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UpperLimitTreatment;
    use std::path::PathBuf;

    fn args(config: Option<PathBuf>) -> RunArgs {
        RunArgs {
            config,
            input: PathBuf::from("."),
            output: PathBuf::from("."),
            ul_treatment: Some(UpperLimitTreatment::Penalize),
            continue_on_fit_failure: true,
        }
    }

    #[test]
    fn cli_flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "ul_treatment: ignore\non_radius: 0.2\n").unwrap();

        let config = config_from_args(&args(Some(path))).unwrap();
        assert_eq!(config.ul_treatment, UpperLimitTreatment::Penalize);
        assert!(config.continue_on_fit_failure);
        assert_eq!(config.on_radius, Some(0.2));
        assert_eq!(config.bindings.source_model, "Crab Nebula");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = config_from_args(&args(Some(PathBuf::from("/nonexistent/run.yaml")))).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
