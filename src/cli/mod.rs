//! Command-line parsing for the joint spectral fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! reduction/fitting code; `app` turns these arguments into a `RunConfig`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::UpperLimitTreatment;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "jsed",
    version,
    about = "Joint multi-instrument gamma-ray spectral fit (reduction, joint likelihood, flux points)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reduce the observations, run the joint fit and compute flux points.
    Run(RunArgs),
    /// Joint fit only: reduce, fit and write the fitted model file.
    Fit(RunArgs),
    /// Write a synthetic input tree (data store, Fermi datasets, HAWC table, models).
    Simulate(SimulateArgs),
}

/// Options shared by `run` and `fit`.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// YAML run configuration; absent keys keep the built-in Crab defaults.
    #[arg(short, long, value_name = "YAML")]
    pub config: Option<PathBuf>,

    /// Directory input paths are resolved against.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub input: PathBuf,

    /// Directory output paths are resolved against.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// How flux-point upper limits enter the joint statistic (overrides the config).
    #[arg(long, value_enum)]
    pub ul_treatment: Option<UpperLimitTreatment>,

    /// Compute flux points even if the joint fit did not converge.
    #[arg(long)]
    pub continue_on_fit_failure: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Destination directory.
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// YAML run configuration naming where the files go.
    #[arg(short, long, value_name = "YAML")]
    pub config: Option<PathBuf>,
}
