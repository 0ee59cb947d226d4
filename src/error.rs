//! Error types.
//!
//! Two layers:
//! - [`AnalysisError`]: typed failures raised by the reduction/fit/estimation code.
//! - [`AppError`]: what the `jsed` binary reports (message + process exit code).
//!
//! Exit codes used by the binary:
//! - 2: input, configuration or file I/O problem
//! - 3: not enough usable data
//! - 4: numerical failure (e.g. the joint fit did not converge)

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::IrfKind;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures raised by the analysis library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The observation lacks a response component the reduction requires.
    #[error("observation {obs_id} is missing required response component(s): {}", kinds_label(.missing))]
    MissingResponseComponent { obs_id: String, missing: Vec<IrfKind> },

    /// Not a single OFF region could be placed for this observation.
    #[error("observation {obs_id} has no usable OFF region: {reason}")]
    InsufficientBackgroundRegions { obs_id: String, reason: String },

    /// The optimizer stopped without meeting its convergence criterion.
    #[error(
        "joint fit did not converge after {n_iter} iterations: {message} (total stat = {stat:.4}; {})",
        params_label(.parameters)
    )]
    FitNonConvergence {
        message: String,
        stat: f64,
        n_iter: usize,
        parameters: Vec<(String, f64)>,
    },

    #[error("invalid bounds for parameter {parameter}: {reason}")]
    InvalidParameterBounds { parameter: String, reason: String },

    /// A flux-point bin carries no information on the source normalization.
    #[error("flux-point bin [{e_min:.4}, {e_max:.4}] TeV is unconstrained: {reason}")]
    UnderConstrainedBin { e_min: f64, e_max: f64, reason: String },

    #[error("invalid energy axis: {0}")]
    InvalidEnergyAxis(String),

    #[error("incompatible dataset geometry: {0}")]
    IncompatibleGeometry(String),

    #[error("model {model} is bound to unknown dataset {dataset}")]
    UnknownDataset { model: String, dataset: String },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("mask length mismatch for dataset {dataset}: expected {expected}, found {found}")]
    MaskLength {
        dataset: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        AnalysisError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code used when this error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AnalysisError::MissingResponseComponent { .. }
            | AnalysisError::InsufficientBackgroundRegions { .. }
            | AnalysisError::UnderConstrainedBin { .. } => 3,
            AnalysisError::FitNonConvergence { .. } => 4,
            _ => 2,
        }
    }
}

impl From<AnalysisError> for AppError {
    fn from(value: AnalysisError) -> Self {
        AppError::new(value.exit_code(), value.to_string())
    }
}

fn kinds_label(kinds: &[IrfKind]) -> String {
    kinds
        .iter()
        .map(|k| k.label())
        .collect::<Vec<_>>()
        .join(", ")
}

fn params_label(params: &[(String, f64)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={value:.6e}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let missing = AnalysisError::MissingResponseComponent {
            obs_id: "42".to_string(),
            missing: vec![IrfKind::RadMax],
        };
        assert_eq!(missing.exit_code(), 3);
        assert!(missing.to_string().contains("rad_max"));

        let fit = AnalysisError::FitNonConvergence {
            message: "max iterations".to_string(),
            stat: 12.5,
            n_iter: 10,
            parameters: vec![("crab.amplitude".to_string(), 1e-11)],
        };
        let app: AppError = fit.into();
        assert_eq!(app.exit_code(), 4);
        assert!(app.to_string().contains("crab.amplitude"));
    }
}
