//! Model definition files (YAML).
//!
//! ```yaml
//! components:
//!   - name: Crab Nebula
//!     spectral:
//!       type: LogParabolaSpectralModel
//!       parameters:
//!         - { name: amplitude, value: 1.0e-11, unit: cm-2 s-1 TeV-1 }
//!         - ...
//!     datasets_names: [Fermi-LAT, HAWC]
//!   - name: crab-nebula-spectrum-only
//!     spectral_link: Crab Nebula
//! covariance:
//!   parameters: [Crab Nebula.amplitude, ...]
//!   matrix: [[...], ...]
//! ```
//!
//! A component either defines its own spectrum or links to the spectrum of an
//! earlier component, in which case both share the same parameters. Unknown
//! keys (e.g. spatial models) are ignored.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::models::{ModelSet, Parameter, ParameterCovariance, SpectralId, SpectralKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelFile {
    components: Vec<ComponentDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    covariance: Option<CovarianceDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ComponentDef {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spectral: Option<SpectralDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spectral_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    datasets_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpectralDef {
    #[serde(rename = "type")]
    kind: SpectralKind,
    parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CovarianceDef {
    parameters: Vec<String>,
    matrix: Vec<Vec<f64>>,
}

pub fn read_models(path: &Path) -> Result<ModelSet, AnalysisError> {
    let text = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
    let file: ModelFile = serde_yaml::from_str(&text).map_err(|e| AnalysisError::parse(path, e))?;
    let models = build_models(file).map_err(|e| match e {
        AnalysisError::InvalidInput(message) => AnalysisError::parse(path, message),
        other => other,
    })?;
    log::info!("loaded {} model(s) from {}", models.sky_models().len(), path.display());
    Ok(models)
}

/// Write `models` (values, errors, bounds and covariance); parent
/// directories are created and an existing file is replaced.
pub fn write_models(path: &Path, models: &ModelSet) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    let text = serde_yaml::to_string(&to_file(models)).map_err(|e| AnalysisError::parse(path, e))?;
    fs::write(path, text).map_err(|e| AnalysisError::io(path, e))?;
    log::info!("wrote fitted models to {}", path.display());
    Ok(())
}

fn build_models(file: ModelFile) -> Result<ModelSet, AnalysisError> {
    let mut models = ModelSet::new();
    for c in file.components {
        match (c.spectral, c.spectral_link) {
            (Some(spectral), None) => {
                let sid = models.add_spectral(spectral.kind, spectral.parameters)?;
                models.add_sky(&c.name, sid, c.datasets_names)?;
            }
            (None, Some(link)) => {
                models.share_spectrum(&link, &c.name, c.datasets_names).map_err(|_| {
                    AnalysisError::InvalidInput(format!(
                        "component '{}' links to '{link}', which is not defined before it",
                        c.name
                    ))
                })?;
            }
            _ => {
                return Err(AnalysisError::InvalidInput(format!(
                    "component '{}' needs exactly one of `spectral` or `spectral_link`",
                    c.name
                )));
            }
        }
    }
    if let Some(cov) = file.covariance {
        let n = cov.parameters.len();
        if cov.matrix.len() != n || cov.matrix.iter().any(|row| row.len() != n) {
            return Err(AnalysisError::InvalidInput(format!(
                "covariance matrix must be {n}x{n}"
            )));
        }
        let matrix = DMatrix::from_fn(n, n, |i, j| cov.matrix[i][j]);
        models.set_covariance(Some(ParameterCovariance {
            parameters: cov.parameters,
            matrix,
        }));
    }
    Ok(models)
}

fn to_file(models: &ModelSet) -> ModelFile {
    let mut first_owner: HashMap<SpectralId, String> = HashMap::new();
    let components = models
        .sky_models()
        .iter()
        .map(|sky| {
            let (spectral, spectral_link) = match first_owner.get(&sky.spectral) {
                Some(owner) => (None, Some(owner.clone())),
                None => {
                    first_owner.insert(sky.spectral, sky.name.clone());
                    let spectral = models.spectral(sky.spectral);
                    let parameters = spectral.params.iter().map(|id| models.parameter(*id).clone()).collect();
                    (
                        Some(SpectralDef {
                            kind: spectral.kind,
                            parameters,
                        }),
                        None,
                    )
                }
            };
            ComponentDef {
                name: sky.name.clone(),
                spectral,
                spectral_link,
                datasets_names: sky.datasets_names.clone(),
            }
        })
        .collect();
    let covariance = models.covariance().map(|cov| CovarianceDef {
        parameters: cov.parameters.clone(),
        matrix: cov
            .matrix
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect(),
    });
    ModelFile { components, covariance }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Unit;

    fn crab() -> ModelSet {
        let mut models = ModelSet::new();
        let sid = models
            .add_spectral(
                SpectralKind::LogParabola,
                vec![
                    Parameter::new("amplitude", 3.5e-11, Unit::FluxPerTeV),
                    Parameter::new("reference", 500.0, Unit::GeV).frozen(),
                    Parameter::new("alpha", 2.4, Unit::Dimensionless).bounded(Some(1.0), Some(4.0)),
                    Parameter::new("beta", 0.1, Unit::Dimensionless).bounded(Some(0.0), Some(1.0)),
                ],
            )
            .unwrap();
        models
            .add_sky("Crab Nebula", sid, Some(vec!["Fermi-LAT".to_string(), "HAWC".to_string()]))
            .unwrap();
        models
            .share_spectrum("Crab Nebula", "crab-nebula-spectrum-only", None)
            .unwrap();
        models
    }

    #[test]
    fn write_then_read_reproduces_models() {
        let mut models = crab();
        let id = models.spectral_parameter("Crab Nebula", "alpha").unwrap();
        models.parameter_mut(id).error = Some(0.03);
        models.set_covariance(Some(ParameterCovariance {
            parameters: vec!["Crab Nebula.amplitude".to_string(), "Crab Nebula.alpha".to_string()],
            matrix: DMatrix::from_row_slice(2, 2, &[1e-24, 2e-14, 2e-14, 9e-4]),
        }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("fit.yaml");
        write_models(&path, &models).unwrap();
        let back = read_models(&path).unwrap();
        assert_eq!(back, models);

        // Shared spectrum survives as a link, not a copy.
        let a = back.sky_model("Crab Nebula").unwrap().spectral;
        let b = back.sky_model("crab-nebula-spectrum-only").unwrap().spectral;
        assert_eq!(a, b);
        assert_eq!(back.parameters().len(), 4);
    }

    #[test]
    fn link_to_later_component_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(
            &path,
            "components:\n  - name: b\n    spectral_link: a\n  - name: a\n    spectral:\n      type: ConstantSpectralModel\n      parameters:\n        - { name: const, value: 1.0e-12, unit: cm-2 s-1 TeV-1 }\n",
        )
        .unwrap();
        let err = read_models(&path).unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { .. }));
    }

    #[test]
    fn unknown_component_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(
            &path,
            "components:\n  - name: src\n    type: SkyModel\n    spatial:\n      type: PointSpatialModel\n    spectral:\n      type: PowerLawSpectralModel\n      parameters:\n        - { name: index, value: 2.3 }\n        - { name: amplitude, value: 1.0e-12, unit: cm-2 s-1 TeV-1 }\n        - { name: reference, value: 1.0, unit: TeV, frozen: true }\n",
        )
        .unwrap();
        let models = read_models(&path).unwrap();
        let id = models.spectral_parameter("src", "index").unwrap();
        assert!((models.parameter(id).value - 2.3).abs() < 1e-12);
        assert!(models.sky_models()[0].datasets_names.is_none());
    }
}
