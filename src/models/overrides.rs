//! Problem-specific adjustments applied to a model file before fitting.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::models::set::ModelSet;
use crate::models::units::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    #[serde(default)]
    pub unit: Unit,
}

/// New bounds for one spectral parameter; `None` leaves a side unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundOverride {
    pub parameter: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOverrides {
    /// Target model; `None` selects the first model of the file.
    pub model: Option<String>,
    pub amplitude: Option<Quantity>,
    pub reference: Option<Quantity>,
    pub bounds: Vec<BoundOverride>,
}

impl Default for ModelOverrides {
    fn default() -> Self {
        Self {
            model: None,
            amplitude: Some(Quantity {
                value: 1e-11,
                unit: Unit::FluxPerTeV,
            }),
            reference: Some(Quantity {
                value: 500.0,
                unit: Unit::GeV,
            }),
            bounds: vec![
                BoundOverride {
                    parameter: "alpha".to_string(),
                    min: Some(1.0),
                    max: Some(4.0),
                },
                BoundOverride {
                    parameter: "beta".to_string(),
                    min: Some(0.0),
                    max: Some(1.0),
                },
            ],
        }
    }
}

impl ModelOverrides {
    /// Apply to `models`, returning the name of the model that was changed.
    pub fn apply(&self, models: &mut ModelSet) -> Result<String, AnalysisError> {
        let name = match &self.model {
            Some(name) => name.clone(),
            None => models
                .sky_models()
                .first()
                .map(|m| m.name.clone())
                .ok_or_else(|| AnalysisError::InvalidInput("model file defines no models".to_string()))?,
        };

        for (param, quantity) in [("amplitude", self.amplitude), ("reference", self.reference)] {
            if let Some(q) = quantity {
                let id = models.spectral_parameter(&name, param)?;
                let p = models.parameter_mut(id);
                // Bounds are expressed in the parameter unit; keep them consistent.
                let rescale = p.unit.factor() / q.unit.factor();
                p.min = p.min.map(|v| v * rescale);
                p.max = p.max.map(|v| v * rescale);
                p.value = q.value;
                p.unit = q.unit;
            }
        }

        for bound in &self.bounds {
            let id = models.spectral_parameter(&name, &bound.parameter)?;
            let p = models.parameter_mut(id);
            if bound.min.is_some() {
                p.min = bound.min;
            }
            if bound.max.is_some() {
                p.max = bound.max;
            }
        }

        log::debug!("applied model overrides to '{name}'");
        Ok(name)
    }
}
