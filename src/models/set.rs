//! The owned parameter table and the models that reference it.
//!
//! All parameters live in one table inside [`ModelSet`]; spectral models hold
//! [`ParamId`]s into it and sky models hold a [`SpectralId`]. Two sky models
//! sharing a spectral model therefore share its parameters exactly, with no
//! aliasing of mutable state.

use nalgebra::DMatrix;

use crate::error::AnalysisError;
use crate::models::spectral::{Parameter, SpectralKind};

/// Index into the parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub usize);

/// Index into the spectral-model list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpectralId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct SpectralModel {
    pub kind: SpectralKind,
    /// Parameter ids in `kind.parameter_names()` order.
    pub params: Vec<ParamId>,
}

/// A named source component.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyModel {
    pub name: String,
    pub spectral: SpectralId,
    /// Datasets this model contributes to; `None` means every dataset.
    pub datasets_names: Option<Vec<String>>,
}

impl SkyModel {
    pub fn applies_to(&self, dataset: &str) -> bool {
        match &self.datasets_names {
            None => true,
            Some(names) => names.iter().any(|n| n == dataset),
        }
    }
}

/// Covariance of named parameters (physical units of each parameter).
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterCovariance {
    pub parameters: Vec<String>,
    pub matrix: DMatrix<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSet {
    parameters: Vec<Parameter>,
    spectral: Vec<SpectralModel>,
    sky: Vec<SkyModel>,
    covariance: Option<ParameterCovariance>,
}

impl ModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spectral model; parameters are reordered to the kind's order.
    pub fn add_spectral(&mut self, kind: SpectralKind, params: Vec<Parameter>) -> Result<SpectralId, AnalysisError> {
        let arranged = kind.arrange(params)?;
        let mut ids = Vec::with_capacity(arranged.len());
        for p in arranged {
            ids.push(ParamId(self.parameters.len()));
            self.parameters.push(p);
        }
        self.spectral.push(SpectralModel { kind, params: ids });
        Ok(SpectralId(self.spectral.len() - 1))
    }

    /// Add a sky model; names are unique.
    pub fn add_sky(
        &mut self,
        name: &str,
        spectral: SpectralId,
        datasets_names: Option<Vec<String>>,
    ) -> Result<usize, AnalysisError> {
        if self.sky.iter().any(|m| m.name == name) {
            return Err(AnalysisError::InvalidInput(format!("duplicate model name '{name}'")));
        }
        if spectral.0 >= self.spectral.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "model '{name}' references unknown spectral model #{}",
                spectral.0
            )));
        }
        self.sky.push(SkyModel {
            name: name.to_string(),
            spectral,
            datasets_names,
        });
        Ok(self.sky.len() - 1)
    }

    /// Add a sky model that reuses `source`'s spectral model (and parameters).
    pub fn share_spectrum(
        &mut self,
        source: &str,
        name: &str,
        datasets_names: Option<Vec<String>>,
    ) -> Result<usize, AnalysisError> {
        let spectral = self.sky_model(source)?.spectral;
        self.add_sky(name, spectral, datasets_names)
    }

    pub fn sky_models(&self) -> &[SkyModel] {
        &self.sky
    }

    pub fn sky_index(&self, name: &str) -> Result<usize, AnalysisError> {
        self.sky
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| AnalysisError::UnknownModel(name.to_string()))
    }

    pub fn sky_model(&self, name: &str) -> Result<&SkyModel, AnalysisError> {
        self.sky_index(name).map(|i| &self.sky[i])
    }

    /// Re-target a model to other datasets.
    pub fn set_datasets(&mut self, name: &str, datasets_names: Option<Vec<String>>) -> Result<(), AnalysisError> {
        let idx = self.sky_index(name)?;
        self.sky[idx].datasets_names = datasets_names;
        Ok(())
    }

    pub fn spectral_models(&self) -> &[SpectralModel] {
        &self.spectral
    }

    pub fn spectral(&self, id: SpectralId) -> &SpectralModel {
        &self.spectral[id.0]
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, id: ParamId) -> &Parameter {
        &self.parameters[id.0]
    }

    pub fn parameter_mut(&mut self, id: ParamId) -> &mut Parameter {
        &mut self.parameters[id.0]
    }

    /// Look up a parameter of a sky model's spectrum by name.
    pub fn spectral_parameter(&self, model: &str, parameter: &str) -> Result<ParamId, AnalysisError> {
        let sky = self.sky_model(model)?;
        self.spectral(sky.spectral)
            .params
            .iter()
            .copied()
            .find(|id| self.parameters[id.0].name == parameter)
            .ok_or_else(|| AnalysisError::InvalidInput(format!("model '{model}' has no parameter '{parameter}'")))
    }

    /// `model.parameter`, using the first sky model that owns the parameter.
    pub fn qualified_name(&self, id: ParamId) -> String {
        let param = &self.parameters[id.0].name;
        let owner = self
            .spectral
            .iter()
            .position(|s| s.params.contains(&id))
            .and_then(|sid| self.sky.iter().find(|m| m.spectral.0 == sid));
        match owner {
            Some(m) => format!("{}.{}", m.name, param),
            None => param.clone(),
        }
    }

    /// Sky models whose spectrum is `spectral`.
    pub fn sharing(&self, spectral: SpectralId) -> Vec<usize> {
        self.sky
            .iter()
            .enumerate()
            .filter(|(_, m)| m.spectral == spectral)
            .map(|(i, _)| i)
            .collect()
    }

    fn canonical_values(&self, spectral: SpectralId) -> Vec<f64> {
        self.spectral[spectral.0]
            .params
            .iter()
            .map(|id| self.parameters[id.0].canonical())
            .collect()
    }

    /// `dN/dE` of sky model `sky` at `energy` (TeV).
    pub fn dnde(&self, sky: usize, energy: f64) -> f64 {
        let sid = self.sky[sky].spectral;
        self.spectral[sid.0].kind.dnde(&self.canonical_values(sid), energy)
    }

    /// Band integrals of sky model `sky` over consecutive `edges`.
    pub fn integrals(&self, sky: usize, edges: &[f64]) -> Vec<f64> {
        let sid = self.sky[sky].spectral;
        let kind = self.spectral[sid.0].kind;
        let values = self.canonical_values(sid);
        edges
            .windows(2)
            .map(|w| kind.integral(&values, w[0], w[1]))
            .collect()
    }

    /// Validate every parameter's value and bounds.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for i in 0..self.parameters.len() {
            let id = ParamId(i);
            self.parameters[i].validate(&self.qualified_name(id))?;
        }
        Ok(())
    }

    pub fn covariance(&self) -> Option<&ParameterCovariance> {
        self.covariance.as_ref()
    }

    pub fn set_covariance(&mut self, covariance: Option<ParameterCovariance>) {
        self.covariance = covariance;
    }
}
