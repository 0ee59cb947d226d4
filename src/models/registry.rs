//! Explicit model ↔ dataset bindings.
//!
//! The registry is built from the sky models' dataset lists and the ordered
//! dataset names of a collection. It answers both directions:
//! - which models contribute to a dataset's prediction
//! - which datasets a model is fitted to
//!
//! and produces the deduplicated free-parameter list in a stable order.

use std::collections::HashSet;

use crate::error::AnalysisError;
use crate::models::set::{ModelSet, ParamId};

/// What to do with a binding that names a dataset outside the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    /// Configuration error (joint fit).
    Strict,
    /// The binding is dropped (sub-collections, e.g. flux points).
    IgnoreMissing,
}

#[derive(Debug, Clone)]
pub struct ModelBindingRegistry {
    dataset_names: Vec<String>,
    dataset_models: Vec<Vec<usize>>,
    model_datasets: Vec<Vec<usize>>,
}

impl ModelBindingRegistry {
    pub fn build(models: &ModelSet, dataset_names: &[String], mode: BindingMode) -> Result<Self, AnalysisError> {
        let mut seen = HashSet::new();
        if let Some(dup) = dataset_names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(AnalysisError::InvalidInput(format!("duplicate dataset name '{dup}'")));
        }

        let mut dataset_models = vec![Vec::new(); dataset_names.len()];
        let mut model_datasets = vec![Vec::new(); models.sky_models().len()];

        for (mi, model) in models.sky_models().iter().enumerate() {
            if let (Some(names), BindingMode::Strict) = (&model.datasets_names, mode) {
                if let Some(unknown) = names.iter().find(|n| !dataset_names.contains(n)) {
                    return Err(AnalysisError::UnknownDataset {
                        model: model.name.clone(),
                        dataset: unknown.clone(),
                    });
                }
            }
            for (di, dataset) in dataset_names.iter().enumerate() {
                if model.applies_to(dataset) {
                    dataset_models[di].push(mi);
                    model_datasets[mi].push(di);
                }
            }
        }

        Ok(Self {
            dataset_names: dataset_names.to_vec(),
            dataset_models,
            model_datasets,
        })
    }

    pub fn dataset_names(&self) -> &[String] {
        &self.dataset_names
    }

    /// Sky-model indices contributing to dataset `dataset`.
    pub fn models_for(&self, dataset: usize) -> &[usize] {
        &self.dataset_models[dataset]
    }

    /// Dataset indices sky model `model` is bound to.
    pub fn datasets_for(&self, model: usize) -> &[usize] {
        &self.model_datasets[model]
    }

    /// Re-target one model to a new dataset list (`None`: all datasets).
    ///
    /// On error neither the models nor the registry change.
    pub fn set_datasets(
        &mut self,
        models: &mut ModelSet,
        model: &str,
        datasets_names: Option<Vec<String>>,
        mode: BindingMode,
    ) -> Result<(), AnalysisError> {
        let mut candidate = models.clone();
        candidate.set_datasets(model, datasets_names)?;
        let registry = Self::build(&candidate, &self.dataset_names, mode)?;
        *models = candidate;
        *self = registry;
        Ok(())
    }

    /// Distinct non-frozen parameters, walking datasets in order and then
    /// each dataset's bound models in model order.
    pub fn free_parameters(&self, models: &ModelSet) -> Vec<ParamId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for bound in &self.dataset_models {
            for &mi in bound {
                let spectral = models.spectral(models.sky_models()[mi].spectral);
                for &id in &spectral.params {
                    if !models.parameter(id).frozen && seen.insert(id) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectral::SpectralKind;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn joint_models() -> ModelSet {
        let mut models = ModelSet::new();
        let sid = models
            .add_spectral(SpectralKind::LogParabola, SpectralKind::LogParabola.default_parameters())
            .unwrap();
        models
            .add_sky("Crab Nebula", sid, Some(names(&["Fermi-LAT", "HAWC"])))
            .unwrap();
        models
            .share_spectrum("Crab Nebula", "spectrum-only", Some(names(&["5029747", "5029748"])))
            .unwrap();
        models
    }

    #[test]
    fn bindings_in_both_directions() {
        let models = joint_models();
        let datasets = names(&["HAWC", "Fermi-LAT", "5029747", "5029748"]);
        let reg = ModelBindingRegistry::build(&models, &datasets, BindingMode::Strict).unwrap();
        assert_eq!(reg.models_for(0), &[0]);
        assert_eq!(reg.models_for(2), &[1]);
        assert_eq!(reg.datasets_for(0), &[0, 1]);
        assert_eq!(reg.datasets_for(1), &[2, 3]);
    }

    #[test]
    fn shared_parameters_appear_once() {
        let models = joint_models();
        let datasets = names(&["HAWC", "Fermi-LAT", "5029747", "5029748"]);
        let reg = ModelBindingRegistry::build(&models, &datasets, BindingMode::Strict).unwrap();
        // amplitude, alpha, beta (reference frozen)
        assert_eq!(reg.free_parameters(&models).len(), 3);
    }

    #[test]
    fn unknown_dataset_is_a_configuration_error() {
        let models = joint_models();
        let datasets = names(&["HAWC", "Fermi-LAT", "5029747"]);
        let err = ModelBindingRegistry::build(&models, &datasets, BindingMode::Strict).unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownDataset { ref dataset, .. } if dataset == "5029748"));

        let reg = ModelBindingRegistry::build(&models, &datasets, BindingMode::IgnoreMissing).unwrap();
        assert_eq!(reg.datasets_for(1), &[2]);
    }

    #[test]
    fn retarget_model() {
        let mut models = joint_models();
        let datasets = names(&["magic_stacked"]);
        let mut reg = ModelBindingRegistry::build(&models, &datasets, BindingMode::IgnoreMissing).unwrap();
        assert!(reg.models_for(0).is_empty());
        reg.set_datasets(
            &mut models,
            "spectrum-only",
            Some(names(&["magic_stacked"])),
            BindingMode::IgnoreMissing,
        )
        .unwrap();
        assert_eq!(reg.models_for(0), &[1]);
        assert_eq!(models.sky_models()[1].datasets_names, Some(names(&["magic_stacked"])));
    }

    #[test]
    fn rejected_retarget_changes_nothing() {
        let mut models = joint_models();
        let datasets = names(&["HAWC", "Fermi-LAT", "5029747", "5029748"]);
        let mut reg = ModelBindingRegistry::build(&models, &datasets, BindingMode::Strict).unwrap();

        let err = reg
            .set_datasets(&mut models, "spectrum-only", Some(names(&["magic_stacked"])), BindingMode::Strict)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownDataset { ref dataset, .. } if dataset == "magic_stacked"));
        assert_eq!(
            models.sky_models()[1].datasets_names,
            Some(names(&["5029747", "5029748"]))
        );
        assert_eq!(reg.datasets_for(1), &[2, 3]);
    }
}
