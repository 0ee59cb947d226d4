//! Joint statistic over a dataset collection.
//!
//! The total is the sum of per-dataset sums; each dataset sums its own
//! per-bin statistic over the bins its mask admits. Contributions are
//! independent, so the total does not depend on dataset order beyond
//! floating-point summation order.

use crate::datasets::{Dataset, Datasets};
use crate::fit::result::DatasetStat;
use crate::models::{ModelBindingRegistry, ModelSet};

/// Per-bin statistic of one dataset given the models bound to it.
pub fn dataset_stat_array(dataset: &Dataset, models: &ModelSet, sky: &[usize]) -> Vec<f64> {
    let prediction = dataset.prediction(models, sky);
    dataset.stat_array(&prediction, &dataset.mask())
}

pub fn stat_breakdown(datasets: &Datasets, models: &ModelSet, registry: &ModelBindingRegistry) -> Vec<DatasetStat> {
    datasets
        .iter()
        .enumerate()
        .map(|(di, dataset)| {
            let stat_per_bin = dataset_stat_array(dataset, models, registry.models_for(di));
            DatasetStat {
                name: dataset.name().to_string(),
                stat_sum: stat_per_bin.iter().sum(),
                stat_per_bin,
            }
        })
        .collect()
}

pub fn total_stat(datasets: &Datasets, models: &ModelSet, registry: &ModelBindingRegistry) -> f64 {
    datasets
        .iter()
        .enumerate()
        .map(|(di, dataset)| {
            dataset_stat_array(dataset, models, registry.models_for(di))
                .iter()
                .sum::<f64>()
        })
        .sum()
}
