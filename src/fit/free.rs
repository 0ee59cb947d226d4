//! The free-parameter vector seen by the optimizer.
//!
//! Each free parameter is divided by a power-of-ten scale derived from its
//! starting value, so the optimizer works on numbers of order one whatever
//! the physical magnitude (an amplitude of `1e-11` and an index of `2.5` move
//! on comparable steps). Bounds are scaled the same way.

use crate::models::{ModelBindingRegistry, ModelSet, ParamId};

#[derive(Debug, Clone)]
pub struct FreeParameters {
    pub ids: Vec<ParamId>,
    pub names: Vec<String>,
    pub scales: Vec<f64>,
}

impl FreeParameters {
    pub fn collect(models: &ModelSet, registry: &ModelBindingRegistry) -> Self {
        let ids = registry.free_parameters(models);
        Self::from_ids(models, ids)
    }

    pub fn from_ids(models: &ModelSet, ids: Vec<ParamId>) -> Self {
        let names = ids.iter().map(|id| models.qualified_name(*id)).collect();
        let scales = ids.iter().map(|id| auto_scale(models.parameter(*id).value)).collect();
        Self { ids, names, scales }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Current values in optimizer (scaled) coordinates.
    pub fn scaled_values(&self, models: &ModelSet) -> Vec<f64> {
        self.ids
            .iter()
            .zip(&self.scales)
            .map(|(id, s)| models.parameter(*id).value / s)
            .collect()
    }

    /// Bounds in optimizer coordinates.
    pub fn scaled_bounds(&self, models: &ModelSet) -> Vec<(f64, f64)> {
        self.ids
            .iter()
            .zip(&self.scales)
            .map(|(id, s)| {
                let (lo, hi) = models.parameter(*id).bounds();
                (lo / s, hi / s)
            })
            .collect()
    }

    /// Write optimizer coordinates back into the parameter table.
    pub fn apply(&self, models: &mut ModelSet, scaled: &[f64]) {
        for ((id, s), x) in self.ids.iter().zip(&self.scales).zip(scaled) {
            models.parameter_mut(*id).value = x * s;
        }
    }
}

/// Power of ten closest below `|value|`; 1 for zero or non-finite values.
fn auto_scale(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return 1.0;
    }
    10f64.powf(value.abs().log10().floor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_is_power_of_ten() {
        assert!((auto_scale(3.2e-11) - 1e-11).abs() < 1e-25);
        assert_eq!(auto_scale(2.5), 1.0);
        assert_eq!(auto_scale(-450.0), 100.0);
        assert_eq!(auto_scale(0.0), 1.0);
    }
}
