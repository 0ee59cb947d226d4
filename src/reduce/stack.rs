//! Additive stacking of spectrum datasets sharing the same binning.

use nalgebra::DMatrix;

use crate::datasets::{Background, SpectrumDataset};
use crate::error::AnalysisError;

/// Stack datasets into one named dataset.
///
/// Counts (and OFF counts) are summed over each input's safe bins. The
/// stacked alpha keeps the expected background unchanged:
/// `α = Σ αᵢ·offᵢ / Σ offᵢ`, falling back to the mean `αᵢ` where no OFF
/// counts were recorded. Exposure is summed and the dispersion is
/// exposure-weighted; the safe mask is the union of the input masks.
pub fn stack_reduce(datasets: &[&SpectrumDataset], name: &str) -> Result<SpectrumDataset, AnalysisError> {
    let Some(first) = datasets.first() else {
        return Err(AnalysisError::InvalidInput("nothing to stack".to_string()));
    };
    for d in &datasets[1..] {
        if !d.energy_axis.is_compatible(&first.energy_axis) || !d.energy_axis_true.is_compatible(&first.energy_axis_true) {
            return Err(AnalysisError::IncompatibleGeometry(format!(
                "cannot stack {} with {}: energy axes differ",
                d.name, first.name
            )));
        }
    }

    let nreco = first.energy_axis.nbin();
    let ntrue = first.energy_axis_true.nbin();

    let mut counts = vec![0.0; nreco];
    let mut mask_union = vec![false; nreco];
    for d in datasets {
        for j in 0..nreco {
            if d.mask_safe()[j] {
                counts[j] += d.counts[j];
                mask_union[j] = true;
            }
        }
    }

    let background = stack_background(datasets, nreco)?;

    let mut exposure = vec![0.0; ntrue];
    let mut weighted = DMatrix::<f64>::zeros(ntrue, nreco);
    for d in datasets {
        for i in 0..ntrue {
            exposure[i] += d.exposure[i];
            for j in 0..nreco {
                weighted[(i, j)] += d.exposure[i] * d.edisp[(i, j)];
            }
        }
    }
    let mut edisp = first.edisp.clone();
    for i in 0..ntrue {
        if exposure[i] > 0.0 {
            for j in 0..nreco {
                edisp[(i, j)] = weighted[(i, j)] / exposure[i];
            }
        }
    }

    let mut stacked = SpectrumDataset::new(
        name,
        first.energy_axis.clone(),
        first.energy_axis_true.clone(),
        counts,
        exposure,
        edisp,
        background,
        datasets.iter().map(|d| d.livetime).sum(),
    )?;
    stacked.restrict_safe(&mask_union)?;
    stacked.obs_ids = datasets.iter().flat_map(|d| d.obs_ids.iter().cloned()).collect();

    log::info!(
        "stacked {} dataset(s) into '{}' ({:.0} s live time)",
        datasets.len(),
        name,
        stacked.livetime
    );
    Ok(stacked)
}

fn stack_background(datasets: &[&SpectrumDataset], nreco: usize) -> Result<Background, AnalysisError> {
    let mixed = || AnalysisError::IncompatibleGeometry("cannot stack datasets with different background types".to_string());

    match &datasets[0].background {
        Background::None => {
            if datasets.iter().all(|d| matches!(d.background, Background::None)) {
                Ok(Background::None)
            } else {
                Err(mixed())
            }
        }
        Background::Model { .. } => {
            let mut total = vec![0.0; nreco];
            for d in datasets {
                let Background::Model { counts } = &d.background else {
                    return Err(mixed());
                };
                for j in 0..nreco {
                    if d.mask_safe()[j] {
                        total[j] += counts[j];
                    }
                }
            }
            Ok(Background::Model { counts: total })
        }
        Background::OnOff { .. } => {
            let mut off_sum = vec![0.0; nreco];
            let mut alpha_off = vec![0.0; nreco];
            let mut alpha_sum = vec![0.0; nreco];
            let mut alpha_n = vec![0usize; nreco];
            let mut alpha_all = vec![0.0; nreco];
            for d in datasets {
                let Background::OnOff { counts_off, alpha } = &d.background else {
                    return Err(mixed());
                };
                for j in 0..nreco {
                    alpha_all[j] += alpha[j];
                    if d.mask_safe()[j] {
                        off_sum[j] += counts_off[j];
                        alpha_off[j] += alpha[j] * counts_off[j];
                        alpha_sum[j] += alpha[j];
                        alpha_n[j] += 1;
                    }
                }
            }
            let n = datasets.len() as f64;
            let alpha = (0..nreco)
                .map(|j| {
                    if off_sum[j] > 0.0 {
                        alpha_off[j] / off_sum[j]
                    } else if alpha_n[j] > 0 {
                        alpha_sum[j] / alpha_n[j] as f64
                    } else {
                        alpha_all[j] / n
                    }
                })
                .collect();
            Ok(Background::OnOff {
                counts_off: off_sum,
                alpha,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::edisp_diagonal;
    use crate::domain::EnergyAxis;

    fn run(name: &str, on: Vec<f64>, off: Vec<f64>, alpha: f64, exposure: f64) -> SpectrumDataset {
        let axis = EnergyAxis::log_spaced(0.1, 10.0, 3).unwrap();
        let mut ds = SpectrumDataset::new(
            name,
            axis.clone(),
            axis.clone(),
            on,
            vec![exposure; 3],
            edisp_diagonal(&axis, &axis),
            Background::OnOff {
                counts_off: off,
                alpha: vec![alpha; 3],
            },
            100.0,
        )
        .unwrap();
        ds.obs_ids = vec![name.to_string()];
        ds
    }

    #[test]
    fn stacking_preserves_excess_and_sums_exposure() {
        let a = run("a", vec![10.0, 8.0, 6.0], vec![10.0, 10.0, 0.0], 0.5, 1e3);
        let b = run("b", vec![20.0, 5.0, 4.0], vec![30.0, 10.0, 0.0], 0.25, 3e3);
        let stacked = stack_reduce(&[&a, &b], "magic_stacked").unwrap();

        assert_eq!(stacked.counts, vec![30.0, 13.0, 10.0]);
        let expected_excess: Vec<f64> = a.excess().iter().zip(b.excess()).map(|(x, y)| x + y).collect();
        for (got, want) in stacked.excess().iter().zip(expected_excess) {
            assert!((got - want).abs() < 1e-9);
        }
        match &stacked.background {
            Background::OnOff { alpha, .. } => {
                assert!((alpha[0] - (0.5 * 10.0 + 0.25 * 30.0) / 40.0).abs() < 1e-12);
                // No OFF counts: mean alpha.
                assert!((alpha[2] - 0.375).abs() < 1e-12);
            }
            other => panic!("unexpected background {other:?}"),
        }
        assert!(stacked.exposure.iter().all(|e| (e - 4e3).abs() < 1e-9));
        assert_eq!(stacked.obs_ids, vec!["a".to_string(), "b".to_string()]);
        assert!((stacked.livetime - 200.0).abs() < 1e-12);
    }

    #[test]
    fn masked_bins_do_not_contribute() {
        let mut a = run("a", vec![10.0, 8.0, 6.0], vec![10.0, 10.0, 10.0], 0.5, 1e3);
        let b = run("b", vec![20.0, 5.0, 4.0], vec![30.0, 10.0, 10.0], 0.5, 1e3);
        a.restrict_safe(&[false, true, true]).unwrap();
        let stacked = stack_reduce(&[&a, &b], "s").unwrap();
        assert_eq!(stacked.counts[0], 20.0);
        assert_eq!(stacked.mask_safe(), &[true, true, true]);
    }

    #[test]
    fn mismatched_axes_are_rejected() {
        let a = run("a", vec![1.0; 3], vec![1.0; 3], 0.5, 1.0);
        let axis = EnergyAxis::log_spaced(0.1, 20.0, 3).unwrap();
        let b = SpectrumDataset::new(
            "b",
            axis.clone(),
            axis.clone(),
            vec![1.0; 3],
            vec![1.0; 3],
            edisp_diagonal(&axis, &axis),
            Background::None,
            1.0,
        )
        .unwrap();
        assert!(matches!(stack_reduce(&[&a, &b], "s"), Err(AnalysisError::IncompatibleGeometry(_))));
    }
}
