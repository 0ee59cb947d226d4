//! Finite-difference Hessian and covariance estimation.
//!
//! Central differences are used wherever the stencil fits inside the box;
//! at a bound the stencil becomes one-sided (forward or backward), with the
//! step shrunk to fit a narrow box, so the objective is never evaluated out of
//! bounds. A zero-width box yields a non-finite row and hence no covariance.

use nalgebra::DMatrix;

/// Relative step used for the finite differences.
pub const DEFAULT_REL_STEP: f64 = 1e-3;

/// Hessian of `f` at `x`.
pub fn hessian<F>(mut f: F, x: &[f64], bounds: &[(f64, f64)], rel_step: f64) -> DMatrix<f64>
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x.len();
    let mut h = DMatrix::<f64>::zeros(n, n);
    if n == 0 {
        return h;
    }

    // Per-parameter step and whether the symmetric stencil fits.
    let steps: Vec<(f64, bool)> = x
        .iter()
        .zip(bounds.iter())
        .map(|(&xi, &(lo, hi))| {
            let step = rel_step * xi.abs().max(1.0);
            if xi - step >= lo && xi + step <= hi {
                return (step, true);
            }
            // One-sided towards the roomier side, shrunk so the stencil fits.
            let (up, down) = (hi - xi, xi - lo);
            if up >= down {
                (step.min(0.5 * up), false)
            } else {
                (-step.min(0.5 * down), false)
            }
        })
        .collect();

    let f0 = f(x);
    let mut shifted = |di: &[(usize, f64)]| {
        let mut p = x.to_vec();
        for &(i, d) in di {
            let (lo, hi) = bounds[i];
            p[i] = (p[i] + d).clamp(lo, hi);
        }
        f(&p)
    };

    for i in 0..n {
        let (hi_step, central) = steps[i];
        let d2 = if central {
            let fp = shifted(&[(i, hi_step)]);
            let fm = shifted(&[(i, -hi_step)]);
            (fp - 2.0 * f0 + fm) / (hi_step * hi_step)
        } else {
            let f1 = shifted(&[(i, hi_step)]);
            let f2 = shifted(&[(i, 2.0 * hi_step)]);
            (f2 - 2.0 * f1 + f0) / (hi_step * hi_step)
        };
        h[(i, i)] = d2;
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let (si, ci) = steps[i];
            let (sj, cj) = steps[j];
            let d2 = if ci && cj {
                let fpp = shifted(&[(i, si), (j, sj)]);
                let fpm = shifted(&[(i, si), (j, -sj)]);
                let fmp = shifted(&[(i, -si), (j, sj)]);
                let fmm = shifted(&[(i, -si), (j, -sj)]);
                (fpp - fpm - fmp + fmm) / (4.0 * si * sj)
            } else {
                let fij = shifted(&[(i, si), (j, sj)]);
                let fi = shifted(&[(i, si)]);
                let fj = shifted(&[(j, sj)]);
                (fij - fi - fj + f0) / (si * sj)
            };
            h[(i, j)] = d2;
            h[(j, i)] = d2;
        }
    }

    h
}

/// Covariance of the parameters from the Hessian of a `-2 ln L` statistic.
///
/// The Fisher information is half the Hessian of `-2 ln L`, so the covariance
/// is `2 H⁻¹`. Returns `None` if the matrix cannot be inverted or the result
/// has a non-positive variance.
pub fn covariance_from_stat_hessian(h: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if h.nrows() == 0 {
        return Some(DMatrix::zeros(0, 0));
    }
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let inv = h.clone().try_inverse()?;
    let mut cov = inv * 2.0;
    // Symmetrize away round-off.
    let cov_t = cov.transpose();
    cov = (cov + cov_t) * 0.5;
    if (0..cov.nrows()).any(|i| !(cov[(i, i)].is_finite() && cov[(i, i)] > 0.0)) {
        return None;
    }
    Some(cov)
}
