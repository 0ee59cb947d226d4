//! Scalar root finding used for profile-likelihood crossings.

/// Find `x` in `[lo, hi]` with `f(x) = 0` by bisection.
///
/// `f(lo)` and `f(hi)` must have opposite signs (or one of them be zero);
/// otherwise `None` is returned.
pub fn bisect<F>(mut f: F, mut lo: f64, mut hi: f64, xtol: f64, max_iter: usize) -> Option<f64>
where
    F: FnMut(f64) -> f64,
{
    let mut f_lo = f(lo);
    let f_hi = f(hi);
    if !(f_lo.is_finite() && f_hi.is_finite()) {
        return None;
    }
    if f_lo == 0.0 {
        return Some(lo);
    }
    if f_hi == 0.0 {
        return Some(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return None;
    }

    for _ in 0..max_iter {
        let mid = 0.5 * (lo + hi);
        if (hi - lo).abs() <= xtol {
            return Some(mid);
        }
        let f_mid = f(mid);
        if !f_mid.is_finite() {
            return None;
        }
        if f_mid == 0.0 {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}

/// Walk upwards from `start` in growing steps until `f` turns non-negative.
///
/// Returns a bracket `(lo, hi)` with `f(lo) < 0 <= f(hi)`, or `None` if
/// `limit` is reached first.
pub fn bracket_upwards<F>(mut f: F, start: f64, initial_step: f64, limit: f64) -> Option<(f64, f64)>
where
    F: FnMut(f64) -> f64,
{
    let mut lo = start;
    let mut step = initial_step.max(1e-12);
    loop {
        let hi = (lo + step).min(limit);
        let v = f(hi);
        if v.is_finite() && v >= 0.0 {
            return Some((lo, hi));
        }
        if hi >= limit {
            return None;
        }
        lo = hi;
        step *= 2.0;
    }
}
