//! One-dimensional interpolation helpers for tabulated responses.

/// Linear interpolation between two knots.
pub fn linear_interp(a: (f64, f64), b: (f64, f64), x: f64) -> f64 {
    let (x0, y0) = a;
    let (x1, y1) = b;
    if (x1 - x0).abs() < 1e-12 {
        return y0;
    }
    let u = (x - x0) / (x1 - x0);
    y0 + u * (y1 - y0)
}

/// Bracketing knots for `x` in an increasing node list.
///
/// Returns `(i, u)` such that `x ≈ xs[i] + u * (xs[i+1] - xs[i])` with `u`
/// clamped to `[0, 1]`. A single node yields `(0, 0.0)`.
pub fn bracket_clamped(xs: &[f64], x: f64) -> (usize, f64) {
    if xs.len() < 2 || x <= xs[0] {
        return (0, 0.0);
    }
    let last = xs.len() - 1;
    if x >= xs[last] {
        return (last - 1, 1.0);
    }
    let idx = xs.partition_point(|v| *v <= x).saturating_sub(1).min(last - 1);
    let span = xs[idx + 1] - xs[idx];
    let u = if span.abs() < 1e-300 { 0.0 } else { (x - xs[idx]) / span };
    (idx, u.clamp(0.0, 1.0))
}

/// Interpolate `ys(xs)` at `x`, holding the end values outside the node range.
pub fn interp_clamped(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    if ys.is_empty() {
        return 0.0;
    }
    if ys.len() == 1 {
        return ys[0];
    }
    let (i, u) = bracket_clamped(xs, x);
    ys[i] + u * (ys[i + 1] - ys[i])
}

/// Interpolate in `ln(x)` (node energies), clamped at both ends.
pub fn interp_log_x_clamped(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let ln_xs: Vec<f64> = xs.iter().map(|v| v.max(1e-300).ln()).collect();
    interp_clamped(&ln_xs, ys, x.max(1e-300).ln())
}

/// Interpolate in `ln(x)`, returning zero outside the node range.
pub fn interp_log_x_or_zero(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    if xs.is_empty() || x < xs[0] || x > xs[xs.len() - 1] {
        return 0.0;
    }
    interp_log_x_clamped(xs, ys, x)
}

/// Index of the node closest to `x`.
pub fn nearest_index(xs: &[f64], x: f64) -> usize {
    xs.iter()
        .enumerate()
        .min_by(|a, b| {
            (a.1 - x)
                .abs()
                .partial_cmp(&(b.1 - x).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_interpolation_holds_end_values() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [10.0, 20.0, 40.0];
        assert!((interp_clamped(&xs, &ys, -1.0) - 10.0).abs() < 1e-12);
        assert!((interp_clamped(&xs, &ys, 0.5) - 15.0).abs() < 1e-12);
        assert!((interp_clamped(&xs, &ys, 1.5) - 30.0).abs() < 1e-12);
        assert!((interp_clamped(&xs, &ys, 5.0) - 40.0).abs() < 1e-12);
    }

    #[test]
    fn log_interpolation_is_zero_outside_range() {
        let xs = [0.1, 1.0, 10.0];
        let ys = [1.0, 2.0, 3.0];
        assert_eq!(interp_log_x_or_zero(&xs, &ys, 0.01), 0.0);
        assert!((interp_log_x_or_zero(&xs, &ys, 10f64.sqrt()) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn nearest_node() {
        assert_eq!(nearest_index(&[0.0, 0.5, 1.0], 0.4), 1);
        assert_eq!(nearest_index(&[0.0, 0.5, 1.0], 2.0), 2);
    }
}
