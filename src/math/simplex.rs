//! Bounded Nelder–Mead minimization on top of `argmin`.
//!
//! Box constraints are enforced by clamping inside the cost function, so the
//! objective never sees a point outside `[lo, hi]`; the reported minimum is
//! clamped the same way. Non-finite objective values count as `+inf`, which
//! makes the simplex retreat from them.
//!
//! A pass converges when the standard deviation of the simplex costs drops
//! below `ftol`. After a converged pass the simplex is rebuilt around the
//! best point (up to `restarts` times); iteration continues while that keeps
//! lowering the minimum. This guards against simplices that collapsed onto a
//! bound face.

use std::cell::{Cell, RefCell};

use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use serde::{Deserialize, Serialize};

/// Options for the simplex minimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplexOptions {
    /// Iteration budget summed over all passes; substitutes for a wall clock.
    pub max_iter: usize,
    /// Tolerance on the standard deviation of the simplex costs.
    pub ftol: f64,
    /// Initial step relative to `max(|x0_i|, 1)`.
    pub initial_step: f64,
    /// Number of restarts allowed after a converged pass.
    pub restarts: usize,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_iter: 5000,
            ftol: 1e-6,
            initial_step: 0.1,
            restarts: 2,
        }
    }
}

/// Outcome of a minimization.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fval: f64,
    pub n_iter: usize,
    pub n_fev: usize,
    pub converged: bool,
    pub message: String,
}

/// `argmin` view of a mutable objective restricted to a box.
struct BoxedCost<'a, F> {
    f: &'a RefCell<F>,
    bounds: &'a [(f64, f64)],
    n_fev: &'a Cell<usize>,
}

impl<F: FnMut(&[f64]) -> f64> BoxedCost<'_, F> {
    fn eval(&self, x: &[f64]) -> f64 {
        self.n_fev.set(self.n_fev.get() + 1);
        let mut f = self.f.borrow_mut();
        let v = (&mut *f)(&project(x, self.bounds));
        if v.is_finite() { v } else { f64::INFINITY }
    }
}

impl<F: FnMut(&[f64]) -> f64> CostFunction for BoxedCost<'_, F> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.eval(params))
    }
}

/// Minimize `f` starting from `x0` inside `bounds`.
pub fn minimize<F>(f: F, x0: &[f64], bounds: &[(f64, f64)], opts: &SimplexOptions) -> Minimum
where
    F: FnMut(&[f64]) -> f64,
{
    let f = RefCell::new(f);
    let n_fev = Cell::new(0);
    let problem = BoxedCost {
        f: &f,
        bounds,
        n_fev: &n_fev,
    };
    let start = project(x0, bounds);

    if start.is_empty() {
        let fval = problem.eval(&start);
        return Minimum {
            x: start,
            fval,
            n_iter: 0,
            n_fev: n_fev.get(),
            converged: fval.is_finite(),
            message: "no free parameters".to_string(),
        };
    }

    let mut best_x = start;
    let mut best_f = problem.eval(&best_x);
    let mut n_iter = 0usize;
    let mut restarts_left = opts.restarts;

    loop {
        let budget = opts.max_iter.saturating_sub(n_iter);
        let pass = run_pass(&problem, &best_x, opts, budget);
        n_iter += pass.n_iter;
        let improved = pass.fval < best_f - opts.ftol;
        if pass.fval <= best_f {
            best_x = pass.x;
            best_f = pass.fval;
        }

        if !pass.converged {
            return Minimum {
                x: best_x,
                fval: best_f,
                n_iter,
                n_fev: n_fev.get(),
                converged: false,
                message: pass.message,
            };
        }
        if !improved || restarts_left == 0 {
            let converged = best_f.is_finite();
            return Minimum {
                x: best_x,
                fval: best_f,
                n_iter,
                n_fev: n_fev.get(),
                converged,
                message: if converged {
                    pass.message
                } else {
                    "objective is not finite at the optimum".to_string()
                },
            };
        }
        restarts_left -= 1;
    }
}

struct Pass {
    x: Vec<f64>,
    fval: f64,
    n_iter: usize,
    converged: bool,
    message: String,
}

fn run_pass<F>(problem: &BoxedCost<'_, F>, x0: &[f64], opts: &SimplexOptions, budget: usize) -> Pass
where
    F: FnMut(&[f64]) -> f64,
{
    let failed = |message: String| Pass {
        x: x0.to_vec(),
        fval: f64::INFINITY,
        n_iter: 0,
        converged: false,
        message,
    };
    if budget == 0 {
        return failed(format!("iteration budget of {} exhausted", opts.max_iter));
    }

    let simplex = initial_simplex(x0, problem.bounds, opts.initial_step);
    let solver = match NelderMead::new(simplex).with_sd_tolerance(opts.ftol) {
        Ok(solver) => solver,
        Err(e) => return failed(format!("invalid simplex tolerance: {e}")),
    };
    let cost = BoxedCost {
        f: problem.f,
        bounds: problem.bounds,
        n_fev: problem.n_fev,
    };
    let res = match Executor::new(cost, solver)
        .configure(|state| state.max_iters(budget as u64))
        .run()
    {
        Ok(res) => res,
        Err(e) => return failed(format!("minimization failed: {e}")),
    };

    let state = res.state();
    let Some(best) = state.get_best_param() else {
        return failed("no best parameters found".to_string());
    };
    let status = state.get_termination_status();
    let converged = matches!(
        status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    );
    let message = match status {
        TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
            format!("iteration budget of {} exhausted", opts.max_iter)
        }
        other => other.to_string(),
    };
    Pass {
        x: project(best, problem.bounds),
        fval: state.get_best_cost(),
        n_iter: state.get_iter() as usize,
        converged,
        message,
    }
}

/// `x0` plus one vertex per axis, each stepped away from the closer bound so
/// the simplex keeps full dimension.
fn initial_simplex(x0: &[f64], bounds: &[(f64, f64)], initial_step: f64) -> Vec<Vec<f64>> {
    let mut verts = vec![x0.to_vec()];
    for (i, &(lo, hi)) in bounds.iter().enumerate() {
        let mut v = x0.to_vec();
        let step = initial_step * x0[i].abs().max(1.0);
        v[i] = if x0[i] + step <= hi { x0[i] + step } else { x0[i] - step };
        v[i] = v[i].max(lo);
        verts.push(v);
    }
    verts
}

/// Clamp a point into the box.
pub fn project(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(bounds.iter())
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNBOUNDED: (f64, f64) = (f64::NEG_INFINITY, f64::INFINITY);

    #[test]
    fn finds_minimum_of_quadratic_bowl() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + 10.0 * (x[1] + 1.0).powi(2);
        let opts = SimplexOptions {
            ftol: 1e-12,
            ..SimplexOptions::default()
        };
        let min = minimize(f, &[0.0, 0.0], &[UNBOUNDED, UNBOUNDED], &opts);
        assert!(min.converged, "{}", min.message);
        assert!((min.x[0] - 3.0).abs() < 1e-3);
        assert!((min.x[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn rosenbrock_converges() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let opts = SimplexOptions {
            max_iter: 20_000,
            ftol: 1e-14,
            ..SimplexOptions::default()
        };
        let min = minimize(f, &[-1.2, 1.0], &[UNBOUNDED, UNBOUNDED], &opts);
        assert!(min.converged, "{}", min.message);
        assert!((min.x[0] - 1.0).abs() < 1e-2);
        assert!((min.x[1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn never_evaluates_outside_bounds() {
        let bounds = [(1.0, 4.0), (0.0, 1.0)];
        let f = |x: &[f64]| {
            assert!(x[0] >= 1.0 && x[0] <= 4.0, "x0 out of bounds: {}", x[0]);
            assert!(x[1] >= 0.0 && x[1] <= 1.0, "x1 out of bounds: {}", x[1]);
            (x[0] + 2.0).powi(2) + (x[1] - 5.0).powi(2)
        };
        let opts = SimplexOptions {
            ftol: 1e-12,
            ..SimplexOptions::default()
        };
        let min = minimize(f, &[2.0, 0.5], &bounds, &opts);
        assert!(min.converged, "{}", min.message);
        assert!((min.x[0] - 1.0).abs() < 1e-4);
        assert!((min.x[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn reports_exhausted_budget() {
        let f = |x: &[f64]| (x[0] - 100.0).powi(2);
        let opts = SimplexOptions {
            max_iter: 3,
            ..SimplexOptions::default()
        };
        let min = minimize(f, &[0.0], &[UNBOUNDED], &opts);
        assert!(!min.converged);
        assert!(min.message.contains("budget"));
        assert!(min.n_iter <= 3);
    }

    #[test]
    fn non_finite_region_is_avoided() {
        let f = |x: &[f64]| if x[0] < 0.5 { f64::NAN } else { (x[0] - 1.0).powi(2) };
        let opts = SimplexOptions {
            ftol: 1e-12,
            ..SimplexOptions::default()
        };
        let min = minimize(f, &[2.0], &[UNBOUNDED], &opts);
        assert!(min.converged, "{}", min.message);
        assert!((min.x[0] - 1.0).abs() < 1e-3);
    }
}
