//! Component F: the Levenberg-Marquardt driver. Damped Gauss-Newton over
//! whatever [`crate::providers::ProviderSet`] assembled, with three linear
//! back-ends sharing one damping-update loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::{
    CG_MAX_ITERS, CG_TOLERANCE, DAMPING_CEILING, DAMPING_FLOOR, MAX_CONSECUTIVE_FAILURES,
    MAX_DAMPING_RETRIES_PER_ITER,
};
use crate::linalg::cg::conjugate_gradient_sparse;
use crate::linalg::cholesky::cholesky_dense;
use crate::linalg::dense::DenseMatrix;
use crate::linalg::sparse::CsrMatrix;
use crate::log::SolveLog;
use crate::providers::ProviderSet;

/// Cooperative cancellation flag shared between a caller and a running
/// solve. Cloning shares the same underlying flag; `cancel()` is safe to
/// call from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Which linear back-end computes and solves the damped normal equations.
/// `Autodiff` picks dense or sparse by problem size; the other three pin
/// the choice explicitly. Jacobians are always the analytical ones from
/// [`crate::providers`] except under `NumericalSparse`, which rebuilds the
/// Jacobian by forward-differencing the residual vector instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmBackEnd {
    Autodiff,
    ExplicitDense,
    ExplicitSparse,
    NumericalSparse,
}

/// Above this many free columns, `Autodiff`'s size-based heuristic solves
/// matrix-free via CG instead of densifying the Jacobian.
const AUTODIFF_DENSE_COLUMN_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub tolerance: f64,
    pub max_iterations: u32,
    pub damping: f64,
    pub back_end: LmBackEnd,
    /// Extra Tikhonov term added to the normal-equations diagonal,
    /// independent of the LM damping schedule -- stabilises rank-deficient
    /// systems (e.g. an under-observed point) without perturbing
    /// convergence accounting.
    pub regularization_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Converged,
    MaxIterations,
    NumericalFailure,
    Cancelled,
}

pub struct LmOutcome {
    pub x: Vec<f64>,
    pub iterations: u32,
    pub final_cost: f64,
    pub termination: Termination,
}

impl LmOutcome {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

fn cost(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn jacobian_for(providers: &ProviderSet, x: &[f64], back_end: LmBackEnd) -> CsrMatrix {
    match back_end {
        LmBackEnd::NumericalSparse => numerical_jacobian(providers, x),
        _ => providers.evaluate(x).1,
    }
}

/// Forward-difference Jacobian, row-for-row over every provider's declared
/// columns -- used only by `NumericalSparse`.
fn numerical_jacobian(providers: &ProviderSet, x: &[f64]) -> CsrMatrix {
    use crate::constants::NUMERICAL_DIFF_EPS;
    use crate::linalg::sparse::CsrBuilder;

    let mut builder = CsrBuilder::new(x.len());
    let r0 = {
        let mut all = Vec::new();
        for p in providers.providers() {
            all.extend(p.residuals(x));
        }
        all
    };
    let mut row = 0;
    for provider in providers.providers() {
        let (_, cols) = provider.jacobian(x);
        let local_r0 = &r0[row..row + provider.residual_count()];
        let mut columns_rows = vec![vec![0.0; cols.len()]; provider.residual_count()];
        for (local, &col) in cols.iter().enumerate() {
            let mut xp = x.to_vec();
            xp[col] += NUMERICAL_DIFF_EPS;
            let rp = provider.residuals(&xp);
            for (k, (&r0k, &rpk)) in local_r0.iter().zip(rp.iter()).enumerate() {
                columns_rows[k][local] = (rpk - r0k) / NUMERICAL_DIFF_EPS;
            }
        }
        for r in columns_rows {
            builder.push_row(&cols, &r);
        }
        row += provider.residual_count();
    }
    builder.build()
}

/// Build dense `J^T J + (lambda + reg) * diag(J^T J)` and `J^T r`.
fn dense_normal_equations(j: &CsrMatrix, r: &[f64], lambda: f64, reg: f64) -> (DenseMatrix, Vec<f64>) {
    let dense = j.to_dense();
    let mut h = dense.gram();
    let diag_jtj = j.diag_jtj();
    for i in 0..h.rows {
        h[(i, i)] += (lambda + reg) * diag_jtj[i];
    }
    let jtr = j.mul_transpose_vec(r);
    let neg_jtr: Vec<f64> = jtr.iter().map(|&v| -v).collect();
    (h, neg_jtr)
}

fn solve_dense(j: &CsrMatrix, r: &[f64], lambda: f64, reg: f64) -> Option<Vec<f64>> {
    let (h, b) = dense_normal_equations(j, r, lambda, reg);
    cholesky_dense(&h, &b)
}

fn solve_sparse(j: &CsrMatrix, r: &[f64], lambda: f64, reg: f64) -> Option<Vec<f64>> {
    Some(conjugate_gradient_sparse(j, r, lambda + reg, CG_TOLERANCE, CG_MAX_ITERS))
}

fn solve_step(back_end: LmBackEnd, j: &CsrMatrix, r: &[f64], lambda: f64, reg: f64) -> Option<Vec<f64>> {
    match back_end {
        LmBackEnd::ExplicitDense => solve_dense(j, r, lambda, reg),
        LmBackEnd::ExplicitSparse | LmBackEnd::NumericalSparse => solve_sparse(j, r, lambda, reg),
        LmBackEnd::Autodiff => {
            if j.num_cols <= AUTODIFF_DENSE_COLUMN_LIMIT {
                solve_dense(j, r, lambda, reg)
            } else {
                solve_sparse(j, r, lambda, reg)
            }
        }
    }
}

/// Run damped Gauss-Newton to convergence, max iterations, cancellation, or
/// numerical failure. `x0` is consumed as the starting point.
pub fn run(
    providers: &ProviderSet,
    x0: Vec<f64>,
    options: &LmOptions,
    cancel: &CancelToken,
    log: &mut SolveLog,
) -> LmOutcome {
    let mut x = x0;
    let mut lambda = options.damping;
    let (mut r, mut j) = (providers.evaluate(&x).0, jacobian_for(providers, &x, options.back_end));
    let mut current_cost = cost(&r);
    let mut consecutive_failures = 0usize;

    log.info(format!("lm: start cost={current_cost:.6} lambda={lambda:.2e}"));

    if x.is_empty() {
        return LmOutcome { x, iterations: 0, final_cost: current_cost, termination: Termination::Converged };
    }

    for iteration in 0..options.max_iterations {
        if cancel.is_cancelled() {
            log.warn("lm: cancelled");
            return LmOutcome { x, iterations: iteration, final_cost: current_cost, termination: Termination::Cancelled };
        }

        let mut accepted = false;
        for _retry in 0..MAX_DAMPING_RETRIES_PER_ITER {
            let step = solve_step(options.back_end, &j, &r, lambda, options.regularization_weight);
            let Some(delta) = step else {
                lambda = (lambda * 10.0).min(DAMPING_CEILING);
                continue;
            };

            let candidate: Vec<f64> = x.iter().zip(&delta).map(|(&xi, &di)| xi + di).collect();
            let candidate_r = {
                let mut all = Vec::new();
                for p in providers.providers() {
                    all.extend(p.residuals(&candidate));
                }
                all
            };
            let candidate_cost = cost(&candidate_r);

            if candidate_cost.is_finite() && candidate_cost <= current_cost {
                let relative_change = (current_cost - candidate_cost) / current_cost.max(1e-300);
                let step_norm = norm(&delta);
                let x_norm = norm(&x);

                x = candidate;
                r = candidate_r;
                j = jacobian_for(providers, &x, options.back_end);
                current_cost = candidate_cost;
                lambda = (lambda / 10.0).max(DAMPING_FLOOR);
                accepted = true;
                consecutive_failures = 0;

                if relative_change < options.tolerance
                    || step_norm < options.tolerance * (x_norm + options.tolerance)
                {
                    log.info(format!("lm: converged at iter {iteration} cost={current_cost:.6}"));
                    return LmOutcome {
                        x,
                        iterations: iteration + 1,
                        final_cost: current_cost,
                        termination: Termination::Converged,
                    };
                }
                break;
            }

            lambda = (lambda * 10.0).min(DAMPING_CEILING);
        }

        if !accepted {
            consecutive_failures += 1;
            log.warn(format!("lm: iter {iteration} rejected, lambda={lambda:.2e}"));
            if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                log.error("lm: numerical failure, too many consecutive rejected iterations");
                return LmOutcome {
                    x,
                    iterations: iteration + 1,
                    final_cost: current_cost,
                    termination: Termination::NumericalFailure,
                };
            }
        }
    }

    log.warn(format!("lm: max iterations reached, cost={current_cost:.6}"));
    LmOutcome {
        x,
        iterations: options.max_iterations,
        final_cost: current_cost,
        termination: Termination::MaxIterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Constraint, ConstraintKind, LineDirection};
    use crate::layout::VariableLayout;
    use crate::project::Project;
    use glam::DVec3;

    fn default_options() -> LmOptions {
        LmOptions {
            tolerance: 1e-9,
            max_iterations: 100,
            damping: 1e-3,
            back_end: LmBackEnd::Autodiff,
            regularization_weight: 0.0,
        }
    }

    #[test]
    fn converges_on_single_distance_constraint() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked = [Some(0.0); 3];
        let b = project.add_point(DVec3::new(1.0, 0.0, 0.0));
        project.add_constraint(Constraint::new(ConstraintKind::DistancePointPoint { a, b }).with_target(5.0));

        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let providers = ProviderSet::build(&project, &layout).unwrap();
        let mut log = SolveLog::new();
        let outcome = run(&providers, layout.initial_x(), &default_options(), &CancelToken::new(), &mut log);

        assert!(outcome.converged());
        let final_point = layout.point_params(b).unwrap().value(&outcome.x);
        assert!((final_point.length() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn empty_layout_converges_immediately() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked = [Some(0.0); 3];
        let _ = project.add_line(a, a, LineDirection::Free); // degenerate, rejected by Project::add_line

        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let providers = ProviderSet::build(&project, &layout).unwrap();
        let mut log = SolveLog::new();
        let outcome = run(&providers, layout.initial_x(), &default_options(), &CancelToken::new(), &mut log);
        assert!(outcome.converged());
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn numerical_sparse_backend_matches_autodiff() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked = [Some(0.0); 3];
        let b = project.add_point(DVec3::new(1.0, 0.0, 0.0));
        project.add_constraint(Constraint::new(ConstraintKind::DistancePointPoint { a, b }).with_target(5.0));

        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let providers = ProviderSet::build(&project, &layout).unwrap();
        let mut options = default_options();
        options.back_end = LmBackEnd::NumericalSparse;
        let mut log = SolveLog::new();
        let outcome = run(&providers, layout.initial_x(), &options, &CancelToken::new(), &mut log);

        assert!(outcome.converged());
        let final_point = layout.point_params(b).unwrap().value(&outcome.x);
        assert!((final_point.length() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn cancellation_stops_before_max_iterations() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked = [Some(0.0); 3];
        let b = project.add_point(DVec3::new(1.0, 0.0, 0.0));
        project.add_constraint(Constraint::new(ConstraintKind::DistancePointPoint { a, b }).with_target(5.0));

        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let providers = ProviderSet::build(&project, &layout).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let mut log = SolveLog::new();
        let outcome = run(&providers, layout.initial_x(), &default_options(), &token, &mut log);
        assert_eq!(outcome.termination, Termination::Cancelled);
    }
}
