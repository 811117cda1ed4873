//! Matrix-free preconditioned conjugate gradient for the damped normal
//! equations `(J^T J + lambda I) x = J^T r`, without ever forming `J^T J`.

use crate::constants::EPS_ZERO;
use crate::linalg::sparse::CsrMatrix;

/// Apply `(J^T J + lambda I) v` without materialising `J^T J`.
fn apply_damped_normal(j: &CsrMatrix, v: &[f64], lambda: f64, diag_jtj: &[f64]) -> Vec<f64> {
    let jv = j.mul_vec(v);
    let jtjv = j.mul_transpose_vec(&jv);
    jtjv.iter()
        .zip(v)
        .zip(diag_jtj)
        .map(|((&a, &vi), &d)| a + lambda * d * vi)
        .collect()
}

/// Solve `(J^T J + lambda * diag(J^T J)) x = J^T r` for `x` via
/// Jacobi-preconditioned CG, matrix-free.
///
/// `tol` is relative to `||J^T r||`; iterates at most `max_iters` times.
pub fn conjugate_gradient_sparse(
    j: &CsrMatrix,
    r: &[f64],
    lambda: f64,
    tol: f64,
    max_iters: usize,
) -> Vec<f64> {
    let n = j.num_cols;
    let jtr = j.mul_transpose_vec(r);
    let neg_b: Vec<f64> = jtr.iter().map(|&v| -v).collect();
    let diag_jtj = j.diag_jtj();

    // Jacobi preconditioner: diag(J^T J + lambda * diag(J^T J))^-1.
    let precond: Vec<f64> = diag_jtj
        .iter()
        .map(|&d| {
            let denom = d + lambda * d;
            if denom.abs() > EPS_ZERO { 1.0 / denom } else { 1.0 }
        })
        .collect();

    let mut x = vec![0.0; n];
    // Solve A x = b with b = -J^T r (the LM normal-equation RHS).
    let b: Vec<f64> = neg_b;
    let ax0 = apply_damped_normal(j, &x, lambda, &diag_jtj);
    let mut residual: Vec<f64> = b.iter().zip(&ax0).map(|(&bi, &axi)| bi - axi).collect();

    let b_norm = dot(&jtr, &jtr).sqrt();
    let threshold = tol * b_norm.max(EPS_ZERO);

    if residual_norm(&residual) <= threshold {
        return x;
    }

    let mut z = apply_precond(&precond, &residual);
    let mut p = z.clone();
    let mut rz_old = dot(&residual, &z);

    for _ in 0..max_iters {
        let ap = apply_damped_normal(j, &p, lambda, &diag_jtj);
        let pap = dot(&p, &ap);
        if pap.abs() < EPS_ZERO {
            break;
        }
        let alpha = rz_old / pap;
        for i in 0..n {
            x[i] += alpha * p[i];
            residual[i] -= alpha * ap[i];
        }
        if residual_norm(&residual) <= threshold {
            break;
        }
        z = apply_precond(&precond, &residual);
        let rz_new = dot(&residual, &z);
        let beta = rz_new / rz_old.max(EPS_ZERO);
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
        rz_old = rz_new;
    }

    x
}

fn apply_precond(precond: &[f64], v: &[f64]) -> Vec<f64> {
    v.iter().zip(precond).map(|(&vi, &pi)| vi * pi).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

fn residual_norm(r: &[f64]) -> f64 {
    dot(r, r).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::CsrBuilder;

    #[test]
    fn cg_matches_cholesky_on_small_system() {
        // J = [[2,0],[0,3]], r = [1,1] => J^T r = [2,3].
        let mut b = CsrBuilder::new(2);
        b.push_row(&[0], &[2.0]);
        b.push_row(&[1], &[3.0]);
        let j = b.build();
        let r = [1.0, 1.0];
        let x = conjugate_gradient_sparse(&j, &r, 0.0, 1e-10, 100);
        // (J^T J) x = -J^T r  =>  diag(4,9) x = [-2,-3]  =>  x = [-0.5, -1/3]
        assert!((x[0] - (-0.5)).abs() < 1e-6);
        assert!((x[1] - (-1.0 / 3.0)).abs() < 1e-6);
    }
}
