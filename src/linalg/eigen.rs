//! Symmetric eigendecomposition for small dense matrices via the classical
//! cyclic Jacobi rotation method.
//!
//! Used by [`crate::init::p3p::dlt`] to extract the null-space vector of the
//! 2n x 12 DLT system (the eigenvector of the smallest eigenvalue of the
//! Gram matrix `A^T A`).

use rand::Rng;

use crate::linalg::dense::DenseMatrix;

/// Result of a symmetric eigendecomposition: eigenvalues and the matching
/// eigenvectors as columns of `vectors`, both sorted ascending by
/// eigenvalue.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    pub values: Vec<f64>,
    pub vectors: DenseMatrix,
}

impl EigenDecomposition {
    /// The eigenvector belonging to the smallest eigenvalue -- the
    /// null-space direction DLT needs.
    pub fn smallest_eigenvector(&self) -> Vec<f64> {
        self.vectors.column(0)
    }
}

/// Compute the eigendecomposition of a symmetric `n x n` matrix using cyclic
/// Jacobi rotations. `rng` is consulted only to break ties when two
/// eigenvalues end up numerically indistinguishable, so repeated calls with
/// the same seed are reproducible.
pub fn symmetric_eigen(s: &DenseMatrix, rng: &mut impl Rng) -> EigenDecomposition {
    assert_eq!(s.rows, s.cols);
    let n = s.rows;
    let mut a = s.clone();
    let mut v = DenseMatrix::identity(n);

    const MAX_SWEEPS: usize = 100;
    const TOL: f64 = 1e-14;

    for _sweep in 0..MAX_SWEEPS {
        let mut off_diag_sum = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diag_sum += a[(p, q)] * a[(p, q)];
            }
        }
        if off_diag_sum.sqrt() < TOL {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[(p, q)];
                if apq.abs() < 1e-300 {
                    continue;
                }
                let app = a[(p, p)];
                let aqq = a[(q, q)];
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s_ = t * c;

                for k in 0..n {
                    let akp = a[(k, p)];
                    let akq = a[(k, q)];
                    a[(k, p)] = c * akp - s_ * akq;
                    a[(k, q)] = s_ * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[(p, k)];
                    let aqk = a[(q, k)];
                    a[(p, k)] = c * apk - s_ * aqk;
                    a[(q, k)] = s_ * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[(k, p)];
                    let vkq = v[(k, q)];
                    v[(k, p)] = c * vkp - s_ * vkq;
                    v[(k, q)] = s_ * vkp + c * vkq;
                }
            }
        }
    }

    let mut values: Vec<f64> = (0..n).map(|i| a[(i, i)]).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        match values[i].partial_cmp(&values[j]) {
            Some(std::cmp::Ordering::Equal) | None => {
                // Degenerate eigenvalues: order is arbitrary but must stay
                // deterministic per-seed, so nudge with a seeded draw
                // rather than relying on sort stability across platforms.
                let coin: f64 = rng.gen();
                if coin < 0.5 { std::cmp::Ordering::Less } else { std::cmp::Ordering::Greater }
            }
            Some(o) => o,
        }
    });

    let mut sorted_vectors = DenseMatrix::zeros(n, n);
    let mut sorted_values = Vec::with_capacity(n);
    for (new_col, &old_col) in order.iter().enumerate() {
        sorted_values.push(values[old_col]);
        for r in 0..n {
            sorted_vectors[(r, new_col)] = v[(r, old_col)];
        }
    }
    values = sorted_values;

    EigenDecomposition { values, vectors: sorted_vectors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn diagonal_matrix_eigenvalues_are_diagonal_entries() {
        let m = DenseMatrix::from_row_major(3, 3, vec![
            3.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 2.0,
        ]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let eig = symmetric_eigen(&m, &mut rng);
        assert!((eig.values[0] - 1.0).abs() < 1e-9);
        assert!((eig.values[1] - 2.0).abs() < 1e-9);
        assert!((eig.values[2] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn eigenvectors_satisfy_av_eq_lambda_v() {
        let m = DenseMatrix::from_row_major(3, 3, vec![
            2.0, 1.0, 0.0,
            1.0, 2.0, 1.0,
            0.0, 1.0, 2.0,
        ]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let eig = symmetric_eigen(&m, &mut rng);
        for i in 0..3 {
            let v = eig.vectors.column(i);
            let av = m.mul_vec(&v);
            for k in 0..3 {
                assert!((av[k] - eig.values[i] * v[k]).abs() < 1e-7);
            }
        }
    }
}
