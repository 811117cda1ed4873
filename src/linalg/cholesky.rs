//! Dense Cholesky solve for the damped normal equations
//! `(J^T J + lambda * diag(J^T J)) x = J^T r`.

use crate::linalg::dense::DenseMatrix;

/// Solve `H x = b` for symmetric positive-definite `H` via Cholesky
/// factorisation `H = L L^T`. Returns `None` if `H` is not numerically
/// positive-definite (a diagonal pivot goes non-positive), which the LM
/// driver treats as a rejected step.
pub fn cholesky_dense(h: &DenseMatrix, b: &[f64]) -> Option<Vec<f64>> {
    let n = h.rows;
    assert_eq!(h.cols, n);
    assert_eq!(b.len(), n);

    let mut l = DenseMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..=i {
            let mut sum = h[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[(i, j)] = sum.sqrt();
            } else {
                l[(i, j)] = sum / l[(j, j)];
            }
        }
    }

    // Forward solve L y = b.
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[(i, k)] * y[k];
        }
        y[i] = sum / l[(i, i)];
    }

    // Back solve L^T x = y.
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[(k, i)] * x[k];
        }
        x[i] = sum / l[(i, i)];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_identity_system() {
        let h = DenseMatrix::identity(3);
        let b = vec![1.0, 2.0, 3.0];
        let x = cholesky_dense(&h, &b).unwrap();
        assert_eq!(x, b);
    }

    #[test]
    fn solves_spd_system() {
        let h = DenseMatrix::from_row_major(2, 2, vec![4.0, 1.0, 1.0, 3.0]);
        let b = vec![1.0, 2.0];
        let x = cholesky_dense(&h, &b).unwrap();
        // Verify H x ~= b.
        let residual = h.mul_vec(&x);
        for i in 0..2 {
            assert!((residual[i] - b[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn rejects_non_positive_definite() {
        let h = DenseMatrix::from_row_major(2, 2, vec![1.0, 2.0, 2.0, 1.0]);
        assert!(cholesky_dense(&h, &[1.0, 1.0]).is_none());
    }
}
