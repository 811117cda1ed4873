//! 3x3 singular value decomposition via power iteration on `A^T A`.
//!
//! `A = U * diag(sigma) * V^T`, singular values sorted descending. Used by
//! P3P's absolute-orientation step and by [`crate::linalg::mat3::orthogonalise_rotation`].

use glam::{DMat3, DVec3};

use crate::constants::{EPS_ZERO, RANK_EPS};

/// `A = U diag(sigma) V^T`.
#[derive(Debug, Clone, Copy)]
pub struct Svd3 {
    pub u: DMat3,
    pub sigma: DVec3,
    pub v: DMat3,
}

const POWER_ITERS: usize = 60;

/// An arbitrary unit vector orthogonal to `v` (`v` assumed already unit or
/// near-unit). Picks the world axis least aligned with `v` to avoid a
/// near-degenerate cross product.
fn arbitrary_orthogonal(v: DVec3) -> DVec3 {
    let axis = if v.x.abs() <= v.y.abs() && v.x.abs() <= v.z.abs() {
        DVec3::X
    } else if v.y.abs() <= v.z.abs() {
        DVec3::Y
    } else {
        DVec3::Z
    };
    v.cross(axis).normalize_or_zero()
}

/// Dominant unit eigenvector of a symmetric 3x3 matrix via power iteration,
/// starting from a fixed deterministic seed vector so `svd3x3` needs no RNG.
fn dominant_eigenvector(m: DMat3, seed: DVec3) -> (f64, DVec3) {
    let mut v = seed.normalize_or_zero();
    if v.length_squared() < EPS_ZERO {
        v = DVec3::X;
    }
    for _ in 0..POWER_ITERS {
        let mv = m * v;
        let norm = mv.length();
        if norm < EPS_ZERO {
            break;
        }
        v = mv / norm;
    }
    let lambda = v.dot(m * v);
    (lambda, v)
}

/// Singular value decomposition of a general 3x3 matrix.
pub fn svd3x3(a: DMat3) -> Svd3 {
    let ata = a.transpose() * a;

    let (lambda1, v1) = dominant_eigenvector(ata, DVec3::new(1.0, 1.0, 1.0));

    // Deflate and find the second eigenvector, seeded orthogonal to v1.
    let deflated1 = ata - lambda1 * DMat3::from_cols(v1 * v1.x, v1 * v1.y, v1 * v1.z);
    let seed2 = {
        let raw = DVec3::new(1.0, -1.0, 1.0);
        let ortho = raw - v1 * raw.dot(v1);
        if ortho.length_squared() < EPS_ZERO { arbitrary_orthogonal(v1) } else { ortho }
    };
    let (lambda2, mut v2) = dominant_eigenvector(deflated1, seed2);
    // Re-orthogonalise against v1 to kill numerical drift from deflation.
    v2 = (v2 - v1 * v1.dot(v2)).normalize_or_zero();
    if v2.length_squared() < EPS_ZERO {
        v2 = arbitrary_orthogonal(v1);
    }

    // Third eigenvector completes a right-handed orthonormal basis.
    let mut v3 = v1.cross(v2);
    if v3.length_squared() < EPS_ZERO {
        v3 = arbitrary_orthogonal(v1);
    }
    v3 = v3.normalize_or_zero();
    let lambda3 = v3.dot(ata * v3);

    let mut triples = [(lambda1, v1), (lambda2, v2), (lambda3, v3)];
    triples.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let sigma = DVec3::new(
        triples[0].0.max(0.0).sqrt(),
        triples[1].0.max(0.0).sqrt(),
        triples[2].0.max(0.0).sqrt(),
    );
    let v = DMat3::from_cols(triples[0].1, triples[1].1, triples[2].1);

    let sigma_max = sigma.x.max(EPS_ZERO);
    let rank_threshold = sigma_max * RANK_EPS;

    let u_col = |vi: DVec3, si: f64| -> DVec3 {
        if si > rank_threshold {
            (a * vi) / si
        } else {
            DVec3::ZERO // filled in below via Gram-Schmidt completion
        }
    };

    let mut u0 = u_col(v.x_axis, sigma.x);
    let mut u1 = u_col(v.y_axis, sigma.y);
    let mut u2 = u_col(v.z_axis, sigma.z);

    if u0.length_squared() < EPS_ZERO {
        u0 = DVec3::X;
    }
    u0 = u0.normalize_or_zero();

    if u1.length_squared() < EPS_ZERO {
        u1 = arbitrary_orthogonal(u0);
    } else {
        u1 = (u1 - u0 * u0.dot(u1)).normalize_or_zero();
        if u1.length_squared() < EPS_ZERO {
            u1 = arbitrary_orthogonal(u0);
        }
    }

    if u2.length_squared() < EPS_ZERO {
        u2 = u0.cross(u1).normalize_or_zero();
    } else {
        u2 = (u2 - u0 * u0.dot(u2) - u1 * u1.dot(u2)).normalize_or_zero();
        if u2.length_squared() < EPS_ZERO {
            u2 = u0.cross(u1).normalize_or_zero();
        }
    }

    Svd3 { u: DMat3::from_cols(u0, u1, u2), sigma, v }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svd_identity() {
        let svd = svd3x3(DMat3::IDENTITY);
        assert!((svd.sigma - DVec3::ONE).length() < 1e-6);
    }

    #[test]
    fn svd_reconstructs_diagonal() {
        let a = DMat3::from_diagonal(DVec3::new(3.0, 2.0, 1.0));
        let svd = svd3x3(a);
        assert!((svd.sigma.x - 3.0).abs() < 1e-5);
        assert!((svd.sigma.y - 2.0).abs() < 1e-5);
        assert!((svd.sigma.z - 1.0).abs() < 1e-5);
        let reconstructed = svd.u * DMat3::from_diagonal(svd.sigma) * svd.v.transpose();
        for i in 0..3 {
            for j in 0..3 {
                assert!((reconstructed.col(i)[j] - a.col(i)[j]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn svd_reconstructs_general_matrix() {
        let a = DMat3::from_cols(
            DVec3::new(1.0, 2.0, 0.0),
            DVec3::new(0.0, 1.0, 3.0),
            DVec3::new(2.0, 0.0, 1.0),
        );
        let svd = svd3x3(a);
        let reconstructed = svd.u * DMat3::from_diagonal(svd.sigma) * svd.v.transpose();
        for i in 0..3 {
            for j in 0..3 {
                assert!((reconstructed.col(i)[j] - a.col(i)[j]).abs() < 1e-3);
            }
        }
    }
}
