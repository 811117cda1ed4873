//! 3x3 dense matrix utilities built on `glam::DMat3`.
//!
//! `glam` already gives us a well-tested `DMat3` with `transpose`,
//! `determinant`, `mul_mat3`; we wrap the pieces needed on top of it
//! (fallible inversion, an `orthogonalise_rotation` built from our own
//! [`crate::linalg::svd::svd3x3`]) rather than reimplementing 3x3 arithmetic
//! from scratch.

use glam::{DMat3, DVec3};

use crate::constants::EPS_ZERO;
use crate::linalg::svd::svd3x3;

/// Invert a 3x3 matrix, or `None` if it is numerically singular
/// (`|det| < EPS_ZERO`).
pub fn invert3x3(m: DMat3) -> Option<DMat3> {
    let det = m.determinant();
    if det.abs() < EPS_ZERO {
        return None;
    }
    Some(m.inverse())
}

/// Determinant of a 3x3 matrix.
pub fn determinant3x3(m: DMat3) -> f64 {
    m.determinant()
}

/// Transpose of a 3x3 matrix.
pub fn transpose3x3(m: DMat3) -> DMat3 {
    m.transpose()
}

/// Multiply two 3x3 matrices.
pub fn mul3x3(a: DMat3, b: DMat3) -> DMat3 {
    a * b
}

/// Project an arbitrary 3x3 matrix onto SO(3): `R = U V^T` from the SVD
/// `M = U Sigma V^T`, negating the last column of `U` when `det(U V^T) < 0`
/// so the result is a proper rotation (determinant +1).
pub fn orthogonalise_rotation(m: DMat3) -> DMat3 {
    let svd = svd3x3(m);
    let mut u = svd.u;
    let v_t = svd.v.transpose();
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        // Negate the last column of U (equivalently the last singular
        // direction) and recompute.
        let cols = [u.x_axis, u.y_axis, -u.z_axis];
        u = DMat3::from_cols(cols[0], cols[1], cols[2]);
        r = u * v_t;
    }
    r
}

/// `true` if every component of `v` is finite.
pub fn vec3_finite(v: DVec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_identity() {
        let inv = invert3x3(DMat3::IDENTITY).unwrap();
        assert!((inv.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invert_singular_is_none() {
        let m = DMat3::from_cols(DVec3::X, DVec3::X, DVec3::Y);
        assert!(invert3x3(m).is_none());
    }

    #[test]
    fn orthogonalise_identity_is_identity() {
        let r = orthogonalise_rotation(DMat3::IDENTITY);
        assert!((r.determinant() - 1.0).abs() < 1e-8);
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((r.col(i)[j] - expect).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn orthogonalise_fixes_reflection() {
        // A pure reflection has det = -1; orthogonalising must recover a
        // proper rotation (det = +1), not the reflection itself.
        let m = DMat3::from_cols(DVec3::X, DVec3::Y, -DVec3::Z);
        let r = orthogonalise_rotation(m);
        assert!(r.determinant() > 0.0);
    }
}
