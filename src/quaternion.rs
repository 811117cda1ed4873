//! Unit-quaternion rotation helpers built on `glam::DQuat`.
//!
//! The teacher crate already leans on `glam::DQuat` directly
//! (`gravitas-wasm/src/camera.rs`); we reuse the same type for camera
//! orientation rather than hand-rolling a quaternion struct.

use glam::{DMat3, DQuat, DVec3};

/// Rotate `v` by `q`: `q * v * q^-1`, i.e. `glam`'s `mul_vec3`.
#[inline]
pub fn rotate(q: DQuat, v: DVec3) -> DVec3 {
    q.mul_vec3(v)
}

/// World-to-camera transform: `p_c = q * (p_w - C) * q^*`.
#[inline]
pub fn world_to_camera(q: DQuat, camera_position: DVec3, world_point: DVec3) -> DVec3 {
    rotate(q, world_point - camera_position)
}

/// `|q|^2`, used directly by the quaternion-normalisation residual.
#[inline]
pub fn norm_squared(q: DQuat) -> f64 {
    q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w
}

/// Renormalise a (possibly drifted) quaternion to unit length. Falls back
/// to identity if the quaternion has collapsed to (near) zero.
pub fn safe_normalize(q: DQuat) -> DQuat {
    let n2 = norm_squared(q);
    if n2 < 1e-20 {
        DQuat::IDENTITY
    } else {
        q / n2.sqrt()
    }
}

/// Equivalent 3x3 rotation matrix.
#[inline]
pub fn to_mat3(q: DQuat) -> DMat3 {
    DMat3::from_quat(q)
}

/// Quaternion nearest the given 3x3 (possibly non-orthogonal) rotation
/// matrix, after projecting the matrix onto SO(3).
pub fn from_orthogonalised_mat3(m: DMat3) -> DQuat {
    let r = crate::linalg::mat3::orthogonalise_rotation(m);
    DQuat::from_mat3(&r)
}

/// A 180-degree rotation about the world X axis, used by the PnP
/// "behind camera" flip correction.
pub fn flip_around_x() -> DQuat {
    DQuat::from_rotation_x(std::f64::consts::PI)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_identity_is_noop() {
        let v = DVec3::new(1.0, 2.0, 3.0);
        assert!((rotate(DQuat::IDENTITY, v) - v).length() < 1e-12);
    }

    #[test]
    fn norm_squared_of_unit_quat_is_one() {
        let q = DQuat::from_rotation_y(0.7);
        assert!((norm_squared(q) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn safe_normalize_fixes_drift() {
        let q = DQuat::from_xyzw(0.1, 0.2, 0.3, 0.9); // not unit length
        let n = safe_normalize(q);
        assert!((norm_squared(n) - 1.0).abs() < 1e-10);
    }
}
