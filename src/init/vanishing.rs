//! Vanishing-point camera orientation: back-project the per-axis averaged
//! vanishing point through `K^-1` into a camera-space direction, assemble a
//! rotation from up to three such directions, and resolve the inherent
//! per-axis sign ambiguity against a caller-supplied score (front-of-camera
//! majority + reprojection) -- scoring needs the viewpoint's actual
//! observations, which belongs to the orchestrator, not this leaf module).

use glam::{DMat3, DQuat, DVec3};

use crate::entity::Axis;
use crate::linalg::mat3::orthogonalise_rotation;
use crate::projection::camera_model::Intrinsics;
use crate::quaternion;

/// One axis' back-projected camera-space direction, `None` if that axis had
/// no vanishing point estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisDirections {
    pub x: Option<DVec3>,
    pub y: Option<DVec3>,
    pub z: Option<DVec3>,
}

impl AxisDirections {
    pub fn set(&mut self, axis: Axis, direction: DVec3) {
        match axis {
            Axis::X => self.x = Some(direction),
            Axis::Y => self.y = Some(direction),
            Axis::Z => self.z = Some(direction),
        }
    }

    fn count(&self) -> usize {
        [self.x, self.y, self.z].iter().filter(|d| d.is_some()).count()
    }
}

/// Back-projects an image-space vanishing point `(x, y, w)` through `K^-1`
/// into a camera-space direction.
pub fn back_project(intrinsics: &Intrinsics, vp: (f64, f64, f64)) -> DVec3 {
    let fx = intrinsics.focal_length;
    let fy = intrinsics.fy();
    let (cx, cy) = intrinsics.principal_point;
    let (a, b, c) = vp;

    let dy = b / fy - c * cy / fy;
    let dx = a / fx - intrinsics.skew * dy / fx - c * cx / fx;
    let dz = c;
    DVec3::new(dx, dy, dz).normalize_or_zero()
}

/// Builds a world-to-camera rotation from up to three per-axis camera-space
/// directions: a missing third axis is filled in as the cross product of
/// the other two, the three columns are forced onto SO(3), and every
/// `+-1 x +-1 x +-1` column sign flip is tried, re-orthogonalised and scored
/// by `disambiguate` -- the best-scoring candidate wins.
///
/// Returns `None` if fewer than two axes have a direction (no way to
/// constrain orientation at all).
pub fn orient_from_vanishing_points(
    directions: AxisDirections,
    disambiguate: impl Fn(DQuat) -> f64,
) -> Option<DQuat> {
    if directions.count() < 2 {
        return None;
    }

    let (x, y, z) = match (directions.x, directions.y, directions.z) {
        (Some(x), Some(y), Some(z)) => (x, y, z),
        (Some(x), Some(y), None) => (x, y, x.cross(y).normalize_or_zero()),
        (Some(x), None, Some(z)) => (x, z.cross(x).normalize_or_zero(), z),
        (None, Some(y), Some(z)) => (y.cross(z).normalize_or_zero(), y, z),
        _ => return None,
    };

    let mut best: Option<(f64, DQuat)> = None;
    for sx in [1.0, -1.0] {
        for sy in [1.0, -1.0] {
            for sz in [1.0, -1.0] {
                let m = DMat3::from_cols(x * sx, y * sy, z * sz);
                let r = orthogonalise_rotation(m);
                let q = quaternion::from_orthogonalised_mat3(r);
                let score = disambiguate(q);
                if best.as_ref().map_or(true, |&(s, _)| score > s) {
                    best = Some((score, q));
                }
            }
        }
    }
    best.map(|(_, q)| q)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_projects_principal_point_to_forward_axis() {
        let intrinsics = Intrinsics::default();
        let d = back_project(&intrinsics, (intrinsics.principal_point.0, intrinsics.principal_point.1, 1.0));
        assert!((d - DVec3::Z).length() < 1e-9);
    }

    #[test]
    fn recovers_identity_rotation_from_axis_aligned_directions() {
        let directions =
            AxisDirections { x: Some(DVec3::X), y: Some(DVec3::Y), z: Some(DVec3::Z) };
        let q = orient_from_vanishing_points(directions, |q| {
            -((q * DVec3::X) - DVec3::X).length()
        })
        .unwrap();
        let recovered = q * DVec3::X;
        assert!((recovered - DVec3::X).length() < 1e-6 || (recovered + DVec3::X).length() < 1e-6);
    }

    #[test]
    fn two_axes_are_enough_with_cross_product_fill() {
        let directions = AxisDirections { x: Some(DVec3::X), y: Some(DVec3::Y), z: None };
        let q = orient_from_vanishing_points(directions, |_| 0.0);
        assert!(q.is_some());
    }

    #[test]
    fn single_axis_is_insufficient() {
        let directions = AxisDirections { x: Some(DVec3::X), y: None, z: None };
        assert!(orient_from_vanishing_points(directions, |_| 0.0).is_none());
    }
}
