//! Camera-facing residual families: quaternion normalisation, reprojection
//! (with intrinsics/distortion columns folding in transparently whenever
//! the layout frees them), and vanishing-line orientation cues.

use glam::DVec3;

use crate::autodiff::Scalar;
use crate::constants::{BEHIND_CAMERA_PENALTY, EPS_ZERO};
use crate::entity::{Axis, VanishingLine};
use crate::layout::{CameraParams, ParamRef, PointParams};
use crate::projection::{camera_space, distort, normalise, pixel, Vec3G};

use super::support::{
    camera_intrinsics_vec, camera_position_vec, camera_quat_vec, dual_rows_to_jacobian, point_vec,
    LocalVars,
};

/// `w^2 + x^2 + y^2 + z^2 - 1`.
pub struct QuatNormProvider {
    camera: CameraParams,
    vars: LocalVars,
}

impl QuatNormProvider {
    pub fn new(camera: CameraParams) -> Self {
        let mut vars = LocalVars::new();
        for r in camera.rotation {
            vars.push(r);
        }
        Self { camera, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let q = camera_quat_vec(&self.camera, &get);
        let one = S::constant(1.0);
        vec![q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z - one]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// `(u_proj - u_obs, v_proj - v_obs)`, or the fixed `(1000, 1000)`
/// behind-camera penalty with an all-zero Jacobian row. Whether the focal
/// length (and other intrinsics) are free columns or fixed constants is
/// entirely a property of the `ParamRef`s in `camera.intrinsics` -- this one
/// body serves both "reprojection" and "reprojection + intrinsics".
pub struct ReprojectionProvider {
    point: PointParams,
    camera: CameraParams,
    observed: (f64, f64),
    vars: LocalVars,
}

impl ReprojectionProvider {
    pub fn new(point: PointParams, camera: CameraParams, observed: (f64, f64)) -> Self {
        let mut vars = LocalVars::new();
        vars.push_point(point);
        vars.push_camera_pose(&camera);
        vars.push_intrinsics(&camera.intrinsics);
        Self { point, camera, observed, vars }
    }

    pub fn residual_count(&self) -> usize {
        2
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let world = point_vec(self.point, &get);
        let pos = camera_position_vec(&self.camera, &get);
        let rot = camera_quat_vec(&self.camera, &get);
        let intrinsics = camera_intrinsics_vec(&self.camera, &get);

        let p_c = camera_space(pos, rot, self.camera.is_z_reflected, world);
        if p_c.z.value() < crate::constants::NEAR_PLANE {
            let penalty = S::constant(BEHIND_CAMERA_PENALTY);
            return vec![penalty, penalty];
        }
        let (xn, yn) = normalise(p_c);
        let (xd, yd) = distort(&intrinsics, xn, yn);
        let (u, v) = pixel(&intrinsics, xd, yd);
        vec![u - S::constant(self.observed.0), v - S::constant(self.observed.1)]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }

    /// `true` when this residual currently falls back to the behind-camera
    /// penalty, used by the outlier/diagnostics pass to avoid mistaking the
    /// penalty for a genuine reprojection error.
    pub fn is_behind_camera(&self, x: &[f64]) -> bool {
        let get = |p: ParamRef| p.value(x);
        let world = point_vec(self.point, &get);
        let pos = camera_position_vec(&self.camera, &get);
        let rot = camera_quat_vec(&self.camera, &get);
        let p_c: Vec3G<f64> = camera_space(pos, rot, self.camera.is_z_reflected, world);
        p_c.z < crate::constants::NEAR_PLANE
    }
}

/// The axis-aligned vanishing point for one `(viewpoint, axis)` group,
/// averaged pairwise over its vanishing lines -- static image-space
/// geometry, computed once at provider-build time (never depends on `x`).
pub fn estimate_vanishing_point(lines: &[&VanishingLine]) -> Option<(f64, f64, f64)> {
    if lines.len() < 2 {
        return None;
    }
    let homs: Vec<DVec3> = lines.iter().map(|l| l.homogeneous()).collect();
    let mut acc = DVec3::ZERO;
    let mut count = 0usize;
    for i in 0..homs.len() {
        for j in (i + 1)..homs.len() {
            let vp = homs[i].cross(homs[j]);
            if vp.z.abs() > EPS_ZERO {
                acc += vp / vp.z;
            } else {
                acc += DVec3::new(vp.x, vp.y, 0.0).normalize_or_zero();
            }
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let avg = acc / count as f64;
    Some((avg.x, avg.y, 1.0))
}

/// `w * (1 - dot(R * e_axis, d_vp_hat))`, `d_vp` back-projected through
/// `K^-1` from the group's averaged vanishing point.
pub struct VanishingLineProvider {
    camera: CameraParams,
    axis: Axis,
    vp_pixel: (f64, f64, f64),
    weight: f64,
    vars: LocalVars,
}

impl VanishingLineProvider {
    pub fn new(camera: CameraParams, axis: Axis, vp_pixel: (f64, f64, f64), weight: f64) -> Self {
        let mut vars = LocalVars::new();
        for r in camera.rotation {
            vars.push(r);
        }
        vars.push_intrinsics(&camera.intrinsics);
        Self { camera, axis, vp_pixel, weight, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let intr = camera_intrinsics_vec(&self.camera, &get);
        let rot = camera_quat_vec(&self.camera, &get);

        let fx = intr.focal_length;
        let fy = fx * intr.aspect_ratio;
        let (a, b, c) =
            (S::constant(self.vp_pixel.0), S::constant(self.vp_pixel.1), S::constant(self.vp_pixel.2));

        let dx = a * fx.recip() - intr.skew * b * (fx * fy).recip()
            + c * (intr.skew * intr.cy - intr.cx * fy) * (fx * fy).recip();
        let dy = b * fy.recip() - c * intr.cy * fy.recip();
        let dz = c;
        let d_vp = Vec3G::new(dx, dy, dz).normalize();

        let axis_unit = self.axis.unit();
        let e_axis = Vec3G::new(
            S::constant(axis_unit.x),
            S::constant(axis_unit.y),
            S::constant(axis_unit.z),
        );
        let r_axis = crate::projection::quat_rotate(rot, e_axis);

        let one = S::constant(1.0);
        let w = S::constant(self.weight);
        vec![w * (one - crate::projection::dot(r_axis, d_vp))]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUMERICAL_DIFF_EPS;
    use crate::layout::VariableLayout;
    use crate::project::Project;
    use crate::projection::camera_model::Intrinsics;

    #[test]
    fn quat_norm_residual_zero_at_identity() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(crate::entity::Viewpoint::new(Intrinsics::default(), 100.0, 100.0));
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let camera = layout.camera_params(vp).unwrap();
        let provider = QuatNormProvider::new(camera);
        let r = provider.residuals(&layout.initial_x());
        assert!(r[0].abs() < 1e-12);
    }

    #[test]
    fn reprojection_behind_camera_gives_penalty_and_zero_jacobian() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(crate::entity::Viewpoint::new(Intrinsics::default(), 1920.0, 1080.0));
        let pt = project.add_point(DVec3::new(0.0, 0.0, -10.0));
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let camera = layout.camera_params(vp).unwrap();
        let point = layout.point_params(pt).unwrap();
        let provider = ReprojectionProvider::new(point, camera, (960.0, 540.0));
        let x = layout.initial_x();
        let r = provider.residuals(&x);
        assert_eq!(r, vec![BEHIND_CAMERA_PENALTY, BEHIND_CAMERA_PENALTY]);
        let (jac, _) = provider.jacobian(&x);
        assert!(jac.iter().all(|row| row.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn reprojection_jacobian_matches_finite_difference() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(
            crate::entity::Viewpoint::new(Intrinsics::default(), 1920.0, 1080.0)
                .with_pose(DVec3::new(0.0, 0.0, -5.0), glam::DQuat::IDENTITY),
        );
        let pt = project.add_point(DVec3::new(0.3, -0.2, 0.0));
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let camera = layout.camera_params(vp).unwrap();
        let point = layout.point_params(pt).unwrap();
        let provider = ReprojectionProvider::new(point, camera, (900.0, 600.0));
        let x = layout.initial_x();
        let (jac, cols) = provider.jacobian(&x);
        let r0 = provider.residuals(&x);

        for (local, &col) in cols.iter().enumerate() {
            let mut xp = x.clone();
            xp[col] += NUMERICAL_DIFF_EPS;
            let rp = provider.residuals(&xp);
            for row in 0..2 {
                let numerical = (rp[row] - r0[row]) / NUMERICAL_DIFF_EPS;
                assert!(
                    (jac[row][local] - numerical).abs() < 1e-3,
                    "row {row} col {col}: {} vs {}",
                    jac[row][local],
                    numerical
                );
            }
        }
    }
}
