//! Pinhole projection with Brown-Conrady distortion, generic over
//! [`Scalar`] so the autodiff (`Dual`) and plain (`f64`) variants are
//! generated from one source of truth.
//!
//! World -> camera -> normalised -> distorted -> pixel, exactly the chain
//! the analytical reprojection Jacobian (see
//! [`crate::providers::reprojection`]) decomposes term by term.

use crate::autodiff::Scalar;
use crate::constants::NEAR_PLANE;

/// Generic 3-vector of `S`. A bare `[S; 3]` would work too; the named
/// fields make the projection chain below read like its own formulas.
#[derive(Debug, Clone, Copy)]
pub struct Vec3G<S> {
    pub x: S,
    pub y: S,
    pub z: S,
}

impl<S: Scalar> Vec3G<S> {
    pub fn new(x: S, y: S, z: S) -> Self {
        Self { x, y, z }
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self { x: self.x - rhs.x, y: self.y - rhs.y, z: self.z - rhs.z }
    }

    pub fn add(self, rhs: Self) -> Self {
        Self { x: self.x + rhs.x, y: self.y + rhs.y, z: self.z + rhs.z }
    }

    pub fn scale(self, k: S) -> Self {
        Self { x: self.x * k, y: self.y * k, z: self.z * k }
    }

    pub fn neg(self) -> Self {
        Self { x: -self.x, y: -self.y, z: -self.z }
    }

    pub fn norm(self) -> S {
        dot(self, self).sqrt()
    }

    /// Unit vector along `self`. Callers are responsible for checking the
    /// norm is bounded away from zero first; this never divides by a
    /// literal zero but will blow up the gradient if it's near one.
    pub fn normalize(self) -> Self {
        self.scale(self.norm().recip())
    }
}

/// Dot product, generic over `S` so it differentiates through [`Scalar`]
/// the same way [`cross`] does.
pub fn dot<S: Scalar>(a: Vec3G<S>, b: Vec3G<S>) -> S {
    a.x * b.x + a.y * b.y + a.z * b.z
}

/// Cross product `a x b`.
pub fn cross<S: Scalar>(a: Vec3G<S>, b: Vec3G<S>) -> Vec3G<S> {
    Vec3G::new(a.y * b.z - a.z * b.y, a.z * b.x - a.x * b.z, a.x * b.y - a.y * b.x)
}

/// Generic quaternion `(w, x, y, z)` of `S`.
#[derive(Debug, Clone, Copy)]
pub struct QuatG<S> {
    pub w: S,
    pub x: S,
    pub y: S,
    pub z: S,
}

/// Rotate `v` by unit quaternion `q`, using the standard
/// `v + 2*cross(qv, cross(qv, v) + q.w*v)` identity -- pure multiply/add,
/// so it differentiates through [`Scalar`] for free.
pub fn quat_rotate<S: Scalar>(q: QuatG<S>, v: Vec3G<S>) -> Vec3G<S> {
    let qv = Vec3G::new(q.x, q.y, q.z);
    let uv = cross(qv, v);
    let uuv = cross(qv, uv);
    let two = S::constant(2.0);
    Vec3G::new(
        v.x + two * (uv.x * q.w + uuv.x),
        v.y + two * (uv.y * q.w + uuv.y),
        v.z + two * (uv.z * q.w + uuv.z),
    )
}

/// Generic camera intrinsics, mirroring
/// [`crate::projection::camera_model::Intrinsics`] but over `S` so the
/// focal length (and, when optimised, other intrinsics) can themselves be
/// active variables.
#[derive(Debug, Clone, Copy)]
pub struct IntrinsicsG<S> {
    pub focal_length: S,
    pub aspect_ratio: S,
    pub cx: S,
    pub cy: S,
    pub skew: S,
    pub k1: S,
    pub k2: S,
    pub k3: S,
    pub p1: S,
    pub p2: S,
}

/// Why a projection could not be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionFailure {
    BehindCamera,
}

/// Full world -> pixel projection. Returns `Err(BehindCamera)` when
/// `p_c.z < NEAR_PLANE`; callers map that to the behind-camera residual
/// penalty rather than a hard error.
pub fn project<S: Scalar>(
    intrinsics: &IntrinsicsG<S>,
    camera_position: Vec3G<S>,
    camera_rotation: QuatG<S>,
    is_z_reflected: bool,
    world_point: Vec3G<S>,
) -> Result<(S, S), ProjectionFailure> {
    let p_c = camera_space(camera_position, camera_rotation, is_z_reflected, world_point);

    if p_c.z.value() < NEAR_PLANE {
        return Err(ProjectionFailure::BehindCamera);
    }

    let (xn, yn) = normalise(p_c);
    let (xd, yd) = distort(intrinsics, xn, yn);
    Ok(pixel(intrinsics, xd, yd))
}

/// World point in camera space (before the perspective divide).
pub fn camera_space<S: Scalar>(
    camera_position: Vec3G<S>,
    camera_rotation: QuatG<S>,
    is_z_reflected: bool,
    world_point: Vec3G<S>,
) -> Vec3G<S> {
    let relative = world_point.sub(camera_position);
    let rotated = quat_rotate(camera_rotation, relative);
    if is_z_reflected {
        rotated.neg()
    } else {
        rotated
    }
}

/// Normalised (pre-distortion) image-plane coordinates.
pub fn normalise<S: Scalar>(p_c: Vec3G<S>) -> (S, S) {
    let inv_z = p_c.z.recip();
    (p_c.x * inv_z, p_c.y * inv_z)
}

/// Brown-Conrady distortion of normalised coordinates.
pub fn distort<S: Scalar>(intrinsics: &IntrinsicsG<S>, x: S, y: S) -> (S, S) {
    let r2 = x.powi(2) + y.powi(2);
    let r4 = r2.powi(2);
    let r6 = r2 * r4;
    let one = S::constant(1.0);
    let two = S::constant(2.0);

    let radial = one + intrinsics.k1 * r2 + intrinsics.k2 * r4 + intrinsics.k3 * r6;

    let xd = x * radial + two * intrinsics.p1 * x * y + intrinsics.p2 * (r2 + two * x.powi(2));
    let yd = y * radial + intrinsics.p1 * (r2 + two * y.powi(2)) + two * intrinsics.p2 * x * y;
    (xd, yd)
}

/// Distorted normalised coordinates -> pixel coordinates.
pub fn pixel<S: Scalar>(intrinsics: &IntrinsicsG<S>, xd: S, yd: S) -> (S, S) {
    let fy = intrinsics.focal_length * intrinsics.aspect_ratio;
    let u = intrinsics.focal_length * xd + intrinsics.skew * yd + intrinsics.cx;
    let v = fy * yd + intrinsics.cy;
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_intrinsics() -> IntrinsicsG<f64> {
        IntrinsicsG {
            focal_length: 1000.0,
            aspect_ratio: 1.0,
            cx: 960.0,
            cy: 540.0,
            skew: 0.0,
            k1: 0.0,
            k2: 0.0,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
        }
    }

    #[test]
    fn projects_point_on_axis_to_principal_point() {
        let intr = identity_intrinsics();
        let cam_pos = Vec3G::new(0.0, 0.0, 0.0);
        let cam_rot = QuatG { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };
        let p = Vec3G::new(0.0, 0.0, 10.0);
        let (u, v) = project(&intr, cam_pos, cam_rot, false, p).unwrap();
        assert!((u - 960.0).abs() < 1e-9);
        assert!((v - 540.0).abs() < 1e-9);
    }

    #[test]
    fn behind_camera_is_rejected() {
        let intr = identity_intrinsics();
        let cam_pos = Vec3G::new(0.0, 0.0, 0.0);
        let cam_rot = QuatG { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };
        let p = Vec3G::new(0.0, 0.0, -10.0);
        assert_eq!(
            project(&intr, cam_pos, cam_rot, false, p),
            Err(ProjectionFailure::BehindCamera)
        );
    }

    #[test]
    fn plain_and_autodiff_agree_on_value() {
        use crate::autodiff::Dual;

        let intr_plain = IntrinsicsG {
            focal_length: 1000.0,
            aspect_ratio: 1.05,
            cx: 960.0,
            cy: 540.0,
            skew: 0.0,
            k1: 0.01,
            k2: -0.002,
            k3: 0.0,
            p1: 0.0005,
            p2: -0.0003,
        };
        let cam_pos_plain = Vec3G::new(1.0, -2.0, -15.0);
        let cam_rot_plain = QuatG { w: 0.98, x: 0.1, y: 0.05, z: 0.02 };
        let p_plain = Vec3G::new(3.0, 4.0, 5.0);
        let (u0, v0) = project(&intr_plain, cam_pos_plain, cam_rot_plain, false, p_plain).unwrap();

        let n = 3;
        let lift = |v: f64| Dual::constant(v, n);
        let intr_dual = IntrinsicsG {
            focal_length: lift(intr_plain.focal_length),
            aspect_ratio: lift(intr_plain.aspect_ratio),
            cx: lift(intr_plain.cx),
            cy: lift(intr_plain.cy),
            skew: lift(intr_plain.skew),
            k1: lift(intr_plain.k1),
            k2: lift(intr_plain.k2),
            k3: lift(intr_plain.k3),
            p1: lift(intr_plain.p1),
            p2: lift(intr_plain.p2),
        };
        let cam_pos_dual = Vec3G::new(lift(1.0), lift(-2.0), lift(-15.0));
        let cam_rot_dual = QuatG { w: lift(0.98), x: lift(0.1), y: lift(0.05), z: lift(0.02) };
        let p_dual = Vec3G::new(
            Dual::variable(3.0, 0, n),
            Dual::variable(4.0, 1, n),
            Dual::variable(5.0, 2, n),
        );
        let (u1, v1) =
            project(&intr_dual, cam_pos_dual, cam_rot_dual, false, p_dual).unwrap();

        assert!((u0 - u1.value).abs() < 1e-9);
        assert!((v0 - v1.value).abs() < 1e-9);
    }
}
