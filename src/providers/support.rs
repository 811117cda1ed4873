//! Shared plumbing every provider in [`crate::providers`] builds on: the
//! free-column bookkeeping that lets one generic `compute<S: Scalar>` body
//! serve as both the plain residual and (via [`Dual`]) the analytical
//! Jacobian, plus the small `ParamRef -> Vec3G<S>`/`QuatG<S>` lifters.

use crate::autodiff::{Dual, Scalar};
use crate::layout::{CameraParams, IntrinsicsParams, ParamRef, PointParams};
use crate::projection::{IntrinsicsG, QuatG, Vec3G};

/// The distinct free columns a provider instance depends on, in first-seen
/// order. A provider registers every operand it will ever read through
/// [`LocalVars::push`] at construction time, then uses [`LocalVars::dual`]
/// to turn each [`ParamRef`] into a [`Dual`] carrying a gradient sized to
/// this set -- the same set for every call, so repeated evaluations (one
/// per LM iteration) don't reallocate a different shape.
#[derive(Debug, Clone, Default)]
pub struct LocalVars {
    columns: Vec<usize>,
}

impl LocalVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, p: ParamRef) {
        if let Some(c) = p.column() {
            if !self.columns.contains(&c) {
                self.columns.push(c);
            }
        }
    }

    pub fn push_point(&mut self, p: PointParams) {
        self.push(p.x);
        self.push(p.y);
        self.push(p.z);
    }

    pub fn push_camera_pose(&mut self, c: &CameraParams) {
        for p in c.position {
            self.push(p);
        }
        for r in c.rotation {
            self.push(r);
        }
    }

    pub fn push_intrinsics(&mut self, ip: &IntrinsicsParams) {
        self.push(ip.focal_length);
        self.push(ip.aspect_ratio);
        self.push(ip.cx);
        self.push(ip.cy);
        self.push(ip.skew);
        self.push(ip.k1);
        self.push(ip.k2);
        self.push(ip.k3);
        self.push(ip.p1);
        self.push(ip.p2);
    }

    pub fn n(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// `p` as a [`Dual`] carrying a gradient against this provider's full
    /// local variable set. `p` must have been registered via [`Self::push`]
    /// (or one of its point/camera variants) beforehand.
    pub fn dual(&self, p: ParamRef, x: &[f64]) -> Dual {
        match p {
            ParamRef::Fixed(v) => Dual::constant(v, self.n()),
            ParamRef::Free(col) => {
                let i = self
                    .columns
                    .iter()
                    .position(|&c| c == col)
                    .expect("column not registered in LocalVars");
                Dual::variable(x[col], i, self.n())
            }
        }
    }
}

/// A [`Dual`]'s gradient is empty when it never touched a variable-carrying
/// operand (e.g. the behind-camera penalty, which is a bare constant) --
/// pad it to the provider's full width so every Jacobian row has the same
/// number of columns as `vars.columns()`.
pub fn dual_rows_to_jacobian(duals: Vec<Dual>, n: usize) -> Vec<Vec<f64>> {
    duals
        .into_iter()
        .map(|d| if d.grad.is_empty() { vec![0.0; n] } else { d.grad })
        .collect()
}

pub fn point_vec<S: Scalar>(p: PointParams, get: &impl Fn(ParamRef) -> S) -> Vec3G<S> {
    Vec3G::new(get(p.x), get(p.y), get(p.z))
}

pub fn camera_position_vec<S: Scalar>(c: &CameraParams, get: &impl Fn(ParamRef) -> S) -> Vec3G<S> {
    Vec3G::new(get(c.position[0]), get(c.position[1]), get(c.position[2]))
}

pub fn camera_quat_vec<S: Scalar>(c: &CameraParams, get: &impl Fn(ParamRef) -> S) -> QuatG<S> {
    QuatG {
        w: get(c.rotation[0]),
        x: get(c.rotation[1]),
        y: get(c.rotation[2]),
        z: get(c.rotation[3]),
    }
}

pub fn camera_intrinsics_vec<S: Scalar>(
    c: &CameraParams,
    get: &impl Fn(ParamRef) -> S,
) -> IntrinsicsG<S> {
    let ip = &c.intrinsics;
    IntrinsicsG {
        focal_length: get(ip.focal_length),
        aspect_ratio: get(ip.aspect_ratio),
        cx: get(ip.cx),
        cy: get(ip.cy),
        skew: get(ip.skew),
        k1: get(ip.k1),
        k2: get(ip.k2),
        k3: get(ip.k3),
        p1: get(ip.p1),
        p2: get(ip.p2),
    }
}
