//! User-drawn image segments used to pin a camera's orientation to a world
//! axis via vanishing-point orientation.

use crate::entity::handle::Handle;
use crate::entity::point::Axis;
use crate::entity::viewpoint::Viewpoint;

#[derive(Debug, Clone, Copy)]
pub struct VanishingLine {
    pub p0: (f64, f64),
    pub p1: (f64, f64),
    pub axis: Axis,
    pub viewpoint: Handle<Viewpoint>,
}

impl VanishingLine {
    pub fn new(p0: (f64, f64), p1: (f64, f64), axis: Axis, viewpoint: Handle<Viewpoint>) -> Self {
        Self { p0, p1, axis, viewpoint }
    }

    /// Homogeneous line through the two endpoints, `p0 x p1` in `(u, v, 1)`
    /// homogeneous image coordinates -- the standard construction for
    /// intersecting two image lines at their vanishing point.
    pub fn homogeneous(&self) -> glam::DVec3 {
        let a = glam::DVec3::new(self.p0.0, self.p0.1, 1.0);
        let b = glam::DVec3::new(self.p1.0, self.p1.1, 1.0);
        a.cross(b)
    }
}
