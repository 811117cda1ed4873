//! Observed pixel clicks: one world point seen in one viewpoint.

use crate::entity::handle::Handle;
use crate::entity::point::WorldPoint;
use crate::entity::viewpoint::Viewpoint;

#[derive(Debug, Clone)]
pub struct ImagePoint {
    pub pixel: (f64, f64),
    pub world_point: Handle<WorldPoint>,
    pub viewpoint: Handle<Viewpoint>,
    pub visible: bool,
    pub confidence: f64,
    /// The last residual written back by a solve (pixel error vector),
    /// surfaced externally as `lastResiduals`.
    pub last_residual: Option<(f64, f64)>,
}

impl ImagePoint {
    pub fn new(pixel: (f64, f64), world_point: Handle<WorldPoint>, viewpoint: Handle<Viewpoint>) -> Self {
        Self {
            pixel,
            world_point,
            viewpoint,
            visible: true,
            confidence: 1.0,
            last_residual: None,
        }
    }

    /// `0 <= u <= W`, `0 <= v <= H` is a warning, not a hard invariant;
    /// callers decide what to do with an out-of-bounds click.
    pub fn in_bounds(&self, width: f64, height: f64) -> bool {
        (0.0..=width).contains(&self.pixel.0) && (0.0..=height).contains(&self.pixel.1)
    }

    pub fn reprojection_error(&self) -> Option<f64> {
        self.last_residual.map(|(du, dv)| (du * du + dv * dv).sqrt())
    }
}
