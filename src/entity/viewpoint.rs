//! Cameras: intrinsics, pose, and the observation set they own.

use glam::{DQuat, DVec3};

use crate::entity::handle::Handle;
use crate::entity::image_point::ImagePoint;
use crate::projection::camera_model::{Intrinsics, Pose};

#[derive(Debug, Clone)]
pub struct Viewpoint {
    pub intrinsics: Intrinsics,
    pub width: f64,
    pub height: f64,
    pub pose: Pose,
    pub pose_locked: bool,
    pub observations: Vec<Handle<ImagePoint>>,
}

impl Viewpoint {
    pub fn new(intrinsics: Intrinsics, width: f64, height: f64) -> Self {
        Self {
            intrinsics,
            width,
            height,
            pose: Pose::default(),
            pose_locked: false,
            observations: Vec::new(),
        }
    }

    pub fn with_pose(mut self, position: DVec3, rotation: DQuat) -> Self {
        self.pose.position = position;
        self.pose.rotation = rotation;
        self
    }

    /// Invariant: `fx, aspect, W, H > 0`.
    pub fn has_valid_geometry(&self) -> bool {
        self.intrinsics.focal_length > 0.0
            && self.intrinsics.aspect_ratio > 0.0
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Invariant: `|q| = 1 +/- 1e-2` at rest.
    pub fn has_valid_quaternion(&self) -> bool {
        (crate::quaternion::norm_squared(self.pose.rotation).sqrt() - 1.0).abs() <= 1e-2
    }
}
