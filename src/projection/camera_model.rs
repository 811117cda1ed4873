//! Plain-data camera intrinsics/pose, independent of the entity arena so the
//! projection kernel can be unit-tested without a [`crate::project::Project`].

use glam::{DQuat, DVec3};

/// Pinhole intrinsics with Brown-Conrady distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub focal_length: f64,
    pub aspect_ratio: f64,
    pub principal_point: (f64, f64),
    pub skew: f64,
    pub radial: (f64, f64, f64), // k1, k2, k3
    pub tangential: (f64, f64), // p1, p2
}

impl Intrinsics {
    pub fn fy(&self) -> f64 {
        self.focal_length * self.aspect_ratio
    }
}

impl Default for Intrinsics {
    fn default() -> Self {
        Self {
            focal_length: 1000.0,
            aspect_ratio: 1.0,
            principal_point: (0.0, 0.0),
            skew: 0.0,
            radial: (0.0, 0.0, 0.0),
            tangential: (0.0, 0.0),
        }
    }
}

/// Camera extrinsic pose: world position and world-to-camera rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub rotation: DQuat,
    /// Mirrors the handedness flag on `Viewpoint`.
    pub is_z_reflected: bool,
}

impl Default for Pose {
    fn default() -> Self {
        Self { position: DVec3::ZERO, rotation: DQuat::IDENTITY, is_z_reflected: false }
    }
}
