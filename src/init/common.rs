//! Small pieces shared by the initialisation modules: pixel <-> bearing
//! conversion through the (undistorted) pinhole model and the world-space
//! ray a camera pose casts through an observed pixel. Distortion is
//! deliberately ignored here -- these are starting guesses for PnP/DLT and
//! triangulation, cleaned up by the LM refine pass afterwards.

use glam::{DQuat, DVec3};

use crate::projection::camera_model::Intrinsics;

/// Undistorted normalised-then-unit bearing direction in camera space for
/// a pixel, through `K^-1`.
pub fn pixel_to_bearing(intrinsics: &Intrinsics, pixel: (f64, f64)) -> DVec3 {
    let fx = intrinsics.focal_length;
    let fy = intrinsics.fy();
    let (cx, cy) = intrinsics.principal_point;
    let (u, v) = pixel;
    let yn = (v - cy) / fy;
    let xn = (u - cx) / fx - intrinsics.skew * yn / fx;
    DVec3::new(xn, yn, 1.0).normalize_or_zero()
}

/// The world-space ray a camera casts through an observed pixel: origin at
/// the camera position, direction the camera-space bearing rotated back
/// into world space (undoing both the world->camera rotation and, if
/// present, the Z-reflection).
pub fn world_ray(
    camera_position: DVec3,
    camera_rotation: DQuat,
    is_z_reflected: bool,
    intrinsics: &Intrinsics,
    pixel: (f64, f64),
) -> (DVec3, DVec3) {
    let mut bearing = pixel_to_bearing(intrinsics, pixel);
    if is_z_reflected {
        bearing = -bearing;
    }
    let direction = camera_rotation.inverse() * bearing;
    (camera_position, direction.normalize_or_zero())
}
