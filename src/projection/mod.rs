//! Pinhole projection with Brown-Conrady distortion, plus the plain
//! camera-model data types entities hold.

pub mod camera_model;
pub mod pinhole;

pub use camera_model::{Intrinsics, Pose};
pub use pinhole::{
    camera_space, cross, distort, dot, normalise, pixel, project, quat_rotate, IntrinsicsG,
    ProjectionFailure, QuatG, Vec3G,
};
