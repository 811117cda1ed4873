//! Component E: the variable layout -- a bidirectional map between scene
//! entities and a flat parameter vector `x`.
//!
//! Built once per solve and immutable for its lifetime. Every provider
//! resolves its operands through [`ParamRef`]s handed out by the layout
//! rather than indexing `x` directly, so a locked axis or a locked camera
//! pose is substituted as a constant at the same call sites that would
//! otherwise read a free column -- a per-variable lock mask expressed as
//! data rather than a second code path.

use std::collections::HashMap;

use glam::{DQuat, DVec3};

use crate::entity::{Axis, Handle, Viewpoint, WorldPoint};
use crate::error::SolveError;
use crate::project::Project;
use crate::projection::camera_model::Intrinsics;

/// A single scalar operand: either a free column in `x`, or a constant
/// substituted at provider-build time (a lock, or a not-currently-optimised
/// intrinsic/pose field).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamRef {
    Free(usize),
    Fixed(f64),
}

impl ParamRef {
    #[inline]
    pub fn value(self, x: &[f64]) -> f64 {
        match self {
            ParamRef::Free(i) => x[i],
            ParamRef::Fixed(v) => v,
        }
    }

    #[inline]
    pub fn column(self) -> Option<usize> {
        match self {
            ParamRef::Free(i) => Some(i),
            ParamRef::Fixed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PointParams {
    pub x: ParamRef,
    pub y: ParamRef,
    pub z: ParamRef,
}

impl PointParams {
    pub fn components(self) -> [ParamRef; 3] {
        [self.x, self.y, self.z]
    }

    pub fn value(self, x: &[f64]) -> DVec3 {
        DVec3::new(self.x.value(x), self.y.value(x), self.z.value(x))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntrinsicsParams {
    pub focal_length: ParamRef,
    pub aspect_ratio: ParamRef,
    pub cx: ParamRef,
    pub cy: ParamRef,
    pub skew: ParamRef,
    pub k1: ParamRef,
    pub k2: ParamRef,
    pub k3: ParamRef,
    pub p1: ParamRef,
    pub p2: ParamRef,
}

/// Position + rotation + intrinsics operands for one camera. Present for
/// *every* viewpoint -- free columns are emitted only for `!poseLocked`
/// viewpoints, but a locked camera still needs its pose/intrinsics as
/// constants for every reprojection that observes it.
#[derive(Debug, Clone, Copy)]
pub struct CameraParams {
    pub position: [ParamRef; 3],
    /// `(w, x, y, z)`.
    pub rotation: [ParamRef; 4],
    pub intrinsics: IntrinsicsParams,
    pub is_z_reflected: bool,
    pub pose_is_free: bool,
}

impl CameraParams {
    pub fn position_value(&self, x: &[f64]) -> DVec3 {
        DVec3::new(self.position[0].value(x), self.position[1].value(x), self.position[2].value(x))
    }

    pub fn rotation_value(&self, x: &[f64]) -> DQuat {
        DQuat::from_xyzw(
            self.rotation[1].value(x),
            self.rotation[2].value(x),
            self.rotation[3].value(x),
            self.rotation[0].value(x),
        )
    }
}

#[derive(Debug, Clone)]
pub struct VariableLayout {
    points: HashMap<Handle<WorldPoint>, PointParams>,
    cameras: HashMap<Handle<Viewpoint>, CameraParams>,
    len: usize,
    initial: Vec<f64>,
}

impl VariableLayout {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn initial_x(&self) -> Vec<f64> {
        self.initial.clone()
    }

    pub fn point_params(&self, handle: Handle<WorldPoint>) -> Option<PointParams> {
        self.points.get(&handle).copied()
    }

    pub fn camera_params(&self, handle: Handle<Viewpoint>) -> Option<CameraParams> {
        self.cameras.get(&handle).copied()
    }

    /// Build the layout over every free parameter in `project`, honouring
    /// `optimize_intrinsics`/`optimize_distortion`/`lock_camera_poses` from
    /// [`crate::orchestrator::SolveOptions`]. Entities are visited in arena
    /// (insertion) order, giving a deterministic "sort by entity identifier
    /// then axis" ordering.
    pub fn build(
        project: &Project,
        optimize_intrinsics: bool,
        optimize_distortion: bool,
        lock_camera_poses: bool,
    ) -> Result<Self, SolveError> {
        let mut initial = Vec::new();
        let mut points = HashMap::new();
        let mut cameras = HashMap::new();

        for (handle, point) in project.points.iter() {
            let mut alloc = |locked: Option<f64>, current: f64| -> ParamRef {
                match locked {
                    Some(v) => ParamRef::Fixed(v),
                    None => {
                        initial.push(current);
                        ParamRef::Free(initial.len() - 1)
                    }
                }
            };
            let params = PointParams {
                x: alloc(point.locked[0], point.optimized_xyz.x),
                y: alloc(point.locked[1], point.optimized_xyz.y),
                z: alloc(point.locked[2], point.optimized_xyz.z),
            };
            points.insert(handle, params);
        }

        for (handle, viewpoint) in project.viewpoints.iter() {
            let pose_is_free = !(viewpoint.pose_locked || lock_camera_poses);

            let position = if pose_is_free {
                let p = viewpoint.pose.position;
                [alloc_free(&mut initial, p.x), alloc_free(&mut initial, p.y), alloc_free(&mut initial, p.z)]
            } else {
                let p = viewpoint.pose.position;
                [ParamRef::Fixed(p.x), ParamRef::Fixed(p.y), ParamRef::Fixed(p.z)]
            };

            let rotation = if pose_is_free {
                let q = viewpoint.pose.rotation;
                [
                    alloc_free(&mut initial, q.w),
                    alloc_free(&mut initial, q.x),
                    alloc_free(&mut initial, q.y),
                    alloc_free(&mut initial, q.z),
                ]
            } else {
                let q = viewpoint.pose.rotation;
                [ParamRef::Fixed(q.w), ParamRef::Fixed(q.x), ParamRef::Fixed(q.y), ParamRef::Fixed(q.z)]
            };

            let intrinsics = build_intrinsics_params(
                &viewpoint.intrinsics,
                pose_is_free && optimize_intrinsics,
                pose_is_free && optimize_distortion,
                &mut initial,
            );

            cameras.insert(
                handle,
                CameraParams {
                    position,
                    rotation,
                    intrinsics,
                    is_z_reflected: viewpoint.pose.is_z_reflected,
                    pose_is_free,
                },
            );
        }

        Ok(Self { len: initial.len(), points, cameras, initial })
    }

    /// Write `x` back into the scene: locked-axis-clamped world points and
    /// camera poses/intrinsics. Called once at the end of a solve; never
    /// during LM iterations.
    pub fn write_back(&self, project: &mut Project, x: &[f64]) {
        for (handle, params) in &self.points {
            if let Some(point) = project.points.get_mut(*handle) {
                point.optimized_xyz = params.value(x);
                point.clamp_to_locks();
            }
        }
        for (handle, params) in &self.cameras {
            if let Some(viewpoint) = project.viewpoints.get_mut(*handle) {
                if params.pose_is_free {
                    viewpoint.pose.position = params.position_value(x);
                    viewpoint.pose.rotation =
                        crate::quaternion::safe_normalize(params.rotation_value(x));
                }
                if let Some(f) = params.intrinsics.focal_length.column() {
                    viewpoint.intrinsics.focal_length = x[f];
                }
                if let Some(c) = params.intrinsics.aspect_ratio.column() {
                    viewpoint.intrinsics.aspect_ratio = x[c];
                }
                if let Some(c) = params.intrinsics.cx.column() {
                    viewpoint.intrinsics.principal_point.0 = x[c];
                }
                if let Some(c) = params.intrinsics.cy.column() {
                    viewpoint.intrinsics.principal_point.1 = x[c];
                }
                if let Some(c) = params.intrinsics.skew.column() {
                    viewpoint.intrinsics.skew = x[c];
                }
                if let Some(c) = params.intrinsics.k1.column() {
                    viewpoint.intrinsics.radial.0 = x[c];
                }
                if let Some(c) = params.intrinsics.k2.column() {
                    viewpoint.intrinsics.radial.1 = x[c];
                }
                if let Some(c) = params.intrinsics.k3.column() {
                    viewpoint.intrinsics.radial.2 = x[c];
                }
                if let Some(c) = params.intrinsics.p1.column() {
                    viewpoint.intrinsics.tangential.0 = x[c];
                }
                if let Some(c) = params.intrinsics.p2.column() {
                    viewpoint.intrinsics.tangential.1 = x[c];
                }
            }
        }
    }
}

fn alloc_free(initial: &mut Vec<f64>, value: f64) -> ParamRef {
    initial.push(value);
    ParamRef::Free(initial.len() - 1)
}

fn build_intrinsics_params(
    intrinsics: &Intrinsics,
    optimize_intrinsics: bool,
    optimize_distortion: bool,
    initial: &mut Vec<f64>,
) -> IntrinsicsParams {
    let mut maybe_free = |optimise: bool, value: f64| -> ParamRef {
        if optimise {
            alloc_free(initial, value)
        } else {
            ParamRef::Fixed(value)
        }
    };
    IntrinsicsParams {
        focal_length: maybe_free(optimize_intrinsics, intrinsics.focal_length),
        aspect_ratio: maybe_free(optimize_intrinsics, intrinsics.aspect_ratio),
        cx: maybe_free(optimize_intrinsics, intrinsics.principal_point.0),
        cy: maybe_free(optimize_intrinsics, intrinsics.principal_point.1),
        skew: maybe_free(optimize_intrinsics, intrinsics.skew),
        k1: maybe_free(optimize_distortion, intrinsics.radial.0),
        k2: maybe_free(optimize_distortion, intrinsics.radial.1),
        k3: maybe_free(optimize_distortion, intrinsics.radial.2),
        p1: maybe_free(optimize_distortion, intrinsics.tangential.0),
        p2: maybe_free(optimize_distortion, intrinsics.tangential.1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_axis_is_fixed_free_axes_get_columns() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked[1] = Some(5.0);
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let params = layout.point_params(a).unwrap();
        assert!(matches!(params.x, ParamRef::Free(_)));
        assert_eq!(params.y, ParamRef::Fixed(5.0));
        assert!(matches!(params.z, ParamRef::Free(_)));
        assert_eq!(layout.len(), 2);
    }

    #[test]
    fn locked_pose_viewpoint_contributes_no_columns() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(Viewpoint::new(Intrinsics::default(), 100.0, 100.0));
        project.viewpoints.get_mut(vp).unwrap().pose_locked = true;
        let layout = VariableLayout::build(&project, true, true, false).unwrap();
        assert_eq!(layout.len(), 0);
        let cam = layout.camera_params(vp).unwrap();
        assert!(!cam.pose_is_free);
        assert!(matches!(cam.intrinsics.focal_length, ParamRef::Fixed(_)));
    }

    #[test]
    fn lock_camera_poses_override_frees_no_pose_even_if_unlocked() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(Viewpoint::new(Intrinsics::default(), 100.0, 100.0));
        let layout = VariableLayout::build(&project, false, false, true).unwrap();
        let cam = layout.camera_params(vp).unwrap();
        assert!(!cam.pose_is_free);
        assert_eq!(layout.len(), 0);
    }

    #[test]
    fn unlocked_viewpoint_gets_seven_pose_columns() {
        let mut project = Project::new();
        let _vp = project.add_viewpoint(Viewpoint::new(Intrinsics::default(), 100.0, 100.0));
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        assert_eq!(layout.len(), 7);
    }

    #[test]
    fn intrinsics_and_distortion_add_five_columns_each() {
        let mut project = Project::new();
        let _vp = project.add_viewpoint(Viewpoint::new(Intrinsics::default(), 100.0, 100.0));
        let layout = VariableLayout::build(&project, true, true, false).unwrap();
        assert_eq!(layout.len(), 7 + 5 + 5);
    }
}
