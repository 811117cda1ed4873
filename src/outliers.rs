//! Outlier detection and retry support: outliers are image observations,
//! never world points; a camera starved of
//! observations after exclusion is dropped from the next attempt rather
//! than left to destabilise it.

use std::collections::HashMap;

use crate::constants::{MIN_OBSERVATIONS_PER_CAMERA, OUTLIER_HARD_PX, OUTLIER_MAD_K};
use crate::entity::{Handle, ImagePoint, Viewpoint};
use crate::project::Project;
use crate::projection::{IntrinsicsG, ProjectionFailure, QuatG, Vec3G};

fn intrinsics_g(intrinsics: &crate::projection::camera_model::Intrinsics) -> IntrinsicsG<f64> {
    IntrinsicsG {
        focal_length: intrinsics.focal_length,
        aspect_ratio: intrinsics.aspect_ratio,
        cx: intrinsics.principal_point.0,
        cy: intrinsics.principal_point.1,
        skew: intrinsics.skew,
        k1: intrinsics.radial.0,
        k2: intrinsics.radial.1,
        k3: intrinsics.radial.2,
        p1: intrinsics.tangential.0,
        p2: intrinsics.tangential.1,
    }
}

/// Pixel reprojection error for every currently-visible image point, keyed
/// by handle. A behind-camera projection is omitted rather than penalised:
/// the outlier test below should see a genuine distribution of pixel
/// errors, not the fixed penalty constant.
pub fn reprojection_errors(project: &Project) -> HashMap<Handle<ImagePoint>, f64> {
    let mut errors = HashMap::new();
    for (handle, ip) in project.image_points.iter() {
        if !ip.visible {
            continue;
        }
        let Some(point) = project.points.get(ip.world_point) else { continue };
        let Some(vp) = project.viewpoints.get(ip.viewpoint) else { continue };
        let intr = intrinsics_g(&vp.intrinsics);
        let rot = QuatG { w: vp.pose.rotation.w, x: vp.pose.rotation.x, y: vp.pose.rotation.y, z: vp.pose.rotation.z };
        let pos = Vec3G::new(vp.pose.position.x, vp.pose.position.y, vp.pose.position.z);
        let world = Vec3G::new(point.optimized_xyz.x, point.optimized_xyz.y, point.optimized_xyz.z);
        match crate::projection::project(&intr, pos, rot, vp.pose.is_z_reflected, world) {
            Ok((u, v)) => {
                let (du, dv) = (u - ip.pixel.0, v - ip.pixel.1);
                errors.insert(handle, (du * du + dv * dv).sqrt());
            }
            Err(ProjectionFailure::BehindCamera) => {}
        }
    }
    errors
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// `median(|x_i - median(x)|)` of `errors`.
fn median_absolute_deviation(errors: &[f64], center: f64) -> f64 {
    let mut deviations: Vec<f64> = errors.iter().map(|&e| (e - center).abs()).collect();
    median(&mut deviations)
}

/// Observations whose pixel error exceeds `median + k*MAD` or the hard
/// ceiling [`OUTLIER_HARD_PX`], whichever flags more.
pub fn detect(project: &Project) -> Vec<Handle<ImagePoint>> {
    let errors = reprojection_errors(project);
    if errors.is_empty() {
        return Vec::new();
    }
    let mut values: Vec<f64> = errors.values().copied().collect();
    let center = median(&mut values.clone());
    let mad = median_absolute_deviation(&values, center);
    let threshold = center + OUTLIER_MAD_K * mad;

    let mut outliers: Vec<Handle<ImagePoint>> = errors
        .into_iter()
        .filter(|&(_, error)| error > threshold || error > OUTLIER_HARD_PX)
        .map(|(handle, _)| handle)
        .collect();
    outliers.sort();
    outliers
}

/// Marks every observation in `excluded` invisible (never deleted: a later
/// attempt may re-include it if re-initialisation changes the geometry).
pub fn exclude(project: &mut Project, excluded: &[Handle<ImagePoint>]) {
    for &handle in excluded {
        if let Some(ip) = project.image_points.get_mut(handle) {
            ip.visible = false;
        }
    }
}

/// Cameras whose visible-observation count has dropped below
/// [`MIN_OBSERVATIONS_PER_CAMERA`] after exclusion.
pub fn starved_cameras(project: &Project) -> Vec<Handle<Viewpoint>> {
    project
        .viewpoints
        .iter()
        .filter(|(_, vp)| {
            let visible = vp
                .observations
                .iter()
                .filter(|&&h| project.image_points.get(h).map_or(false, |ip| ip.visible))
                .count();
            visible < MIN_OBSERVATIONS_PER_CAMERA
        })
        .map(|(h, _)| h)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Viewpoint as VP;
    use crate::projection::camera_model::Intrinsics;
    use glam::DVec3;

    #[test]
    fn flags_a_clear_outlier_but_not_the_inliers() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(
            VP::new(Intrinsics::default(), 1920.0, 1080.0).with_pose(DVec3::ZERO, glam::DQuat::IDENTITY),
        );
        for i in 0..6 {
            let pt = project.add_point(DVec3::new(0.1 * i as f64, 0.0, 5.0));
            let p_c = DVec3::new(0.1 * i as f64, 0.0, 5.0);
            let (u, v) = (1000.0 * p_c.x / p_c.z, 1000.0 * p_c.y / p_c.z);
            project.add_image_point((u, v), pt, vp);
        }
        let bad_pt = project.add_point(DVec3::new(0.0, 0.0, 5.0));
        let bad_ip = project.add_image_point((5000.0, 5000.0), bad_pt, vp).unwrap();

        let outliers = detect(&project);
        assert_eq!(outliers, vec![bad_ip]);
    }

    #[test]
    fn exclude_marks_observations_invisible() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(VP::new(Intrinsics::default(), 1920.0, 1080.0));
        let pt = project.add_point(DVec3::ZERO);
        let ip = project.add_image_point((0.0, 0.0), pt, vp).unwrap();
        exclude(&mut project, &[ip]);
        assert!(!project.image_points.get(ip).unwrap().visible);
    }

    #[test]
    fn camera_below_minimum_observations_is_starved() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(VP::new(Intrinsics::default(), 1920.0, 1080.0));
        let pt = project.add_point(DVec3::ZERO);
        project.add_image_point((0.0, 0.0), pt, vp);
        assert_eq!(starved_cameras(&project), vec![vp]);
    }
}
