//! Initialisation pipeline: gives the LM driver a starting point it can
//! actually converge from, rather than leaving every free variable at its
//! arbitrary default.
//!
//! The five pieces below ([`vanishing`], [`p3p`], [`triangulation`],
//! [`seeding`], [`branching`]) are individually pure and unit-tested; this
//! module wires them into one incremental pass over a [`Project`]:
//!
//! 1. Orient every viewpoint that has vanishing lines, straight from the
//!    image geometry (no world points needed yet).
//! 2. Where a viewpoint is oriented (or has enough locked correspondences
//!    for P3P/DLT outright), recover its position/pose.
//! 3. Seed every remaining unconstrained point by walking the line graph.
//! 4. Resolve inference-branching sign ambiguities against reprojection
//!    cost now that camera poses exist.
//! 5. Triangulate every point seen by two or more posed cameras, replacing
//!    its seeded guess with a real multi-view estimate.
//! 6. A final PnP pass for any viewpoint still unposed, now that
//!    triangulation has produced more correspondences to draw on.

pub mod branching;
pub mod common;
pub mod p3p;
pub mod seeding;
pub mod triangulation;
pub mod vanishing;

use std::collections::HashMap;

use glam::DQuat;
use rand::Rng;

use crate::entity::{Axis, Handle, Viewpoint, WorldPoint};
use crate::log::SolveLog;
use crate::project::Project;
use crate::providers::camera::estimate_vanishing_point;
use crate::quaternion;

/// Every correspondence between a locked/inferred world point and a pixel
/// click in `viewpoint`, usable directly by [`p3p::pnp`]/[`p3p::dlt`].
fn correspondences_for(project: &Project, viewpoint: Handle<Viewpoint>) -> Vec<p3p::Correspondence> {
    let Some(vp) = project.viewpoints.get(viewpoint) else { return Vec::new() };
    vp.observations
        .iter()
        .filter_map(|&ip_handle| project.image_points.get(ip_handle))
        .filter_map(|ip| {
            let point = project.points.get(ip.world_point)?;
            if !point.is_fully_constrained() {
                return None;
            }
            let world = glam::DVec3::new(
                point.effective_value(Axis::X).unwrap(),
                point.effective_value(Axis::Y).unwrap(),
                point.effective_value(Axis::Z).unwrap(),
            );
            Some(p3p::Correspondence { world, pixel: ip.pixel })
        })
        .collect()
}

/// Orients `viewpoint` from its vanishing lines alone, or `None` if it has
/// fewer than two axis groups with an estimated vanishing point.
fn orient_from_vanishing_lines(project: &Project, viewpoint: Handle<Viewpoint>) -> Option<DQuat> {
    let vp = project.viewpoints.get(viewpoint)?;
    let lines = project.vanishing_lines_for(viewpoint);

    let mut by_axis: HashMap<Axis, Vec<_>> = HashMap::new();
    for line in &lines {
        by_axis.entry(line.axis).or_default().push(*line);
    }

    let mut directions = vanishing::AxisDirections::default();
    for &axis in &Axis::ALL {
        let Some(group) = by_axis.get(&axis) else { continue };
        let refs: Vec<&crate::entity::VanishingLine> = group.iter().copied().collect();
        let Some(vp_pixel) = estimate_vanishing_point(&refs) else { continue };
        directions.set(axis, vanishing::back_project(&vp.intrinsics, vp_pixel));
    }

    let correspondences = correspondences_for(project, viewpoint);
    vanishing::orient_from_vanishing_points(directions, |candidate| {
        score_orientation(candidate, vp, &correspondences)
    })
}

/// Front-of-camera majority, then (as a tie-break) negative mean
/// reprojection error -- higher is better.
fn score_orientation(
    rotation: DQuat,
    viewpoint: &Viewpoint,
    correspondences: &[p3p::Correspondence],
) -> f64 {
    if correspondences.is_empty() {
        return 0.0;
    }
    let front = correspondences
        .iter()
        .filter(|c| quaternion::world_to_camera(rotation, glam::DVec3::ZERO, c.world).z > 0.0)
        .count();
    let front_fraction = front as f64 / correspondences.len() as f64;

    let mut total_error = 0.0;
    for corr in correspondences {
        let world = glam::DVec3::new(corr.world.x, corr.world.y, corr.world.z);
        let p_c = rotation * world;
        if p_c.z > crate::constants::NEAR_PLANE {
            let xn = p_c.x / p_c.z - corr.pixel.0 / viewpoint.intrinsics.focal_length;
            let yn = p_c.y / p_c.z - corr.pixel.1 / viewpoint.intrinsics.fy();
            total_error += (xn * xn + yn * yn).sqrt();
        } else {
            total_error += 1.0;
        }
    }
    front_fraction * 1000.0 - total_error
}

/// Orients and positions every viewpoint it can, given the project's current
/// point constraints: vanishing-line orientation first, then best-of
/// P3P/DLT position/pose recovery from whatever correspondences are locked
/// or already inferred. Returns the viewpoints this pass could not recover
/// a pose for, left unlocked so a later pass (more correspondences after
/// triangulation) can retry them.
fn initialize_cameras(project: &mut Project, rng: &mut impl Rng, log: &mut SolveLog) -> Vec<Handle<Viewpoint>> {
    let handles: Vec<Handle<Viewpoint>> = project.viewpoints.iter().map(|(h, _)| h).collect();
    let mut failed = Vec::new();
    for handle in handles {
        if project.viewpoints.get(handle).map_or(true, |vp| vp.pose_locked) {
            continue;
        }

        let correspondences = correspondences_for(project, handle);
        let oriented = orient_from_vanishing_lines(project, handle);

        let pose = match (oriented, correspondences.len()) {
            (_, n) if n >= 3 => {
                let Some(vp) = project.viewpoints.get(handle) else { continue };
                let (intrinsics, width, height) = (vp.intrinsics, vp.width, vp.height);
                p3p::initialize_pose(intrinsics, width, height, &correspondences, rng, log)
            }
            (Some(rotation), _) => {
                let Some(vp) = project.viewpoints.get(handle) else { continue };
                Some((vp.pose.position, rotation))
            }
            _ => None,
        };

        if let Some((position, rotation)) = pose {
            if let Some(vp) = project.viewpoints.get_mut(handle) {
                vp.pose.position = position;
                vp.pose.rotation = rotation;
            }
            log.info(format!("init: posed viewpoint {}", handle.index()));
        } else {
            log.warn(format!("init: could not recover a pose for viewpoint {}", handle.index()));
            failed.push(handle);
        }
    }
    failed
}

/// Triangulates every point observed by two or more posed viewpoints,
/// overwriting its seeded `optimized_xyz` with the multi-view estimate.
fn triangulate_points(project: &mut Project) {
    let handles: Vec<Handle<WorldPoint>> = project.points.iter().map(|(h, _)| h).collect();
    for handle in handles {
        let Some(point) = project.points.get(handle) else { continue };
        if point.is_fully_constrained() {
            continue;
        }
        let rays: Vec<triangulation::Ray> = point
            .observations
            .iter()
            .filter_map(|&ip_handle| {
                let ip = project.image_points.get(ip_handle)?;
                let vp = project.viewpoints.get(ip.viewpoint)?;
                let (origin, direction) = common::world_ray(
                    vp.pose.position,
                    vp.pose.rotation,
                    vp.pose.is_z_reflected,
                    &vp.intrinsics,
                    ip.pixel,
                );
                Some(triangulation::Ray { origin, direction })
            })
            .collect();

        if let Some(position) = triangulation::triangulate(&rays) {
            if let Some(point) = project.points.get_mut(handle) {
                point.optimized_xyz = position;
            }
        }
    }
}

/// Runs the full initialisation pipeline over `project`: vanishing-point
/// orientation and PnP for cameras, BFS seeding and inference branching for
/// points, and a triangulation pass once cameras are posed, finishing with a
/// second camera pass for anything triangulation newly unlocked.
///
/// Returns the viewpoints that still had no recoverable pose after the
/// second camera pass. Each of those is excluded from the solve (its pose
/// is locked in place) and flagged rather than left to destabilise the
/// layout with a meaningless starting guess.
pub fn initialize(project: &mut Project, rng: &mut impl Rng, log: &mut SolveLog) -> Vec<Handle<Viewpoint>> {
    log.info("init: starting initialisation pipeline".to_string());

    initialize_cameras(project, rng, log);
    seeding::seed_positions(project, rng);
    branching::resolve_best(project, |p| reprojection_cost(p));
    triangulate_points(project);
    let failed = initialize_cameras(project, rng, log);

    for &handle in &failed {
        if let Some(vp) = project.viewpoints.get_mut(handle) {
            vp.pose_locked = true;
        }
        log.warn(format!(
            "init: excluding viewpoint {} -- no pose could be recovered",
            handle.index()
        ));
    }

    log.info("init: initialisation pipeline finished".to_string());
    failed
}

/// Total mean reprojection error across every posed viewpoint -- the
/// "post-init cost" [`branching::resolve_best`] minimises over sign
/// assignments.
fn reprojection_cost(project: &mut Project) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for (_, vp) in project.viewpoints.iter() {
        for &ip_handle in &vp.observations {
            let Some(ip) = project.image_points.get(ip_handle) else { continue };
            let Some(point) = project.points.get(ip.world_point) else { continue };
            if !point.is_fully_constrained() {
                continue;
            }
            let world = glam::DVec3::new(
                point.effective_value(Axis::X).unwrap(),
                point.effective_value(Axis::Y).unwrap(),
                point.effective_value(Axis::Z).unwrap(),
            );
            let intr = crate::projection::IntrinsicsG {
                focal_length: vp.intrinsics.focal_length,
                aspect_ratio: vp.intrinsics.aspect_ratio,
                cx: vp.intrinsics.principal_point.0,
                cy: vp.intrinsics.principal_point.1,
                skew: vp.intrinsics.skew,
                k1: vp.intrinsics.radial.0,
                k2: vp.intrinsics.radial.1,
                k3: vp.intrinsics.radial.2,
                p1: vp.intrinsics.tangential.0,
                p2: vp.intrinsics.tangential.1,
            };
            let rot = crate::projection::QuatG {
                w: vp.pose.rotation.w,
                x: vp.pose.rotation.x,
                y: vp.pose.rotation.y,
                z: vp.pose.rotation.z,
            };
            let pos = crate::projection::Vec3G::new(vp.pose.position.x, vp.pose.position.y, vp.pose.position.z);
            let world_g = crate::projection::Vec3G::new(world.x, world.y, world.z);
            match crate::projection::project(&intr, pos, rot, vp.pose.is_z_reflected, world_g) {
                Ok((u, v)) => {
                    let (du, dv) = (u - ip.pixel.0, v - ip.pixel.1);
                    total += (du * du + dv * dv).sqrt();
                    count += 1;
                }
                Err(_) => {
                    total += crate::constants::BEHIND_CAMERA_PENALTY;
                    count += 1;
                }
            }
        }
    }
    if count == 0 { 0.0 } else { total / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Viewpoint;
    use crate::projection::camera_model::Intrinsics;
    use glam::DVec3;

    #[test]
    fn triangulates_a_point_seen_by_two_posed_cameras() {
        let mut project = Project::new();

        let true_point = DVec3::new(0.2, -0.1, 8.0);
        let cams = [
            (DVec3::new(-1.0, 0.0, 0.0), DQuat::IDENTITY),
            (DVec3::new(1.0, 0.0, 0.0), DQuat::IDENTITY),
        ];

        let handle = project.add_point(DVec3::ZERO);
        for (pos, rot) in cams {
            let vp = project.add_viewpoint(
                Viewpoint::new(Intrinsics::default(), 1920.0, 1080.0).with_pose(pos, rot),
            );
            let relative = true_point - pos;
            let p_c = rot * relative;
            let u = 1000.0 * (p_c.x / p_c.z);
            let v = 1000.0 * (p_c.y / p_c.z);
            project.add_image_point((u, v), handle, vp);
        }

        let before = project.points.get(handle).unwrap().optimized_xyz;
        triangulate_points(&mut project);
        let after = project.points.get(handle).unwrap().optimized_xyz;
        assert_ne!(before, after);
        assert!((after - true_point).length() < 1e-6);
    }
}
