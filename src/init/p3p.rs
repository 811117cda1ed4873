//! PnP position/orientation recovery: P3P (Grunert's quartic, Kneip-style
//! bearing formulation) for the minimal 3-point case, DLT for 6+
//! correspondences, and a bounded LM refine pass that re-uses the ordinary
//! reprojection provider and driver on a scratch project with every world
//! point locked -- the same "fine-tune as a `lock_mask` on the one LM
//! driver" idea the outer solve uses, applied here to PnP instead.

use glam::{DMat3, DQuat, DVec3};
use rand::Rng;

use crate::constants::{
    EPS_ZERO, PNP_MAX_DRIFT_FACTOR, PNP_MAX_ERROR_PX, PNP_MIN_FRONT_FRACTION,
    PNP_QUAT_MAGNITUDE_MAX, PNP_QUAT_MAGNITUDE_MIN, PNP_REFINE_DAMPING, PNP_REFINE_ITERATIONS,
};
use crate::entity::Viewpoint;
use crate::init::common::pixel_to_bearing;
use crate::linalg::dense::DenseMatrix;
use crate::linalg::eigen::symmetric_eigen;
use crate::linalg::mat3::{invert3x3, orthogonalise_rotation};
use crate::linalg::svd::svd3x3;
use crate::lm::{self, CancelToken, LmBackEnd, LmOptions};
use crate::log::SolveLog;
use crate::polynomial::solve_quartic;
use crate::project::Project;
use crate::projection::camera_model::Intrinsics;
use crate::providers::ProviderSet;
use crate::quaternion;

/// One 3D-point / pixel pairing used to recover a camera pose.
#[derive(Debug, Clone, Copy)]
pub struct Correspondence {
    pub world: DVec3,
    pub pixel: (f64, f64),
}

/// Bounds the combinatorial P3P triple search over the first few
/// correspondences; a compute budget, not a spec tunable.
const MAX_P3P_SAMPLE_POINTS: usize = 6;

/// Solves the Grunert/Kneip P3P quartic for one triple of world points and
/// their camera-frame bearings, returning every `(position, rotation)`
/// candidate the real quartic roots produce (up to 4, typically 1-2 once
/// the non-positive-distance roots are discarded). Parameterised over
/// bearings rather than pixels so it has no dependency on `Intrinsics` --
/// the caller divides those out via [`crate::init::common::pixel_to_bearing`].
pub fn p3p_from_bearings(
    world: [DVec3; 3],
    bearings: [DVec3; 3],
) -> Vec<(DVec3, DQuat)> {
    let [a, b, c] = world;
    let [f1, f2, f3] = bearings;

    let rab = (a - b).length();
    let rbc = (b - c).length();
    let rac = (a - c).length();
    if rab < EPS_ZERO || rbc < EPS_ZERO || rac < EPS_ZERO {
        return Vec::new();
    }

    let cab = f1.dot(f2);
    let cbc = f2.dot(f3);
    let cac = f1.dot(f3);

    // Resultant-eliminated quartic in x = d2/d1 (Grunert 1841), derived by
    // eliminating y = d3/d1 between the two law-of-cosines relations.
    let rab2 = rab * rab;
    let rbc2 = rbc * rbc;
    let rac2 = rac * rac;
    let rab4 = rab2 * rab2;

    let a4 = -4.0 * cbc * cbc * rab2 * rac2 + rab4 + 2.0 * rab2 * rac2 - 2.0 * rab2 * rbc2 + rac2 * rac2
        - 2.0 * rac2 * rbc2
        + rbc2 * rbc2;
    let a3 = 4.0
        * (2.0 * cab * cbc * cbc * rab2 * rac2 - cab * rab2 * rac2 + cab * rab2 * rbc2
            - cab * rac2 * rac2
            + 2.0 * cab * rac2 * rbc2
            - cab * rbc2 * rbc2
            - cac * cbc * rab4
            + cac * cbc * rab2 * rac2
            + cac * cbc * rab2 * rbc2);
    let a2 = 2.0
        * (2.0 * cab * cab * rac2 * rac2 - 4.0 * cab * cab * rac2 * rbc2 + 2.0 * cab * cab * rbc2 * rbc2
            - 4.0 * cab * cac * cbc * rab2 * rac2
            - 4.0 * cab * cac * cbc * rab2 * rbc2
            + 2.0 * cac * cac * rab4
            - 2.0 * cac * cac * rab2 * rbc2
            + 2.0 * cbc * cbc * rab4
            - 2.0 * cbc * cbc * rab2 * rac2
            - rab4
            + rac2 * rac2
            - 2.0 * rac2 * rbc2
            + rbc2 * rbc2);
    let a1 = 4.0
        * (2.0 * cab * cac * cac * rab2 * rbc2 + cab * rab2 * rac2 - cab * rab2 * rbc2
            - cab * rac2 * rac2
            + 2.0 * cab * rac2 * rbc2
            - cab * rbc2 * rbc2
            - cac * cbc * rab4
            + cac * cbc * rab2 * rac2
            + cac * cbc * rab2 * rbc2);
    let a0 = -4.0 * cac * cac * rab2 * rbc2 + rab4 - 2.0 * rab2 * rac2 + 2.0 * rab2 * rbc2 + rac2 * rac2
        - 2.0 * rac2 * rbc2
        + rbc2 * rbc2;

    let roots = solve_quartic(a4, a3, a2, a1, a0);

    let mut candidates = Vec::new();
    for x in roots {
        let denom_y = 2.0 * rab2 * (cac - cbc * x);
        if denom_y.abs() < EPS_ZERO {
            continue;
        }
        let y = (2.0 * cab * rac2 * x - 2.0 * cab * rbc2 * x - rab2 * x * x + rab2 - rac2 * x * x - rac2
            + rbc2 * x * x
            + rbc2)
            / denom_y;

        let denom1 = 1.0 + x * x - 2.0 * x * cab;
        if denom1 <= EPS_ZERO {
            continue;
        }
        let d1_sq = rab2 / denom1;
        if d1_sq <= 0.0 || !d1_sq.is_finite() {
            continue;
        }
        let d1 = d1_sq.sqrt();
        let d2 = x * d1;
        let d3 = y * d1;
        if d2 <= 0.0 || d3 <= 0.0 {
            continue;
        }

        if let Some(pose) = absolute_orientation(&[a, b, c], &[f1 * d1, f2 * d2, f3 * d3]) {
            candidates.push(pose);
        }
    }
    candidates
}

/// Kabsch absolute orientation: given the camera-frame point estimates
/// `cam_points[i] = d_i * bearing_i` and their world-frame counterparts,
/// recover the world-to-camera rotation and the camera's world position.
fn absolute_orientation(world: &[DVec3], cam_points: &[DVec3]) -> Option<(DVec3, DQuat)> {
    let n = world.len();
    if n < 3 || cam_points.len() != n {
        return None;
    }
    let centroid_w = world.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n as f64;
    let centroid_c = cam_points.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n as f64;

    let mut h = DMat3::ZERO;
    for i in 0..n {
        let cw = world[i] - centroid_w;
        let cc = cam_points[i] - centroid_c;
        h += DMat3::from_cols(cc * cw.x, cc * cw.y, cc * cw.z);
    }
    let r_wc = orthogonalise_rotation(h);
    if !crate::linalg::mat3::vec3_finite(r_wc.x_axis)
        || !crate::linalg::mat3::vec3_finite(r_wc.y_axis)
        || !crate::linalg::mat3::vec3_finite(r_wc.z_axis)
    {
        return None;
    }
    let position = centroid_w - r_wc.transpose() * centroid_c;
    let rotation = quaternion::from_orthogonalised_mat3(r_wc);
    Some((position, rotation))
}

/// Direct Linear Transform: builds the 2n x 12 homogeneous system for the
/// camera projection matrix, takes its null space (the eigenvector of the
/// smallest eigenvalue of the 12x12 Gram matrix), and factors it into a
/// world-to-camera rotation + camera position using the already-known
/// intrinsics.
pub fn dlt(
    intrinsics: &Intrinsics,
    correspondences: &[Correspondence],
    rng: &mut impl Rng,
) -> Option<(DVec3, DQuat)> {
    if correspondences.len() < 6 {
        return None;
    }
    let n = correspondences.len();
    let mut a = DenseMatrix::zeros(2 * n, 12);
    for (i, corr) in correspondences.iter().enumerate() {
        let (x, y, z) = (corr.world.x, corr.world.y, corr.world.z);
        let (u, v) = corr.pixel;
        let row0 = 2 * i;
        let row1 = 2 * i + 1;
        a.set(row0, 0, x);
        a.set(row0, 1, y);
        a.set(row0, 2, z);
        a.set(row0, 3, 1.0);
        a.set(row0, 8, -u * x);
        a.set(row0, 9, -u * y);
        a.set(row0, 10, -u * z);
        a.set(row0, 11, -u);

        a.set(row1, 4, x);
        a.set(row1, 5, y);
        a.set(row1, 6, z);
        a.set(row1, 7, 1.0);
        a.set(row1, 8, -v * x);
        a.set(row1, 9, -v * y);
        a.set(row1, 10, -v * z);
        a.set(row1, 11, -v);
    }

    let gram = a.gram();
    let eig = symmetric_eigen(&gram, rng);
    let p = eig.smallest_eigenvector();

    let k = DMat3::from_cols(
        DVec3::new(intrinsics.focal_length, 0.0, 0.0),
        DVec3::new(intrinsics.skew, intrinsics.fy(), 0.0),
        DVec3::new(intrinsics.principal_point.0, intrinsics.principal_point.1, 1.0),
    );
    let k_inv = invert3x3(k)?;

    let candidate_from = |p: &[f64]| -> Option<(DVec3, DQuat)> {
        let m = DMat3::from_cols(
            DVec3::new(p[0], p[4], p[8]),
            DVec3::new(p[1], p[5], p[9]),
            DVec3::new(p[2], p[6], p[10]),
        );
        let t_raw = DVec3::new(p[3], p[7], p[11]);
        let scaled_r = k_inv * m;
        let scaled_t = k_inv * t_raw;
        let svd = svd3x3(scaled_r);
        let scale = (svd.sigma.x + svd.sigma.y + svd.sigma.z) / 3.0;
        if scale < EPS_ZERO {
            return None;
        }
        let r_wc = orthogonalise_rotation(scaled_r);
        let t_cam = scaled_t / scale;
        let position = -(r_wc.transpose() * t_cam);
        let rotation = quaternion::from_orthogonalised_mat3(r_wc);
        Some((position, rotation))
    };

    let negated: Vec<f64> = p.iter().map(|v| -v).collect();
    let front_count = |pose: &(DVec3, DQuat)| -> usize {
        correspondences
            .iter()
            .filter(|c| {
                quaternion::world_to_camera(pose.1, pose.0, c.world).z > 0.0
            })
            .count()
    };

    let pos_candidate = candidate_from(&p);
    let neg_candidate = candidate_from(&negated);
    match (pos_candidate, neg_candidate) {
        (Some(p1), Some(p2)) => {
            if front_count(&p1) >= front_count(&p2) {
                Some(p1)
            } else {
                Some(p2)
            }
        }
        (Some(p1), None) => Some(p1),
        (None, Some(p2)) => Some(p2),
        (None, None) => None,
    }
}

fn intrinsics_g(intrinsics: &Intrinsics) -> crate::projection::IntrinsicsG<f64> {
    crate::projection::IntrinsicsG {
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

fn quat_g(q: DQuat) -> crate::projection::QuatG<f64> {
    crate::projection::QuatG { w: q.w, x: q.x, y: q.y, z: q.z }
}

fn vec3_g(v: DVec3) -> crate::projection::Vec3G<f64> {
    crate::projection::Vec3G::new(v.x, v.y, v.z)
}

fn mean_reprojection_error(
    intrinsics: &Intrinsics,
    pose: (DVec3, DQuat),
    correspondences: &[Correspondence],
) -> f64 {
    let intr = intrinsics_g(intrinsics);
    let rot = quat_g(pose.1);
    let pos = vec3_g(pose.0);
    let mut total = 0.0;
    for corr in correspondences {
        let world = vec3_g(corr.world);
        let error = match crate::projection::project(&intr, pos, rot, false, world) {
            Ok((u, v)) => {
                let (du, dv) = (u - corr.pixel.0, v - corr.pixel.1);
                (du * du + dv * dv).sqrt()
            }
            Err(crate::projection::ProjectionFailure::BehindCamera) => {
                crate::constants::BEHIND_CAMERA_PENALTY
            }
        };
        total += error;
    }
    if correspondences.is_empty() { f64::INFINITY } else { total / correspondences.len() as f64 }
}

/// Best-of-P3P over a bounded sample of triples (scored by reprojection
/// error across every correspondence, so a 4th+ point disambiguates the
/// usual 1-4 P3P solutions), falling back to DLT when there are enough
/// correspondences for it to be better conditioned.
pub fn pnp(
    intrinsics: &Intrinsics,
    correspondences: &[Correspondence],
    rng: &mut impl Rng,
) -> Option<(DVec3, DQuat)> {
    if correspondences.len() < 3 {
        return None;
    }

    let sample_count = correspondences.len().min(MAX_P3P_SAMPLE_POINTS);
    let mut best: Option<(f64, (DVec3, DQuat))> = None;

    for i in 0..sample_count {
        for j in (i + 1)..sample_count {
            for k in (j + 1)..sample_count {
                let world = [correspondences[i].world, correspondences[j].world, correspondences[k].world];
                let bearings = [
                    pixel_to_bearing(intrinsics, correspondences[i].pixel),
                    pixel_to_bearing(intrinsics, correspondences[j].pixel),
                    pixel_to_bearing(intrinsics, correspondences[k].pixel),
                ];
                for pose in p3p_from_bearings(world, bearings) {
                    let err = mean_reprojection_error(intrinsics, pose, correspondences);
                    if best.as_ref().map_or(true, |&(s, _)| err < s) {
                        best = Some((err, pose));
                    }
                }
            }
        }
    }

    if correspondences.len() >= 6 {
        if let Some(pose) = dlt(intrinsics, correspondences, rng) {
            let err = mean_reprojection_error(intrinsics, pose, correspondences);
            if best.as_ref().map_or(true, |&(s, _)| err < s) {
                best = Some((err, pose));
            }
        }
    }

    best.map(|(_, pose)| pose)
}

/// Bounded LM refinement of a PnP pose estimate: builds a scratch project
/// with every correspondence's world point locked, frees only the camera
/// pose, and runs the ordinary LM driver (component F) for a small,
/// fixed iteration budget.
pub fn refine_pose(
    intrinsics: Intrinsics,
    width: f64,
    height: f64,
    initial: (DVec3, DQuat),
    correspondences: &[Correspondence],
    log: &mut SolveLog,
) -> (DVec3, DQuat) {
    let mut scratch = Project::new();
    let viewpoint_handle =
        scratch.add_viewpoint(Viewpoint::new(intrinsics, width, height).with_pose(initial.0, initial.1));

    for corr in correspondences {
        let point_handle = scratch.add_point(corr.world);
        let point = scratch.points.get_mut(point_handle).expect("just inserted");
        point.locked = [Some(corr.world.x), Some(corr.world.y), Some(corr.world.z)];
        scratch.add_image_point(corr.pixel, point_handle, viewpoint_handle);
    }

    let layout = match crate::layout::VariableLayout::build(&scratch, false, false, false) {
        Ok(l) => l,
        Err(_) => return initial,
    };
    if layout.is_empty() {
        return initial;
    }
    let providers = match ProviderSet::build(&scratch, &layout) {
        Ok(p) => p,
        Err(_) => return initial,
    };

    let options = LmOptions {
        tolerance: 1e-10,
        max_iterations: PNP_REFINE_ITERATIONS,
        damping: PNP_REFINE_DAMPING,
        back_end: LmBackEnd::Autodiff,
        regularization_weight: 0.0,
    };
    let outcome = lm::run(&providers, layout.initial_x(), &options, &CancelToken::new(), log);
    layout.write_back(&mut scratch, &outcome.x);

    match scratch.viewpoints.get(viewpoint_handle) {
        Some(vp) => (vp.pose.position, vp.pose.rotation),
        None => initial,
    }
}

/// `true` if `pose` clears the PnP sanity gates: a
/// plausible quaternion magnitude, bounded drift from `before`, most
/// correspondences in front of the camera, and a tolerable mean
/// reprojection error.
pub fn passes_sanity_checks(
    intrinsics: &Intrinsics,
    before: (DVec3, DQuat),
    pose: (DVec3, DQuat),
    correspondences: &[Correspondence],
) -> bool {
    let quat_mag = pose.1.length();
    if !(PNP_QUAT_MAGNITUDE_MIN..=PNP_QUAT_MAGNITUDE_MAX).contains(&quat_mag) {
        return false;
    }
    let drift = (pose.0 - before.0).length();
    let scale = before.0.length().max(1.0);
    if drift > PNP_MAX_DRIFT_FACTOR * scale {
        return false;
    }
    let front = correspondences
        .iter()
        .filter(|c| quaternion::world_to_camera(pose.1, pose.0, c.world).z > 0.0)
        .count();
    let front_fraction = front as f64 / correspondences.len().max(1) as f64;
    if front_fraction < PNP_MIN_FRONT_FRACTION {
        return false;
    }
    mean_reprojection_error(intrinsics, pose, correspondences) <= PNP_MAX_ERROR_PX
}

/// Full pose initialisation for one camera: best-of-P3P/DLT, a bounded LM
/// refine, and -- if the result still looks like it's facing the wrong way
/// -- one retry with the 180-degree flip-around-X correction applied to the
/// rotation before refining again.
pub fn initialize_pose(
    intrinsics: Intrinsics,
    width: f64,
    height: f64,
    correspondences: &[Correspondence],
    rng: &mut impl Rng,
    log: &mut SolveLog,
) -> Option<(DVec3, DQuat)> {
    let initial = pnp(&intrinsics, correspondences, rng)?;
    let refined = refine_pose(intrinsics.clone(), width, height, initial, correspondences, log);

    if passes_sanity_checks(&intrinsics, initial, refined, correspondences) {
        return Some(refined);
    }

    let flipped_rotation = quaternion::flip_around_x() * refined.1;
    let flipped = (refined.0, flipped_rotation);
    let reflipped = refine_pose(intrinsics.clone(), width, height, flipped, correspondences, log);
    if passes_sanity_checks(&intrinsics, initial, reflipped, correspondences) {
        log.warn("pnp: applied 180-degree flip-around-X correction".to_string());
        return Some(reflipped);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;

    fn synthetic_pose() -> (DVec3, DQuat) {
        (DVec3::new(1.0, 2.0, 5.0), DQuat::from_euler(glam::EulerRot::XYZ, 0.3, -0.2, 0.5))
    }

    fn project_point(pose: (DVec3, DQuat), world: DVec3) -> DVec3 {
        pose.1 * (world - pose.0)
    }

    #[test]
    fn p3p_recovers_known_pose_from_three_points() {
        let (pos, rot) = synthetic_pose();
        let world = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.3, 0.2),
            DVec3::new(-0.5, 0.8, 0.4),
        ];
        let bearings: Vec<DVec3> =
            world.iter().map(|&w| project_point((pos, rot), w).normalize()).collect();

        let candidates = p3p_from_bearings(world, [bearings[0], bearings[1], bearings[2]]);
        assert!(!candidates.is_empty());

        let best = candidates
            .iter()
            .min_by(|a, b| {
                (a.0 - pos).length().partial_cmp(&(b.0 - pos).length()).unwrap()
            })
            .unwrap();
        assert!((best.0 - pos).length() < 1e-3, "position off by {:?}", best.0 - pos);
    }

    #[test]
    fn dlt_recovers_known_pose_from_six_points() {
        let (pos, rot) = synthetic_pose();
        let intrinsics = Intrinsics::default();
        let world_points = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 1.0, 0.3),
            DVec3::new(-1.0, 0.5, 0.7),
        ];
        let correspondences: Vec<Correspondence> = world_points
            .iter()
            .map(|&w| {
                let p_c = project_point((pos, rot), w);
                let xn = p_c.x / p_c.z;
                let yn = p_c.y / p_c.z;
                let u = intrinsics.focal_length * xn + intrinsics.principal_point.0;
                let v = intrinsics.fy() * yn + intrinsics.principal_point.1;
                Correspondence { world: w, pixel: (u, v) }
            })
            .collect();

        let mut rng = crate::rng::seeded(0);
        let (est_pos, _) = dlt(&intrinsics, &correspondences, &mut rng).unwrap();
        assert!((est_pos - pos).length() < 1e-2, "position off by {:?}", est_pos - pos);
    }
}
