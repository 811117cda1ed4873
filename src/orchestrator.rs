//! Component H: the orchestrator. Ties the variable layout (E), providers
//! (D), initialisation pipeline (G), LM driver (F), and outlier loop (I)
//! into the one external entry point, [`solve`].
//!
//! Pre-flight failures (layout has nothing to optimise, a dangling
//! reference, no observations at all) return `Err(SolveError)` before any
//! work starts; every other failure mode (numerical, convergence,
//! initialisation, cancellation) is non-fatal and is folded into
//! `SolveResult.error` instead, so a caller always gets back whatever
//! partial solution was reached.

use crate::entity::{Handle, ImagePoint, Viewpoint};
use crate::error::SolveError;
use crate::layout::VariableLayout;
use crate::lm::{self, CancelToken, LmBackEnd, LmOptions, Termination};
use crate::log::SolveLog;
use crate::outliers;
use crate::project::Project;
use crate::providers::ProviderSet;
use std::collections::HashMap;

/// Configuration surface for one [`solve`] call.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub tolerance: f64,
    pub max_iterations: u32,
    pub damping: f64,
    pub back_end: LmBackEnd,
    pub optimize_intrinsics: bool,
    pub optimize_distortion: bool,
    pub auto_initialize_cameras: bool,
    pub auto_initialize_world_points: bool,
    pub detect_outliers: bool,
    pub max_attempts: u32,
    pub fine_tune: bool,
    pub lock_camera_poses: bool,
    pub regularization_weight: f64,
    pub seed: u64,
    pub cancel: CancelToken,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            tolerance: crate::constants::DEFAULT_TOLERANCE,
            max_iterations: 100,
            damping: crate::constants::DEFAULT_DAMPING,
            back_end: LmBackEnd::Autodiff,
            optimize_intrinsics: false,
            optimize_distortion: false,
            auto_initialize_cameras: true,
            auto_initialize_world_points: true,
            detect_outliers: true,
            max_attempts: crate::constants::DEFAULT_MAX_ATTEMPTS,
            fine_tune: false,
            lock_camera_poses: false,
            regularization_weight: 0.0,
            seed: 0,
            cancel: CancelToken::new(),
        }
    }
}

/// Structured, machine-readable facts about a solve beyond the headline
/// `SolveResult` fields: per-camera init reason, per-outlier observation
/// list.
#[derive(Debug, Clone, Default)]
pub struct SolveDiagnostics {
    /// One note per viewpoint the initialisation pipeline touched.
    pub camera_init_notes: HashMap<Handle<Viewpoint>, String>,
    /// Every observation excluded by the outlier loop, across all attempts.
    pub excluded_observations: Vec<Handle<ImagePoint>>,
}

/// Outcome of one [`solve`] call, including an ambient `log` and
/// `diagnostics` side-car alongside the headline convergence fields.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub converged: bool,
    pub iterations: u32,
    pub residual: f64,
    pub median_reprojection_error: f64,
    pub outliers: Vec<Handle<ImagePoint>>,
    pub error: Option<String>,
    pub log: SolveLog,
    pub diagnostics: SolveDiagnostics,
}

fn termination_message(termination: Termination) -> Option<&'static str> {
    match termination {
        Termination::Converged => None,
        Termination::MaxIterations => Some("Max iterations reached"),
        Termination::NumericalFailure => Some("numerical failure"),
        Termination::Cancelled => Some("cancelled"),
    }
}

fn median_reprojection_error(project: &Project) -> f64 {
    let mut errors: Vec<f64> = outliers::reprojection_errors(project).into_values().collect();
    if errors.is_empty() {
        return 0.0;
    }
    errors.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = errors.len() / 2;
    if errors.len() % 2 == 0 {
        (errors[mid - 1] + errors[mid]) / 2.0
    } else {
        errors[mid]
    }
}

fn lm_options(opts: &SolveOptions) -> LmOptions {
    LmOptions {
        tolerance: opts.tolerance,
        max_iterations: opts.max_iterations,
        damping: opts.damping,
        back_end: opts.back_end,
        regularization_weight: opts.regularization_weight,
    }
}

/// Build the layout+providers pair for the current scene state, under
/// `lock_camera_poses` (used as-is for the main attempts, forced `true` for
/// the fine-tune pass).
fn build_problem(
    project: &Project,
    opts: &SolveOptions,
    lock_camera_poses: bool,
) -> Result<(VariableLayout, ProviderSet), SolveError> {
    let layout = VariableLayout::build(
        project,
        opts.optimize_intrinsics,
        opts.optimize_distortion,
        lock_camera_poses,
    )?;
    if layout.is_empty() {
        return Err(SolveError::EmptyLayout);
    }
    let providers = ProviderSet::build(project, &layout)?;
    Ok((layout, providers))
}

/// Runs initialisation (if requested) then the LM + outlier-loop + optional
/// fine-tune solve, writing the result back onto `project`.
pub fn solve(project: &mut Project, opts: SolveOptions) -> Result<SolveResult, SolveError> {
    let mut log = SolveLog::new();
    let mut diagnostics = SolveDiagnostics::default();

    if project.image_points.is_empty() {
        return Err(SolveError::NoObservations);
    }

    let mut rng = crate::rng::seeded(opts.seed);

    if opts.auto_initialize_cameras || opts.auto_initialize_world_points {
        log.info("orchestrator: running initialisation pipeline".to_string());
        let failed_init = crate::init::initialize(project, &mut rng, &mut log);
        for &handle in &failed_init {
            diagnostics
                .camera_init_notes
                .insert(handle, "failed: no pose recovered".to_string());
        }
        for (handle, vp) in project.viewpoints.iter() {
            diagnostics.camera_init_notes.entry(handle).or_insert_with(|| {
                if vp.pose_locked { "pose locked, skipped".to_string() } else { "initialised".to_string() }
            });
        }

        let total_viewpoints = project.viewpoints.iter().count();
        if opts.auto_initialize_cameras && total_viewpoints > 0 && failed_init.len() == total_viewpoints {
            log.warn("orchestrator: no camera could be initialised, aborting".to_string());
            return Ok(SolveResult {
                converged: false,
                iterations: 0,
                residual: 0.0,
                median_reprojection_error: 0.0,
                outliers: Vec::new(),
                error: Some("no initializable cameras".to_string()),
                log,
                diagnostics,
            });
        }
    }

    let (mut layout, mut providers) = build_problem(project, &opts, opts.lock_camera_poses)?;

    let mut outcome = lm::run(&providers, layout.initial_x(), &lm_options(&opts), &opts.cancel, &mut log);
    layout.write_back(project, &outcome.x);

    if opts.detect_outliers {
        for attempt in 1..=opts.max_attempts {
            if opts.cancel.is_cancelled() {
                break;
            }
            let newly_excluded = outliers::detect(project);
            if newly_excluded.is_empty() {
                log.info(format!("orchestrator: no new outliers after attempt {attempt}"));
                break;
            }
            log.warn(format!(
                "orchestrator: attempt {attempt} excluding {} observation(s) as outliers",
                newly_excluded.len()
            ));
            outliers::exclude(project, &newly_excluded);
            diagnostics.excluded_observations.extend(newly_excluded);

            for starved in outliers::starved_cameras(project) {
                if let Some(vp) = project.viewpoints.get_mut(starved) {
                    vp.pose_locked = true;
                }
                diagnostics
                    .camera_init_notes
                    .insert(starved, "excluded: fewer than minimum observations".to_string());
            }

            let (next_layout, next_providers) = build_problem(project, &opts, opts.lock_camera_poses)?;
            layout = next_layout;
            providers = next_providers;
            outcome = lm::run(&providers, layout.initial_x(), &lm_options(&opts), &opts.cancel, &mut log);
            layout.write_back(project, &outcome.x);
        }
    }

    if opts.fine_tune && !opts.cancel.is_cancelled() {
        log.info("orchestrator: running fine-tune pass with camera poses locked".to_string());
        let (fine_layout, fine_providers) = build_problem(project, &opts, true)?;
        outcome = lm::run(&fine_providers, fine_layout.initial_x(), &lm_options(&opts), &opts.cancel, &mut log);
        fine_layout.write_back(project, &outcome.x);
    }

    record_last_residuals(project);

    let error = termination_message(outcome.termination).map(str::to_string);
    let residual = outcome.final_cost;
    let median = median_reprojection_error(project);
    let outlier_list = diagnostics.excluded_observations.clone();

    Ok(SolveResult {
        converged: outcome.converged(),
        iterations: outcome.iterations,
        residual,
        median_reprojection_error: median,
        outliers: outlier_list,
        error,
        log,
        diagnostics,
    })
}

/// Writes each visible observation's current pixel-error vector into
/// `ImagePoint::last_residual`, the external "`lastResiduals`" surface.
fn record_last_residuals(project: &mut Project) {
    let errors: HashMap<Handle<ImagePoint>, (f64, f64)> = project
        .image_points
        .iter()
        .filter(|(_, ip)| ip.visible)
        .filter_map(|(handle, ip)| {
            let point = project.points.get(ip.world_point)?;
            let vp = project.viewpoints.get(ip.viewpoint)?;
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
            let world = crate::projection::Vec3G::new(
                point.optimized_xyz.x,
                point.optimized_xyz.y,
                point.optimized_xyz.z,
            );
            match crate::projection::project(&intr, pos, rot, vp.pose.is_z_reflected, world) {
                Ok((u, v)) => Some((handle, (u - ip.pixel.0, v - ip.pixel.1))),
                Err(_) => None,
            }
        })
        .collect();

    for (handle, residual) in errors {
        if let Some(ip) = project.image_points.get_mut(handle) {
            ip.last_residual = Some(residual);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Viewpoint;
    use crate::projection::camera_model::Intrinsics;
    use glam::{DQuat, DVec3};

    fn synthetic_cube_project() -> Project {
        let mut project = Project::new();
        let corners = [
            DVec3::new(-1.0, -1.0, 5.0),
            DVec3::new(1.0, -1.0, 5.0),
            DVec3::new(1.0, 1.0, 5.0),
            DVec3::new(-1.0, 1.0, 5.0),
            DVec3::new(-1.0, -1.0, 7.0),
            DVec3::new(1.0, -1.0, 7.0),
        ];
        let cams = [
            (DVec3::new(-2.0, 0.0, 0.0), DQuat::IDENTITY),
            (DVec3::new(2.0, 0.0, 0.0), DQuat::IDENTITY),
            (DVec3::new(0.0, 0.0, -3.0), DQuat::IDENTITY),
        ];

        let point_handles: Vec<_> = corners.iter().map(|&c| project.add_point(c)).collect();
        for (pos, rot) in cams {
            let vp = project.add_viewpoint(
                Viewpoint::new(Intrinsics::default(), 1920.0, 1080.0).with_pose(pos, rot),
            );
            for (&corner, &handle) in corners.iter().zip(&point_handles) {
                let relative = corner - pos;
                let p_c = rot * relative;
                if p_c.z <= 0.1 {
                    continue;
                }
                let u = 1000.0 * (p_c.x / p_c.z);
                let v = 1000.0 * (p_c.y / p_c.z);
                project.add_image_point((u, v), handle, vp);
            }
        }
        project
    }

    #[test]
    fn solve_rejects_a_project_with_no_observations() {
        let mut project = Project::new();
        let opts = SolveOptions::default();
        assert!(matches!(solve(&mut project, opts), Err(SolveError::NoObservations)));
    }

    #[test]
    fn solve_recovers_a_simple_scene() {
        let mut project = synthetic_cube_project();
        // Anchor the scene: lock every camera's pose so the solve has
        // something unambiguous to reconstruct the points against.
        for (_, vp) in project.viewpoints.iter_mut() {
            vp.pose_locked = true;
        }

        let mut opts = SolveOptions::default();
        opts.auto_initialize_cameras = false;
        opts.seed = 11;
        let result = solve(&mut project, opts).expect("pre-flight should pass");

        assert!(result.median_reprojection_error < 5.0);
    }
}
