//! Numerical tolerances and default solver parameters.
//!
//! Mirrors the "named constant, not a magic number" texture of the physics
//! kernel this crate grew out of: every tolerance used more than once lives
//! here so the policy is auditable in one place.

/// Comparisons against zero (determinants, denominators) use this epsilon.
pub const EPS_ZERO: f64 = 1e-10;

/// Singular-value rank test: a singular value below `sigma_1 * RANK_EPS` is
/// treated as numerically zero.
pub const RANK_EPS: f64 = 1e-6;

/// Forward-difference step for numerical Jacobians.
pub const NUMERICAL_DIFF_EPS: f64 = 1e-6;

/// Max allowed disagreement between analytical and numerical Jacobians in
/// the property tests of the residual providers.
pub const JACOBIAN_AGREEMENT_TOL: f64 = 1e-4;

/// Near-plane guard: reject projection when camera-space z falls below this.
pub const NEAR_PLANE: f64 = 0.1;

/// Residual assigned to a reprojection that falls behind the camera.
pub const BEHIND_CAMERA_PENALTY: f64 = 1000.0;

/// Default LM convergence tolerance (relative cost change / step norm).
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Default initial Levenberg-Marquardt damping.
pub const DEFAULT_DAMPING: f64 = 1e-3;

/// Damping is never allowed below this floor.
pub const DAMPING_FLOOR: f64 = 1e-10;

/// Damping is never allowed above this ceiling.
pub const DAMPING_CEILING: f64 = 1e10;

/// Per-iteration cap on rejected damped-equation solves before giving up on
/// that iteration and counting it as a failure.
pub const MAX_DAMPING_RETRIES_PER_ITER: usize = 16;

/// Consecutive numerically-failed iterations before the driver aborts.
pub const MAX_CONSECUTIVE_FAILURES: usize = 8;

/// Sparse CG: relative residual tolerance (times `‖J^T r‖`).
pub const CG_TOLERANCE: f64 = 1e-6;

/// Sparse CG: inner iteration cap.
pub const CG_MAX_ITERS: usize = 200;

/// Default outlier attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Outlier MAD multiplier (k in `median + k * MAD`).
pub const OUTLIER_MAD_K: f64 = 5.0;

/// Hard pixel-error ceiling past which an observation is always an outlier
/// candidate, regardless of the MAD threshold.
pub const OUTLIER_HARD_PX: f64 = 50.0;

/// A camera with fewer observations than this after outlier exclusion is
/// considered unreliable and excluded from the next attempt.
pub const MIN_OBSERVATIONS_PER_CAMERA: usize = 3;

/// Cap on the combinatorial sign search in inference branching; beyond this
/// many ambiguous axes a heuristic (rather than exhaustive search) is used.
pub const MAX_BRANCHING_AXES: u32 = 6;

/// Fine-tune / PnP-refinement iteration bounds (smaller than a full solve).
pub const PNP_REFINE_ITERATIONS: u32 = 100;
pub const PNP_REFINE_DAMPING: f64 = 10.0;

/// PnP pose sanity checks (Sec 4.G).
pub const PNP_QUAT_MAGNITUDE_MIN: f64 = 0.5;
pub const PNP_QUAT_MAGNITUDE_MAX: f64 = 2.0;
pub const PNP_MAX_DRIFT_FACTOR: f64 = 15.0;
pub const PNP_MAX_ERROR_PX: f64 = 80.0;
pub const PNP_MIN_FRONT_FRACTION: f64 = 0.5;

/// Ray-ray triangulation: rays closer to parallel than this (radians-ish,
/// measured via the Gram determinant) are skipped.
pub const TRIANGULATION_PARALLEL_EPS: f64 = 1e-6;

/// Smart seeding: length of a BFS-propagated random-direction step when the
/// line it follows carries no `target_length`.
pub const DEFAULT_SEED_LENGTH: f64 = 1.0;
