//! Point/line residual families: fixed point, distances, line direction and
//! length, coincidence, parallel/perpendicular, angles, coplanarity, and the
//! equal-distance/equal-angle group providers.

use glam::DVec3;

use crate::autodiff::Scalar;
use crate::layout::{ParamRef, PointParams};
use crate::projection::{cross, dot};

use super::support::{dual_rows_to_jacobian, point_vec, LocalVars};

pub struct FixedPointProvider {
    point: PointParams,
    target: DVec3,
    vars: LocalVars,
}

impl FixedPointProvider {
    pub fn new(point: PointParams, target: DVec3) -> Self {
        let mut vars = LocalVars::new();
        vars.push_point(point);
        Self { point, target, vars }
    }

    pub fn residual_count(&self) -> usize {
        3
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let p = point_vec(self.point, &get);
        vec![
            p.x - S::constant(self.target.x),
            p.y - S::constant(self.target.y),
            p.z - S::constant(self.target.z),
        ]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// `(||b - a|| - target) / target`, the shape shared by point-point
/// distance and point-line distance (just a different operand pair).
fn distance_residual<S: Scalar>(sep: S, target: f64) -> S {
    let t = S::constant(target);
    (sep - t) / t
}

pub struct DistanceProvider {
    a: PointParams,
    b: PointParams,
    target: f64,
    vars: LocalVars,
}

impl DistanceProvider {
    pub fn new(a: PointParams, b: PointParams, target: f64) -> Self {
        let mut vars = LocalVars::new();
        vars.push_point(a);
        vars.push_point(b);
        Self { a, b, target, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let a = point_vec(self.a, &get);
        let b = point_vec(self.b, &get);
        vec![distance_residual(b.sub(a).norm(), self.target)]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// `100 * (||b - a|| - L) / L`.
pub struct LineLengthProvider {
    a: PointParams,
    b: PointParams,
    target: f64,
    vars: LocalVars,
}

impl LineLengthProvider {
    pub fn new(a: PointParams, b: PointParams, target: f64) -> Self {
        let mut vars = LocalVars::new();
        vars.push_point(a);
        vars.push_point(b);
        Self { a, b, target, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let a = point_vec(self.a, &get);
        let b = point_vec(self.b, &get);
        let hundred = S::constant(100.0);
        vec![distance_residual(b.sub(a).norm(), self.target) * hundred]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// `10 * ((P - A) x (B - A))`: forces `P` onto the infinite line through
/// `A, B`. Shared by the point-on-line family and by collinear-points
/// (one instance per extra point, first two points as `A, B`).
pub struct CoincidentProvider {
    a: PointParams,
    b: PointParams,
    p: PointParams,
    vars: LocalVars,
}

impl CoincidentProvider {
    pub fn new(a: PointParams, b: PointParams, p: PointParams) -> Self {
        let mut vars = LocalVars::new();
        vars.push_point(a);
        vars.push_point(b);
        vars.push_point(p);
        Self { a, b, p, vars }
    }

    pub fn residual_count(&self) -> usize {
        3
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let a = point_vec(self.a, &get);
        let b = point_vec(self.b, &get);
        let p = point_vec(self.p, &get);
        let ten = S::constant(10.0);
        let v = cross(p.sub(a), b.sub(a));
        vec![v.x * ten, v.y * ten, v.z * ten]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// Distance from a point to the infinite line through `a, b`:
/// `(||(p - a) x (b - a)|| / ||b - a|| - target) / target`.
pub struct DistancePointLineProvider {
    a: PointParams,
    b: PointParams,
    p: PointParams,
    target: f64,
    vars: LocalVars,
}

impl DistancePointLineProvider {
    pub fn new(a: PointParams, b: PointParams, p: PointParams, target: f64) -> Self {
        let mut vars = LocalVars::new();
        vars.push_point(a);
        vars.push_point(b);
        vars.push_point(p);
        Self { a, b, p, target, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let a = point_vec(self.a, &get);
        let b = point_vec(self.b, &get);
        let p = point_vec(self.p, &get);
        let dir = b.sub(a);
        let sep = cross(p.sub(a), dir).norm() / dir.norm();
        vec![distance_residual(sep, self.target)]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// Distance from a point to the plane through `plane[0..3]`:
/// `(|dot(p - plane0, normal)| / ||normal|| - target) / target`.
pub struct DistancePointPlaneProvider {
    plane: [PointParams; 3],
    p: PointParams,
    target: f64,
    vars: LocalVars,
}

impl DistancePointPlaneProvider {
    pub fn new(plane: [PointParams; 3], p: PointParams, target: f64) -> Self {
        let mut vars = LocalVars::new();
        for pt in plane {
            vars.push_point(pt);
        }
        vars.push_point(p);
        Self { plane, p, target, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let p0 = point_vec(self.plane[0], &get);
        let p1 = point_vec(self.plane[1], &get);
        let p2 = point_vec(self.plane[2], &get);
        let p = point_vec(self.p, &get);
        let normal = cross(p1.sub(p0), p2.sub(p0));
        let signed = dot(p.sub(p0), normal) / normal.norm();
        // abs without a branch that could break differentiability sign
        // conventions -- sqrt(signed^2) matches |signed| and its derivative
        // away from zero, which is the only region this residual operates in.
        let sep = (signed * signed).sqrt();
        vec![distance_residual(sep, self.target)]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// Selected components of `B - A` forced to zero, scaled by 100. `indices`
/// is `LineDirection::forced_zero_components()` (length 1 or 2), or any
/// explicit override (e.g. the standalone horizontal/vertical constraints).
pub struct LineDirectionProvider {
    a: PointParams,
    b: PointParams,
    indices: &'static [usize],
    vars: LocalVars,
}

impl LineDirectionProvider {
    pub fn new(a: PointParams, b: PointParams, indices: &'static [usize]) -> Self {
        let mut vars = LocalVars::new();
        vars.push_point(a);
        vars.push_point(b);
        Self { a, b, indices, vars }
    }

    pub fn residual_count(&self) -> usize {
        self.indices.len()
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let a = point_vec(self.a, &get);
        let b = point_vec(self.b, &get);
        let d = b.sub(a);
        let hundred = S::constant(100.0);
        let comps = [d.x, d.y, d.z];
        self.indices.iter().map(|&i| comps[i] * hundred).collect()
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

fn unit_direction<S: Scalar>(
    a: PointParams,
    b: PointParams,
    get: &impl Fn(ParamRef) -> S,
) -> crate::projection::Vec3G<S> {
    point_vec(b, get).sub(point_vec(a, get)).normalize()
}

/// `cross(dirAB_hat, dirCD_hat)`, three components.
pub struct ParallelProvider {
    a: PointParams,
    b: PointParams,
    c: PointParams,
    d: PointParams,
    vars: LocalVars,
}

impl ParallelProvider {
    pub fn new(a: PointParams, b: PointParams, c: PointParams, d: PointParams) -> Self {
        let mut vars = LocalVars::new();
        for pt in [a, b, c, d] {
            vars.push_point(pt);
        }
        Self { a, b, c, d, vars }
    }

    pub fn residual_count(&self) -> usize {
        3
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let dir_ab = unit_direction(self.a, self.b, &get);
        let dir_cd = unit_direction(self.c, self.d, &get);
        let v = cross(dir_ab, dir_cd);
        vec![v.x, v.y, v.z]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// `dot(dirAB_hat, dirCD_hat)`, one component.
pub struct PerpendicularProvider {
    a: PointParams,
    b: PointParams,
    c: PointParams,
    d: PointParams,
    vars: LocalVars,
}

impl PerpendicularProvider {
    pub fn new(a: PointParams, b: PointParams, c: PointParams, d: PointParams) -> Self {
        let mut vars = LocalVars::new();
        for pt in [a, b, c, d] {
            vars.push_point(pt);
        }
        Self { a, b, c, d, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let dir_ab = unit_direction(self.a, self.b, &get);
        let dir_cd = unit_direction(self.c, self.d, &get);
        vec![dot(dir_ab, dir_cd)]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

fn clamped_angle<S: Scalar>(u: crate::projection::Vec3G<S>, v: crate::projection::Vec3G<S>) -> S {
    let cos = dot(u, v).clamp_unit();
    cos.acos()
}

/// `acos(clamp(cos(angle(a, vertex, c)))) - target`.
pub struct AngleProvider {
    a: PointParams,
    vertex: PointParams,
    c: PointParams,
    target: f64,
    vars: LocalVars,
}

impl AngleProvider {
    pub fn new(a: PointParams, vertex: PointParams, c: PointParams, target: f64) -> Self {
        let mut vars = LocalVars::new();
        for pt in [a, vertex, c] {
            vars.push_point(pt);
        }
        Self { a, vertex, c, target, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let a = point_vec(self.a, &get);
        let vx = point_vec(self.vertex, &get);
        let c = point_vec(self.c, &get);
        let u = a.sub(vx).normalize();
        let v = c.sub(vx).normalize();
        vec![clamped_angle(u, v) - S::constant(self.target)]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// `acos(clamp(dot(dirAB_hat, dirCD_hat))) - target`.
pub struct AngleLineLineProvider {
    a: PointParams,
    b: PointParams,
    c: PointParams,
    d: PointParams,
    target: f64,
    vars: LocalVars,
}

impl AngleLineLineProvider {
    pub fn new(a: PointParams, b: PointParams, c: PointParams, d: PointParams, target: f64) -> Self {
        let mut vars = LocalVars::new();
        for pt in [a, b, c, d] {
            vars.push_point(pt);
        }
        Self { a, b, c, d, target, vars }
    }

    pub fn residual_count(&self) -> usize {
        1
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let dir_ab = unit_direction(self.a, self.b, &get);
        let dir_cd = unit_direction(self.c, self.d, &get);
        vec![clamped_angle(dir_ab, dir_cd) - S::constant(self.target)]
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// Signed-volume coplanarity against a reference triple: one residual per
/// extra point, dimension `points.len() - 3`.
pub struct CoplanarProvider {
    reference: [PointParams; 3],
    rest: Vec<PointParams>,
    vars: LocalVars,
}

impl CoplanarProvider {
    pub fn new(reference: [PointParams; 3], rest: Vec<PointParams>) -> Self {
        let mut vars = LocalVars::new();
        for pt in reference {
            vars.push_point(pt);
        }
        for &pt in &rest {
            vars.push_point(pt);
        }
        Self { reference, rest, vars }
    }

    pub fn residual_count(&self) -> usize {
        self.rest.len()
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        let p0 = point_vec(self.reference[0], &get);
        let p1 = point_vec(self.reference[1], &get);
        let p2 = point_vec(self.reference[2], &get);
        let normal = cross(p1.sub(p0), p2.sub(p0));
        let six = S::constant(6.0);
        self.rest
            .iter()
            .map(|&pt| {
                let p = point_vec(pt, &get);
                dot(p.sub(p0), normal) / six
            })
            .collect()
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// `||p2_i - p1_i|| - ||p2_0 - p1_0||` for `i = 1..k`, reducing to zero
/// residuals when given fewer than two pairs.
pub struct EqualDistancesProvider {
    pairs: Vec<(PointParams, PointParams)>,
    vars: LocalVars,
}

impl EqualDistancesProvider {
    pub fn new(pairs: Vec<(PointParams, PointParams)>) -> Self {
        let mut vars = LocalVars::new();
        for &(a, b) in &pairs {
            vars.push_point(a);
            vars.push_point(b);
        }
        Self { pairs, vars }
    }

    pub fn residual_count(&self) -> usize {
        self.pairs.len().saturating_sub(1)
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        if self.pairs.len() < 2 {
            return Vec::new();
        }
        let dist = |a: PointParams, b: PointParams| point_vec(b, &get).sub(point_vec(a, &get)).norm();
        let reference = dist(self.pairs[0].0, self.pairs[0].1);
        self.pairs[1..].iter().map(|&(a, b)| dist(a, b) - reference).collect()
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

/// `angle_i - angle_0` for `i = 1..k`, reducing to zero residuals when
/// given fewer than two triples.
pub struct EqualAnglesProvider {
    triples: Vec<(PointParams, PointParams, PointParams)>,
    vars: LocalVars,
}

impl EqualAnglesProvider {
    pub fn new(triples: Vec<(PointParams, PointParams, PointParams)>) -> Self {
        let mut vars = LocalVars::new();
        for &(a, vx, c) in &triples {
            vars.push_point(a);
            vars.push_point(vx);
            vars.push_point(c);
        }
        Self { triples, vars }
    }

    pub fn residual_count(&self) -> usize {
        self.triples.len().saturating_sub(1)
    }

    fn compute<S: Scalar>(&self, get: impl Fn(ParamRef) -> S) -> Vec<S> {
        if self.triples.len() < 2 {
            return Vec::new();
        }
        let angle = |a: PointParams, vx: PointParams, c: PointParams| {
            let u = point_vec(a, &get).sub(point_vec(vx, &get)).normalize();
            let v = point_vec(c, &get).sub(point_vec(vx, &get)).normalize();
            clamped_angle(u, v)
        };
        let (a0, v0, c0) = self.triples[0];
        let reference = angle(a0, v0, c0);
        self.triples[1..].iter().map(|&(a, vx, c)| angle(a, vx, c) - reference).collect()
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.compute(|p| p.value(x))
    }

    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        let duals = self.compute(|p| self.vars.dual(p, x));
        (dual_rows_to_jacobian(duals, self.vars.n()), self.vars.columns().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Dual;
    use crate::constants::NUMERICAL_DIFF_EPS;
    use crate::layout::VariableLayout;
    use crate::project::Project;

    fn free_point(project: &mut Project, p: DVec3) -> PointParams {
        let handle = project.add_point(p);
        let layout = VariableLayout::build(project, false, false, false).unwrap();
        layout.point_params(handle).unwrap()
    }

    // Each of these builds its own tiny project, since PointParams columns
    // are only meaningful relative to the layout that minted them.

    #[test]
    fn fixed_point_residual_is_difference_from_target() {
        let mut project = Project::new();
        let p = free_point(&mut project, DVec3::new(1.0, 2.0, 3.0));
        let provider = FixedPointProvider::new(p, DVec3::new(1.5, 2.0, 2.5));
        let x = vec![1.0, 2.0, 3.0];
        let r = provider.residuals(&x);
        assert!((r[0] - (-0.5)).abs() < 1e-12);
        assert!((r[1] - 0.0).abs() < 1e-12);
        assert!((r[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn line_direction_xz_forces_only_y_component() {
        let mut project = Project::new();
        let a_handle = project.add_point(DVec3::ZERO);
        let b_handle = project.add_point(DVec3::new(1.0, 0.1, 2.0));
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let a = layout.point_params(a_handle).unwrap();
        let b = layout.point_params(b_handle).unwrap();
        let indices = crate::entity::LineDirection::Xz.forced_zero_components();
        let provider = LineDirectionProvider::new(a, b, indices);
        assert_eq!(provider.residual_count(), 1);
        let x = layout.initial_x();
        let r = provider.residuals(&x);
        assert!((r[0] - 10.0).abs() < 1e-9); // 100 * 0.1
    }

    #[test]
    fn distance_jacobian_matches_finite_difference() {
        let mut project = Project::new();
        let _a = project.add_point(DVec3::ZERO);
        let _b = project.add_point(DVec3::new(3.0, 4.0, 0.0));
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let handles: Vec<_> = project.points.iter().map(|(h, _)| h).collect();
        let a = layout.point_params(handles[0]).unwrap();
        let b = layout.point_params(handles[1]).unwrap();
        let provider = DistanceProvider::new(a, b, 5.0);
        let x = layout.initial_x();
        let (jac, cols) = provider.jacobian(&x);

        for (local, &col) in cols.iter().enumerate() {
            let mut xp = x.clone();
            xp[col] += NUMERICAL_DIFF_EPS;
            let rp = provider.residuals(&xp)[0];
            let r0 = provider.residuals(&x)[0];
            let numerical = (rp - r0) / NUMERICAL_DIFF_EPS;
            assert!((jac[0][local] - numerical).abs() < 1e-4, "col {col}: {} vs {}", jac[0][local], numerical);
        }
    }

    #[test]
    fn equal_distances_below_two_pairs_is_empty() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        let b = project.add_point(DVec3::X);
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let a = layout.point_params(a).unwrap();
        let b = layout.point_params(b).unwrap();
        let provider = EqualDistancesProvider::new(vec![(a, b)]);
        assert_eq!(provider.residual_count(), 0);
        assert!(provider.residuals(&layout.initial_x()).is_empty());
    }

    #[test]
    fn dual_normalize_matches_plain_direction() {
        let n = 3;
        let v = crate::projection::Vec3G::new(
            Dual::variable(3.0, 0, n),
            Dual::variable(4.0, 1, n),
            Dual::variable(0.0, 2, n),
        );
        let u = v.normalize();
        assert!((u.x.value - 0.6).abs() < 1e-9);
        assert!((u.y.value - 0.8).abs() < 1e-9);
    }
}
