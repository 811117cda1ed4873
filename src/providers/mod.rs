//! Component D: residual/Jacobian providers. Each family is a closed-set
//! enum variant (`Provider`) rather than a trait object hierarchy, so the
//! set of kinds is fixed and exhaustively matched everywhere it's
//! dispatched. [`ProviderSet::build`] is the one place that turns scene
//! constraints into providers; [`ProviderSet::evaluate`] is the one place
//! that assembles their contributions into a global residual vector and
//! CSR Jacobian, in provider-insertion order.

mod camera;
mod geometry;
mod support;

use std::collections::HashMap;

use camera::{estimate_vanishing_point, QuatNormProvider, ReprojectionProvider, VanishingLineProvider};
use geometry::{
    AngleLineLineProvider, AngleProvider, CoincidentProvider, CoplanarProvider, DistanceProvider,
    DistancePointLineProvider, DistancePointPlaneProvider, EqualAnglesProvider,
    EqualDistancesProvider, FixedPointProvider, LineDirectionProvider, LineLengthProvider,
    ParallelProvider, PerpendicularProvider,
};

use crate::entity::{Axis, Constraint, ConstraintKind, Handle, Line, LineDirection, WorldPoint};
use crate::error::SolveError;
use crate::layout::{CameraParams, PointParams, VariableLayout};
use crate::linalg::sparse::{CsrBuilder, CsrMatrix};
use crate::project::Project;

pub use camera::{estimate_vanishing_point, ReprojectionProvider as Reprojection};

/// The closed set of residual families. New kinds are added by extending
/// this enum and its two match arms below -- never by adding a trait impl
/// site somewhere else.
pub enum Provider {
    FixedPoint(FixedPointProvider),
    Distance(DistanceProvider),
    LineLength(LineLengthProvider),
    Coincident(CoincidentProvider),
    DistancePointLine(DistancePointLineProvider),
    DistancePointPlane(DistancePointPlaneProvider),
    LineDirection(LineDirectionProvider),
    Parallel(ParallelProvider),
    Perpendicular(PerpendicularProvider),
    Angle(AngleProvider),
    AngleLineLine(AngleLineLineProvider),
    Coplanar(CoplanarProvider),
    EqualDistances(EqualDistancesProvider),
    EqualAngles(EqualAnglesProvider),
    QuatNorm(QuatNormProvider),
    Reprojection(ReprojectionProvider),
    VanishingLine(VanishingLineProvider),
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::FixedPoint(_) => "fixed_point",
            Provider::Distance(_) => "distance_point_point",
            Provider::LineLength(_) => "line_length",
            Provider::Coincident(_) => "coincident",
            Provider::DistancePointLine(_) => "distance_point_line",
            Provider::DistancePointPlane(_) => "distance_point_plane",
            Provider::LineDirection(_) => "line_direction",
            Provider::Parallel(_) => "parallel_lines",
            Provider::Perpendicular(_) => "perpendicular_lines",
            Provider::Angle(_) => "angle_point_point_point",
            Provider::AngleLineLine(_) => "angle_line_line",
            Provider::Coplanar(_) => "coplanar_points",
            Provider::EqualDistances(_) => "equal_distances",
            Provider::EqualAngles(_) => "equal_angles",
            Provider::QuatNorm(_) => "quaternion_normalisation",
            Provider::Reprojection(_) => "reprojection",
            Provider::VanishingLine(_) => "vanishing_line",
        }
    }

    pub fn residual_count(&self) -> usize {
        match self {
            Provider::FixedPoint(p) => p.residual_count(),
            Provider::Distance(p) => p.residual_count(),
            Provider::LineLength(p) => p.residual_count(),
            Provider::Coincident(p) => p.residual_count(),
            Provider::DistancePointLine(p) => p.residual_count(),
            Provider::DistancePointPlane(p) => p.residual_count(),
            Provider::LineDirection(p) => p.residual_count(),
            Provider::Parallel(p) => p.residual_count(),
            Provider::Perpendicular(p) => p.residual_count(),
            Provider::Angle(p) => p.residual_count(),
            Provider::AngleLineLine(p) => p.residual_count(),
            Provider::Coplanar(p) => p.residual_count(),
            Provider::EqualDistances(p) => p.residual_count(),
            Provider::EqualAngles(p) => p.residual_count(),
            Provider::QuatNorm(p) => p.residual_count(),
            Provider::Reprojection(p) => p.residual_count(),
            Provider::VanishingLine(p) => p.residual_count(),
        }
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        match self {
            Provider::FixedPoint(p) => p.residuals(x),
            Provider::Distance(p) => p.residuals(x),
            Provider::LineLength(p) => p.residuals(x),
            Provider::Coincident(p) => p.residuals(x),
            Provider::DistancePointLine(p) => p.residuals(x),
            Provider::DistancePointPlane(p) => p.residuals(x),
            Provider::LineDirection(p) => p.residuals(x),
            Provider::Parallel(p) => p.residuals(x),
            Provider::Perpendicular(p) => p.residuals(x),
            Provider::Angle(p) => p.residuals(x),
            Provider::AngleLineLine(p) => p.residuals(x),
            Provider::Coplanar(p) => p.residuals(x),
            Provider::EqualDistances(p) => p.residuals(x),
            Provider::EqualAngles(p) => p.residuals(x),
            Provider::QuatNorm(p) => p.residuals(x),
            Provider::Reprojection(p) => p.residuals(x),
            Provider::VanishingLine(p) => p.residuals(x),
        }
    }

    /// `(dense jacobian rows over this provider's columns, global columns)`.
    pub fn jacobian(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<usize>) {
        match self {
            Provider::FixedPoint(p) => p.jacobian(x),
            Provider::Distance(p) => p.jacobian(x),
            Provider::LineLength(p) => p.jacobian(x),
            Provider::Coincident(p) => p.jacobian(x),
            Provider::DistancePointLine(p) => p.jacobian(x),
            Provider::DistancePointPlane(p) => p.jacobian(x),
            Provider::LineDirection(p) => p.jacobian(x),
            Provider::Parallel(p) => p.jacobian(x),
            Provider::Perpendicular(p) => p.jacobian(x),
            Provider::Angle(p) => p.jacobian(x),
            Provider::AngleLineLine(p) => p.jacobian(x),
            Provider::Coplanar(p) => p.jacobian(x),
            Provider::EqualDistances(p) => p.jacobian(x),
            Provider::EqualAngles(p) => p.jacobian(x),
            Provider::QuatNorm(p) => p.jacobian(x),
            Provider::Reprojection(p) => p.jacobian(x),
            Provider::VanishingLine(p) => p.jacobian(x),
        }
    }
}

/// Every provider built from one project+layout pair, in insertion order,
/// plus the contiguous row range each owns in the global residual vector.
pub struct ProviderSet {
    providers: Vec<Provider>,
    row_offsets: Vec<usize>,
    total_rows: usize,
    num_cols: usize,
}

fn point_params(
    layout: &VariableLayout,
    handle: Handle<WorldPoint>,
    context: &str,
) -> Result<PointParams, SolveError> {
    layout
        .point_params(handle)
        .ok_or_else(|| SolveError::DanglingReference { context: context.to_string() })
}

fn line_endpoints(
    project: &Project,
    layout: &VariableLayout,
    handle: Handle<Line>,
    context: &str,
) -> Result<(PointParams, PointParams), SolveError> {
    let line = project
        .lines
        .get(handle)
        .ok_or_else(|| SolveError::DanglingReference { context: context.to_string() })?;
    Ok((point_params(layout, line.a, context)?, point_params(layout, line.b, context)?))
}

fn camera_params(
    layout: &VariableLayout,
    handle: crate::entity::Handle<crate::entity::Viewpoint>,
    context: &str,
) -> Result<CameraParams, SolveError> {
    layout
        .camera_params(handle)
        .ok_or_else(|| SolveError::DanglingReference { context: context.to_string() })
}

impl ProviderSet {
    pub fn residual_count(&self) -> usize {
        self.total_rows
    }

    pub fn row_range(&self, index: usize) -> std::ops::Range<usize> {
        self.row_offsets[index]..self.row_offsets[index + 1]
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Residual vector and CSR Jacobian over the whole provider set, at
    /// `x`, in provider-insertion row order.
    pub fn evaluate(&self, x: &[f64]) -> (Vec<f64>, CsrMatrix) {
        let mut residuals = Vec::with_capacity(self.total_rows);
        let mut builder = CsrBuilder::new(self.num_cols);
        for provider in &self.providers {
            residuals.extend(provider.residuals(x));
            let (rows, cols) = provider.jacobian(x);
            for row in rows {
                builder.push_row(&cols, &row);
            }
        }
        (residuals, builder.build())
    }

    pub fn build(project: &Project, layout: &VariableLayout) -> Result<Self, SolveError> {
        let mut providers = Vec::new();

        for (_, line) in project.lines.iter() {
            let a = point_params(layout, line.a, "line direction")?;
            let b = point_params(layout, line.b, "line direction")?;
            let indices = line.direction.forced_zero_components();
            if !indices.is_empty() {
                providers.push(Provider::LineDirection(LineDirectionProvider::new(a, b, indices)));
            }
            if let Some(target) = line.target_length {
                providers.push(Provider::LineLength(LineLengthProvider::new(a, b, target)));
            }
        }

        for (_, constraint) in project.constraints.iter() {
            if !constraint.enabled {
                continue;
            }
            if !constraint.is_valid() {
                return Err(SolveError::InvalidConstraintParameter(format!(
                    "{:?}",
                    constraint.kind
                )));
            }
            build_constraint_providers(project, layout, constraint, &mut providers)?;
        }

        for (handle, viewpoint) in project.viewpoints.iter() {
            let camera = camera_params(layout, handle, "viewpoint")?;
            if camera.pose_is_free {
                providers.push(Provider::QuatNorm(QuatNormProvider::new(camera)));
            }

            let mut by_axis: HashMap<Axis, Vec<&crate::entity::VanishingLine>> = HashMap::new();
            for vl in project.vanishing_lines_for(handle) {
                by_axis.entry(vl.axis).or_default().push(vl);
            }
            for axis in Axis::ALL {
                if let Some(lines) = by_axis.get(&axis) {
                    if let Some(vp) = estimate_vanishing_point(lines) {
                        providers.push(Provider::VanishingLine(VanishingLineProvider::new(
                            camera, axis, vp, 1.0,
                        )));
                    }
                }
            }
        }

        for (_, ip) in project.image_points.iter() {
            if !ip.visible {
                continue;
            }
            let point = point_params(layout, ip.world_point, "image point")?;
            let camera = camera_params(layout, ip.viewpoint, "image point")?;
            providers.push(Provider::Reprojection(ReprojectionProvider::new(point, camera, ip.pixel)));
        }

        let mut row_offsets = Vec::with_capacity(providers.len() + 1);
        let mut total_rows = 0;
        row_offsets.push(0);
        for p in &providers {
            total_rows += p.residual_count();
            row_offsets.push(total_rows);
        }

        Ok(Self { providers, row_offsets, total_rows, num_cols: layout.len() })
    }
}

fn build_constraint_providers(
    project: &Project,
    layout: &VariableLayout,
    constraint: &Constraint,
    providers: &mut Vec<Provider>,
) -> Result<(), SolveError> {
    let target = |name: &str| {
        constraint
            .target_value
            .ok_or_else(|| SolveError::InvalidConstraintParameter(format!("{name}: missing target_value")))
    };

    match &constraint.kind {
        ConstraintKind::DistancePointPoint { a, b } => {
            let a = point_params(layout, *a, "distance_point_point")?;
            let b = point_params(layout, *b, "distance_point_point")?;
            providers.push(Provider::Distance(DistanceProvider::new(a, b, target("distance_point_point")?)));
        }
        ConstraintKind::DistancePointLine { point, line } => {
            let p = point_params(layout, *point, "distance_point_line")?;
            let (a, b) = line_endpoints(project, layout, *line, "distance_point_line")?;
            providers.push(Provider::DistancePointLine(DistancePointLineProvider::new(
                a,
                b,
                p,
                target("distance_point_line")?,
            )));
        }
        ConstraintKind::DistancePointPlane { point, plane } => {
            let p = point_params(layout, *point, "distance_point_plane")?;
            let plane = [
                point_params(layout, plane[0], "distance_point_plane")?,
                point_params(layout, plane[1], "distance_point_plane")?,
                point_params(layout, plane[2], "distance_point_plane")?,
            ];
            providers.push(Provider::DistancePointPlane(DistancePointPlaneProvider::new(
                plane,
                p,
                target("distance_point_plane")?,
            )));
        }
        ConstraintKind::AnglePointPointPoint { a, vertex, c } => {
            let a = point_params(layout, *a, "angle_point_point_point")?;
            let vertex = point_params(layout, *vertex, "angle_point_point_point")?;
            let c = point_params(layout, *c, "angle_point_point_point")?;
            providers.push(Provider::Angle(AngleProvider::new(
                a,
                vertex,
                c,
                target("angle_point_point_point")?,
            )));
        }
        ConstraintKind::AngleLineLine { line_a, line_b } => {
            let (a, b) = line_endpoints(project, layout, *line_a, "angle_line_line")?;
            let (c, d) = line_endpoints(project, layout, *line_b, "angle_line_line")?;
            providers.push(Provider::AngleLineLine(AngleLineLineProvider::new(
                a,
                b,
                c,
                d,
                target("angle_line_line")?,
            )));
        }
        ConstraintKind::ParallelLines { line_a, line_b } => {
            let (a, b) = line_endpoints(project, layout, *line_a, "parallel_lines")?;
            let (c, d) = line_endpoints(project, layout, *line_b, "parallel_lines")?;
            providers.push(Provider::Parallel(ParallelProvider::new(a, b, c, d)));
        }
        ConstraintKind::PerpendicularLines { line_a, line_b } => {
            let (a, b) = line_endpoints(project, layout, *line_a, "perpendicular_lines")?;
            let (c, d) = line_endpoints(project, layout, *line_b, "perpendicular_lines")?;
            providers.push(Provider::Perpendicular(PerpendicularProvider::new(a, b, c, d)));
        }
        ConstraintKind::CollinearPoints { points } => {
            if points.len() >= 3 {
                let a = point_params(layout, points[0], "collinear_points")?;
                let b = point_params(layout, points[1], "collinear_points")?;
                for &extra in &points[2..] {
                    let p = point_params(layout, extra, "collinear_points")?;
                    providers.push(Provider::Coincident(CoincidentProvider::new(a, b, p)));
                }
            }
        }
        ConstraintKind::CoplanarPoints { points } => {
            if points.len() >= 4 {
                let reference = [
                    point_params(layout, points[0], "coplanar_points")?,
                    point_params(layout, points[1], "coplanar_points")?,
                    point_params(layout, points[2], "coplanar_points")?,
                ];
                let rest = points[3..]
                    .iter()
                    .map(|&h| point_params(layout, h, "coplanar_points"))
                    .collect::<Result<Vec<_>, _>>()?;
                providers.push(Provider::Coplanar(CoplanarProvider::new(reference, rest)));
            }
        }
        ConstraintKind::FixedPoint { point, target: position } => {
            let p = point_params(layout, *point, "fixed_point")?;
            providers.push(Provider::FixedPoint(FixedPointProvider::new(p, *position)));
        }
        ConstraintKind::HorizontalLine { line } => {
            let (a, b) = line_endpoints(project, layout, *line, "horizontal_line")?;
            providers.push(Provider::LineDirection(LineDirectionProvider::new(
                a,
                b,
                LineDirection::Xz.forced_zero_components(),
            )));
        }
        ConstraintKind::VerticalLine { line } => {
            let (a, b) = line_endpoints(project, layout, *line, "vertical_line")?;
            providers.push(Provider::LineDirection(LineDirectionProvider::new(
                a,
                b,
                LineDirection::Y.forced_zero_components(),
            )));
        }
        ConstraintKind::EqualDistances { pairs } => {
            let pairs = pairs
                .iter()
                .map(|&(a, b)| {
                    Ok((point_params(layout, a, "equal_distances")?, point_params(layout, b, "equal_distances")?))
                })
                .collect::<Result<Vec<_>, SolveError>>()?;
            providers.push(Provider::EqualDistances(EqualDistancesProvider::new(pairs)));
        }
        ConstraintKind::EqualAngles { triples } => {
            let triples = triples
                .iter()
                .map(|&(a, vertex, c)| {
                    Ok((
                        point_params(layout, a, "equal_angles")?,
                        point_params(layout, vertex, "equal_angles")?,
                        point_params(layout, c, "equal_angles")?,
                    ))
                })
                .collect::<Result<Vec<_>, SolveError>>()?;
            providers.push(Provider::EqualAngles(EqualAnglesProvider::new(triples)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn free_line_contributes_no_direction_provider() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        let b = project.add_point(DVec3::X);
        project.add_line(a, b, LineDirection::Free).unwrap();
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let set = ProviderSet::build(&project, &layout).unwrap();
        assert_eq!(set.residual_count(), 0);
    }

    #[test]
    fn fixed_point_constraint_contributes_three_residuals() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.add_constraint(Constraint::new(ConstraintKind::FixedPoint {
            point: a,
            target: DVec3::new(1.0, 2.0, 3.0),
        }));
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let set = ProviderSet::build(&project, &layout).unwrap();
        assert_eq!(set.residual_count(), 3);
    }

    #[test]
    fn reprojection_provider_built_per_visible_image_point() {
        let mut project = Project::new();
        let vp = project.add_viewpoint(crate::entity::Viewpoint::new(
            crate::projection::camera_model::Intrinsics::default(),
            100.0,
            100.0,
        ));
        let pt = project.add_point(DVec3::new(0.0, 0.0, 5.0));
        project.add_image_point((50.0, 50.0), pt, vp).unwrap();
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let set = ProviderSet::build(&project, &layout).unwrap();
        // quaternion normalisation (1) + reprojection (2)
        assert_eq!(set.residual_count(), 3);
    }

    #[test]
    fn evaluate_assembles_csr_with_expected_shape() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        let b = project.add_point(DVec3::new(3.0, 0.0, 0.0));
        project.add_constraint(Constraint::new(ConstraintKind::DistancePointPoint { a, b }).with_target(5.0));
        let layout = VariableLayout::build(&project, false, false, false).unwrap();
        let set = ProviderSet::build(&project, &layout).unwrap();
        let (r, j) = set.evaluate(&layout.initial_x());
        assert_eq!(r.len(), 1);
        assert_eq!(j.num_rows, 1);
        assert_eq!(j.num_cols, layout.len());
    }
}
