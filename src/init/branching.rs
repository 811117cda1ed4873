//! Inference branching: a single-axis, known-length
//! line with exactly one endpoint already resolved on that axis leaves the
//! other endpoint's value known up to a sign -- `unknown = base +- magnitude`.
//! Below [`crate::constants::MAX_BRANCHING_AXES`] ambiguous axes, every sign
//! combination is enumerated and scored by a caller-supplied cost closure
//! (post-init reprojection/constraint cost lives in the orchestrator, not
//! here); beyond that, a single all-positive heuristic assignment is used.

use crate::constants::MAX_BRANCHING_AXES;
use crate::entity::{Axis, Handle, LineDirection, WorldPoint};
use crate::project::Project;

/// One point whose value on `axis` is known only up to a sign:
/// `value = base +- magnitude`.
#[derive(Debug, Clone, Copy)]
pub struct AmbiguousAxis {
    pub point: Handle<WorldPoint>,
    pub axis: Axis,
    pub base: f64,
    pub magnitude: f64,
}

fn axis_for(direction: LineDirection) -> Option<Axis> {
    match direction {
        LineDirection::X => Some(Axis::X),
        LineDirection::Y => Some(Axis::Y),
        LineDirection::Z => Some(Axis::Z),
        _ => None,
    }
}

/// Scans every line with a single-axis direction and a known `target_length`
/// where exactly one endpoint is resolved on that axis and the other is not,
/// recording one [`AmbiguousAxis`] per newly-reachable point. A point already
/// resolved on its axis (by a lock, an earlier inference pass, or another
/// line in the same scan) is skipped.
pub fn find_ambiguous_axes(project: &Project) -> Vec<AmbiguousAxis> {
    let mut resolved_this_pass: Vec<(Handle<WorldPoint>, Axis)> = Vec::new();
    let mut found = Vec::new();

    for (_, line) in project.lines.iter() {
        let Some(axis) = axis_for(line.direction) else { continue };
        let Some(length) = line.target_length else { continue };
        let (Some(a), Some(b)) = (project.points.get(line.a), project.points.get(line.b)) else {
            continue;
        };

        let a_known = a.effective_value(axis);
        let b_known = b.effective_value(axis);
        let a_resolved = a_known.is_some() || resolved_this_pass.contains(&(line.a, axis));
        let b_resolved = b_known.is_some() || resolved_this_pass.contains(&(line.b, axis));

        match (a_resolved, b_resolved) {
            (true, false) => {
                let base = a_known.unwrap_or(axis.component(a.optimized_xyz));
                found.push(AmbiguousAxis { point: line.b, axis, base, magnitude: length });
                resolved_this_pass.push((line.b, axis));
            }
            (false, true) => {
                let base = b_known.unwrap_or(axis.component(b.optimized_xyz));
                found.push(AmbiguousAxis { point: line.a, axis, base, magnitude: length });
                resolved_this_pass.push((line.a, axis));
            }
            _ => {}
        }
    }
    found
}

/// Every `+-1` sign combination for `axes`, or `None` (signalling "use the
/// heuristic instead") once there are more than [`MAX_BRANCHING_AXES`].
pub fn enumerate_sign_assignments(axes: &[AmbiguousAxis]) -> Option<Vec<Vec<f64>>> {
    if axes.len() as u32 > MAX_BRANCHING_AXES {
        return None;
    }
    let count = 1usize << axes.len();
    let mut assignments = Vec::with_capacity(count);
    for mask in 0..count {
        let signs: Vec<f64> =
            (0..axes.len()).map(|i| if mask & (1 << i) != 0 { 1.0 } else { -1.0 }).collect();
        assignments.push(signs);
    }
    Some(assignments)
}

/// All-positive fallback assignment used once `axes.len() > MAX_BRANCHING_AXES`.
pub fn heuristic_assignment(axes: &[AmbiguousAxis]) -> Vec<f64> {
    vec![1.0; axes.len()]
}

/// Writes `base + sign * magnitude` into each point's `inferred_xyz[axis]`.
pub fn apply_assignment(project: &mut Project, axes: &[AmbiguousAxis], signs: &[f64]) {
    for (ambiguous, &sign) in axes.iter().zip(signs) {
        if let Some(point) = project.points.get_mut(ambiguous.point) {
            point.set_inferred(ambiguous.axis, ambiguous.base + sign * ambiguous.magnitude);
        }
    }
}

/// Finds the ambiguous axes, enumerates (or falls back to the heuristic for)
/// their sign assignments, and applies whichever minimises `cost` -- `cost`
/// is expected to re-run whatever downstream evaluation (reprojection,
/// constraint residuals) the orchestrator considers "post-init cost".
pub fn resolve_best(project: &mut Project, cost: impl Fn(&mut Project) -> f64) {
    let axes = find_ambiguous_axes(project);
    if axes.is_empty() {
        return;
    }

    let assignments = enumerate_sign_assignments(&axes)
        .unwrap_or_else(|| vec![heuristic_assignment(&axes)]);

    let mut best: Option<(f64, Vec<f64>)> = None;
    for signs in assignments {
        apply_assignment(project, &axes, &signs);
        let score = cost(project);
        if best.as_ref().map_or(true, |&(s, _)| score < s) {
            best = Some((score, signs));
        }
    }
    if let Some((_, signs)) = best {
        apply_assignment(project, &axes, &signs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn single_ambiguous_axis_is_found_and_resolved() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked = [Some(0.0), Some(0.0), Some(0.0)];
        let b = project.add_point(DVec3::new(10.0, 0.0, 0.0));
        let line = project.add_line(a, b, LineDirection::X).unwrap();
        project.lines.get_mut(line).unwrap().target_length = Some(2.0);

        let axes = find_ambiguous_axes(&project);
        assert_eq!(axes.len(), 1);
        assert_eq!(axes[0].point, b);
        assert_eq!(axes[0].magnitude, 2.0);
    }

    #[test]
    fn resolve_best_picks_the_lower_cost_sign() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked = [Some(0.0), Some(0.0), Some(0.0)];
        let b = project.add_point(DVec3::new(10.0, 0.0, 0.0));
        let line = project.add_line(a, b, LineDirection::X).unwrap();
        project.lines.get_mut(line).unwrap().target_length = Some(3.0);

        resolve_best(&mut project, |p| {
            let v = p.points.get(b).unwrap().effective_value(Axis::X).unwrap();
            (v - 3.0).abs()
        });

        let resolved = project.points.get(b).unwrap().effective_value(Axis::X).unwrap();
        assert!((resolved - 3.0).abs() < 1e-9);
    }

    #[test]
    fn heuristic_assignment_is_all_positive() {
        let mut project = Project::new();
        let p = project.add_point(DVec3::ZERO);
        let axes =
            vec![AmbiguousAxis { point: p, axis: Axis::X, base: 0.0, magnitude: 1.0 }; 3];
        assert_eq!(heuristic_assignment(&axes), vec![1.0, 1.0, 1.0]);
    }
}
