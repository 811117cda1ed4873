//! Smart seeding: propagate an initial 3D position guess outward from
//! already-constrained points across the line graph via BFS, and fall back
//! to a deterministic jittered position for anything left disconnected:
//! walk the line graph outward from any fully-constrained point, using
//! each line's direction/length to place the next point.

use std::collections::{HashSet, VecDeque};

use glam::DVec3;
use rand::Rng;

use crate::constants::DEFAULT_SEED_LENGTH;
use crate::entity::{Axis, Handle, LineDirection, WorldPoint};
use crate::project::Project;

fn effective_position(point: &WorldPoint) -> DVec3 {
    DVec3::new(
        point.effective_value(Axis::X).unwrap_or(point.optimized_xyz.x),
        point.effective_value(Axis::Y).unwrap_or(point.optimized_xyz.y),
        point.effective_value(Axis::Z).unwrap_or(point.optimized_xyz.z),
    )
}

/// A random unit direction respecting `direction`'s forced-zero components
/// (e.g. an X-direction line only ever points along +-X), falling back to a
/// fully free random direction when none are forced.
pub fn seed_direction(direction: LineDirection, rng: &mut impl Rng) -> DVec3 {
    loop {
        let mut v = DVec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        for &axis in direction.forced_zero_components() {
            match axis {
                0 => v.x = 0.0,
                1 => v.y = 0.0,
                2 => v.z = 0.0,
                _ => unreachable!(),
            }
        }
        if v.length_squared() > 1e-12 {
            return v.normalize();
        }
    }
}

/// BFS-seeds every point's `optimized_xyz` starting from the already
/// fully-constrained points, walking incident lines outward; anything left
/// unreached (disconnected from any constrained point) gets a deterministic
/// jittered fallback position around the origin.
pub fn seed_positions(project: &mut Project, rng: &mut impl Rng) {
    let mut visited: HashSet<Handle<WorldPoint>> = HashSet::new();
    let mut queue: VecDeque<Handle<WorldPoint>> = VecDeque::new();

    for (handle, point) in project.points.iter() {
        if point.is_fully_constrained() {
            visited.insert(handle);
            queue.push_back(handle);
        }
    }
    for &handle in &visited {
        let pos = effective_position(project.points.get(handle).unwrap());
        project.points.get_mut(handle).unwrap().optimized_xyz = pos;
    }

    while let Some(handle) = queue.pop_front() {
        let (known_pos, incident_lines) = {
            let point = project.points.get(handle).unwrap();
            (point.optimized_xyz, point.incident_lines.clone())
        };
        for line_handle in incident_lines {
            let Some(line) = project.lines.get(line_handle) else { continue };
            let (other, sign) = if line.a == handle {
                (line.b, 1.0)
            } else if line.b == handle {
                (line.a, -1.0)
            } else {
                continue;
            };
            if visited.contains(&other) {
                continue;
            }
            let length = line.target_length.unwrap_or(DEFAULT_SEED_LENGTH);
            let direction = line.direction;
            let step = seed_direction(direction, rng) * length * sign;
            if let Some(other_point) = project.points.get_mut(other) {
                other_point.optimized_xyz = known_pos + step;
            }
            visited.insert(other);
            queue.push_back(other);
        }
    }

    let fallback_handles: Vec<Handle<WorldPoint>> = project
        .points
        .iter()
        .filter(|(h, _)| !visited.contains(h))
        .map(|(h, _)| h)
        .collect();
    for handle in fallback_handles {
        let jitter = DVec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if let Some(point) = project.points.get_mut(handle) {
            point.optimized_xyz = jitter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_propagate_from_locked_point_along_a_line() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked = [Some(0.0), Some(0.0), Some(0.0)];
        let b = project.add_point(DVec3::new(99.0, 99.0, 99.0));
        project.add_line(a, b, LineDirection::X).unwrap();

        let mut rng = crate::rng::seeded(1);
        seed_positions(&mut project, &mut rng);

        let pos_b = project.points.get(b).unwrap().optimized_xyz;
        assert!(pos_b.y.abs() < 1e-9);
        assert!(pos_b.z.abs() < 1e-9);
        assert!(pos_b.x.abs() > 1e-9);
    }

    #[test]
    fn disconnected_point_gets_a_fallback_position() {
        let mut project = Project::new();
        let a = project.add_point(DVec3::ZERO);
        project.points.get_mut(a).unwrap().locked = [Some(0.0), Some(0.0), Some(0.0)];
        let isolated = project.add_point(DVec3::new(5.0, 5.0, 5.0));

        let mut rng = crate::rng::seeded(2);
        seed_positions(&mut project, &mut rng);

        let pos = project.points.get(isolated).unwrap().optimized_xyz;
        assert_ne!(pos, DVec3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn seed_direction_respects_forced_zero_axes() {
        let mut rng = crate::rng::seeded(3);
        for _ in 0..20 {
            let d = seed_direction(LineDirection::Y, &mut rng);
            assert!(d.x.abs() < 1e-12);
            assert!(d.z.abs() < 1e-12);
            assert!((d.length() - 1.0).abs() < 1e-9);
        }
    }

}
