//! The scene: owns every entity arena and maintains the forward/back-link
//! invariants (incident lines, observation sets).
//!
//! Out of scope: persistence (JSON load/save), the editor mutation layer
//! (undo/history), DTO validation at load time. `Project`
//! here is the plain in-memory scene the core consumes; a caller builds one
//! however it likes and hands it to [`crate::orchestrator::solve`].

use glam::DVec3;

use crate::entity::{
    Arena, Constraint, Handle, ImagePoint, Line, LineDirection, VanishingLine, Viewpoint,
    WorldPoint,
};

#[derive(Debug, Default)]
pub struct Project {
    pub points: Arena<WorldPoint>,
    pub lines: Arena<Line>,
    pub viewpoints: Arena<Viewpoint>,
    pub image_points: Arena<ImagePoint>,
    pub vanishing_lines: Arena<VanishingLine>,
    pub constraints: Arena<Constraint>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, position: DVec3) -> Handle<WorldPoint> {
        self.points.insert(WorldPoint::new(position))
    }

    /// Insert a line and register it on both endpoints' incident sets.
    /// Returns `None` if the endpoints are the same point (degenerate) or
    /// either handle is dangling.
    pub fn add_line(
        &mut self,
        a: Handle<WorldPoint>,
        b: Handle<WorldPoint>,
        direction: LineDirection,
    ) -> Option<Handle<Line>> {
        if a == b || !self.points.contains(a) || !self.points.contains(b) {
            return None;
        }
        let handle = self.lines.insert(Line::new(a, b, direction));
        self.points.get_mut(a).unwrap().incident_lines.push(handle);
        self.points.get_mut(b).unwrap().incident_lines.push(handle);
        Some(handle)
    }

    /// Remove a line, unregistering it from both endpoints.
    pub fn remove_line(&mut self, handle: Handle<Line>) -> Option<Line> {
        let line = self.lines.remove(handle)?;
        if let Some(a) = self.points.get_mut(line.a) {
            a.incident_lines.retain(|&h| h != handle);
        }
        if let Some(b) = self.points.get_mut(line.b) {
            b.incident_lines.retain(|&h| h != handle);
        }
        Some(line)
    }

    pub fn add_viewpoint(&mut self, viewpoint: Viewpoint) -> Handle<Viewpoint> {
        self.viewpoints.insert(viewpoint)
    }

    /// Insert an image point, registering it on both the world point's and
    /// the viewpoint's observation sets. Returns `None` on a dangling
    /// reference.
    pub fn add_image_point(
        &mut self,
        pixel: (f64, f64),
        world_point: Handle<WorldPoint>,
        viewpoint: Handle<Viewpoint>,
    ) -> Option<Handle<ImagePoint>> {
        if !self.points.contains(world_point) || !self.viewpoints.contains(viewpoint) {
            return None;
        }
        let handle = self.image_points.insert(ImagePoint::new(pixel, world_point, viewpoint));
        self.points.get_mut(world_point).unwrap().observations.push(handle);
        self.viewpoints.get_mut(viewpoint).unwrap().observations.push(handle);
        Some(handle)
    }

    pub fn remove_image_point(&mut self, handle: Handle<ImagePoint>) -> Option<ImagePoint> {
        let ip = self.image_points.remove(handle)?;
        if let Some(wp) = self.points.get_mut(ip.world_point) {
            wp.observations.retain(|&h| h != handle);
        }
        if let Some(vp) = self.viewpoints.get_mut(ip.viewpoint) {
            vp.observations.retain(|&h| h != handle);
        }
        Some(ip)
    }

    pub fn add_vanishing_line(&mut self, vl: VanishingLine) -> Option<Handle<VanishingLine>> {
        if !self.viewpoints.contains(vl.viewpoint) {
            return None;
        }
        Some(self.vanishing_lines.insert(vl))
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Handle<Constraint> {
        self.constraints.insert(constraint)
    }

    pub fn vanishing_lines_for(&self, viewpoint: Handle<Viewpoint>) -> Vec<&VanishingLine> {
        self.vanishing_lines.iter().filter(|(_, vl)| vl.viewpoint == viewpoint).map(|(_, vl)| vl).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::point::Axis;
    use crate::projection::camera_model::Intrinsics;

    #[test]
    fn add_line_registers_on_both_endpoints() {
        let mut p = Project::new();
        let a = p.add_point(DVec3::ZERO);
        let b = p.add_point(DVec3::X);
        let line = p.add_line(a, b, LineDirection::Free).unwrap();
        assert_eq!(p.points.get(a).unwrap().incident_lines, vec![line]);
        assert_eq!(p.points.get(b).unwrap().incident_lines, vec![line]);
    }

    #[test]
    fn degenerate_line_is_rejected() {
        let mut p = Project::new();
        let a = p.add_point(DVec3::ZERO);
        assert!(p.add_line(a, a, LineDirection::Free).is_none());
    }

    #[test]
    fn remove_line_unregisters_from_endpoints() {
        let mut p = Project::new();
        let a = p.add_point(DVec3::ZERO);
        let b = p.add_point(DVec3::X);
        let line = p.add_line(a, b, LineDirection::Free).unwrap();
        p.remove_line(line);
        assert!(p.points.get(a).unwrap().incident_lines.is_empty());
        assert!(p.points.get(b).unwrap().incident_lines.is_empty());
    }

    #[test]
    fn image_point_registers_on_point_and_viewpoint() {
        let mut p = Project::new();
        let pt = p.add_point(DVec3::ZERO);
        let vp = p.add_viewpoint(Viewpoint::new(Intrinsics::default(), 1920.0, 1080.0));
        let axis_check = Axis::X.unit();
        assert_eq!(axis_check, DVec3::X);
        let ip = p.add_image_point((10.0, 20.0), pt, vp).unwrap();
        assert_eq!(p.points.get(pt).unwrap().observations, vec![ip]);
        assert_eq!(p.viewpoints.get(vp).unwrap().observations, vec![ip]);
    }
}
