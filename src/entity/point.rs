//! World points: 3D positions with optional per-axis locks.

use glam::DVec3;

use crate::entity::handle::Handle;
use crate::entity::image_point::ImagePoint;
use crate::entity::line::Line;

/// One of the three world axes. Used both for lock status and for the
/// axis-label on [`crate::entity::vanishing_line::VanishingLine`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn unit(self) -> DVec3 {
        match self {
            Axis::X => DVec3::X,
            Axis::Y => DVec3::Y,
            Axis::Z => DVec3::Z,
        }
    }

    pub fn component(self, v: DVec3) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// A 3D point in the scene. A locked axis keeps its locked value across
/// all operations; `inferred_xyz` is recomputed whenever the locked set or
/// line set changes.
#[derive(Debug, Clone)]
pub struct WorldPoint {
    /// Current best estimate, written back at the end of a solve.
    pub optimized_xyz: DVec3,
    /// Per-axis locked value, `None` if that axis is free.
    pub locked: [Option<f64>; 3],
    /// Axis values deduced from direction-constrained lines touching a
    /// fully-locked endpoint via inference branching; `None` if not (yet)
    /// inferred. Recomputed by [`crate::init::branching`].
    pub inferred_xyz: [Option<f64>; 3],
    pub incident_lines: Vec<Handle<Line>>,
    pub observations: Vec<Handle<ImagePoint>>,
}

impl WorldPoint {
    pub fn new(position: DVec3) -> Self {
        Self {
            optimized_xyz: position,
            locked: [None; 3],
            inferred_xyz: [None; 3],
            incident_lines: Vec::new(),
            observations: Vec::new(),
        }
    }

    pub fn with_lock(mut self, axis: Axis, value: f64) -> Self {
        self.locked[axis_index(axis)] = Some(value);
        self
    }

    pub fn is_locked(&self, axis: Axis) -> bool {
        self.locked[axis_index(axis)].is_some()
    }

    pub fn is_fully_locked(&self) -> bool {
        self.locked.iter().all(Option::is_some)
    }

    pub fn is_fully_constrained(&self) -> bool {
        Axis::ALL.iter().all(|&a| self.effective_value(a).is_some())
    }

    /// The value an axis takes for the purposes of initialisation/PnP: the
    /// lock if present, else the inferred value, else `None` (unknown).
    pub fn effective_value(&self, axis: Axis) -> Option<f64> {
        let i = axis_index(axis);
        self.locked[i].or(self.inferred_xyz[i])
    }

    /// Record an inference-branching deduced value for `axis`.
    /// A no-op on an already-locked axis: the lock wins per
    /// [`Self::effective_value`].
    pub fn set_inferred(&mut self, axis: Axis, value: f64) {
        self.inferred_xyz[axis_index(axis)] = Some(value);
    }

    /// Apply locked-axis values onto `self.optimized_xyz`, leaving free axes
    /// untouched. Locked axes never drift.
    pub fn clamp_to_locks(&mut self) {
        let mut v = self.optimized_xyz;
        if let Some(lx) = self.locked[0] {
            v.x = lx;
        }
        if let Some(ly) = self.locked[1] {
            v.y = ly;
        }
        if let Some(lz) = self.locked[2] {
            v.z = lz;
        }
        self.optimized_xyz = v;
    }
}

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
        Axis::Z => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_axis_survives_clamp() {
        let mut p = WorldPoint::new(DVec3::new(1.0, 2.0, 3.0)).with_lock(Axis::Y, 5.0);
        p.optimized_xyz.y = 999.0;
        p.clamp_to_locks();
        assert_eq!(p.optimized_xyz.y, 5.0);
    }

    #[test]
    fn fully_locked_requires_all_three_axes() {
        let p = WorldPoint::new(DVec3::ZERO).with_lock(Axis::X, 0.0).with_lock(Axis::Y, 0.0);
        assert!(!p.is_fully_locked());
        let p = p.with_lock(Axis::Z, 0.0);
        assert!(p.is_fully_locked());
    }
}
