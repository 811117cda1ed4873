//! The generic constraint data model. Each [`Constraint`] wraps a
//! tagged [`ConstraintKind`] plus the shared parameter dict (target,
//! tolerance, priority, enabled, driving). Providers (component D,
//! [`crate::providers`]) are built from these plus the project's lines and
//! points directly -- `Constraint` is the data model, not the solver's
//! internal representation.

use glam::DVec3;

use crate::entity::handle::Handle;
use crate::entity::line::Line;
use crate::entity::point::WorldPoint;

#[derive(Debug, Clone)]
pub enum ConstraintKind {
    DistancePointPoint { a: Handle<WorldPoint>, b: Handle<WorldPoint> },
    DistancePointLine { point: Handle<WorldPoint>, line: Handle<Line> },
    DistancePointPlane { point: Handle<WorldPoint>, plane: [Handle<WorldPoint>; 3] },
    AnglePointPointPoint {
        a: Handle<WorldPoint>,
        vertex: Handle<WorldPoint>,
        c: Handle<WorldPoint>,
    },
    AngleLineLine { line_a: Handle<Line>, line_b: Handle<Line> },
    ParallelLines { line_a: Handle<Line>, line_b: Handle<Line> },
    PerpendicularLines { line_a: Handle<Line>, line_b: Handle<Line> },
    CollinearPoints { points: Vec<Handle<WorldPoint>> },
    CoplanarPoints { points: Vec<Handle<WorldPoint>> },
    FixedPoint { point: Handle<WorldPoint>, target: DVec3 },
    HorizontalLine { line: Handle<Line> },
    VerticalLine { line: Handle<Line> },
    EqualDistances { pairs: Vec<(Handle<WorldPoint>, Handle<WorldPoint>)> },
    EqualAngles { triples: Vec<(Handle<WorldPoint>, Handle<WorldPoint>, Handle<WorldPoint>)> },
}

/// Shared parameter dict: target value, tolerance, priority, enabled,
/// driving.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub target_value: Option<f64>,
    pub tolerance: f64,
    pub priority: f64,
    pub enabled: bool,
    /// A "driving" constraint determines geometry outright (as opposed to a
    /// soft preference); non-driving constraints are still residualised but
    /// conventionally carry a lower weight upstream of the solver. The core
    /// does not itself distinguish the two beyond exposing the flag to
    /// provider construction.
    pub driving: bool,
}

impl Constraint {
    pub fn new(kind: ConstraintKind) -> Self {
        Self { kind, target_value: None, tolerance: 1e-3, priority: 1.0, enabled: true, driving: true }
    }

    pub fn with_target(mut self, target_value: f64) -> Self {
        self.target_value = Some(target_value);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Pre-flight validation: `target_value <= 0` is invalid for the
    /// constraint kinds where the
    /// target is a length, and `tolerance`/`priority` must be finite and
    /// non-negative.
    pub fn is_valid(&self) -> bool {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return false;
        }
        if !self.priority.is_finite() || self.priority < 0.0 {
            return false;
        }
        if let Some(target) = self.target_value {
            let needs_positive_length = matches!(
                self.kind,
                ConstraintKind::DistancePointPoint { .. }
                    | ConstraintKind::DistancePointLine { .. }
                    | ConstraintKind::DistancePointPlane { .. }
            );
            if needs_positive_length && target <= 0.0 {
                return false;
            }
        }
        true
    }
}
