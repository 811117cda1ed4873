//! Lines between two world points with an intrinsic direction/length
//! constraint.

use crate::entity::handle::Handle;
use crate::entity::point::WorldPoint;

/// Unified residual-side direction vocabulary: the DTO enum `{free,
/// horizontal, vertical, x-aligned, y-aligned, z-aligned}` and the
/// residual-side enum `{xy, xz, yz, x, y, z}` are unified here; `horizontal`
/// is an alias of `Xz` (read as the XZ-plane, not "Y=0") and `vertical` is
/// an alias of `Y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDirection {
    /// No direction constraint; produces no provider.
    Free,
    /// Direction locked to the X axis: forces `Delta.y = Delta.z = 0`.
    X,
    /// Direction locked to the Y axis (DTO alias "vertical"): forces
    /// `Delta.x = Delta.z = 0`.
    Y,
    /// Direction locked to the Z axis: forces `Delta.x = Delta.y = 0`.
    Z,
    /// Constrained to the XY plane: forces `Delta.z = 0`.
    Xy,
    /// Constrained to the XZ plane (DTO alias "horizontal"): forces
    /// `Delta.y = 0`.
    Xz,
    /// Constrained to the YZ plane: forces `Delta.x = 0`.
    Yz,
}

impl LineDirection {
    /// Parse a DTO direction label into the unified vocabulary. Returns
    /// `Err` for anything outside the union so the caller can surface
    /// [`crate::error::SolveError::UnrecognisedDirection`] rather than
    /// silently treating an unknown label as `Free`.
    pub fn from_dto_label(label: &str) -> Result<Self, String> {
        match label {
            "free" => Ok(Self::Free),
            "horizontal" => Ok(Self::Xz),
            "vertical" => Ok(Self::Y),
            "x-aligned" | "x" => Ok(Self::X),
            "y-aligned" | "y" => Ok(Self::Y),
            "z-aligned" | "z" => Ok(Self::Z),
            "xy" => Ok(Self::Xy),
            "xz" => Ok(Self::Xz),
            "yz" => Ok(Self::Yz),
            other => Err(other.to_string()),
        }
    }

    /// Which components of `B - A` the direction provider forces to zero.
    /// Empty for `Free`.
    pub fn forced_zero_components(self) -> &'static [usize] {
        match self {
            Self::Free => &[],
            Self::X => &[1, 2],
            Self::Y => &[0, 2],
            Self::Z => &[0, 1],
            Self::Xy => &[2],
            Self::Xz => &[1],
            Self::Yz => &[0],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Line {
    pub a: Handle<WorldPoint>,
    pub b: Handle<WorldPoint>,
    pub direction: LineDirection,
    /// Target length, if this line carries a length constraint. Must be
    /// `> 0`.
    pub target_length: Option<f64>,
    pub tolerance: f64,
}

impl Line {
    pub fn new(a: Handle<WorldPoint>, b: Handle<WorldPoint>, direction: LineDirection) -> Self {
        Self { a, b, direction, target_length: None, tolerance: 1e-3 }
    }

    pub fn with_length(mut self, target_length: f64) -> Self {
        self.target_length = Some(target_length);
        self
    }

    /// `true` if the two endpoint handles are identical -- the "degenerate
    /// line" pre-flight failure.
    pub fn is_degenerate(&self) -> bool {
        self.a == self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_is_alias_of_xz() {
        assert_eq!(LineDirection::from_dto_label("horizontal").unwrap(), LineDirection::Xz);
        assert_eq!(LineDirection::Xz.forced_zero_components(), &[1]);
    }

    #[test]
    fn vertical_is_alias_of_y() {
        assert_eq!(LineDirection::from_dto_label("vertical").unwrap(), LineDirection::Y);
        assert_eq!(LineDirection::Y.forced_zero_components(), &[0, 2]);
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(LineDirection::from_dto_label("diagonal").is_err());
    }
}
