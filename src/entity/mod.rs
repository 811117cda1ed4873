//! Per-kind entity arenas and the handles that cross-reference them.
//!
//! To avoid cyclic references, each entity kind lives in its own
//! [`handle::Arena`]; `Line`, `ImagePoint`, `VanishingLine` hold
//! [`handle::Handle`]s into the point/viewpoint arenas rather than shared
//! owning references. [`crate::project::Project`] is the one place that
//! owns all five arenas together.

pub mod constraint;
pub mod handle;
pub mod image_point;
pub mod line;
pub mod point;
pub mod vanishing_line;
pub mod viewpoint;

pub use constraint::{Constraint, ConstraintKind};
pub use handle::{Arena, Handle};
pub use image_point::ImagePoint;
pub use line::{Line, LineDirection};
pub use point::{Axis, WorldPoint};
pub use vanishing_line::VanishingLine;
pub use viewpoint::Viewpoint;
