//! Error taxonomy for pre-flight and reported-but-non-fatal failures.
//!
//! Only the configuration/validation class is a hard `Err` -- it means the
//! solve never started. Numerical, convergence, initialisation and
//! cancellation failures are all non-fatal and are reported through
//! [`crate::orchestrator::SolveResult::error`] instead, because a caller
//! still wants back whatever partial solution was reached.

/// Pre-flight failures that prevent a solve from starting at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SolveError {
    /// The variable layout has zero free parameters -- there is nothing to
    /// optimise.
    #[error("layout has no free variables")]
    EmptyLayout,

    /// A line's two endpoints resolve to the same world point.
    #[error("line {0:?} has coincident endpoints")]
    DegenerateLine(crate::entity::handle::Handle<crate::entity::line::Line>),

    /// A constraint references a tolerance or priority outside its valid
    /// range, or a target value that cannot be satisfied (e.g. length <= 0).
    #[error("invalid constraint parameter: {0}")]
    InvalidConstraintParameter(String),

    /// A direction value on a DTO fell outside the unified vocabulary.
    #[error("unrecognised line direction constraint: {0}")]
    UnrecognisedDirection(String),

    /// An image point, line endpoint, or constraint member references an
    /// entity handle that does not exist in the project.
    #[error("dangling entity reference in {context}")]
    DanglingReference { context: String },

    /// No viewpoint in the project has any observations to anchor a solve.
    #[error("no observations available to build a solve")]
    NoObservations,
}
