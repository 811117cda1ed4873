//! Dense and sparse linear algebra kernel (component A of the design).
//!
//! Intentionally small and hand-rolled, in the style of the physics kernel
//! this crate grew out of (`MetricTensor4` et al.) rather than pulled in
//! from `nalgebra`/`faer`: every routine here exists because a specific
//! provider or solver step needs exactly it.

pub mod cg;
pub mod cholesky;
pub mod dense;
pub mod eigen;
pub mod mat3;
pub mod sparse;
pub mod svd;

pub use cg::conjugate_gradient_sparse;
pub use cholesky::cholesky_dense;
pub use dense::DenseMatrix;
pub use eigen::{symmetric_eigen, EigenDecomposition};
pub use mat3::{determinant3x3, invert3x3, mul3x3, orthogonalise_rotation, transpose3x3};
pub use sparse::{CsrBuilder, CsrMatrix};
pub use svd::{svd3x3, Svd3};
