//! Picard (fixed-point) iteration for discretized nonlinear problems, with
//! optional Anderson acceleration.
//!
//! Each iteration linearizes the problem around the previous iterate,
//! `A(u_k) u_{k+1} = b(u_k)`, and solves the sparse linear system for the next
//! iterate. The loop stops when the relative change between iterates drops
//! below a tolerance, or fails after a fixed number of iterations.
//!
//! How it works (high level):
//! - An `Assembler` writes `A(u_k)` into a fixed CSC sparsity pattern and
//!   `b(u_k)` into the right-hand side.
//! - A `LinearSolver` solves the system. The driver tells it how much of the
//!   previous factorization may be reused.
//! - With Anderson acceleration on, the last `m` iterates are mixed with
//!   coefficients from a small least-squares problem.
//!
//! Calling it:
//! - Build a `SparsityPattern` for the system matrix.
//! - Implement `Assembler` for the problem.
//! - Create a `PicardSolver` (e.g. `PicardSolver::with_sparse_qr`), set options
//!   and call `solve`.
//!
//! Example:
//! ```rust,no_run
//! use picard_rs::{Assembler, MatrixValuesMut, PicardSolver, SparsityPattern};
//! use faer_core::Parallelism;
//!
//! // u = 0.5 u + 1, fixed point u = 2.
//! struct Halving;
//! impl Assembler<f64> for Halving {
//!     fn assemble_jacobian(&mut self, _x: &[f64], jac: &mut MatrixValuesMut<'_, f64>) {
//!         jac.set(0, 0, 1.0);
//!     }
//!     fn assemble_residual(&mut self, x: &[f64], b: &mut [f64]) {
//!         b[0] = 0.5 * x[0] + 1.0;
//!     }
//! }
//!
//! let mut solver =
//!     PicardSolver::with_sparse_qr(SparsityPattern::diagonal(1), Parallelism::None).unwrap();
//! solver.use_anderson_acceleration(true);
//! let solution = solver.solve(&mut Halving, None, None).unwrap();
//! assert!((solution.vector[0] - 2.0).abs() < 1e-3);
//! ```

mod anderson;
mod history;
mod linear;
mod lu;
mod pattern;
mod report;
mod scalar;
mod solver;
mod system;

pub use anderson::{compute_coefficients as anderson_coefficients, mix as anderson_mix};
pub use history::HistoryBuffer;
pub use linear::{FactorizationScheme, LinearSolver, SolverError, SparseQrSolver};
pub use lu::{LuDecomposition, LuError};
pub use pattern::{PatternError, SparsityPattern};
pub use report::{IterationReport, Observer, SolveStatus, SolverStats, StdoutReporter};
pub use scalar::Scalar;
pub use solver::{Assembler, PicardError, PicardOptions, PicardSolver, Solution};
pub use system::{LinearSystem, MatrixValuesMut};
