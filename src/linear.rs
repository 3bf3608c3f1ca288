use core::fmt;
use std::time::Instant;

use dyn_stack::{GlobalPodBuffer, PodStack, ReborrowMut};
use faer_core::sparse::SparseColMatRef;
use faer_core::{mat, Conj, Parallelism};
use faer_sparse::qr::{factorize_symbolic_qr, QrRef, QrSymbolicParams, SymbolicQr};

use crate::report::{emit_line, format_duration};
use crate::scalar::Scalar;
use crate::system::LinearSystem;

/// How much of the previous factorization the linear solver may keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorizationScheme {
    /// Analyze and factorize the matrix from scratch.
    FactorizeFromScratch,
    /// Same sparsity pattern, new values: keep the ordering, refactorize.
    ReuseMatrixReorderingAndScaling,
    /// Same matrix: keep the factorization, only solve.
    ReuseFactorizationCompletely,
}

/// Linear solver used by the Picard driver.
///
/// The driver sets a factorization scheme before every `solve`.
pub trait LinearSolver<S: Scalar> {
    fn set_factorization_scheme(&mut self, scheme: FactorizationScheme);

    /// Enables the solver's own diagnostics.
    fn set_verbose_output(&mut self, verbose: bool) {
        let _ = verbose;
    }

    /// Solves the system; `false` reports failure.
    fn solve(&mut self, system: &LinearSystem<S>) -> bool;

    /// Solution of the last successful `solve`.
    fn solution(&self) -> &[S];
}

/// Errors raised by the sparse QR backend.
#[derive(Debug)]
pub enum SolverError {
    /// faer rejected the symbolic analysis.
    Faer(faer_sparse::FaerError),
    /// Workspace requirement overflowed.
    WorkspaceOverflow,
    /// Workspace allocation failed.
    WorkspaceAlloc,
    /// Factorization was requested before any symbolic analysis.
    NotAnalyzed,
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Faer(err) => write!(f, "faer error: {err:?}"),
            Self::WorkspaceOverflow => write!(f, "workspace size overflow"),
            Self::WorkspaceAlloc => write!(f, "workspace allocation failed"),
            Self::NotAnalyzed => write!(f, "no symbolic factorization available"),
        }
    }
}

impl std::error::Error for SolverError {}

/// Sparse QR linear solver backed by faer.
///
/// Honors the factorization schemes: the symbolic analysis is only redone
/// on `FactorizeFromScratch`, and `ReuseFactorizationCompletely` skips the
/// numeric factorization when one is available.
pub struct SparseQrSolver {
    parallelism: Parallelism,
    scheme: FactorizationScheme,
    verbose: bool,
    symbolic: Option<SymbolicQr<usize>>,
    qr_indices: Vec<usize>,
    qr_values: Vec<f64>,
    qr_stack: Option<GlobalPodBuffer>,
    factorized: bool,
    solution: Vec<f64>,
}

impl SparseQrSolver {
    pub fn new(parallelism: Parallelism) -> Self {
        Self {
            parallelism,
            scheme: FactorizationScheme::FactorizeFromScratch,
            verbose: false,
            symbolic: None,
            qr_indices: Vec::new(),
            qr_values: Vec::new(),
            qr_stack: None,
            factorized: false,
            solution: Vec::new(),
        }
    }

    pub fn scheme(&self) -> FactorizationScheme {
        self.scheme
    }

    fn analyze(&mut self, system: &LinearSystem<f64>) -> Result<(), SolverError> {
        self.factorized = false;
        let symbolic = factorize_symbolic_qr(
            system.pattern().as_symbolic(),
            QrSymbolicParams::default(),
        )
        .map_err(SolverError::Faer)?;

        let factor_req = symbolic
            .factorize_numeric_qr_req::<f64>(self.parallelism)
            .map_err(|_| SolverError::WorkspaceOverflow)?;
        let solve_req = symbolic
            .solve_in_place_req::<f64>(1, self.parallelism)
            .map_err(|_| SolverError::WorkspaceOverflow)?;
        let req = factor_req
            .try_or(solve_req)
            .map_err(|_| SolverError::WorkspaceOverflow)?;
        self.qr_stack = Some(GlobalPodBuffer::try_new(req).map_err(|_| SolverError::WorkspaceAlloc)?);

        self.qr_indices = vec![0usize; symbolic.len_indices()];
        self.qr_values = vec![0.0; symbolic.len_values()];
        self.symbolic = Some(symbolic);
        Ok(())
    }

    /// Numeric factorization with the current symbolic analysis, then solve.
    fn factorize_and_solve(&mut self, system: &LinearSystem<f64>) -> Result<bool, SolverError> {
        let (Some(symbolic), Some(buffer)) = (self.symbolic.as_ref(), self.qr_stack.as_mut()) else {
            return Err(SolverError::NotAnalyzed);
        };
        let a = SparseColMatRef::<'_, usize, f64>::new(
            system.pattern().as_symbolic(),
            system.values(),
        );
        self.solution.clear();
        self.solution.extend_from_slice(system.rhs());
        let n = self.solution.len();

        let mut stack = PodStack::new(buffer);
        let qr = symbolic.factorize_numeric_qr::<f64>(
            &mut self.qr_indices,
            &mut self.qr_values,
            a,
            self.parallelism,
            stack.rb_mut(),
        );
        self.factorized = true;

        let mut rhs_mat = mat::from_column_major_slice_mut::<f64>(&mut self.solution, n, 1);
        qr.solve_in_place_with_conj(
            Conj::No,
            rhs_mat.rb_mut(),
            self.parallelism,
            stack.rb_mut(),
        );
        Ok(self.solution.iter().all(|v| v.is_finite()))
    }

    /// Solve with the factors kept from an earlier `factorize_and_solve`.
    fn solve_factored(&mut self, rhs: &[f64]) -> Result<bool, SolverError> {
        let (Some(symbolic), Some(buffer)) = (self.symbolic.as_ref(), self.qr_stack.as_mut()) else {
            return Err(SolverError::NotAnalyzed);
        };
        let n = rhs.len();
        self.solution.clear();
        self.solution.extend_from_slice(rhs);

        // `factorized` guarantees that qr_indices/qr_values hold the factors
        // of this symbolic analysis.
        let qr = unsafe {
            QrRef::<'_, usize, f64>::new_unchecked(
                symbolic,
                self.qr_indices.as_slice(),
                self.qr_values.as_slice(),
            )
        };
        let mut rhs_mat = mat::from_column_major_slice_mut::<f64>(&mut self.solution, n, 1);
        let mut stack = PodStack::new(buffer);
        qr.solve_in_place_with_conj(
            Conj::No,
            rhs_mat.rb_mut(),
            self.parallelism,
            stack.rb_mut(),
        );

        Ok(self.solution.iter().all(|v| v.is_finite()))
    }

    fn solve_with_scheme(&mut self, system: &LinearSystem<f64>) -> Result<bool, SolverError> {
        match self.scheme {
            FactorizationScheme::FactorizeFromScratch => {
                self.analyze(system)?;
                self.factorize_and_solve(system)
            }
            FactorizationScheme::ReuseMatrixReorderingAndScaling => {
                if self.symbolic.is_none() {
                    self.analyze(system)?;
                }
                self.factorize_and_solve(system)
            }
            FactorizationScheme::ReuseFactorizationCompletely => {
                if self.symbolic.is_none() {
                    self.analyze(system)?;
                }
                if self.factorized {
                    self.solve_factored(system.rhs())
                } else {
                    self.factorize_and_solve(system)
                }
            }
        }
    }
}

impl Default for SparseQrSolver {
    fn default() -> Self {
        Self::new(Parallelism::None)
    }
}

impl LinearSolver<f64> for SparseQrSolver {
    fn set_factorization_scheme(&mut self, scheme: FactorizationScheme) {
        self.scheme = scheme;
    }

    fn set_verbose_output(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    fn solve(&mut self, system: &LinearSystem<f64>) -> bool {
        let start = self.verbose.then(Instant::now);
        let outcome = self.solve_with_scheme(system);
        let ok = match outcome {
            Ok(true) => true,
            Ok(false) => {
                log::warn!("sparse QR: solution is not finite, matrix is likely singular");
                false
            }
            Err(err) => {
                log::error!("sparse QR: {err}");
                self.factorized = false;
                false
            }
        };
        if let Some(start) = start {
            let elapsed = format_duration(start.elapsed());
            emit_line(&format!(
                "sparse QR: ndof {}, nnz {}, {:?}, {elapsed}",
                system.ndof(),
                system.pattern().nnz(),
                self.scheme,
            ));
        }
        ok
    }

    fn solution(&self) -> &[f64] {
        &self.solution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::SparsityPattern;

    fn tridiagonal_system(diag: f64, rhs: &[f64]) -> LinearSystem<f64> {
        let n = rhs.len();
        let mut system = LinearSystem::new(SparsityPattern::tridiagonal(n));
        let (mut matrix, b) = system.parts_mut();
        for i in 0..n {
            matrix.set(i, i, diag);
            if i > 0 {
                matrix.set(i, i - 1, -1.0);
                matrix.set(i - 1, i, -1.0);
            }
        }
        b.copy_from_slice(rhs);
        system
    }

    fn assert_solves(system: &LinearSystem<f64>, x: &[f64]) {
        let r = system.residual(x);
        let norm = r.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!(norm < 1e-10, "residual norm {norm}");
    }

    #[test]
    fn solves_tridiagonal_system() {
        let system = tridiagonal_system(4.0, &[1.0, 2.0, 3.0, 4.0]);
        let mut solver = SparseQrSolver::default();
        solver.set_factorization_scheme(FactorizationScheme::FactorizeFromScratch);
        assert!(solver.solve(&system));
        assert_eq!(solver.solution().len(), 4);
        assert_solves(&system, solver.solution());
    }

    #[test]
    fn reuses_factorization_for_new_rhs() {
        let mut system = tridiagonal_system(3.0, &[1.0, 0.0, 1.0]);
        let mut solver = SparseQrSolver::default();
        assert!(solver.solve(&system));

        system.rhs_mut().copy_from_slice(&[0.0, 5.0, -1.0]);
        solver.set_factorization_scheme(FactorizationScheme::ReuseFactorizationCompletely);
        assert!(solver.solve(&system));
        assert_solves(&system, solver.solution());
    }

    #[test]
    fn full_reuse_keeps_factors_of_first_matrix() {
        let first = tridiagonal_system(3.0, &[1.0, 2.0, 1.0]);
        let mut solver = SparseQrSolver::default();
        solver.set_factorization_scheme(FactorizationScheme::FactorizeFromScratch);
        assert!(solver.solve(&first));
        assert_solves(&first, solver.solution());

        // New values are ignored until the next refactorization.
        let second = tridiagonal_system(6.0, &[0.0, 1.0, 4.0]);
        solver.set_factorization_scheme(FactorizationScheme::ReuseFactorizationCompletely);
        assert!(solver.solve(&second));
        let expected = tridiagonal_system(3.0, &[0.0, 1.0, 4.0]);
        assert_solves(&expected, solver.solution());

        solver.set_factorization_scheme(FactorizationScheme::ReuseMatrixReorderingAndScaling);
        assert!(solver.solve(&second));
        assert_solves(&second, solver.solution());
    }

    #[test]
    fn refactorizes_with_kept_ordering() {
        let system = tridiagonal_system(3.0, &[1.0, 2.0, 1.0]);
        let mut solver = SparseQrSolver::default();
        assert!(solver.solve(&system));

        let system = tridiagonal_system(5.0, &[1.0, 2.0, 1.0]);
        solver.set_factorization_scheme(FactorizationScheme::ReuseMatrixReorderingAndScaling);
        assert!(solver.solve(&system));
        assert_solves(&system, solver.solution());
    }

    #[test]
    fn reuse_without_prior_factorization_factorizes() {
        let system = tridiagonal_system(3.0, &[1.0, 1.0]);
        let mut solver = SparseQrSolver::default();
        solver.set_factorization_scheme(FactorizationScheme::ReuseFactorizationCompletely);
        assert!(solver.solve(&system));
        assert_solves(&system, solver.solution());
    }

    #[test]
    fn singular_matrix_fails() {
        let mut system = LinearSystem::<f64>::new(SparsityPattern::diagonal(2));
        {
            let (mut matrix, b) = system.parts_mut();
            matrix.set(0, 0, 1.0);
            matrix.set(1, 1, 0.0);
            b.copy_from_slice(&[1.0, 1.0]);
        }
        let mut solver = SparseQrSolver::default();
        assert!(!solver.solve(&system));
    }
}
