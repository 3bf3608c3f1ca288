use core::fmt;
use std::time::Instant;

use faer_core::Parallelism;

use crate::anderson;
use crate::history::HistoryBuffer;
use crate::linear::{FactorizationScheme, LinearSolver, SparseQrSolver};
use crate::lu::LuError;
use crate::pattern::SparsityPattern;
use crate::report::{
    emit_line, format_duration, IterationReport, Observer, SolveStatus, SolverStats,
    StdoutReporter,
};
use crate::scalar::{l2_distance, l2_norm, Scalar};
use crate::system::{LinearSystem, MatrixValuesMut};

/// Previous iterates with a smaller norm count as the zero vector.
const ZERO_NORM: f64 = 1e-12;

/// Errors of a Picard solve. None of them leaves a usable solution behind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PicardError {
    /// The options failed validation.
    InvalidConfiguration { reason: &'static str },
    /// The sparsity pattern is empty or not square.
    InvalidDimensions { nrows: usize, ncols: usize },
    /// A vector has the wrong length.
    DimensionMismatch { expected: usize, actual: usize },
    /// Anderson mixing needs at least two stored iterates.
    InvalidAccelerationDepth { depth: usize },
    /// The Anderson normal equations could not be factorized.
    SingularMatrix { column: usize },
    /// The linear solver reported failure.
    LinearSolveFailure { iteration: usize },
    /// No convergence within the iteration cap.
    IterationLimitExceeded { iterations: usize, relative_error: f64 },
}

impl fmt::Display for PicardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration { reason } => write!(f, "invalid configuration: {reason}"),
            Self::InvalidDimensions { nrows, ncols } => {
                write!(f, "invalid dimensions: nrows={nrows}, ncols={ncols}")
            }
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "vector length {actual} does not match ndof {expected}")
            }
            Self::InvalidAccelerationDepth { depth } => write!(
                f,
                "Anderson acceleration needs at least two stored iterates, got {depth}"
            ),
            Self::SingularMatrix { column } => {
                write!(f, "singular Anderson system at column {column}")
            }
            Self::LinearSolveFailure { iteration } => {
                write!(f, "linear solve failed in iteration {iteration}")
            }
            Self::IterationLimitExceeded {
                iterations,
                relative_error,
            } => write!(
                f,
                "maximum of {iterations} Picard iterations exceeded (relative error {relative_error:e})"
            ),
        }
    }
}

impl std::error::Error for PicardError {}

impl From<LuError> for PicardError {
    fn from(err: LuError) -> Self {
        match err {
            LuError::Singular { column } => Self::SingularMatrix { column },
            LuError::NotSquare { nrows, ncols } => Self::InvalidDimensions { nrows, ncols },
        }
    }
}

/// Options controlling the Picard iteration.
#[derive(Debug, Clone)]
pub struct PicardOptions {
    /// Stop once the relative change between iterates drops below this.
    pub tol: f64,
    /// Maximum number of iterations.
    pub max_iters: usize,
    /// Number of stored iterates used by Anderson mixing.
    pub num_last_vectors_used: usize,
    /// Enable Anderson acceleration.
    pub anderson: bool,
    /// Anderson damping; 1.0 disables damping.
    pub anderson_beta: f64,
    /// Print an iteration table and the solve duration.
    pub verbose: bool,
    /// Forwarded to the linear solver.
    pub verbose_linear_solver: bool,
}

impl Default for PicardOptions {
    fn default() -> Self {
        Self {
            tol: 1e-4,
            max_iters: 50,
            num_last_vectors_used: 3,
            anderson: false,
            anderson_beta: 1.0,
            verbose: false,
            verbose_linear_solver: false,
        }
    }
}

impl PicardOptions {
    pub fn validate(&self) -> Result<(), PicardError> {
        let reason = if self.num_last_vectors_used < 1 {
            "number of last iterations used must be at least one"
        } else if !(self.tol.is_finite() && self.tol > 0.0) {
            "tolerance must be positive and finite"
        } else if self.max_iters == 0 {
            "maximum number of iterations must be at least one"
        } else if !self.anderson_beta.is_finite() {
            "Anderson beta must be finite"
        } else {
            return Ok(());
        };
        Err(PicardError::InvalidConfiguration { reason })
    }
}

/// Linearizes the nonlinear problem around an iterate.
///
/// Each Picard step solves `A(u_k) u_{k+1} = b(u_k)`: `assemble_jacobian`
/// writes `A(u_k)` and `assemble_residual` writes `b(u_k)`.
pub trait Assembler<S: Scalar> {
    fn assemble_jacobian(&mut self, x: &[S], jacobian: &mut MatrixValuesMut<'_, S>);
    fn assemble_residual(&mut self, x: &[S], residual: &mut [S]);

    /// Full reassembly; defaults to the two calls above.
    fn assemble(&mut self, x: &[S], jacobian: &mut MatrixValuesMut<'_, S>, residual: &mut [S]) {
        self.assemble_jacobian(x, jacobian);
        self.assemble_residual(x, residual);
    }

    /// `A` does not depend on the iterate, so its factorization can be kept.
    fn constant_jacobian(&self) -> bool {
        false
    }
}

/// Result of a converged solve.
#[derive(Debug, Clone)]
pub struct Solution<S> {
    pub vector: Vec<S>,
    pub stats: SolverStats,
}

struct AndersonState<S> {
    history: HistoryBuffer<S>,
    beta: f64,
}

/// Per-call state; rebuilt by every `solve`.
struct IterationState<S> {
    iteration: usize,
    current: Vec<S>,
    previous: Vec<S>,
    anderson: Option<AndersonState<S>>,
    jacobian_reusable: bool,
    accelerated_steps: usize,
}

impl<S: Scalar> IterationState<S> {
    fn new(guess: Vec<S>, options: &PicardOptions) -> Self {
        let anderson = options.anderson.then(|| {
            let mut history = HistoryBuffer::new(options.num_last_vectors_used);
            history.push(&guess);
            AndersonState {
                history,
                beta: options.anderson_beta,
            }
        });
        Self {
            iteration: 1,
            previous: guess.clone(),
            current: guess,
            anderson,
            jacobian_reusable: false,
            accelerated_steps: 0,
        }
    }

    fn next_scheme(&mut self, constant_jacobian: bool) -> FactorizationScheme {
        if !self.jacobian_reusable {
            self.jacobian_reusable = true;
            FactorizationScheme::FactorizeFromScratch
        } else if constant_jacobian {
            FactorizationScheme::ReuseFactorizationCompletely
        } else {
            FactorizationScheme::ReuseMatrixReorderingAndScaling
        }
    }

    /// Records the new iterate and mixes once the history is full.
    fn accelerate(&mut self) -> Result<bool, PicardError> {
        let Some(state) = self.anderson.as_mut() else {
            return Ok(false);
        };
        state.history.push(&self.current);
        if !state.history.is_full() {
            return Ok(false);
        }
        let coefficients = anderson::compute_coefficients(&state.history)?;
        anderson::mix(&state.history, &coefficients, state.beta, &mut self.current);
        self.accelerated_steps += 1;
        Ok(true)
    }

    /// Relative change from `previous` to `current`, and whether `previous`
    /// counts as the zero vector.
    ///
    /// From a zero vector the relative change is undefined: it is zero when
    /// the new iterate is zero as well and infinite otherwise.
    fn relative_error(&self) -> (f64, bool) {
        let prev_norm = l2_norm(&self.previous);
        let abs_error = l2_distance(&self.current, &self.previous);
        if prev_norm >= ZERO_NORM {
            (abs_error / prev_norm, false)
        } else if abs_error < ZERO_NORM {
            (0.0, true)
        } else {
            (f64::INFINITY, true)
        }
    }

    fn advance(&mut self) {
        self.iteration += 1;
        self.previous.copy_from_slice(&self.current);
    }
}

enum ObserverSlot<'a, S: Scalar> {
    External(&'a mut dyn Observer<S>),
    Local(StdoutReporter),
    None,
}

impl<'a, S: Scalar> ObserverSlot<'a, S> {
    fn new(observer: Option<&'a mut dyn Observer<S>>, verbose: bool) -> Self {
        match observer {
            Some(o) => Self::External(o),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    fn as_mut(&mut self) -> Option<&mut dyn Observer<S>> {
        match self {
            Self::External(o) => Some(*o),
            Self::Local(o) => Some(o),
            Self::None => None,
        }
    }
}

/// Picard fixed-point solver with optional Anderson acceleration.
///
/// Owns the assembled linear system and the linear solver; everything tied
/// to a single solve lives in that call.
pub struct PicardSolver<S: Scalar, L: LinearSolver<S>> {
    system: LinearSystem<S>,
    linear_solver: L,
    options: PicardOptions,
}

impl PicardSolver<f64, SparseQrSolver> {
    /// Real-valued solver backed by faer's sparse QR.
    pub fn with_sparse_qr(
        pattern: SparsityPattern,
        parallelism: Parallelism,
    ) -> Result<Self, PicardError> {
        Self::new(pattern, SparseQrSolver::new(parallelism))
    }
}

impl<S: Scalar, L: LinearSolver<S>> PicardSolver<S, L> {
    /// Create a solver for a square sparsity pattern.
    pub fn new(pattern: SparsityPattern, linear_solver: L) -> Result<Self, PicardError> {
        if pattern.nrows() == 0 || !pattern.is_square() {
            return Err(PicardError::InvalidDimensions {
                nrows: pattern.nrows(),
                ncols: pattern.ncols(),
            });
        }
        Ok(Self {
            system: LinearSystem::new(pattern),
            linear_solver,
            options: PicardOptions::default(),
        })
    }

    pub fn with_options(mut self, options: PicardOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ndof(&self) -> usize {
        self.system.ndof()
    }

    pub fn options(&self) -> &PicardOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut PicardOptions {
        &mut self.options
    }

    pub fn set_tol(&mut self, tol: f64) {
        self.options.tol = tol;
    }

    pub fn set_max_iters(&mut self, max_iters: usize) {
        self.options.max_iters = max_iters;
    }

    pub fn set_num_last_vectors_used(&mut self, num: usize) {
        self.options.num_last_vectors_used = num;
    }

    pub fn set_anderson_beta(&mut self, beta: f64) {
        self.options.anderson_beta = beta;
    }

    pub fn use_anderson_acceleration(&mut self, on: bool) {
        self.options.anderson = on;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.options.verbose = verbose;
    }

    pub fn set_verbose_output_linear_solver(&mut self, verbose: bool) {
        self.options.verbose_linear_solver = verbose;
    }

    pub fn linear_solver(&self) -> &L {
        &self.linear_solver
    }

    pub fn linear_solver_mut(&mut self) -> &mut L {
        &mut self.linear_solver
    }

    /// System assembled in the most recent iteration.
    pub fn system(&self) -> &LinearSystem<S> {
        &self.system
    }

    /// Run the Picard iteration from `initial_guess` (zero when `None`).
    pub fn solve(
        &mut self,
        assembler: &mut impl Assembler<S>,
        initial_guess: Option<&[S]>,
        observer: Option<&mut dyn Observer<S>>,
    ) -> Result<Solution<S>, PicardError> {
        self.options.validate()?;
        let ndof = self.ndof();
        let guess = match initial_guess {
            Some(x) if x.len() != ndof => {
                return Err(PicardError::DimensionMismatch {
                    expected: ndof,
                    actual: x.len(),
                });
            }
            Some(x) => x.to_vec(),
            None => vec![S::zero(); ndof],
        };

        let start = Instant::now();
        let mut observer = ObserverSlot::new(observer, self.options.verbose);
        let mut state = IterationState::new(guess, &self.options);
        self.linear_solver
            .set_verbose_output(self.options.verbose_linear_solver);
        if let Some(observer) = observer.as_mut() {
            observer.on_initialization(ndof);
        }

        loop {
            let it = state.iteration;
            if let Some(observer) = observer.as_mut() {
                observer.on_step_begin(it);
            }

            let scheme = state.next_scheme(assembler.constant_jacobian());
            if scheme == FactorizationScheme::ReuseFactorizationCompletely {
                log::debug!("Picard: reusing jacobian.");
                assembler.assemble_residual(&state.previous, self.system.rhs_mut());
            } else {
                let (mut jacobian, residual) = self.system.parts_mut();
                assembler.assemble(&state.previous, &mut jacobian, residual);
            }
            self.linear_solver.set_factorization_scheme(scheme);
            if let Some(observer) = observer.as_mut() {
                observer.on_linearized(it, &self.system);
            }

            if !self.linear_solver.solve(&self.system) {
                return Err(self.fail(
                    &mut observer,
                    start,
                    SolveStatus::LinearSolveFailure,
                    PicardError::LinearSolveFailure { iteration: it },
                ));
            }
            let solution = self.linear_solver.solution();
            if solution.len() != ndof {
                return Err(self.fail(
                    &mut observer,
                    start,
                    SolveStatus::LinearSolveFailure,
                    PicardError::DimensionMismatch {
                        expected: ndof,
                        actual: solution.len(),
                    },
                ));
            }
            state.current.copy_from_slice(solution);

            let accelerated = match state.accelerate() {
                Ok(accelerated) => accelerated,
                Err(err) => {
                    return Err(self.fail(&mut observer, start, SolveStatus::NumericalFailure, err));
                }
            };

            let (relative_error, zero_start) = state.relative_error();
            let report = IterationReport {
                iteration: it,
                ndof,
                relative_error,
                zero_start,
                accelerated,
                scheme,
            };
            log::info!("{report}");
            if let Some(observer) = observer.as_mut() {
                observer.on_iteration(&report);
            }

            if relative_error < self.options.tol {
                let elapsed = self.finish(&mut observer, start, SolveStatus::Converged);
                let stats = SolverStats {
                    iterations: it,
                    relative_error,
                    accelerated_steps: state.accelerated_steps,
                    elapsed,
                };
                return Ok(Solution {
                    vector: state.current,
                    stats,
                });
            }

            if it >= self.options.max_iters {
                return Err(self.fail(
                    &mut observer,
                    start,
                    SolveStatus::IterationLimit,
                    PicardError::IterationLimitExceeded {
                        iterations: it,
                        relative_error,
                    },
                ));
            }

            if let Some(observer) = observer.as_mut() {
                observer.on_step_end(it);
            }
            state.advance();
        }
    }

    fn finish(
        &self,
        observer: &mut ObserverSlot<'_, S>,
        start: Instant,
        status: SolveStatus,
    ) -> std::time::Duration {
        let elapsed = start.elapsed();
        if let Some(observer) = observer.as_mut() {
            observer.on_finish(status);
        }
        if self.options.verbose {
            emit_line(&format!("Picard: solution duration: {}", format_duration(elapsed)));
        } else {
            log::debug!("Picard: solution duration: {}", format_duration(elapsed));
        }
        elapsed
    }

    fn fail(
        &self,
        observer: &mut ObserverSlot<'_, S>,
        start: Instant,
        status: SolveStatus,
        err: PicardError,
    ) -> PicardError {
        self.finish(observer, start, status);
        log::warn!("Picard: {err}");
        err
    }
}
