use core::fmt;
use std::time::Duration;

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

use crate::linear::FactorizationScheme;
use crate::scalar::Scalar;
use crate::system::LinearSystem;

/// How a solve call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    IterationLimit,
    LinearSolveFailure,
    NumericalFailure,
}

/// Summary of a converged solve.
#[derive(Debug, Clone)]
pub struct SolverStats {
    pub iterations: usize,
    pub relative_error: f64,
    /// Iterations in which the iterate was replaced by an Anderson mix.
    pub accelerated_steps: usize,
    pub elapsed: Duration,
}

/// Progress of one Picard iteration.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    pub ndof: usize,
    /// Change relative to the previous iterate. After a zero vector this is
    /// zero if the new iterate is zero too, infinite otherwise.
    pub relative_error: f64,
    /// The previous iterate had (numerically) zero norm.
    pub zero_start: bool,
    pub accelerated: bool,
    pub scheme: FactorizationScheme,
}

impl fmt::Display for IterationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.zero_start {
            write!(
                f,
                "Picard: iteration {}, nDOFs {}, starting from zero vector.",
                self.iteration, self.ndof
            )
        } else {
            write!(
                f,
                "Picard: iteration {}, nDOFs {}, relative error {}%",
                self.iteration,
                self.ndof,
                self.relative_error * 100.0
            )
        }
    }
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.3} us", secs * 1e6)
    } else {
        format!("{:.0} ns", secs * 1e9)
    }
}

/// Receives lifecycle notifications from the Picard driver.
///
/// Observers cannot influence the iteration.
pub trait Observer<S: Scalar> {
    fn on_initialization(&mut self, _ndof: usize) {}
    /// Before the system is linearized.
    fn on_step_begin(&mut self, _iteration: usize) {}
    /// After assembly, before the linear solve.
    fn on_linearized(&mut self, _iteration: usize, _system: &LinearSystem<S>) {}
    fn on_iteration(&mut self, report: &IterationReport);
    /// After a full step that did not terminate the solve.
    fn on_step_end(&mut self, _iteration: usize) {}
    fn on_finish(&mut self, _status: SolveStatus) {}
}

/// Collects iteration reports and prints them as a table when the solve ends.
pub struct StdoutReporter {
    rows: Vec<IterationReport>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn scheme_label(scheme: FactorizationScheme) -> &'static str {
    match scheme {
        FactorizationScheme::FactorizeFromScratch => "scratch",
        FactorizationScheme::ReuseMatrixReorderingAndScaling => "reorder",
        FactorizationScheme::ReuseFactorizationCompletely => "reuse",
    }
}

impl<S: Scalar> Observer<S> for StdoutReporter {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.rows.push(report.clone());
    }

    fn on_finish(&mut self, status: SolveStatus) {
        if self.rows.is_empty() {
            return;
        }
        if !log::log_enabled!(log::Level::Info) {
            println!();
        }
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("iter").set_alignment(CellAlignment::Right),
            Cell::new("ndof").set_alignment(CellAlignment::Right),
            Cell::new("rel. error").set_alignment(CellAlignment::Right),
            Cell::new("factorization"),
            Cell::new("anderson"),
        ]);
        for row in &self.rows {
            let error = if row.zero_start {
                "zero start".to_string()
            } else {
                format!("{:.3e}", row.relative_error)
            };
            table.add_row(vec![
                Cell::new(row.iteration).set_alignment(CellAlignment::Right),
                Cell::new(row.ndof).set_alignment(CellAlignment::Right),
                Cell::new(error).set_alignment(CellAlignment::Right),
                Cell::new(scheme_label(row.scheme)),
                Cell::new(if row.accelerated { "yes" } else { "no" }),
            ]);
        }

        for line in table.to_string().lines() {
            emit_line(line);
        }
        emit_line(&format!("status: {status:?}"));
        self.rows.clear();
    }
}
