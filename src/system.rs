use crate::pattern::SparsityPattern;
use crate::scalar::Scalar;

/// Matrix and right-hand side of one linearization, `A(u_k) u = b(u_k)`.
///
/// The matrix values follow the column-major order of the pattern.
#[derive(Debug, Clone)]
pub struct LinearSystem<S> {
    pattern: SparsityPattern,
    values: Vec<S>,
    rhs: Vec<S>,
}

impl<S: Scalar> LinearSystem<S> {
    /// Zero-filled system on a square pattern.
    pub fn new(pattern: SparsityPattern) -> Self {
        debug_assert!(pattern.is_square());
        let values = vec![S::zero(); pattern.nnz()];
        let rhs = vec![S::zero(); pattern.nrows()];
        Self {
            pattern,
            values,
            rhs,
        }
    }

    pub fn pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    /// Number of degrees of freedom.
    pub fn ndof(&self) -> usize {
        self.pattern.ncols()
    }

    /// Stored matrix values, column by column.
    pub fn values(&self) -> &[S] {
        &self.values
    }

    pub fn rhs(&self) -> &[S] {
        &self.rhs
    }

    pub fn rhs_mut(&mut self) -> &mut [S] {
        &mut self.rhs
    }

    pub fn matrix_mut(&mut self) -> MatrixValuesMut<'_, S> {
        MatrixValuesMut::new(&mut self.values, &self.pattern)
    }

    /// Matrix view and right-hand side at once, for full assembly.
    pub fn parts_mut(&mut self) -> (MatrixValuesMut<'_, S>, &mut [S]) {
        (
            MatrixValuesMut::new(&mut self.values, &self.pattern),
            &mut self.rhs,
        )
    }

    /// Matrix entry, zero when not stored.
    pub fn get(&self, row: usize, col: usize) -> S {
        self.pattern
            .position(row, col)
            .map_or(S::zero(), |pos| self.values[pos])
    }

    /// `out = A x`.
    pub fn apply(&self, x: &[S], out: &mut [S]) {
        out.fill(S::zero());
        for col in 0..self.pattern.ncols() {
            let xc = x[col];
            for idx in self.pattern.col_range(col) {
                out[self.pattern.row_indices()[idx]] += self.values[idx] * xc;
            }
        }
    }

    /// `b - A x`.
    pub fn residual(&self, x: &[S]) -> Vec<S> {
        let mut ax = vec![S::zero(); self.ndof()];
        self.apply(x, &mut ax);
        self.rhs.iter().zip(&ax).map(|(&b, &v)| b - v).collect()
    }
}

/// Mutable view of matrix values matching the sparsity pattern.
pub struct MatrixValuesMut<'a, S> {
    values: &'a mut [S],
    pattern: &'a SparsityPattern,
}

impl<'a, S: Scalar> MatrixValuesMut<'a, S> {
    pub(crate) fn new(values: &'a mut [S], pattern: &'a SparsityPattern) -> Self {
        Self { values, pattern }
    }

    pub fn nrows(&self) -> usize {
        self.pattern.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.pattern.ncols()
    }

    /// Sorted row indices for the given column.
    pub fn row_indices_of_col(&self, col: usize) -> &[usize] {
        self.pattern.row_indices_of_col(col)
    }

    /// Mutable values for the given column, aligned with row_indices_of_col.
    pub fn values_of_col_mut(&mut self, col: usize) -> &mut [S] {
        let range = self.pattern.col_range(col);
        &mut self.values[range]
    }

    /// Mutable entry at `(row, col)` if it is part of the pattern.
    pub fn entry_mut(&mut self, row: usize, col: usize) -> Option<&mut S> {
        let pos = self.pattern.position(row, col)?;
        Some(&mut self.values[pos])
    }

    /// Sets a stored entry.
    ///
    /// # Panics
    /// If `(row, col)` is not in the pattern.
    pub fn set(&mut self, row: usize, col: usize, value: S) {
        match self.entry_mut(row, col) {
            Some(entry) => *entry = value,
            None => panic!("({row}, {col}) is not in the sparsity pattern"),
        }
    }

    pub fn fill_zero(&mut self) {
        self.values.fill(S::zero());
    }
}
