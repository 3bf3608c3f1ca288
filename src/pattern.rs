use core::fmt;
use core::ops::Range;

use faer_core::sparse::SymbolicSparseColMatRef;

/// Column-compressed sparsity pattern of the linearized system matrix.
///
/// Indices are zero-based; each column's row indices must be strictly
/// increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsityPattern {
    nrows: usize,
    ncols: usize,
    col_ptrs: Vec<usize>,
    row_indices: Vec<usize>,
}

/// Validation errors for a SparsityPattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// col_ptrs length is not ncols + 1.
    ColPtrLen { expected: usize, actual: usize },
    /// col_ptrs[0] is not 0.
    ColPtrStart { value: usize },
    /// col_ptrs decreases between two columns.
    ColPtrNotMonotonic { col: usize, prev: usize, next: usize },
    /// col_ptrs[ncols] does not match row_indices length.
    ColPtrEnd { last: usize, row_indices_len: usize },
    /// A row index is >= nrows.
    RowIndexOutOfBounds { col: usize, row: usize, nrows: usize },
    /// Row indices in a column are unsorted or repeated.
    RowIndexNotSorted { col: usize, prev: usize, next: usize },
    /// An entry given to `from_entries` lies outside the matrix.
    EntryOutOfBounds { row: usize, col: usize },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColPtrLen { expected, actual } => {
                write!(f, "col_ptrs has length {actual}, expected {expected}")
            }
            Self::ColPtrStart { value } => write!(f, "col_ptrs must start at 0, got {value}"),
            Self::ColPtrNotMonotonic { col, prev, next } => {
                write!(f, "col_ptrs decreases at col {col}: {prev} > {next}")
            }
            Self::ColPtrEnd {
                last,
                row_indices_len,
            } => write!(
                f,
                "col_ptrs ends at {last} but there are {row_indices_len} row indices"
            ),
            Self::RowIndexOutOfBounds { col, row, nrows } => {
                write!(f, "row index {row} in col {col} is out of bounds (nrows {nrows})")
            }
            Self::RowIndexNotSorted { col, prev, next } => {
                write!(f, "row indices of col {col} not strictly increasing: {prev} then {next}")
            }
            Self::EntryOutOfBounds { row, col } => {
                write!(f, "entry ({row}, {col}) is outside the matrix")
            }
        }
    }
}

impl std::error::Error for PatternError {}

impl SparsityPattern {
    /// Creates a validated CSC pattern.
    ///
    /// Requirements:
    /// - `col_ptrs.len() == ncols + 1`, starting at `0` and non-decreasing
    /// - `col_ptrs[ncols] == row_indices.len()`
    /// - row indices strictly increasing and `< nrows` within each column
    pub fn new(
        nrows: usize,
        ncols: usize,
        col_ptrs: Vec<usize>,
        row_indices: Vec<usize>,
    ) -> Result<Self, PatternError> {
        if col_ptrs.len() != ncols + 1 {
            return Err(PatternError::ColPtrLen {
                expected: ncols + 1,
                actual: col_ptrs.len(),
            });
        }
        if col_ptrs[0] != 0 {
            return Err(PatternError::ColPtrStart { value: col_ptrs[0] });
        }
        for (col, w) in col_ptrs.windows(2).enumerate() {
            if w[0] > w[1] {
                return Err(PatternError::ColPtrNotMonotonic {
                    col,
                    prev: w[0],
                    next: w[1],
                });
            }
        }
        if col_ptrs[ncols] != row_indices.len() {
            return Err(PatternError::ColPtrEnd {
                last: col_ptrs[ncols],
                row_indices_len: row_indices.len(),
            });
        }

        for col in 0..ncols {
            let rows = &row_indices[col_ptrs[col]..col_ptrs[col + 1]];
            for (pos, &row) in rows.iter().enumerate() {
                if row >= nrows {
                    return Err(PatternError::RowIndexOutOfBounds { col, row, nrows });
                }
                if pos > 0 && rows[pos - 1] >= row {
                    return Err(PatternError::RowIndexNotSorted {
                        col,
                        prev: rows[pos - 1],
                        next: row,
                    });
                }
            }
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptrs,
            row_indices,
        })
    }

    /// Builds an `n x n` pattern from `(row, col)` pairs in any order.
    /// Duplicates are merged.
    pub fn from_entries(n: usize, entries: &[(usize, usize)]) -> Result<Self, PatternError> {
        let mut cols: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(row, col) in entries {
            if row >= n || col >= n {
                return Err(PatternError::EntryOutOfBounds { row, col });
            }
            cols[col].push(row);
        }
        let mut col_ptrs = Vec::with_capacity(n + 1);
        let mut row_indices = Vec::with_capacity(entries.len());
        col_ptrs.push(0);
        for mut rows in cols {
            rows.sort_unstable();
            rows.dedup();
            row_indices.extend_from_slice(&rows);
            col_ptrs.push(row_indices.len());
        }
        Self::new(n, n, col_ptrs, row_indices)
    }

    /// Diagonal `n x n` pattern.
    pub fn diagonal(n: usize) -> Self {
        Self {
            nrows: n,
            ncols: n,
            col_ptrs: (0..=n).collect(),
            row_indices: (0..n).collect(),
        }
    }

    /// Tridiagonal `n x n` pattern, typical of 1D discretizations.
    pub fn tridiagonal(n: usize) -> Self {
        let mut col_ptrs = Vec::with_capacity(n + 1);
        let mut row_indices = Vec::with_capacity(3 * n);
        col_ptrs.push(0);
        for col in 0..n {
            let first = col.saturating_sub(1);
            let last = (col + 1).min(n.saturating_sub(1));
            row_indices.extend(first..=last);
            col_ptrs.push(row_indices.len());
        }
        Self {
            nrows: n,
            ncols: n,
            col_ptrs,
            row_indices,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.row_indices.len()
    }

    pub fn col_ptrs(&self) -> &[usize] {
        &self.col_ptrs
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    /// Index range in row_indices for the given column.
    pub fn col_range(&self, col: usize) -> Range<usize> {
        self.col_ptrs[col]..self.col_ptrs[col + 1]
    }

    pub fn row_indices_of_col(&self, col: usize) -> &[usize] {
        &self.row_indices[self.col_range(col)]
    }

    /// Position of `(row, col)` in the value array, if stored.
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        if col >= self.ncols {
            return None;
        }
        let range = self.col_range(col);
        let start = range.start;
        self.row_indices[range]
            .binary_search(&row)
            .ok()
            .map(|offset| start + offset)
    }

    pub(crate) fn as_symbolic(&self) -> SymbolicSparseColMatRef<'_, usize> {
        // Invariants were checked in the constructors.
        unsafe {
            SymbolicSparseColMatRef::new_unchecked(
                self.nrows,
                self.ncols,
                &self.col_ptrs,
                None,
                &self.row_indices,
            )
        }
    }
}
