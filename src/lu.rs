use core::fmt;

use faer_core::Mat;

/// Dense LU factorization failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LuError {
    /// The matrix is not square.
    NotSquare { nrows: usize, ncols: usize },
    /// No usable pivot exists in this column.
    Singular { column: usize },
}

impl fmt::Display for LuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSquare { nrows, ncols } => {
                write!(f, "LU needs a square matrix, got {nrows}x{ncols}")
            }
            Self::Singular { column } => write!(f, "singular matrix at column {column}"),
        }
    }
}

impl std::error::Error for LuError {}

/// Pivots at or below `PIVOT_TOL * max|A|` are treated as zero.
const PIVOT_TOL: f64 = f64::EPSILON;

/// LU factorization with partial pivoting, `P A = L U`.
///
/// `L` (unit diagonal, not stored) and `U` share one matrix. Meant for the
/// small dense systems of Anderson mixing, not for large problems.
#[derive(Debug, Clone)]
pub struct LuDecomposition {
    lu: Mat<f64>,
    perm: Vec<usize>,
    sign: f64,
}

impl LuDecomposition {
    /// Factorizes `a` in place.
    pub fn new(mut a: Mat<f64>) -> Result<Self, LuError> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(LuError::NotSquare {
                nrows: n,
                ncols: a.ncols(),
            });
        }

        let mut scale = 0.0f64;
        for j in 0..n {
            for i in 0..n {
                scale = scale.max(a.read(i, j).abs());
            }
        }
        let threshold = PIVOT_TOL * scale;

        let mut perm: Vec<usize> = (0..n).collect();
        let mut sign = 1.0;

        for k in 0..n {
            let mut pivot_row = k;
            let mut best = a.read(k, k).abs();
            for i in k + 1..n {
                let v = a.read(i, k).abs();
                if v > best {
                    best = v;
                    pivot_row = i;
                }
            }
            if scale == 0.0 || best <= threshold {
                return Err(LuError::Singular { column: k });
            }

            if pivot_row != k {
                for j in 0..n {
                    let tmp = a.read(k, j);
                    a.write(k, j, a.read(pivot_row, j));
                    a.write(pivot_row, j, tmp);
                }
                perm.swap(k, pivot_row);
                sign = -sign;
            }

            let pivot = a.read(k, k);
            for i in k + 1..n {
                let factor = a.read(i, k) / pivot;
                a.write(i, k, factor);
                if factor == 0.0 {
                    continue;
                }
                for j in k + 1..n {
                    a.write(i, j, a.read(i, j) - factor * a.read(k, j));
                }
            }
        }

        Ok(Self { lu: a, perm, sign })
    }

    pub fn dim(&self) -> usize {
        self.perm.len()
    }

    /// Row permutation: row `i` of `L U` is row `permutation()[i]` of `A`.
    pub fn permutation(&self) -> &[usize] {
        &self.perm
    }

    /// +1 or -1 depending on the parity of the row swaps.
    pub fn sign(&self) -> f64 {
        self.sign
    }

    pub fn determinant(&self) -> f64 {
        let mut det = self.sign;
        for i in 0..self.dim() {
            det *= self.lu.read(i, i);
        }
        det
    }

    /// Unit lower-triangular factor.
    pub fn lower(&self) -> Mat<f64> {
        let n = self.dim();
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else if i > j {
                self.lu.read(i, j)
            } else {
                0.0
            }
        })
    }

    /// Upper-triangular factor.
    pub fn upper(&self) -> Mat<f64> {
        let n = self.dim();
        Mat::from_fn(n, n, |i, j| if i <= j { self.lu.read(i, j) } else { 0.0 })
    }

    /// Overwrites `rhs` with the solution of `A x = rhs`.
    pub fn solve_in_place(&self, rhs: &mut [f64]) {
        let n = self.dim();
        assert_eq!(rhs.len(), n, "rhs length does not match LU dimension");

        let permuted: Vec<f64> = self.perm.iter().map(|&p| rhs[p]).collect();
        rhs.copy_from_slice(&permuted);

        for i in 1..n {
            let mut sum = rhs[i];
            for j in 0..i {
                sum -= self.lu.read(i, j) * rhs[j];
            }
            rhs[i] = sum;
        }
        for i in (0..n).rev() {
            let mut sum = rhs[i];
            for j in i + 1..n {
                sum -= self.lu.read(i, j) * rhs[j];
            }
            rhs[i] = sum / self.lu.read(i, i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat_from_rows(rows: &[&[f64]]) -> Mat<f64> {
        Mat::from_fn(rows.len(), rows[0].len(), |i, j| rows[i][j])
    }

    #[test]
    fn solves_with_row_swap() {
        // Zero leading entry forces a pivot.
        let a = mat_from_rows(&[&[0.0, 2.0, 1.0], &[1.0, 1.0, 0.0], &[2.0, 0.0, 3.0]]);
        let lu = LuDecomposition::new(a).unwrap();
        let mut x = [5.0, 3.0, 13.0];
        lu.solve_in_place(&mut x);
        // Exact solution is [2, 1, 3].
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
        assert!((x[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn factors_reproduce_permuted_matrix() {
        let rows: [&[f64]; 3] = [&[1.0, 4.0, -2.0], &[3.0, -1.0, 5.0], &[-6.0, 2.0, 1.0]];
        let a = mat_from_rows(&rows);
        let lu = LuDecomposition::new(a).unwrap();
        let l = lu.lower();
        let u = lu.upper();
        for i in 0..3 {
            for j in 0..3 {
                let mut v = 0.0;
                for k in 0..3 {
                    v += l.read(i, k) * u.read(k, j);
                }
                let expected = rows[lu.permutation()[i]][j];
                assert!((v - expected).abs() < 1e-12, "({i},{j}): {v} vs {expected}");
            }
        }
        // det = 1*(-1*1 - 5*2) - 4*(3*1 + 30) + (-2)*(6 - 6) = -11 - 132 = -143
        assert!((lu.determinant() + 143.0).abs() < 1e-9);
        assert!(lu.sign() == 1.0 || lu.sign() == -1.0);
    }

    #[test]
    fn detects_singular_matrix() {
        let a = mat_from_rows(&[&[1.0, 2.0], &[2.0, 4.0]]);
        assert_eq!(
            LuDecomposition::new(a).unwrap_err(),
            LuError::Singular { column: 1 }
        );

        let zero = Mat::<f64>::zeros(2, 2);
        assert_eq!(
            LuDecomposition::new(zero).unwrap_err(),
            LuError::Singular { column: 0 }
        );
    }

    #[test]
    fn rejects_rectangular_input() {
        let a = Mat::<f64>::zeros(2, 3);
        assert!(matches!(
            LuDecomposition::new(a),
            Err(LuError::NotSquare { nrows: 2, ncols: 3 })
        ));
    }
}
