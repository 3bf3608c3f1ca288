//! Anderson mixing coefficients for the Picard iteration.
//!
//! With `m` stored iterates `h_0..h_{m-1}` and consecutive differences
//! `r_i = h_{i+1} - h_i`, the coefficients minimize
//! `|| sum_i c_i r_i ||` subject to `sum_i c_i = 1`. Eliminating the last
//! coefficient gives the `(m-2)x(m-2)` normal equations
//!
//! ```text
//! A[i][j] = <r_k - r_i, r_k - r_j>,   b[i] = <r_k - r_i, r_k>,   k = m - 2
//! ```
//!
//! The system is assembled and solved in real arithmetic: inner products are
//! `Re(sum conj(x) y)`. For real problems this is exact. For complex problems
//! it is an approximation: the coefficients are restricted to real values.

use faer_core::Mat;

use crate::history::HistoryBuffer;
use crate::lu::LuDecomposition;
use crate::scalar::{real_dot, Scalar};
use crate::solver::PicardError;

/// Mixing coefficients for the iterates in `history`.
///
/// Returns `history.len() - 1` values summing to one. A two-vector history
/// yields `[1.0]` without solving anything.
///
/// When all residual differences are exactly zero the normal matrix is zero
/// and every affine combination is equally good. Instead of failing with
/// `SingularMatrix`, the coefficients `[0, ..., 0, 1]` select the newest
/// iterate. Any other singular system is an error.
pub fn compute_coefficients<S: Scalar>(history: &HistoryBuffer<S>) -> Result<Vec<f64>, PicardError> {
    let m = history.len();
    if m <= 1 {
        return Err(PicardError::InvalidAccelerationDepth { depth: m });
    }
    if m == 2 {
        return Ok(vec![1.0]);
    }

    let k = m - 2;
    let ndof = history.get(0).len();

    let residuals: Vec<Vec<S>> = (0..=k)
        .map(|i| {
            let (prev, next) = (history.get(i), history.get(i + 1));
            next.iter().zip(prev).map(|(&a, &b)| a - b).collect()
        })
        .collect();
    let last = &residuals[k];
    let deltas: Vec<Vec<S>> = residuals[..k]
        .iter()
        .map(|r| last.iter().zip(r).map(|(&a, &b)| a - b).collect())
        .collect();

    // All deltas vanish: every affine combination has the same residual,
    // keep the newest iterate.
    if deltas.iter().all(|d| d.iter().all(|&v| v == S::zero())) {
        let mut coeffs = vec![0.0; k + 1];
        coeffs[k] = 1.0;
        return Ok(coeffs);
    }

    let mut a = Mat::<f64>::zeros(k, k);
    let mut rhs = vec![0.0; k];
    for i in 0..k {
        rhs[i] = real_dot(&deltas[i], last);
        for j in 0..=i {
            let v = real_dot(&deltas[i], &deltas[j]);
            a.write(i, j, v);
            a.write(j, i, v);
        }
    }

    let lu = LuDecomposition::new(a)?;
    lu.solve_in_place(&mut rhs);
    log::trace!("anderson: m={m}, ndof={ndof}, solved coefficients {rhs:?}");

    let sum: f64 = rhs.iter().sum();
    rhs.push(1.0 - sum);
    Ok(rhs)
}

/// Writes the mixed iterate into `out`.
///
/// `out[i] = sum_{j=1}^{m-1} c[j-1] * (h_j[i] - (1 - beta) * (h_j[i] - h_{j-1}[i]))`.
/// With `beta == 1` this is the plain affine combination of `h_1..h_{m-1}`.
pub fn mix<S: Scalar>(history: &HistoryBuffer<S>, coefficients: &[f64], beta: f64, out: &mut [S]) {
    debug_assert_eq!(coefficients.len() + 1, history.len());
    let damping = S::from_real(1.0 - beta);
    out.fill(S::zero());
    for j in 1..history.len() {
        let c = S::from_real(coefficients[j - 1]);
        let (prev, cur) = (history.get(j - 1), history.get(j));
        for ((o, &x), &x_prev) in out.iter_mut().zip(cur).zip(prev) {
            *o += c * x - damping * c * (x - x_prev);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn history_of(vectors: &[&[f64]]) -> HistoryBuffer<f64> {
        let mut history = HistoryBuffer::new(vectors.len());
        for v in vectors {
            history.push(v);
        }
        history
    }

    #[test]
    fn rejects_short_history() {
        let history = history_of(&[&[1.0]]);
        assert!(matches!(
            compute_coefficients(&history),
            Err(PicardError::InvalidAccelerationDepth { depth: 1 })
        ));
        let empty = HistoryBuffer::<f64>::new(3);
        assert!(matches!(
            compute_coefficients(&empty),
            Err(PicardError::InvalidAccelerationDepth { depth: 0 })
        ));
    }

    #[test]
    fn depth_two_is_trivial() {
        let history = history_of(&[&[0.0, 0.0], &[3.0, -1.0]]);
        assert_eq!(compute_coefficients(&history).unwrap(), vec![1.0]);
    }

    #[test]
    fn depth_three_matches_hand_computation() {
        // r0 = [2, 0], r1 = [1, 1], d0 = r1 - r0 = [-1, 1].
        // A = |d0|^2 = 2, b = <d0, r1> = 0  ->  x = 0, coefficients [0, 1].
        let history = history_of(&[&[0.0, 0.0], &[2.0, 0.0], &[3.0, 1.0]]);
        let c = compute_coefficients(&history).unwrap();
        assert_eq!(c.len(), 2);
        assert!(c[0].abs() < 1e-14);
        assert!((c[1] - 1.0).abs() < 1e-14);

        // Linear contraction with rate 1/2: r1 = r0 / 2 gives x = -1.
        let history = history_of(&[&[0.0], &[1.0], &[1.5]]);
        let c = compute_coefficients(&history).unwrap();
        assert!((c[0] + 1.0).abs() < 1e-14);
        assert!((c[1] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn coefficients_sum_to_one() {
        let history = history_of(&[
            &[0.0, 0.0, 1.0],
            &[0.5, 1.5, 0.2],
            &[0.75, 1.875, -0.4],
            &[0.9, 1.95, 0.3],
            &[1.1, 2.3, 0.1],
        ]);
        let c = compute_coefficients(&history).unwrap();
        assert_eq!(c.len(), 4);
        let sum: f64 = c.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "sum = {sum}");
    }

    #[test]
    fn stationary_differences_keep_newest_iterate() {
        let history = history_of(&[&[0.5, 1.0], &[0.75, 1.5], &[1.0, 2.0]]);
        assert_eq!(compute_coefficients(&history).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn collinear_differences_are_singular() {
        // r0 = 4r, r1 = 2r, r2 = r: the 2x2 normal matrix has rank one.
        let history = history_of(&[&[0.0, 0.0], &[4.0, 8.0], &[6.0, 12.0], &[7.0, 14.0]]);
        assert!(matches!(
            compute_coefficients(&history),
            Err(PicardError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn complex_history_uses_real_reduction() {
        let z = |re: f64, im: f64| Complex64::new(re, im);
        let mut history = HistoryBuffer::new(3);
        history.push(&[z(0.0, 0.0)]);
        history.push(&[z(1.0, 1.0)]);
        history.push(&[z(1.5, 1.5)]);
        let c = compute_coefficients(&history).unwrap();
        assert!((c[0] + 1.0).abs() < 1e-14);
        assert!((c[1] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn mix_with_full_damping_is_affine_combination() {
        let history = history_of(&[&[0.0], &[1.0], &[1.5]]);
        let mut out = [0.0];
        mix(&history, &[-1.0, 2.0], 1.0, &mut out);
        assert!((out[0] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn mix_with_partial_damping() {
        // beta = 0.5: sum c_j (h_j - 0.5 (h_j - h_{j-1}))
        // = -1 * (1 - 0.5) + 2 * (1.5 - 0.25) = 2.0
        let history = history_of(&[&[0.0], &[1.0], &[1.5]]);
        let mut out = [0.0];
        mix(&history, &[-1.0, 2.0], 0.5, &mut out);
        assert!((out[0] - 2.0).abs() < 1e-14);
    }
}
