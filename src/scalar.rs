use core::fmt::Debug;
use core::ops::{AddAssign, SubAssign};

use num_complex::ComplexFloat;

/// Element type of solution vectors, matrices and right-hand sides.
///
/// Any `ComplexFloat` with `f64` as its real type, i.e. `f64` and
/// `Complex64`.
pub trait Scalar:
    ComplexFloat<Real = f64> + From<f64> + AddAssign + SubAssign + Debug + 'static
{
    #[inline]
    fn from_real(value: f64) -> Self {
        <Self as From<f64>>::from(value)
    }
}

impl<T> Scalar for T where
    T: ComplexFloat<Real = f64> + From<f64> + AddAssign + SubAssign + Debug + 'static
{
}

/// `sqrt(sum |x_i * x_i|)`.
///
/// The product is taken without conjugation. For complex entries
/// `|x * x| == |x|^2`, so this agrees with the Euclidean norm up to rounding,
/// but it is not computed as a Hermitian inner product.
pub(crate) fn l2_norm<S: Scalar>(x: &[S]) -> f64 {
    let mut sum = 0.0;
    for &v in x {
        sum += (v * v).abs();
    }
    sum.sqrt()
}

/// `l2_norm(a - b)` without a temporary vector.
pub(crate) fn l2_distance<S: Scalar>(a: &[S], b: &[S]) -> f64 {
    let mut sum = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let d = x - y;
        sum += (d * d).abs();
    }
    sum.sqrt()
}

/// `Re(sum conj(a_i) * b_i)`.
pub(crate) fn real_dot<S: Scalar>(a: &[S], b: &[S]) -> f64 {
    let mut sum = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        sum += (x.conj() * y).re();
    }
    sum
}
