use ndarray::{Array, Array1, Array2, ArrayView1, Axis};
use thiserror::Error;

/// A comprehensive error type for all operations within the basis module.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BasisError {
    #[error("Spline degree must be at least 1, but was {0}.")]
    InvalidDegree(usize),

    #[error("Data range is invalid: start ({0}) must be strictly less than end ({1}).")]
    InvalidRange(f64, f64),

    #[error("An I-spline of degree {degree} needs more than {degree} basis functions, but {num_basis} were requested.")]
    TooFewBasisFunctions { num_basis: usize, degree: usize },
}

/// Builds a clamped knot vector with uniformly spaced internal knots.
///
/// The boundary knots are repeated `degree + 1` times so the resulting basis
/// interpolates the endpoints of `data_range`.
pub fn clamped_uniform_knots(
    data_range: (f64, f64),
    num_internal_knots: usize,
    degree: usize,
) -> Result<Array1<f64>, BasisError> {
    if degree < 1 {
        return Err(BasisError::InvalidDegree(degree));
    }
    let (min_val, max_val) = data_range;
    if min_val.is_nan() || max_val.is_nan() || min_val >= max_val {
        return Err(BasisError::InvalidRange(min_val, max_val));
    }

    let h = (max_val - min_val) / (num_internal_knots as f64 + 1.0);
    let internal_knots = (1..=num_internal_knots).map(|i| min_val + i as f64 * h);

    // [boundary_min x (degree+1), internal, boundary_max x (degree+1)]
    Ok(Array::from_iter(
        std::iter::repeat_n(min_val, degree + 1)
            .chain(internal_knots)
            .chain(std::iter::repeat_n(max_val, degree + 1)),
    ))
}

/// Evaluates every B-spline basis function of the given degree at `x`.
///
/// Uses the triangular Cox-de Boor scheme. The knot span is searched only
/// among `[degree, num_basis - 1]`, so `x` equal to the right boundary lands
/// in the last non-degenerate span and the basis still sums to one there.
pub fn evaluate_bspline_basis(x: f64, degree: usize, knots: ArrayView1<f64>) -> Array1<f64> {
    let num_basis = knots.len() - degree - 1;

    let mut mu = degree;
    for i in degree..num_basis {
        if knots[i] <= x {
            mu = i;
        }
    }

    let mut n = vec![0.0; degree + 1];
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    n[0] = 1.0;
    for j in 1..=degree {
        left[j] = x - knots[mu + 1 - j];
        right[j] = knots[mu + j] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom.abs() > 1e-12 { n[r] / denom } else { 0.0 };
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }

    let mut basis_values = Array1::zeros(num_basis);
    for (r, &value) in n.iter().enumerate() {
        let idx = mu + r - degree;
        if idx < num_basis {
            basis_values[idx] = value;
        }
    }
    basis_values
}

/// A monotone spline basis built from cumulative sums of clamped B-splines.
///
/// Every column rises from 0 at the left boundary to 1 at the right one, so a
/// non-negative combination of columns is a non-decreasing curve.
#[derive(Debug, Clone)]
pub struct ISplineBasis {
    range: (f64, f64),
    degree: usize,
    num_basis: usize,
    knots: Array1<f64>,
}

impl ISplineBasis {
    pub fn new(range: (f64, f64), num_basis: usize, degree: usize) -> Result<Self, BasisError> {
        if degree < 1 {
            return Err(BasisError::InvalidDegree(degree));
        }
        if num_basis <= degree {
            return Err(BasisError::TooFewBasisFunctions { num_basis, degree });
        }
        // The underlying B-spline basis has one more function than the
        // I-spline basis; the first one is dropped by the cumulative sum.
        let knots = clamped_uniform_knots(range, num_basis - degree, degree)?;
        Ok(Self {
            range,
            degree,
            num_basis,
            knots,
        })
    }

    pub fn num_basis(&self) -> usize {
        self.num_basis
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    /// Clamps `x` into the basis domain. Non-finite inputs map to the lower bound.
    pub fn clamp(&self, x: f64) -> f64 {
        if x.is_nan() {
            return self.range.0;
        }
        x.clamp(self.range.0, self.range.1)
    }

    /// Evaluates all I-spline functions at `x` (clamped, never extrapolated).
    pub fn evaluate(&self, x: f64) -> Array1<f64> {
        let x = self.clamp(x);
        let b = evaluate_bspline_basis(x, self.degree, self.knots.view());
        let mut values = Array1::zeros(self.num_basis);
        let mut tail = 0.0;
        for j in (0..self.num_basis).rev() {
            tail += b[j + 1];
            values[j] = tail.clamp(0.0, 1.0);
        }
        values
    }

    /// Stacks the basis rows for every point into an `[n, num_basis]` matrix.
    pub fn design_matrix(&self, data: ArrayView1<f64>) -> Array2<f64> {
        let mut matrix = Array2::zeros((data.len(), self.num_basis));
        for (mut row, &x) in matrix.axis_iter_mut(Axis(0)).zip(data.iter()) {
            row.assign(&self.evaluate(x));
        }
        matrix
    }

    /// Evaluates the curve `sum_j coefficients[j] * I_j(x)`.
    pub fn evaluate_curve(&self, x: f64, coefficients: &[f64]) -> f64 {
        self.evaluate(x)
            .iter()
            .zip(coefficients)
            .map(|(b, c)| b * c)
            .sum()
    }
}
