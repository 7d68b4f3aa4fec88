//! Error metrics shared by the validation harness.
//!
//! All functions are total: empty or mismatched input yields 0 rather than NaN.

/// Root mean squared value of `errors`.
pub fn rmse(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt()
}

pub fn mean_absolute_error(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64
}

pub fn max_absolute_error(errors: &[f64]) -> f64 {
    errors.iter().fold(0.0, |acc: f64, e| acc.max(e.abs()))
}

/// Pearson correlation. Zero when either side has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    let denom = (vx * vy).sqrt();
    if denom > 0.0 { cov / denom } else { 0.0 }
}

/// True when `values` never decreases by more than `tolerance`.
pub fn is_non_decreasing(values: &[f64], tolerance: f64) -> bool {
    values.windows(2).all(|w| w[1] >= w[0] - tolerance)
}
