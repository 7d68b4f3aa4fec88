//! Logit-scale helpers shared by every probability computation.

/// Probabilities never leave `[PROB_EPS, 1 - PROB_EPS]`.
pub const PROB_EPS: f64 = 1e-9;

/// Linear predictors are clamped to this magnitude before `exp`.
const ETA_LIMIT: f64 = 700.0;

/// The logistic function, clamped so the result is strictly inside (0, 1).
pub fn sigmoid(eta: f64) -> f64 {
    if eta.is_nan() {
        return 0.5;
    }
    let eta = eta.clamp(-ETA_LIMIT, ETA_LIMIT);
    let p = 1.0 / (1.0 + (-eta).exp());
    p.clamp(PROB_EPS, 1.0 - PROB_EPS)
}

/// Log-odds of `p`, with `p` first pulled into `[PROB_EPS, 1 - PROB_EPS]`.
pub fn logit(p: f64) -> f64 {
    let p = if p.is_nan() { 0.5 } else { p.clamp(PROB_EPS, 1.0 - PROB_EPS) };
    (p / (1.0 - p)).ln()
}

/// Moves `p` by `effect` on the logit scale.
pub fn shift_probability(p: f64, effect: f64) -> f64 {
    sigmoid(logit(p) + effect)
}

/// Clamps a rate into `[lo, hi]` and returns its logit. Used where observed
/// aggregates can hit 0 or 1.
pub fn clamped_logit(rate: f64, lo: f64, hi: f64) -> f64 {
    logit(rate.clamp(lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sigmoid_is_bounded_for_extreme_inputs() {
        for eta in [-1e6, -800.0, -40.0, 0.0, 40.0, 800.0, 1e6, f64::INFINITY] {
            let p = sigmoid(eta);
            assert!(p > 0.0 && p < 1.0, "sigmoid({eta}) = {p}");
        }
        assert_eq!(sigmoid(f64::NAN), 0.5);
    }

    #[test]
    fn logit_inverts_sigmoid() {
        for eta in [-5.0, -1.0, 0.0, 0.3, 2.5, 7.0] {
            assert_abs_diff_eq!(logit(sigmoid(eta)), eta, epsilon = 1e-9);
        }
    }

    #[test]
    fn shift_is_symmetric_in_logit_space() {
        let p = 0.3;
        let up = shift_probability(p, 0.8);
        let down = shift_probability(p, -0.8);
        assert_abs_diff_eq!(logit(up) - logit(p), logit(p) - logit(down), epsilon = 1e-9);
        assert_abs_diff_eq!(shift_probability(p, 0.0), p, epsilon = 1e-12);
    }

    #[test]
    fn clamped_logit_handles_degenerate_rates() {
        assert_abs_diff_eq!(clamped_logit(0.0, 0.01, 0.99), logit(0.01), epsilon = 1e-12);
        assert_abs_diff_eq!(clamped_logit(1.0, 0.01, 0.99), logit(0.99), epsilon = 1e-12);
    }
}
