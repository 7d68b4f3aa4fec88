//! Fitting the competitiveness scorer to the reference grid.
//!
//! Each grid cell contributes one row `[1, I_gpa(g), I_mcat(m)]` with target
//! `logit(rate)` and weight equal to its share of applicants. Spline
//! coefficients must stay non-negative for the curves to be monotone, so the
//! weighted least-squares problem is solved by projected coordinate descent on
//! its normal equations. A small penalty on first differences of adjacent
//! coefficients keeps the curves from kinking where the grid is sparse.

use crate::basis::{BasisError, ISplineBasis};
use crate::calibrate::grid::ReferenceGrid;
use crate::competitiveness::{BASELINE_PROB_AT_ZERO, CompetitivenessScorer, ScorerError, ScorerParams};
use crate::link::{clamped_logit, logit};
use ndarray::{Array1, Array2, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Spline basis construction failed: {0}")]
    Basis(#[from] BasisError),

    #[error("Fitted parameters were rejected: {0}")]
    Scorer(#[from] ScorerError),

    #[error("The reference grid has no applicants to weight the fit.")]
    NoApplicants,

    #[error("Coefficient {0} has no support in the grid; its curvature is zero.")]
    Unidentified(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSettings {
    pub gpa_range: (f64, f64),
    pub mcat_range: (f64, f64),
    pub num_basis: usize,
    pub degree: usize,
    /// Observed rates are clamped to `[floor, 1 - floor]` before the logit.
    pub rate_floor: f64,
    pub smoothing: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub anchor_gpa: f64,
    pub anchor_mcat: f64,
    pub baseline_prob_at_zero: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        let scorer = ScorerParams::default();
        Self {
            gpa_range: scorer.gpa_range,
            mcat_range: scorer.mcat_range,
            num_basis: scorer.num_basis,
            degree: scorer.degree,
            rate_floor: 0.001,
            smoothing: 0.001,
            max_iterations: 5000,
            tolerance: 1e-12,
            anchor_gpa: scorer.anchor_gpa,
            anchor_mcat: scorer.anchor_mcat,
            baseline_prob_at_zero: BASELINE_PROB_AT_ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub params: ScorerParams,
    pub iterations: usize,
    pub converged: bool,
    /// Applicant-weighted RMSE of the fit on the logit scale.
    pub weighted_logit_rmse: f64,
}

impl FitOutcome {
    pub fn scorer(&self) -> Result<CompetitivenessScorer, ScorerError> {
        CompetitivenessScorer::new(self.params.clone())
    }
}

/// Weighted Gram matrix and right-hand side of the normal equations, with the
/// difference penalty added to each spline block.
fn normal_equations(
    design: &Array2<f64>,
    targets: &Array1<f64>,
    weights: &Array1<f64>,
    num_basis: usize,
    smoothing: f64,
) -> (Array2<f64>, Array1<f64>) {
    let weighted = design * &weights.view().insert_axis(ndarray::Axis(1));
    let mut gram = weighted.t().dot(design);
    let rhs = weighted.t().dot(targets);

    for block in [1, 1 + num_basis] {
        for k in 0..num_basis.saturating_sub(1) {
            let (i, j) = (block + k, block + k + 1);
            gram[[i, i]] += smoothing;
            gram[[j, j]] += smoothing;
            gram[[i, j]] -= smoothing;
            gram[[j, i]] -= smoothing;
        }
    }
    (gram, rhs)
}

/// Minimizes `0.5 x'Gx - h'x` subject to `x[i] >= 0` for every `i` except 0.
fn projected_coordinate_descent(
    gram: &Array2<f64>,
    rhs: &Array1<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> Result<(Array1<f64>, usize, bool), FitError> {
    let p = rhs.len();
    if let Some(i) = (0..p).find(|&i| gram[[i, i]] <= 0.0) {
        return Err(FitError::Unidentified(i));
    }
    let mut theta = Array1::<f64>::zeros(p);
    for iteration in 1..=max_iterations {
        let mut largest_step: f64 = 0.0;
        for i in 0..p {
            let gradient = gram.row(i).dot(&theta) - rhs[i];
            let mut updated = theta[i] - gradient / gram[[i, i]];
            if i > 0 {
                updated = updated.max(0.0);
            }
            largest_step = largest_step.max((updated - theta[i]).abs());
            theta[i] = updated;
        }
        if largest_step < tolerance {
            return Ok((theta, iteration, true));
        }
    }
    Ok((theta, max_iterations, false))
}

/// Fits scorer parameters to `grid`.
pub fn fit_scorer(grid: &ReferenceGrid, settings: &FitSettings) -> Result<FitOutcome, FitError> {
    let total = grid.total_applicants();
    if total.is_nan() || total <= 0.0 {
        return Err(FitError::NoApplicants);
    }
    let gpa_basis = ISplineBasis::new(settings.gpa_range, settings.num_basis, settings.degree)?;
    let mcat_basis = ISplineBasis::new(settings.mcat_range, settings.num_basis, settings.degree)?;
    let nb = settings.num_basis;
    let p = 1 + 2 * nb;

    let cells: Vec<_> = grid.cells().collect();
    let mut design = Array2::<f64>::zeros((cells.len(), p));
    let mut targets = Array1::<f64>::zeros(cells.len());
    let mut weights = Array1::<f64>::zeros(cells.len());
    let floor = settings.rate_floor.clamp(1e-6, 0.49);
    for (row, cell) in cells.iter().enumerate() {
        design[[row, 0]] = 1.0;
        design.slice_mut(s![row, 1..=nb]).assign(&gpa_basis.evaluate(cell.gpa));
        design.slice_mut(s![row, 1 + nb..]).assign(&mcat_basis.evaluate(cell.mcat));
        targets[row] = clamped_logit(cell.rate, floor, 1.0 - floor);
        weights[row] = cell.applicants / total;
    }

    let (gram, rhs) = normal_equations(&design, &targets, &weights, nb, settings.smoothing);
    let (theta, iterations, converged) =
        projected_coordinate_descent(&gram, &rhs, settings.max_iterations, settings.tolerance)?;
    if !converged {
        log::warn!(
            "Scorer fit stopped after {} iterations without meeting tolerance {:e}.",
            iterations,
            settings.tolerance
        );
    }

    let residuals = &targets - &design.dot(&theta);
    let weighted_logit_rmse = (&weights * &residuals * &residuals).sum().sqrt();

    let gpa_coefficients = theta.slice(s![1..=nb]).to_vec();
    let mcat_coefficients = theta.slice(s![1 + nb..]).to_vec();
    // The fitted model is theta0 + raw_g + raw_m on the logit scale. Anchoring
    // both curves moves their anchor values into the intercept of C.
    let raw_anchor = gpa_basis.evaluate_curve(settings.anchor_gpa, &gpa_coefficients)
        + mcat_basis.evaluate_curve(settings.anchor_mcat, &mcat_coefficients);
    let global_intercept = theta[0] + raw_anchor - logit(settings.baseline_prob_at_zero);

    let params = ScorerParams {
        gpa_range: settings.gpa_range,
        mcat_range: settings.mcat_range,
        num_basis: nb,
        degree: settings.degree,
        gpa_coefficients,
        mcat_coefficients,
        anchor_gpa: settings.anchor_gpa,
        anchor_mcat: settings.anchor_mcat,
        global_intercept,
        baseline_prob_at_zero: settings.baseline_prob_at_zero,
    };
    // Rejects anything the scorer itself would refuse.
    CompetitivenessScorer::new(params.clone())?;

    log::info!(
        "Fitted scorer in {} iterations; weighted logit RMSE {:.4}.",
        iterations,
        weighted_logit_rmse
    );
    Ok(FitOutcome {
        params,
        iterations,
        converged,
        weighted_logit_rmse,
    })
}
