//! The competitiveness index `C`.
//!
//! `C` combines two monotone spline curves, one over GPA and one over MCAT,
//! each anchored to contribute exactly zero at a reference applicant. A global
//! intercept positions the reference applicant on the baseline acceptance
//! curve, so `competitiveness_to_baseline_prob(C)` reproduces the empirical
//! chance of at least one acceptance for applicants with those stats.

use crate::basis::{BasisError, ISplineBasis};
use crate::link::{logit, sigmoid};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Baseline probability of at least one acceptance at `C = 0`.
pub const BASELINE_PROB_AT_ZERO: f64 = 0.65;

// Fitted against the built-in A-23 grid (applicant-weighted, logit scale).
const GPA_COEFFICIENTS: [f64; 6] = [0.045112, 0.273138, 0.759593, 1.098930, 0.776219, 0.324569];
const MCAT_COEFFICIENTS: [f64; 6] = [0.311914, 0.663227, 1.274016, 1.688767, 0.785756, 0.663045];
const GLOBAL_INTERCEPT: f64 = -0.448691;

#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("Spline basis construction failed: {0}")]
    Basis(#[from] BasisError),

    #[error("The {curve} curve expects {expected} coefficients, but {found} were provided.")]
    CoefficientCount {
        curve: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Coefficient {index} of the {curve} curve is {value}; monotone curves need non-negative coefficients.")]
    NegativeCoefficient {
        curve: &'static str,
        index: usize,
        value: f64,
    },

    #[error("Baseline probability at C = 0 must lie strictly inside (0, 1), got {0}.")]
    InvalidBaseline(f64),

    #[error("Failed to read or write scorer file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scorer TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize scorer to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Serializable description of a fitted scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerParams {
    pub gpa_range: (f64, f64),
    pub mcat_range: (f64, f64),
    pub num_basis: usize,
    pub degree: usize,
    pub gpa_coefficients: Vec<f64>,
    pub mcat_coefficients: Vec<f64>,
    /// The reference applicant whose spline contributions are zero.
    pub anchor_gpa: f64,
    pub anchor_mcat: f64,
    pub global_intercept: f64,
    pub baseline_prob_at_zero: f64,
}

impl Default for ScorerParams {
    fn default() -> Self {
        Self {
            gpa_range: (2.0, 4.0),
            mcat_range: (486.0, 528.0),
            num_basis: 6,
            degree: 3,
            gpa_coefficients: GPA_COEFFICIENTS.to_vec(),
            mcat_coefficients: MCAT_COEFFICIENTS.to_vec(),
            anchor_gpa: 3.75,
            anchor_mcat: 512.0,
            global_intercept: GLOBAL_INTERCEPT,
            baseline_prob_at_zero: BASELINE_PROB_AT_ZERO,
        }
    }
}

impl ScorerParams {
    pub fn save(&self, path: &Path) -> Result<(), ScorerError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ScorerError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// One monotone curve with its anchor offset baked in.
#[derive(Debug, Clone)]
struct AnchoredCurve {
    basis: ISplineBasis,
    coefficients: Vec<f64>,
    anchor_value: f64,
}

impl AnchoredCurve {
    fn new(
        curve: &'static str,
        basis: ISplineBasis,
        coefficients: &[f64],
        anchor: f64,
    ) -> Result<Self, ScorerError> {
        if coefficients.len() != basis.num_basis() {
            return Err(ScorerError::CoefficientCount {
                curve,
                expected: basis.num_basis(),
                found: coefficients.len(),
            });
        }
        if let Some((index, &value)) = coefficients
            .iter()
            .enumerate()
            .find(|(_, c)| c.is_nan() || **c < 0.0)
        {
            return Err(ScorerError::NegativeCoefficient {
                curve,
                index,
                value,
            });
        }
        let anchor_value = basis.evaluate_curve(anchor, coefficients);
        Ok(Self {
            basis,
            coefficients: coefficients.to_vec(),
            anchor_value,
        })
    }

    fn contribution(&self, x: f64) -> f64 {
        self.basis.evaluate_curve(x, &self.coefficients) - self.anchor_value
    }
}

/// Maps (GPA, MCAT) to the competitiveness index `C`.
#[derive(Debug, Clone)]
pub struct CompetitivenessScorer {
    params: ScorerParams,
    gpa: AnchoredCurve,
    mcat: AnchoredCurve,
    baseline_logit: f64,
}

impl CompetitivenessScorer {
    pub fn new(params: ScorerParams) -> Result<Self, ScorerError> {
        let p0 = params.baseline_prob_at_zero;
        if p0.is_nan() || p0 <= 0.0 || p0 >= 1.0 {
            return Err(ScorerError::InvalidBaseline(p0));
        }
        let gpa_basis = ISplineBasis::new(params.gpa_range, params.num_basis, params.degree)?;
        let mcat_basis = ISplineBasis::new(params.mcat_range, params.num_basis, params.degree)?;
        let gpa = AnchoredCurve::new("GPA", gpa_basis, &params.gpa_coefficients, params.anchor_gpa)?;
        let mcat = AnchoredCurve::new(
            "MCAT",
            mcat_basis,
            &params.mcat_coefficients,
            params.anchor_mcat,
        )?;
        Ok(Self {
            baseline_logit: logit(p0),
            params,
            gpa,
            mcat,
        })
    }

    /// The scorer shipped with the crate.
    pub fn builtin() -> Self {
        Self::new(ScorerParams::default())
            .expect("built-in scorer parameters are valid by construction")
    }

    pub fn params(&self) -> &ScorerParams {
        &self.params
    }

    /// GPA curve value relative to the anchor GPA.
    pub fn gpa_contribution(&self, gpa: f64) -> f64 {
        self.gpa.contribution(gpa)
    }

    /// MCAT curve value relative to the anchor MCAT.
    pub fn mcat_contribution(&self, mcat: f64) -> f64 {
        self.mcat.contribution(mcat)
    }

    /// `C = global_intercept + gpa_contribution + mcat_contribution`.
    ///
    /// Inputs outside each curve's domain are clamped, so the result is always
    /// finite and non-decreasing in each argument.
    pub fn competitiveness(&self, gpa: f64, mcat: f64) -> f64 {
        self.params.global_intercept + self.gpa_contribution(gpa) + self.mcat_contribution(mcat)
    }

    pub fn competitiveness_to_baseline_prob(&self, c: f64) -> f64 {
        sigmoid(self.baseline_logit + c)
    }

    /// Shortcut for the baseline probability of an applicant's stats.
    pub fn baseline_prob(&self, gpa: f64, mcat: f64) -> f64 {
        self.competitiveness_to_baseline_prob(self.competitiveness(gpa, mcat))
    }
}
