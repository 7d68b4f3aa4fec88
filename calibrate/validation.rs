//! End-to-end checks of the model against ground truth and expected behavior.
//!
//! Nothing here returns an error: a failing metric is recorded in the report
//! and the caller decides what to do with it.

use crate::calibrate::diagnostics::{
    is_non_decreasing, max_absolute_error, mean_absolute_error, pearson, rmse,
};
use crate::calibrate::grid::ReferenceGrid;
use crate::catalog::Catalog;
use crate::competitiveness::CompetitivenessScorer;
use crate::experience::{
    ExperienceConfig, ThresholdMode, calculate_experience_contribution, saturating_contribution,
};
use crate::fixtures::{
    ApplicantBuilder, average_applicant, perfect_applicant, top_urm_applicant, weak_applicant,
};
use crate::two_stage::{AdmissionModel, Category, typical_interview_rate};
use crate::types::{ApplicantProfile, SchoolRecord};
use serde::{Deserialize, Serialize};

// =============================================================================
// Targets
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationTargets {
    pub grid_max_rmse: f64,
    pub grid_min_correlation: f64,
    pub grid_max_abs_error: f64,
    pub school_max_mae: f64,
    pub school_min_correlation: f64,
}

impl Default for ValidationTargets {
    fn default() -> Self {
        Self {
            grid_max_rmse: 0.03,
            grid_min_correlation: 0.9,
            grid_max_abs_error: 0.15,
            school_max_mae: 0.10,
            school_min_correlation: 0.0,
        }
    }
}

// =============================================================================
// Grid calibration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCellResult {
    pub gpa_label: String,
    pub mcat_label: String,
    pub observed: f64,
    pub predicted: f64,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridValidation {
    pub cells: Vec<GridCellResult>,
    pub rmse: f64,
    pub correlation: f64,
    pub max_abs_error: f64,
    pub passed: bool,
}

/// Baseline probability at each cell's representative stats against the
/// cell's observed rate.
pub fn validate_against_a23(
    scorer: &CompetitivenessScorer,
    grid: &ReferenceGrid,
    targets: &ValidationTargets,
) -> GridValidation {
    let cells: Vec<GridCellResult> = grid
        .cells()
        .map(|cell| {
            let predicted = scorer.baseline_prob(cell.gpa, cell.mcat);
            GridCellResult {
                gpa_label: cell.gpa_label.to_string(),
                mcat_label: cell.mcat_label.to_string(),
                observed: cell.rate,
                predicted,
                error: predicted - cell.rate,
            }
        })
        .collect();

    let errors: Vec<f64> = cells.iter().map(|c| c.error).collect();
    let observed: Vec<f64> = cells.iter().map(|c| c.observed).collect();
    let predicted: Vec<f64> = cells.iter().map(|c| c.predicted).collect();
    let rmse = rmse(&errors);
    let correlation = pearson(&observed, &predicted);
    let max_abs_error = max_absolute_error(&errors);
    let passed = !cells.is_empty()
        && rmse < targets.grid_max_rmse
        && correlation > targets.grid_min_correlation
        && max_abs_error < targets.grid_max_abs_error;

    log::info!(
        "Grid validation: RMSE {:.4}, r = {:.4}, max error {:.4} ({}).",
        rmse,
        correlation,
        max_abs_error,
        if passed { "pass" } else { "FAIL" }
    );
    GridValidation {
        cells,
        rmse,
        correlation,
        max_abs_error,
        passed,
    }
}

// =============================================================================
// School interview rates
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRateRow {
    pub school_id: String,
    pub observed: f64,
    pub modeled: f64,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRateValidation {
    pub rows: Vec<SchoolRateRow>,
    pub mae: f64,
    pub correlation: f64,
    pub passed: bool,
}

/// `C` of a school's typical applicant: 25th-percentile GPA and MCAT.
fn typical_competitiveness(school: &SchoolRecord, scorer: &CompetitivenessScorer) -> f64 {
    let gpa = school.gpa.resolve_gpa();
    let mcat = school.mcat.resolve_mcat();
    scorer.competitiveness(gpa.p25, mcat.p25)
}

/// Modeled interview rate of each school's typical out-of-state applicant
/// against its observed interview rate. Schools without parameters or
/// applicant counts are skipped.
pub fn validate_school_rates(
    catalog: &Catalog,
    scorer: &CompetitivenessScorer,
    targets: &ValidationTargets,
) -> SchoolRateValidation {
    let rows: Vec<SchoolRateRow> = catalog
        .predictable()
        .filter_map(|(school, params)| {
            let observed = school.interview_rate()?;
            let modeled = typical_interview_rate(params, typical_competitiveness(school, scorer));
            Some(SchoolRateRow {
                school_id: school.id.clone(),
                observed,
                modeled,
                error: modeled - observed,
            })
        })
        .collect();

    let errors: Vec<f64> = rows.iter().map(|r| r.error).collect();
    let observed: Vec<f64> = rows.iter().map(|r| r.observed).collect();
    let modeled: Vec<f64> = rows.iter().map(|r| r.modeled).collect();
    let mae = mean_absolute_error(&errors);
    let correlation = pearson(&observed, &modeled);
    let passed = !rows.is_empty() && mae < targets.school_max_mae && correlation > targets.school_min_correlation;

    log::info!(
        "School-rate validation over {} schools: MAE {:.4}, r = {:.4}.",
        rows.len(),
        mae,
        correlation
    );
    SchoolRateValidation {
        rows,
        mae,
        correlation,
        passed,
    }
}

// =============================================================================
// Behavioral probes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl NamedCheck {
    fn new(name: &str, passed: bool, detail: String) -> Self {
        if !passed {
            log::warn!("Check '{}' failed: {}", name, detail);
        }
        Self {
            name: name.to_string(),
            passed,
            detail,
        }
    }
}

/// School used for single-school probes: the first public school in the
/// catalog that can be predicted.
fn probe_school(catalog: &Catalog) -> Option<&SchoolRecord> {
    catalog
        .predictable()
        .map(|(s, _)| s)
        .find(|s| s.is_public)
        .or_else(|| catalog.predictable().map(|(s, _)| s).next())
}

fn gpa_monotonicity(model: &AdmissionModel, catalog: &Catalog) -> NamedCheck {
    let gpas: Vec<f64> = (0..=40).map(|i| 2.0 + 0.05 * i as f64).collect();
    let baseline: Vec<f64> = gpas.iter().map(|&g| model.scorer.baseline_prob(g, 510.0)).collect();
    let mut passed = is_non_decreasing(&baseline, 0.0);
    if let Some((school, params)) = probe_school(catalog).and_then(|s| catalog.lookup(&s.id)) {
        let p: Vec<f64> = gpas
            .iter()
            .map(|&g| {
                let profile = ApplicantBuilder::new().stats(g, 510.0).typical_experience().build();
                model.predict_for(&profile, school, params).p_accept()
            })
            .collect();
        passed &= is_non_decreasing(&p, 0.0);
    }
    NamedCheck::new(
        "gpa_monotonicity",
        passed,
        format!(
            "baseline {:.3} at GPA 2.0 to {:.3} at GPA 4.0",
            baseline[0],
            baseline[baseline.len() - 1]
        ),
    )
}

fn mcat_monotonicity(model: &AdmissionModel, catalog: &Catalog) -> NamedCheck {
    let mcats: Vec<f64> = (472..=528).map(f64::from).collect();
    let baseline: Vec<f64> = mcats.iter().map(|&m| model.scorer.baseline_prob(3.6, m)).collect();
    let mut passed = is_non_decreasing(&baseline, 0.0);
    if let Some((school, params)) = probe_school(catalog).and_then(|s| catalog.lookup(&s.id)) {
        let p: Vec<f64> = mcats
            .iter()
            .map(|&m| {
                let profile = ApplicantBuilder::new().stats(3.6, m).typical_experience().build();
                model.predict_for(&profile, school, params).p_accept()
            })
            .collect();
        passed &= is_non_decreasing(&p, 0.0);
    }
    NamedCheck::new(
        "mcat_monotonicity",
        passed,
        format!(
            "baseline {:.3} at MCAT 472 to {:.3} at MCAT 528",
            baseline[0],
            baseline[baseline.len() - 1]
        ),
    )
}

fn in_state_bonus_sign(model: &AdmissionModel, catalog: &Catalog) -> NamedCheck {
    let mut checked = 0;
    let mut violations = Vec::new();
    for (school, params) in catalog.predictable().filter(|(s, _)| s.is_public) {
        let resident = ApplicantBuilder::new().typical_experience().state(&school.state).build();
        let outsider = ApplicantBuilder::new().typical_experience().state("ZZ").build();
        let inside = model.predict_for(&resident, school, params);
        let outside = model.predict_for(&outsider, school, params);
        checked += 1;
        if inside.p_interview() <= outside.p_interview() || inside.p_accept() < outside.p_accept() {
            violations.push(school.id.clone());
        }
    }
    NamedCheck::new(
        "in_state_bonus_sign",
        checked > 0 && violations.is_empty(),
        if violations.is_empty() {
            format!("residents favored at all {checked} public schools")
        } else {
            format!("no resident advantage at {}", violations.join(", "))
        },
    )
}

fn reasonable_probability_range(model: &AdmissionModel, catalog: &Catalog) -> NamedCheck {
    let profiles = [weak_applicant(), average_applicant(), perfect_applicant()];
    let mut all_inside = true;
    for profile in &profiles {
        for p in model.predict_catalog(profile, catalog).predictions {
            all_inside &= [p.p_interview(), p.p_accept_given_interview(), p.p_accept()]
                .iter()
                .all(|v| v.is_finite() && *v > 0.0 && *v < 1.0);
        }
    }
    let average = model.predict_catalog(&average_applicant(), catalog);
    let n = average.predictions.len().max(1) as f64;
    let mean_accept = average.expected_acceptances / n;
    NamedCheck::new(
        "reasonable_probability_range",
        all_inside && (0.02..=0.5).contains(&mean_accept),
        format!("average applicant's mean P(accept) {mean_accept:.3}"),
    )
}

fn experience_saturation(config: &ExperienceConfig) -> NamedCheck {
    let params = config.clinical.saturation;
    let hours: Vec<f64> = (0..=40).map(|i| 250.0 * i as f64).collect();
    let values: Vec<f64> = hours.iter().map(|&h| saturating_contribution(h, params)).collect();
    let increasing = values.windows(2).all(|w| w[1] > w[0]);
    let concave = values.windows(3).all(|w| w[2] - w[1] <= w[1] - w[0]);
    let bounded = values.iter().all(|&v| v <= params.alpha);

    let saturated = ApplicantBuilder::new().saturated_experience().build();
    let total = calculate_experience_contribution(&saturated, config);
    let within_bound = total <= config.upper_bound();
    NamedCheck::new(
        "experience_saturation",
        increasing && concave && bounded && within_bound,
        format!(
            "clinical {:.3} at 10000 h (ceiling {:.2}); saturated total {:.3} <= {:.3}",
            values[values.len() - 1],
            params.alpha,
            total,
            config.upper_bound()
        ),
    )
}

/// Monotonicity and behavior probes.
pub fn run_sensitivity_analysis(model: &AdmissionModel, catalog: &Catalog) -> Vec<NamedCheck> {
    vec![
        gpa_monotonicity(model, catalog),
        mcat_monotonicity(model, catalog),
        in_state_bonus_sign(model, catalog),
        reasonable_probability_range(model, catalog),
        experience_saturation(&model.settings.experience),
    ]
}

// =============================================================================
// Literal scenarios
// =============================================================================

/// The tier-1 school admitting the smallest share of applicants.
pub fn most_selective_school(catalog: &Catalog) -> Option<&SchoolRecord> {
    catalog
        .predictable()
        .map(|(s, _)| s)
        .filter(|s| s.tier == 1 && s.applicants > 0)
        .min_by(|a, b| {
            let ra = a.accepted as f64 / a.applicants as f64;
            let rb = b.accepted as f64 / b.applicants as f64;
            ra.total_cmp(&rb).then_with(|| a.id.cmp(&b.id))
        })
}

fn list_band(
    name: &str,
    model: &AdmissionModel,
    catalog: &Catalog,
    profile: &ApplicantProfile,
    (lo, hi): (f64, f64),
) -> NamedCheck {
    let p = model.predict_catalog(profile, catalog).p_at_least_one;
    NamedCheck::new(name, p > lo && p <= hi, format!("P(>=1) = {p:.4}, expected in ({lo}, {hi}]"))
}

/// Literal applicant scenarios, each with an expected outcome band.
pub fn run_edge_case_tests(model: &AdmissionModel, catalog: &Catalog) -> Vec<NamedCheck> {
    let mut checks = vec![
        list_band("perfect_applicant", model, catalog, &perfect_applicant(), (0.95, 1.0)),
        list_band("weak_applicant", model, catalog, &weak_applicant(), (0.0, 0.15)),
        list_band("average_applicant", model, catalog, &average_applicant(), (0.40, 0.95)),
    ];

    checks.push(match most_selective_school(catalog).and_then(|s| catalog.lookup(&s.id)) {
        Some((school, params)) => {
            let p = model.predict_for(&top_urm_applicant(), school, params);
            let inside = [p.p_interview(), p.p_accept_given_interview(), p.p_accept()]
                .iter()
                .all(|v| *v > 0.0 && *v < 1.0);
            NamedCheck::new(
                "top_applicant_at_most_selective",
                inside && p.category != Category::Safety,
                format!(
                    "{}: P(accept) {:.3}, {}",
                    school.id,
                    p.p_accept(),
                    p.category.as_str()
                ),
            )
        }
        None => NamedCheck::new(
            "top_applicant_at_most_selective",
            false,
            "no predictable tier-1 school".into(),
        ),
    });

    let hard = model.settings.experience.with_clinical_mode(ThresholdMode::Hard);
    let no_clinical = ApplicantBuilder::new().typical_experience().clinical_hours(0.0).build();
    let value = calculate_experience_contribution(&no_clinical, &hard);
    checks.push(NamedCheck::new(
        "hard_clinical_threshold",
        value <= -2.0,
        format!("experience contribution {value:.3}"),
    ));

    let extremes = [
        ApplicantBuilder::new().stats(5.0, 600.0).clinical_hours(-100.0).build(),
        ApplicantBuilder::new().stats(-1.0, 300.0).research_hours(f64::NAN).build(),
        ApplicantBuilder::new().stats(f64::NAN, f64::INFINITY).build(),
    ];
    let finite = extremes.iter().all(|profile| {
        model.predict_catalog(profile, catalog).predictions.iter().all(|p| {
            [p.p_interview(), p.p_accept_given_interview(), p.p_accept()]
                .iter()
                .all(|v| v.is_finite() && *v > 0.0 && *v < 1.0)
        })
    });
    checks.push(NamedCheck::new(
        "out_of_range_inputs",
        finite,
        "extreme and non-finite inputs stay inside (0, 1)".into(),
    ));

    let known: Vec<&str> = catalog.predictable().map(|(s, _)| s.id.as_str()).take(3).collect();
    let mut with_unknown = known.clone();
    with_unknown.push("no-such-school");
    let profile = average_applicant();
    let a = model.calculate_list_probability(&profile, &with_unknown, catalog);
    let b = model.calculate_list_probability(&profile, &known, catalog);
    checks.push(NamedCheck::new(
        "unknown_school_omitted",
        a.predictions == b.predictions
            && a.p_at_least_one == b.p_at_least_one
            && a.omitted == ["no-such-school"],
        format!("{} predicted, {} omitted", a.predictions.len(), a.omitted.len()),
    ));

    let public = catalog.predictable().find(|(s, _)| s.is_public);
    checks.push(match public {
        Some((school, params)) => {
            let resident = ApplicantBuilder::new().typical_experience().state(&school.state).build();
            let outsider = ApplicantBuilder::new().typical_experience().state("ZZ").build();
            let inside = model.predict_for(&resident, school, params).p_accept();
            let outside = model.predict_for(&outsider, school, params).p_accept();
            NamedCheck::new(
                "in_state_advantage",
                inside > outside,
                format!("{}: resident {:.3} vs non-resident {:.3}", school.id, inside, outside),
            )
        }
        None => NamedCheck::new("in_state_advantage", false, "no public school".into()),
    });
    checks
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub checks_total: usize,
    pub checks_passed: usize,
    pub grid_rmse: f64,
    pub grid_correlation: f64,
    pub grid_max_abs_error: f64,
    pub school_mae: f64,
    pub school_correlation: f64,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub grid: GridValidation,
    pub school_rates: SchoolRateValidation,
    pub sensitivity: Vec<NamedCheck>,
    pub edge_cases: Vec<NamedCheck>,
    pub passed: bool,
    pub summary: ValidationSummary,
}

pub fn generate_validation_report(
    model: &AdmissionModel,
    catalog: &Catalog,
    grid: &ReferenceGrid,
    targets: &ValidationTargets,
) -> ValidationReport {
    let grid_result = validate_against_a23(&model.scorer, grid, targets);
    let school_rates = validate_school_rates(catalog, &model.scorer, targets);
    let sensitivity = run_sensitivity_analysis(model, catalog);
    let edge_cases = run_edge_case_tests(model, catalog);

    let mut failed = Vec::new();
    if !grid_result.passed {
        failed.push("grid_calibration".to_string());
    }
    if !school_rates.passed {
        failed.push("school_rates".to_string());
    }
    failed.extend(
        sensitivity
            .iter()
            .chain(&edge_cases)
            .filter(|c| !c.passed)
            .map(|c| c.name.clone()),
    );
    let checks_total = 2 + sensitivity.len() + edge_cases.len();

    let summary = ValidationSummary {
        checks_total,
        checks_passed: checks_total - failed.len(),
        grid_rmse: grid_result.rmse,
        grid_correlation: grid_result.correlation,
        grid_max_abs_error: grid_result.max_abs_error,
        school_mae: school_rates.mae,
        school_correlation: school_rates.correlation,
        failed,
    };
    log::info!(
        "Validation: {}/{} checks passed.",
        summary.checks_passed,
        summary.checks_total
    );
    ValidationReport {
        passed: summary.failed.is_empty(),
        grid: grid_result,
        school_rates,
        sensitivity,
        edge_cases,
        summary,
    }
}
