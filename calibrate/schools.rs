//! Deriving two-stage parameters from a school's published aggregates.
//!
//! Intercepts start from the logit of the observed interview and
//! interview-to-acceptance rates and are then recentered so that an applicant
//! at the school's 25th percentile (interview stage) or median (acceptance
//! stage) sees roughly the observed rate. Slopes come from the spread of `C`
//! across the school's interquartile range. Every estimate is partially pooled
//! toward the mean of its tier.

use crate::catalog::{Catalog, SchoolParamTable};
use crate::competitiveness::CompetitivenessScorer;
use crate::link::{clamped_logit, sigmoid};
use crate::two_stage::typical_interview_rate;
use crate::types::{SchoolModelParams, SchoolRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    /// Weight on the tier mean when pooling, in [0, 1].
    pub shrinkage: f64,
    /// Interview slope used when the IQR of `C` is uninformative, by tier 1-4.
    pub tier_slopes: [f64; 4],
    pub slope_bounds: (f64, f64),
    pub min_iqr: f64,
    pub accept_slope_ratio: f64,
    /// In-state applicants' interview rate relative to out-of-state applicants.
    pub in_state_rate_ratio: f64,
    pub bonus_bounds: (f64, f64),
    /// Public schools filling less than this share in-state get the private bonus.
    pub min_in_state_share: f64,
    pub private_bonus: f64,
    pub accept_bonus_ratio: f64,
    pub rate_bounds: (f64, f64),
    pub default_interview_rate: f64,
    pub default_accept_rate: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            shrinkage: 0.3,
            tier_slopes: [1.2, 1.0, 0.8, 0.6],
            slope_bounds: (0.3, 2.0),
            min_iqr: 0.1,
            accept_slope_ratio: 0.4,
            in_state_rate_ratio: 2.5,
            bonus_bounds: (0.2, 2.0),
            min_in_state_share: 0.3,
            private_bonus: 0.1,
            accept_bonus_ratio: 0.3,
            rate_bounds: (0.01, 0.99),
            default_interview_rate: 0.10,
            default_accept_rate: 0.40,
        }
    }
}

impl CalibrationSettings {
    fn tier_slope(&self, tier: u8) -> f64 {
        self.tier_slopes[(tier.clamp(1, 4) - 1) as usize]
    }

    fn logit_rate(&self, rate: f64) -> f64 {
        clamped_logit(rate, self.rate_bounds.0, self.rate_bounds.1)
    }
}

/// Unpooled estimates for one school.
#[derive(Debug, Clone, Copy)]
struct RawEstimate {
    tier: u8,
    intercept_interview: f64,
    intercept_accept: f64,
    slope: f64,
    bonus: f64,
    c25: f64,
    c50: f64,
}

/// In-state interview bonus on the logit scale. Splits the overall rate into
/// in-state and out-of-state rates using the in-state share of matriculants.
fn in_state_bonus(record: &SchoolRecord, interview_rate: f64, settings: &CalibrationSettings) -> f64 {
    let share = record.pct_in_state_matriculants;
    if !record.is_public || share.is_nan() || share <= settings.min_in_state_share {
        return settings.private_bonus;
    }
    let ratio = settings.in_state_rate_ratio;
    let out_of_state = interview_rate / (share * ratio + (1.0 - share));
    let in_state = out_of_state * ratio;
    let bonus = if in_state > out_of_state {
        settings.logit_rate(in_state) - settings.logit_rate(out_of_state)
    } else {
        0.8 * share / 0.5
    };
    bonus.clamp(settings.bonus_bounds.0, settings.bonus_bounds.1)
}

fn raw_estimate(
    record: &SchoolRecord,
    scorer: &CompetitivenessScorer,
    settings: &CalibrationSettings,
) -> RawEstimate {
    let interview_rate = record
        .interview_rate()
        .unwrap_or(settings.default_interview_rate);
    let accept_rate = record
        .interview_to_accept_rate()
        .unwrap_or(settings.default_accept_rate);

    let gpa = record.gpa.resolve_gpa();
    let mcat = record.mcat.resolve_mcat();
    let c25 = scorer.competitiveness(gpa.p25, mcat.p25);
    let c50 = scorer.competitiveness(gpa.p50, mcat.p50);
    let c75 = scorer.competitiveness(gpa.p75, mcat.p75);

    let tier_slope = settings.tier_slope(record.tier);
    let iqr = c75 - c25;
    let iqr_slope = if iqr > settings.min_iqr { 1.0 / iqr } else { tier_slope };
    let slope = (0.5 * tier_slope + 0.5 * iqr_slope).clamp(settings.slope_bounds.0, settings.slope_bounds.1);

    RawEstimate {
        tier: record.tier,
        intercept_interview: settings.logit_rate(interview_rate),
        intercept_accept: settings.logit_rate(accept_rate),
        slope,
        bonus: in_state_bonus(record, interview_rate, settings),
        c25,
        c50,
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TierMeans {
    intercept_interview: f64,
    intercept_accept: f64,
    slope: f64,
}

fn tier_means(raw: &[RawEstimate]) -> BTreeMap<u8, TierMeans> {
    let mut sums: BTreeMap<u8, (TierMeans, usize)> = BTreeMap::new();
    for r in raw {
        let (acc, n) = sums.entry(r.tier).or_default();
        acc.intercept_interview += r.intercept_interview;
        acc.intercept_accept += r.intercept_accept;
        acc.slope += r.slope;
        *n += 1;
    }
    sums.into_iter()
        .map(|(tier, (acc, n))| {
            let n = n as f64;
            (
                tier,
                TierMeans {
                    intercept_interview: acc.intercept_interview / n,
                    intercept_accept: acc.intercept_accept / n,
                    slope: acc.slope / n,
                },
            )
        })
        .collect()
}

/// Calibrated parameters for every record, pooled within tiers.
pub fn calibrate_school_params(
    records: &[SchoolRecord],
    scorer: &CompetitivenessScorer,
    settings: &CalibrationSettings,
) -> SchoolParamTable {
    let raw: Vec<RawEstimate> = records
        .iter()
        .map(|r| raw_estimate(r, scorer, settings))
        .collect();
    let means = tier_means(&raw);
    let w = settings.shrinkage.clamp(0.0, 1.0);
    let pool = |own: f64, tier: f64| (1.0 - w) * own + w * tier;

    let mut table = SchoolParamTable::default();
    for (record, r) in records.iter().zip(&raw) {
        let m = means.get(&r.tier).copied().unwrap_or_default();
        let slope_c_interview = pool(r.slope, m.slope);
        let slope_c_accept = settings.accept_slope_ratio * slope_c_interview;
        let params = SchoolModelParams {
            intercept_interview: pool(r.intercept_interview, m.intercept_interview)
                - slope_c_interview * r.c25,
            intercept_accept: pool(r.intercept_accept, m.intercept_accept) - slope_c_accept * r.c50,
            slope_c_interview,
            slope_c_accept,
            in_state_bonus_interview: r.bonus,
            in_state_bonus_accept: settings.accept_bonus_ratio * r.bonus,
        };
        log::debug!("Calibrated '{}': {:?}", record.id, params);
        table.insert(record.id.clone(), params);
    }
    log::info!("Calibrated parameters for {} schools.", table.len());
    table
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditIssue {
    pub school_id: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub checked: usize,
    pub issues: Vec<AuditIssue>,
}

impl AuditReport {
    pub fn errors(&self) -> impl Iterator<Item = &AuditIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &AuditIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }

    fn push(&mut self, school_id: &str, severity: Severity, message: String) {
        self.issues.push(AuditIssue {
            school_id: school_id.to_string(),
            severity,
            message,
        });
    }
}

const EXTREME_INTERCEPT: f64 = 8.0;
const MAX_PRIVATE_BONUS: f64 = 0.5;
const MAX_RATE_GAP: f64 = 0.15;

/// Sanity checks on a catalog's parameters. Errors make a school's
/// predictions meaningless; warnings flag values worth a second look.
pub fn audit_school_params(catalog: &Catalog, scorer: &CompetitivenessScorer) -> AuditReport {
    let mut report = AuditReport::default();
    for school in catalog.schools() {
        let id = school.id.as_str();
        let Some(p) = catalog.params(id) else {
            report.push(id, Severity::Warning, "no calibrated parameters".into());
            continue;
        };
        report.checked += 1;

        let values = [
            p.intercept_interview,
            p.intercept_accept,
            p.slope_c_interview,
            p.slope_c_accept,
            p.in_state_bonus_interview,
            p.in_state_bonus_accept,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            report.push(id, Severity::Error, "non-finite parameter".into());
            continue;
        }
        if p.slope_c_interview <= 0.0 || p.slope_c_accept <= 0.0 {
            report.push(
                id,
                Severity::Error,
                format!(
                    "slopes must be positive (interview {:.3}, accept {:.3})",
                    p.slope_c_interview, p.slope_c_accept
                ),
            );
        } else if p.slope_c_accept > p.slope_c_interview {
            report.push(
                id,
                Severity::Warning,
                "acceptance slope exceeds interview slope".into(),
            );
        }
        if p.in_state_bonus_interview < 0.0 || p.in_state_bonus_accept < 0.0 {
            report.push(id, Severity::Error, "negative in-state bonus".into());
        } else if !school.is_public && p.in_state_bonus_interview > MAX_PRIVATE_BONUS {
            report.push(
                id,
                Severity::Warning,
                format!(
                    "private school with in-state bonus {:.2}",
                    p.in_state_bonus_interview
                ),
            );
        }
        if p.intercept_interview.abs() > EXTREME_INTERCEPT || p.intercept_accept.abs() > EXTREME_INTERCEPT {
            report.push(id, Severity::Warning, "extreme intercept".into());
        }

        if let Some(observed) = school.interview_rate() {
            let gpa = school.gpa.resolve_gpa();
            let mcat = school.mcat.resolve_mcat();
            let modeled = typical_interview_rate(p, scorer.competitiveness(gpa.p25, mcat.p25));
            if (modeled - observed).abs() > MAX_RATE_GAP {
                report.push(
                    id,
                    Severity::Warning,
                    format!("modeled interview rate {modeled:.3} vs observed {observed:.3}"),
                );
            }
        }
    }

    for issue in &report.issues {
        match issue.severity {
            Severity::Error => log::warn!("Audit error for '{}': {}", issue.school_id, issue.message),
            Severity::Warning => log::warn!("Audit warning for '{}': {}", issue.school_id, issue.message),
        }
    }
    report
}

/// Interview rate implied by calibrated parameters at a given `C`, resident or not.
pub fn modeled_interview_rate(params: &SchoolModelParams, c: f64, resident: bool) -> f64 {
    let bonus = if resident {
        params.in_state_bonus_interview
    } else {
        0.0
    };
    sigmoid(params.intercept_interview + params.slope_c_interview * c + bonus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MissionFeatures, PercentileLadder};
    use approx::assert_abs_diff_eq;

    #[test]
    fn recalibration_matches_shipped_parameters() {
        let catalog = Catalog::builtin().unwrap();
        let scorer = CompetitivenessScorer::builtin();
        let table = calibrate_school_params(catalog.schools(), &scorer, &CalibrationSettings::default());
        assert_eq!(table.len(), catalog.len());
        for school in catalog.schools() {
            let fresh = table.get(&school.id).unwrap();
            let shipped = catalog.params(&school.id).unwrap();
            assert_abs_diff_eq!(fresh.intercept_interview, shipped.intercept_interview, epsilon = 1e-3);
            assert_abs_diff_eq!(fresh.intercept_accept, shipped.intercept_accept, epsilon = 1e-3);
            assert_abs_diff_eq!(fresh.slope_c_interview, shipped.slope_c_interview, epsilon = 1e-3);
            assert_abs_diff_eq!(fresh.slope_c_accept, shipped.slope_c_accept, epsilon = 1e-3);
            assert_abs_diff_eq!(
                fresh.in_state_bonus_interview,
                shipped.in_state_bonus_interview,
                epsilon = 1e-3
            );
        }
    }

    #[test]
    fn public_schools_with_in_state_preference_get_larger_bonus() {
        let catalog = Catalog::builtin().unwrap();
        let public = catalog.params("sutter-state").unwrap();
        let private = catalog.params("bayshore-med").unwrap();
        assert!(public.in_state_bonus_interview > 0.5);
        assert_abs_diff_eq!(private.in_state_bonus_interview, 0.1);
        assert_abs_diff_eq!(
            public.in_state_bonus_accept,
            0.3 * public.in_state_bonus_interview,
            epsilon = 1e-6
        );
    }

    #[test]
    fn shrinkage_controls_pooling_toward_tier_mean() {
        let catalog = Catalog::builtin().unwrap();
        let scorer = CompetitivenessScorer::builtin();
        let settings = CalibrationSettings {
            shrinkage: 1.0,
            ..CalibrationSettings::default()
        };
        let pooled = calibrate_school_params(catalog.schools(), &scorer, &settings);
        let a = pooled.get("halden-med").unwrap().slope_c_interview;
        let b = pooled.get("lakemont-med").unwrap().slope_c_interview;
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);

        let unpooled = calibrate_school_params(
            catalog.schools(),
            &scorer,
            &CalibrationSettings {
                shrinkage: 0.0,
                ..CalibrationSettings::default()
            },
        );
        let a = unpooled.get("halden-med").unwrap().slope_c_interview;
        let b = unpooled.get("lakemont-med").unwrap().slope_c_interview;
        assert!((a - b).abs() > 1e-6);
    }

    #[test]
    fn calibrated_rates_track_observed_rates() {
        let catalog = Catalog::builtin().unwrap();
        let scorer = CompetitivenessScorer::builtin();
        let report = audit_school_params(&catalog, &scorer);
        assert_eq!(report.checked, 16);
        assert!(report.is_clean());
        assert_eq!(report.warnings().count(), 0);
    }

    #[test]
    fn audit_flags_bad_parameters() {
        let catalog = Catalog::builtin().unwrap();
        let scorer = CompetitivenessScorer::builtin();
        let mut table = catalog.param_table().clone();
        let mut broken = *table.get("cedar-med").unwrap();
        broken.slope_c_interview = -0.2;
        table.insert("cedar-med", broken);
        let mut generous = *table.get("eastgate-med").unwrap();
        generous.in_state_bonus_interview = 1.5;
        table.insert("eastgate-med", generous);
        table.params.remove("meridian-med");

        let report = audit_school_params(&catalog.with_params(table).unwrap(), &scorer);
        assert!(!report.is_clean());
        assert!(report.errors().any(|i| i.school_id == "cedar-med"));
        assert!(report.warnings().any(|i| i.school_id == "eastgate-med"));
        assert!(report.warnings().any(|i| i.school_id == "meridian-med"));
        assert_eq!(report.checked, 15);
    }

    #[test]
    fn missing_counts_fall_back_to_defaults() {
        let record = SchoolRecord {
            id: "new-school".into(),
            name: "New School".into(),
            state: "OR".into(),
            is_public: true,
            tier: 3,
            gpa: PercentileLadder::median_only(3.7),
            mcat: PercentileLadder::median_only(509.0),
            applicants: 0,
            interviewed: 0,
            accepted: 0,
            pct_in_state_matriculants: 0.7,
            mission: MissionFeatures::default(),
        };
        let scorer = CompetitivenessScorer::builtin();
        let table = calibrate_school_params(
            std::slice::from_ref(&record),
            &scorer,
            &CalibrationSettings {
                shrinkage: 0.0,
                ..CalibrationSettings::default()
            },
        );
        let p = table.get("new-school").unwrap();
        assert!(p.slope_c_interview >= 0.3 && p.slope_c_interview <= 2.0);
        assert!(p.in_state_bonus_interview >= 0.2);
        let gpa = record.gpa.resolve_gpa();
        let mcat = record.mcat.resolve_mcat();
        let c25 = scorer.competitiveness(gpa.p25, mcat.p25);
        assert_abs_diff_eq!(modeled_interview_rate(p, c25, false), 0.10, epsilon = 1e-9);
        assert!(modeled_interview_rate(p, c25, true) > 0.10);
    }
}
