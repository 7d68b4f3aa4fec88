//! Bounded, diminishing-return contributions of activities and publications.
//!
//! Every domain saturates toward a finite ceiling, so the aggregate can be fed
//! into a logistic term without ever dominating it.

use crate::types::{ApplicantProfile, GpaTrend, Publications};
use serde::{Deserialize, Serialize};

/// Returned by a `Hard` threshold when the minimum is not met.
pub const HARD_THRESHOLD_SENTINEL: f64 = -2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaturationParams {
    /// Hours at which ~63% of `alpha` is reached.
    pub tau: f64,
    /// Asymptotic ceiling on the logit scale.
    pub alpha: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    #[default]
    None,
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub saturation: SaturationParams,
    /// Minimum magnitude expected of an applicant. Only read by `Soft` and `Hard`.
    pub minimum: f64,
    pub mode: ThresholdMode,
    /// Subtracted under `Soft` mode when below `minimum`.
    pub penalty: f64,
}

impl DomainConfig {
    const fn unthresholded(tau: f64, alpha: f64) -> Self {
        Self {
            saturation: SaturationParams { tau, alpha },
            minimum: 0.0,
            mode: ThresholdMode::None,
            penalty: 0.0,
        }
    }

    const fn with_minimum(tau: f64, alpha: f64, minimum: f64, penalty: f64) -> Self {
        Self {
            saturation: SaturationParams { tau, alpha },
            minimum,
            mode: ThresholdMode::None,
            penalty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PublicationParams {
    pub first_author_weight: f64,
    pub other_weight: f64,
    pub poster_weight: f64,
    /// Each successive item in a class is worth `decay` times the previous one.
    pub decay: f64,
}

impl Default for PublicationParams {
    fn default() -> Self {
        Self {
            first_author_weight: 0.06,
            other_weight: 0.03,
            poster_weight: 0.015,
            decay: 0.5,
        }
    }
}

/// The experience profile the calibrated school intercepts refer to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceExperience {
    pub clinical_hours: f64,
    pub research_hours: f64,
    pub volunteer_hours: f64,
    pub shadowing_hours: f64,
    pub leadership_count: u32,
    pub publications: Publications,
}

impl Default for ReferenceExperience {
    fn default() -> Self {
        Self {
            clinical_hours: 400.0,
            research_hours: 500.0,
            volunteer_hours: 200.0,
            shadowing_hours: 40.0,
            leadership_count: 2,
            publications: Publications {
                first_author: 0,
                other: 0,
                posters: 1,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperienceConfig {
    pub clinical: DomainConfig,
    pub research: DomainConfig,
    pub volunteer: DomainConfig,
    pub shadowing: DomainConfig,
    pub leadership: DomainConfig,
    pub publications: PublicationParams,
    pub trend_upward: f64,
    pub trend_downward: f64,
    pub reference: ReferenceExperience,
}

impl Default for ExperienceConfig {
    fn default() -> Self {
        Self {
            clinical: DomainConfig::with_minimum(500.0, 0.20, 100.0, 0.3),
            research: DomainConfig::unthresholded(800.0, 0.15),
            volunteer: DomainConfig::unthresholded(300.0, 0.10),
            shadowing: DomainConfig::with_minimum(40.0, 0.08, 20.0, 0.15),
            leadership: DomainConfig::unthresholded(2.0, 0.07),
            publications: PublicationParams::default(),
            trend_upward: 0.10,
            trend_downward: -0.15,
            reference: ReferenceExperience::default(),
        }
    }
}

impl ExperienceConfig {
    /// Sets the threshold mode of the clinical domain.
    pub fn with_clinical_mode(mut self, mode: ThresholdMode) -> Self {
        self.clinical.mode = mode;
        self
    }

    /// Sets the threshold mode of the shadowing domain.
    pub fn with_shadowing_mode(mut self, mode: ThresholdMode) -> Self {
        self.shadowing.mode = mode;
        self
    }

    /// Supremum of `calculate_experience_contribution` over all profiles.
    pub fn upper_bound(&self) -> f64 {
        let domains = [
            &self.clinical,
            &self.research,
            &self.volunteer,
            &self.shadowing,
            &self.leadership,
        ];
        let activity: f64 = domains.iter().map(|d| d.saturation.alpha.max(0.0)).sum();
        let p = &self.publications;
        let series_limit = |w: f64| w.max(0.0) / (1.0 - p.decay.clamp(0.0, 0.99));
        activity
            + series_limit(p.first_author_weight)
            + series_limit(p.other_weight)
            + series_limit(p.poster_weight)
    }
}

/// `alpha * (1 - exp(-hours / tau))`, and exactly 0 for non-positive hours.
pub fn saturating_contribution(hours: f64, params: SaturationParams) -> f64 {
    if hours.is_nan() || hours <= 0.0 || params.tau.is_nan() || params.tau <= 0.0 {
        return 0.0;
    }
    if hours.is_infinite() {
        return params.alpha;
    }
    params.alpha * -(-hours / params.tau).exp_m1()
}

/// Saturating value with an optional minimum-magnitude check.
pub fn contribution_with_threshold(
    hours: f64,
    params: SaturationParams,
    mode: ThresholdMode,
    minimum: f64,
    penalty: f64,
) -> f64 {
    let value = saturating_contribution(hours, params);
    let below_minimum = hours.is_nan() || hours < minimum;
    match mode {
        ThresholdMode::None => value,
        ThresholdMode::Soft if below_minimum => value - penalty.abs(),
        ThresholdMode::Soft => value,
        ThresholdMode::Hard if below_minimum => HARD_THRESHOLD_SENTINEL,
        ThresholdMode::Hard => value,
    }
}

fn geometric_series(weight: f64, decay: f64, count: u32) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let decay = decay.clamp(0.0, 0.99);
    weight * (1.0 - decay.powi(count.min(i32::MAX as u32) as i32)) / (1.0 - decay)
}

/// Publication value: first-author > other-author > poster, with each extra
/// item in a class worth `decay` times the one before it.
pub fn publication_contribution(pubs: &Publications, params: &PublicationParams) -> f64 {
    geometric_series(params.first_author_weight, params.decay, pubs.first_author)
        + geometric_series(params.other_weight, params.decay, pubs.other)
        + geometric_series(params.poster_weight, params.decay, pubs.posters)
}

/// Per-domain values that make up the aggregate contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperienceBreakdown {
    pub clinical: f64,
    pub research: f64,
    pub volunteer: f64,
    pub shadowing: f64,
    pub leadership: f64,
    pub publications: f64,
    /// Set when a `Hard` domain missed its minimum.
    pub hard_threshold_failed: bool,
}

impl ExperienceBreakdown {
    pub fn total(&self) -> f64 {
        if self.hard_threshold_failed {
            return HARD_THRESHOLD_SENTINEL;
        }
        self.clinical
            + self.research
            + self.volunteer
            + self.shadowing
            + self.leadership
            + self.publications
    }
}

fn domain_value(hours: f64, domain: &DomainConfig) -> f64 {
    contribution_with_threshold(
        hours,
        domain.saturation,
        domain.mode,
        domain.minimum,
        domain.penalty,
    )
}

fn misses_hard_minimum(hours: f64, domain: &DomainConfig) -> bool {
    domain.mode == ThresholdMode::Hard && (hours.is_nan() || hours < domain.minimum)
}

pub fn experience_breakdown(
    profile: &ApplicantProfile,
    config: &ExperienceConfig,
) -> ExperienceBreakdown {
    let leadership = profile.leadership_count as f64;
    let hard_threshold_failed = misses_hard_minimum(profile.clinical_hours, &config.clinical)
        || misses_hard_minimum(profile.research_hours, &config.research)
        || misses_hard_minimum(profile.volunteer_hours, &config.volunteer)
        || misses_hard_minimum(profile.shadowing_hours, &config.shadowing)
        || misses_hard_minimum(leadership, &config.leadership);

    ExperienceBreakdown {
        clinical: domain_value(profile.clinical_hours, &config.clinical),
        research: domain_value(profile.research_hours, &config.research),
        volunteer: domain_value(profile.volunteer_hours, &config.volunteer),
        shadowing: domain_value(profile.shadowing_hours, &config.shadowing),
        leadership: domain_value(leadership, &config.leadership),
        publications: publication_contribution(&profile.publications, &config.publications),
        hard_threshold_failed,
    }
}

/// Sum of all domain contributions.
///
/// Bounded above by `config.upper_bound()`. A `Hard` domain below its minimum
/// replaces the whole sum with `HARD_THRESHOLD_SENTINEL`.
pub fn calculate_experience_contribution(
    profile: &ApplicantProfile,
    config: &ExperienceConfig,
) -> f64 {
    experience_breakdown(profile, config).total()
}

/// Contribution of the reference applicant, with thresholds ignored.
pub fn reference_contribution(config: &ExperienceConfig) -> f64 {
    let r = &config.reference;
    let plain = |hours: f64, d: &DomainConfig| saturating_contribution(hours, d.saturation);
    plain(r.clinical_hours, &config.clinical)
        + plain(r.research_hours, &config.research)
        + plain(r.volunteer_hours, &config.volunteer)
        + plain(r.shadowing_hours, &config.shadowing)
        + plain(r.leadership_count as f64, &config.leadership)
        + publication_contribution(&r.publications, &config.publications)
}

pub fn trend_adjustment(trend: Option<GpaTrend>, config: &ExperienceConfig) -> f64 {
    match trend {
        Some(GpaTrend::Upward) => config.trend_upward,
        Some(GpaTrend::Downward) => config.trend_downward,
        Some(GpaTrend::Flat) | None => 0.0,
    }
}

/// Logit-scale experience term of the two-stage model: the aggregate
/// contribution relative to the reference applicant, plus the GPA trend.
pub fn experience_effect(profile: &ApplicantProfile, config: &ExperienceConfig) -> f64 {
    calculate_experience_contribution(profile, config) - reference_contribution(config)
        + trend_adjustment(profile.gpa_trend, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::ApplicantBuilder;
    use approx::assert_abs_diff_eq;

    const PARAMS: SaturationParams = SaturationParams {
        tau: 500.0,
        alpha: 0.3,
    };

    #[test]
    fn zero_and_negative_hours_contribute_nothing() {
        assert_eq!(saturating_contribution(0.0, PARAMS), 0.0);
        assert_eq!(saturating_contribution(-25.0, PARAMS), 0.0);
        assert_eq!(saturating_contribution(f64::NAN, PARAMS), 0.0);
    }

    #[test]
    fn reaches_63_percent_at_tau() {
        let v = saturating_contribution(500.0, PARAMS);
        assert_abs_diff_eq!(v / 0.3, 1.0 - (-1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn increasing_concave_and_bounded() {
        let mut previous = 0.0;
        let mut previous_step = f64::INFINITY;
        for i in 1..=60 {
            let v = saturating_contribution(i as f64 * 50.0, PARAMS);
            let step = v - previous;
            assert!(step > 0.0);
            assert!(step < previous_step);
            assert!(v < 0.3);
            previous = v;
            previous_step = step;
        }
        assert_eq!(saturating_contribution(f64::INFINITY, PARAMS), 0.3);
    }

    #[test]
    fn threshold_modes() {
        let none = contribution_with_threshold(50.0, PARAMS, ThresholdMode::None, 100.0, 0.4);
        let soft = contribution_with_threshold(50.0, PARAMS, ThresholdMode::Soft, 100.0, 0.4);
        let hard = contribution_with_threshold(50.0, PARAMS, ThresholdMode::Hard, 100.0, 0.4);
        assert_abs_diff_eq!(none, saturating_contribution(50.0, PARAMS));
        assert_abs_diff_eq!(soft, none - 0.4, epsilon = 1e-12);
        assert_eq!(hard, HARD_THRESHOLD_SENTINEL);

        let above = contribution_with_threshold(150.0, PARAMS, ThresholdMode::Hard, 100.0, 0.4);
        assert_abs_diff_eq!(above, saturating_contribution(150.0, PARAMS));
    }

    #[test]
    fn publications_rank_authorship_classes() {
        let params = PublicationParams::default();
        let one = |first_author, other, posters| {
            publication_contribution(
                &Publications {
                    first_author,
                    other,
                    posters,
                },
                &params,
            )
        };
        assert!(one(1, 0, 0) > one(0, 1, 0));
        assert!(one(0, 1, 0) > one(0, 0, 1));
        assert_eq!(one(0, 0, 0), 0.0);
    }

    #[test]
    fn publications_diminish_but_keep_increasing() {
        let params = PublicationParams::default();
        let value = |n| {
            publication_contribution(
                &Publications {
                    first_author: n,
                    other: 0,
                    posters: 0,
                },
                &params,
            )
        };
        let mut previous = 0.0;
        let mut previous_step = f64::INFINITY;
        for n in 1..=20 {
            let v = value(n);
            let step = v - previous;
            assert!(step > 0.0, "n = {n}");
            assert!(step < previous_step);
            previous = v;
            previous_step = step;
        }
        assert!(value(10_000) <= 2.0 * params.first_author_weight + 1e-12);
    }

    #[test]
    fn aggregate_stays_bounded_for_huge_inputs() {
        let config = ExperienceConfig::default();
        let profile = ApplicantBuilder::new()
            .clinical_hours(1e9)
            .research_hours(1e12)
            .volunteer_hours(f64::MAX)
            .shadowing_hours(1e7)
            .leadership_count(u32::MAX)
            .publications(u32::MAX, u32::MAX, u32::MAX)
            .build();
        let total = calculate_experience_contribution(&profile, &config);
        assert!(total.is_finite());
        assert!(total <= config.upper_bound() + 1e-12);
        assert!(total > 0.5 * config.upper_bound());
    }

    #[test]
    fn hard_clinical_threshold_overrides_everything() {
        let config = ExperienceConfig::default().with_clinical_mode(ThresholdMode::Hard);
        let profile = ApplicantBuilder::new()
            .clinical_hours(0.0)
            .research_hours(5000.0)
            .publications(10, 10, 10)
            .build();
        assert!(calculate_experience_contribution(&profile, &config) <= -2.0);
        assert!(experience_effect(&profile, &config) <= -2.0);
    }

    #[test]
    fn reference_profile_has_zero_effect() {
        let config = ExperienceConfig::default();
        let profile = ApplicantBuilder::new().typical_experience().build();
        assert_abs_diff_eq!(experience_effect(&profile, &config), 0.0, epsilon = 1e-12);

        let upward = ApplicantBuilder::new()
            .typical_experience()
            .gpa_trend(GpaTrend::Upward)
            .build();
        assert_abs_diff_eq!(experience_effect(&upward, &config), 0.10, epsilon = 1e-12);
    }
}
