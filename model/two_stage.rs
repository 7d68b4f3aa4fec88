//! Per-school interview and acceptance probabilities.
//!
//! ```text
//! P(interview)          = sigmoid(a_i + b_i*C + bonus_i*[resident] + demo + mission + exp)
//! P(accept | interview) = sigmoid(a_a + b_a*C + bonus_a*[resident] + demo + exp)
//! P(accept)             = P(interview) * P(accept | interview)
//! ```
//!
//! Every adjustment enters on the logit scale, so probabilities stay inside
//! (0, 1) whatever the inputs.

use crate::catalog::Catalog;
use crate::competitiveness::CompetitivenessScorer;
use crate::demographics::{DemographicEffects, MissionEffects, demographic_effect, mission_fit_effect};
use crate::experience::{ExperienceConfig, experience_effect};
use crate::link::sigmoid;
use crate::types::{
    ApplicantProfile, PredictionSample, RandomEffects, SchoolModelParams, SchoolRecord,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Below this `p_accept` a school is a reach.
pub const REACH_UPPER: f64 = 0.15;
/// Below this `p_accept` a school is a target.
pub const TARGET_UPPER: f64 = 0.30;
/// Below this `p_accept` a school is likely (untiered form).
pub const LIKELY_UPPER: f64 = 0.55;
/// Likely/safety cut by tier. Tier 1 schools need near-certainty to count as safe.
pub const TIERED_LIKELY_UPPER: [f64; 4] = [0.80, 0.70, 0.60, 0.55];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Reach,
    Target,
    Likely,
    Safety,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reach => "reach",
            Self::Target => "target",
            Self::Likely => "likely",
            Self::Safety => "safety",
        }
    }
}

fn categorize_with(p_accept: f64, likely_upper: f64) -> Category {
    if p_accept.is_nan() || p_accept < REACH_UPPER {
        Category::Reach
    } else if p_accept < TARGET_UPPER {
        Category::Target
    } else if p_accept < likely_upper {
        Category::Likely
    } else {
        Category::Safety
    }
}

/// Fixed-threshold category of an acceptance probability.
pub fn categorize_school(p_accept: f64) -> Category {
    categorize_with(p_accept, LIKELY_UPPER)
}

/// Category with the likely/safety cut raised for selective tiers.
pub fn categorize_for_tier(p_accept: f64, tier: u8) -> Category {
    let idx = (tier.clamp(1, 4) - 1) as usize;
    categorize_with(p_accept, TIERED_LIKELY_UPPER[idx])
}

/// Effect sizes used by the two-stage model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    pub experience: ExperienceConfig,
    pub demographics: DemographicEffects,
    pub mission: MissionEffects,
}

/// Logit-scale contributions to the interview stage of one school.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub competitiveness: f64,
    pub experience: f64,
    pub demographic: f64,
    pub residency: f64,
    pub mission_fit: f64,
}

/// School-independent terms of one applicant, computed once per list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplicantTerms {
    pub competitiveness: f64,
    pub experience: f64,
    pub demographic: f64,
}

/// Applicant-and-school terms that do not depend on calibrated parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchoolTerms {
    pub applicant: ApplicantTerms,
    pub resident: bool,
    pub mission_fit: f64,
}

impl SchoolTerms {
    /// Both stage probabilities under `params`, shifted by `effects`.
    pub fn sample(&self, params: &SchoolModelParams, effects: RandomEffects) -> PredictionSample {
        let a = &self.applicant;
        let resident = if self.resident { 1.0 } else { 0.0 };
        let eta_interview = params.intercept_interview
            + params.slope_c_interview * a.competitiveness
            + params.in_state_bonus_interview * resident
            + a.demographic
            + self.mission_fit
            + a.experience;
        let eta_accept = params.intercept_accept
            + params.slope_c_accept * a.competitiveness
            + params.in_state_bonus_accept * resident
            + a.demographic
            + a.experience;
        PredictionSample::from_stages(
            sigmoid(eta_interview + effects.u_file),
            sigmoid(eta_accept + effects.u_interview),
        )
    }

    fn factors(&self, params: &SchoolModelParams) -> FactorBreakdown {
        FactorBreakdown {
            competitiveness: params.slope_c_interview * self.applicant.competitiveness,
            experience: self.applicant.experience,
            demographic: self.applicant.demographic,
            residency: if self.resident {
                params.in_state_bonus_interview
            } else {
                0.0
            },
            mission_fit: self.mission_fit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolPrediction {
    pub school_id: String,
    pub school_name: String,
    pub tier: u8,
    pub sample: PredictionSample,
    pub category: Category,
    pub factors: FactorBreakdown,
}

impl SchoolPrediction {
    pub fn p_interview(&self) -> f64 {
        self.sample.p_interview()
    }

    pub fn p_accept_given_interview(&self) -> f64 {
        self.sample.p_accept_given_interview()
    }

    pub fn p_accept(&self) -> f64 {
        self.sample.p_accept()
    }
}

/// List-level view under the independence assumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListProbability {
    /// Known schools, sorted by descending `p_accept`.
    pub predictions: Vec<SchoolPrediction>,
    /// Requested ids that could not be predicted.
    pub omitted: Vec<String>,
    pub p_at_least_one: f64,
    pub expected_interviews: f64,
    pub expected_acceptances: f64,
}

/// `1 - prod(1 - p)` over independent acceptance chances.
pub fn p_at_least_one(p_accepts: impl IntoIterator<Item = f64>) -> f64 {
    let none = p_accepts
        .into_iter()
        .fold(1.0, |acc, p| acc * (1.0 - p.clamp(0.0, 1.0)));
    1.0 - none
}

/// The competitiveness scorer plus effect sizes: everything needed to turn an
/// applicant and a calibrated school into probabilities.
#[derive(Debug, Clone)]
pub struct AdmissionModel {
    pub scorer: CompetitivenessScorer,
    pub settings: ModelSettings,
}

impl AdmissionModel {
    pub fn new(scorer: CompetitivenessScorer, settings: ModelSettings) -> Self {
        Self { scorer, settings }
    }

    pub fn builtin() -> Self {
        Self::new(CompetitivenessScorer::builtin(), ModelSettings::default())
    }

    pub fn applicant_terms(&self, profile: &ApplicantProfile) -> ApplicantTerms {
        ApplicantTerms {
            competitiveness: self.scorer.competitiveness(profile.gpa, profile.mcat),
            experience: experience_effect(profile, &self.settings.experience),
            demographic: demographic_effect(profile, &self.settings.demographics),
        }
    }

    pub fn school_terms(
        &self,
        applicant: ApplicantTerms,
        profile: &ApplicantProfile,
        school: &SchoolRecord,
    ) -> SchoolTerms {
        SchoolTerms {
            applicant,
            resident: profile.resides_in(&school.state),
            mission_fit: mission_fit_effect(profile, &school.mission, &self.settings.mission),
        }
    }

    /// Prediction for a school whose record and parameters are at hand.
    pub fn predict_for(
        &self,
        profile: &ApplicantProfile,
        school: &SchoolRecord,
        params: &SchoolModelParams,
    ) -> SchoolPrediction {
        let terms = self.school_terms(self.applicant_terms(profile), profile, school);
        self.prediction_from_terms(&terms, school, params)
    }

    fn prediction_from_terms(
        &self,
        terms: &SchoolTerms,
        school: &SchoolRecord,
        params: &SchoolModelParams,
    ) -> SchoolPrediction {
        let sample = terms.sample(params, RandomEffects::ZERO);
        SchoolPrediction {
            school_id: school.id.clone(),
            school_name: school.name.clone(),
            tier: school.tier,
            category: categorize_for_tier(sample.p_accept(), school.tier),
            factors: terms.factors(params),
            sample,
        }
    }

    /// Prediction for one school id; `None` when the catalog cannot predict it.
    pub fn predict_school(
        &self,
        profile: &ApplicantProfile,
        school_id: &str,
        catalog: &Catalog,
    ) -> Option<SchoolPrediction> {
        let (school, params) = catalog.lookup(school_id)?;
        Some(self.predict_for(profile, school, params))
    }

    /// Predictions for a list of ids, skipping unknown schools, sorted by
    /// descending `p_accept` (ties broken by id).
    pub fn calculate_list_probability<I>(
        &self,
        profile: &ApplicantProfile,
        school_ids: I,
        catalog: &Catalog,
    ) -> ListProbability
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let applicant = self.applicant_terms(profile);
        let mut predictions = Vec::new();
        let mut omitted = Vec::new();
        for id in school_ids {
            let id = id.as_ref();
            match catalog.lookup(id) {
                Some((school, params)) => {
                    let terms = self.school_terms(applicant, profile, school);
                    predictions.push(self.prediction_from_terms(&terms, school, params));
                }
                None => {
                    log::debug!("Omitting '{}': no calibrated parameters.", id);
                    omitted.push(id.to_string());
                }
            }
        }
        predictions.sort_by(|a, b| {
            b.p_accept()
                .partial_cmp(&a.p_accept())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.school_id.cmp(&b.school_id))
        });

        ListProbability {
            p_at_least_one: p_at_least_one(predictions.iter().map(SchoolPrediction::p_accept)),
            expected_interviews: predictions.iter().map(SchoolPrediction::p_interview).sum(),
            expected_acceptances: predictions.iter().map(SchoolPrediction::p_accept).sum(),
            predictions,
            omitted,
        }
    }

    /// Predictions for every predictable school in the catalog.
    pub fn predict_catalog(&self, profile: &ApplicantProfile, catalog: &Catalog) -> ListProbability {
        self.calculate_list_probability(profile, catalog.ids(), catalog)
    }
}

/// Interview probability of an out-of-state applicant with competitiveness
/// `c` and no other adjustments.
pub fn typical_interview_rate(params: &SchoolModelParams, c: f64) -> f64 {
    sigmoid(params.intercept_interview + params.slope_c_interview * c)
}
