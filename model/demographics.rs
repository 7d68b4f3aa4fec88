//! Logit-scale demographic and mission-fit adjustments.
//!
//! Effects are stored as aggregate log-odds for the whole admission process;
//! each stage receives `stage_share` of the aggregate so the product of the
//! two stages carries the full effect.

use crate::types::{ApplicantProfile, MissionFeatures, RaceEthnicity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaceEffects {
    pub black: f64,
    pub hispanic: f64,
    pub asian: f64,
    pub american_indian: f64,
    pub pacific_islander: f64,
}

impl Default for RaceEffects {
    fn default() -> Self {
        Self {
            black: 7.0f64.ln(),
            hispanic: 4.0f64.ln(),
            asian: 0.85f64.ln(),
            american_indian: URM_AGGREGATE,
            pacific_islander: URM_AGGREGATE,
        }
    }
}

impl RaceEffects {
    fn effect(&self, race: RaceEthnicity) -> f64 {
        match race {
            RaceEthnicity::BlackOrAfricanAmerican => self.black,
            RaceEthnicity::HispanicOrLatino => self.hispanic,
            RaceEthnicity::Asian => self.asian,
            RaceEthnicity::AmericanIndianOrAlaskaNative => self.american_indian,
            RaceEthnicity::NativeHawaiianOrPacificIslander => self.pacific_islander,
            RaceEthnicity::White | RaceEthnicity::Multiracial | RaceEthnicity::Other => 0.0,
        }
    }
}

const URM_AGGREGATE: f64 = 1.70;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemographicEffects {
    /// Applied when the URM flag is set and no race-specific effect is known.
    pub urm: f64,
    pub race: RaceEffects,
    pub first_generation: f64,
    pub disadvantaged: f64,
    pub rural_background: f64,
    pub stage_share: f64,
}

impl Default for DemographicEffects {
    fn default() -> Self {
        Self {
            urm: URM_AGGREGATE,
            race: RaceEffects::default(),
            first_generation: 0.15,
            disadvantaged: 0.22,
            rural_background: 0.20,
            stage_share: 0.5,
        }
    }
}

/// Extra log-odds when an applicant trait matches a school's mission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissionEffects {
    pub rural: f64,
    pub research: f64,
    pub hbcu_black: f64,
    pub diversity_urm: f64,
    pub primary_care: f64,
}

impl Default for MissionEffects {
    fn default() -> Self {
        Self {
            rural: 0.40,
            research: 0.20,
            hbcu_black: 0.50,
            diversity_urm: 0.25,
            primary_care: 0.15,
        }
    }
}

/// Per-stage demographic adjustment, summed in logit space.
pub fn demographic_effect(profile: &ApplicantProfile, effects: &DemographicEffects) -> f64 {
    let identity = match profile.race_ethnicity {
        Some(race) => {
            let specific = effects.race.effect(race);
            // A URM flag without a race-specific effect still counts.
            if specific == 0.0 && profile.is_urm {
                effects.urm
            } else {
                specific
            }
        }
        None if profile.is_urm => effects.urm,
        None => 0.0,
    };

    let mut total = identity;
    if profile.is_first_gen {
        total += effects.first_generation;
    }
    if profile.is_disadvantaged {
        total += effects.disadvantaged;
    }
    if profile.is_rural {
        total += effects.rural_background;
    }
    effects.stage_share * total
}

/// Interview-stage mission fit between an applicant and a school.
pub fn mission_fit_effect(
    profile: &ApplicantProfile,
    mission: &MissionFeatures,
    effects: &MissionEffects,
) -> f64 {
    let mut total = 0.0;
    if mission.rural && profile.is_rural {
        total += effects.rural;
    }
    if mission.research_intensive && profile.has_strong_research() {
        total += effects.research;
    }
    if mission.historically_underrepresented_serving && profile.is_black() {
        total += effects.hbcu_black;
    }
    if mission.diversity_focused && profile.counts_as_urm() {
        total += effects.diversity_urm;
    }
    if mission.primary_care && profile.primary_care_interest {
        total += effects.primary_care;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::ApplicantBuilder;
    use approx::assert_abs_diff_eq;

    #[test]
    fn no_flags_means_no_effect() {
        let profile = ApplicantBuilder::new().build();
        assert_eq!(demographic_effect(&profile, &DemographicEffects::default()), 0.0);
    }

    #[test]
    fn urm_flag_uses_aggregate_share() {
        let profile = ApplicantBuilder::new().urm(true).build();
        let effect = demographic_effect(&profile, &DemographicEffects::default());
        assert_abs_diff_eq!(effect, 0.85, epsilon = 1e-12);
    }

    #[test]
    fn known_race_replaces_aggregate() {
        let effects = DemographicEffects::default();
        let black = ApplicantBuilder::new()
            .urm(true)
            .race_ethnicity(RaceEthnicity::BlackOrAfricanAmerican)
            .build();
        assert_abs_diff_eq!(
            demographic_effect(&black, &effects),
            0.5 * 7.0f64.ln(),
            epsilon = 1e-12
        );

        let asian = ApplicantBuilder::new()
            .race_ethnicity(RaceEthnicity::Asian)
            .build();
        assert!(demographic_effect(&asian, &effects) < 0.0);

        let multiracial_urm = ApplicantBuilder::new()
            .urm(true)
            .race_ethnicity(RaceEthnicity::Multiracial)
            .build();
        assert_abs_diff_eq!(
            demographic_effect(&multiracial_urm, &effects),
            0.85,
            epsilon = 1e-12
        );
    }

    #[test]
    fn socioeconomic_flags_add_up() {
        let profile = ApplicantBuilder::new()
            .first_gen(true)
            .disadvantaged(true)
            .rural(true)
            .build();
        let effect = demographic_effect(&profile, &DemographicEffects::default());
        assert_abs_diff_eq!(effect, 0.5 * (0.15 + 0.22 + 0.20), epsilon = 1e-12);
    }

    #[test]
    fn mission_fit_requires_both_sides() {
        let effects = MissionEffects::default();
        let rural_school = MissionFeatures {
            rural: true,
            primary_care: true,
            ..MissionFeatures::default()
        };
        let urban_applicant = ApplicantBuilder::new().build();
        let rural_applicant = ApplicantBuilder::new()
            .rural(true)
            .primary_care_interest(true)
            .build();
        assert_eq!(mission_fit_effect(&urban_applicant, &rural_school, &effects), 0.0);
        assert_abs_diff_eq!(
            mission_fit_effect(&rural_applicant, &rural_school, &effects),
            0.55,
            epsilon = 1e-12
        );
        assert_eq!(
            mission_fit_effect(&rural_applicant, &MissionFeatures::default(), &effects),
            0.0
        );
    }

    #[test]
    fn research_and_identity_missions() {
        let effects = MissionEffects::default();
        let school = MissionFeatures {
            research_intensive: true,
            historically_underrepresented_serving: true,
            diversity_focused: true,
            ..MissionFeatures::default()
        };
        let applicant = ApplicantBuilder::new()
            .publications(1, 0, 0)
            .race_ethnicity(RaceEthnicity::BlackOrAfricanAmerican)
            .build();
        assert_abs_diff_eq!(
            mission_fit_effect(&applicant, &school, &effects),
            0.20 + 0.50 + 0.25,
            epsilon = 1e-12
        );
    }
}
