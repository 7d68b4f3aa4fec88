//! Builders and reference applicant profiles.
//!
//! The reference profiles are the literal scenarios the validation harness
//! runs; tests and the CLI demo use the same builder.

use crate::experience::ReferenceExperience;
use crate::types::{ApplicantProfile, GpaTrend, Publications, RaceEthnicity};

/// Builder for applicant profiles with neutral defaults: reference stats
/// (3.75 / 512), no activities, no flags, resident of Texas.
#[derive(Debug, Clone)]
pub struct ApplicantBuilder {
    profile: ApplicantProfile,
}

impl Default for ApplicantBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicantBuilder {
    pub fn new() -> Self {
        Self {
            profile: ApplicantProfile {
                gpa: 3.75,
                mcat: 512.0,
                gpa_trend: None,
                clinical_hours: 0.0,
                research_hours: 0.0,
                volunteer_hours: 0.0,
                shadowing_hours: 0.0,
                leadership_count: 0,
                publications: Publications::default(),
                state_of_residence: "TX".to_string(),
                race_ethnicity: None,
                is_urm: false,
                is_first_gen: false,
                is_disadvantaged: false,
                is_rural: false,
                primary_care_interest: false,
            },
        }
    }

    pub fn gpa(mut self, gpa: f64) -> Self {
        self.profile.gpa = gpa;
        self
    }

    pub fn mcat(mut self, mcat: f64) -> Self {
        self.profile.mcat = mcat;
        self
    }

    pub fn stats(self, gpa: f64, mcat: f64) -> Self {
        self.gpa(gpa).mcat(mcat)
    }

    pub fn gpa_trend(mut self, trend: GpaTrend) -> Self {
        self.profile.gpa_trend = Some(trend);
        self
    }

    pub fn clinical_hours(mut self, hours: f64) -> Self {
        self.profile.clinical_hours = hours;
        self
    }

    pub fn research_hours(mut self, hours: f64) -> Self {
        self.profile.research_hours = hours;
        self
    }

    pub fn volunteer_hours(mut self, hours: f64) -> Self {
        self.profile.volunteer_hours = hours;
        self
    }

    pub fn shadowing_hours(mut self, hours: f64) -> Self {
        self.profile.shadowing_hours = hours;
        self
    }

    pub fn leadership_count(mut self, count: u32) -> Self {
        self.profile.leadership_count = count;
        self
    }

    pub fn publications(mut self, first_author: u32, other: u32, posters: u32) -> Self {
        self.profile.publications = Publications {
            first_author,
            other,
            posters,
        };
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.profile.state_of_residence = state.to_string();
        self
    }

    pub fn race_ethnicity(mut self, race: RaceEthnicity) -> Self {
        self.profile.race_ethnicity = Some(race);
        self
    }

    pub fn urm(mut self, flag: bool) -> Self {
        self.profile.is_urm = flag;
        self
    }

    pub fn first_gen(mut self, flag: bool) -> Self {
        self.profile.is_first_gen = flag;
        self
    }

    pub fn disadvantaged(mut self, flag: bool) -> Self {
        self.profile.is_disadvantaged = flag;
        self
    }

    pub fn rural(mut self, flag: bool) -> Self {
        self.profile.is_rural = flag;
        self
    }

    pub fn primary_care_interest(mut self, flag: bool) -> Self {
        self.profile.primary_care_interest = flag;
        self
    }

    /// Activities of the reference applicant the school intercepts describe.
    pub fn typical_experience(mut self) -> Self {
        let r = ReferenceExperience::default();
        self.profile.clinical_hours = r.clinical_hours;
        self.profile.research_hours = r.research_hours;
        self.profile.volunteer_hours = r.volunteer_hours;
        self.profile.shadowing_hours = r.shadowing_hours;
        self.profile.leadership_count = r.leadership_count;
        self.profile.publications = r.publications;
        self
    }

    /// Activity magnitudes far past every saturation scale.
    pub fn saturated_experience(self) -> Self {
        self.clinical_hours(100_000.0)
            .research_hours(100_000.0)
            .volunteer_hours(100_000.0)
            .shadowing_hours(100_000.0)
            .leadership_count(100)
            .publications(50, 50, 50)
    }

    pub fn build(self) -> ApplicantProfile {
        self.profile
    }
}

/// Perfect stats with strong, well-rounded activities.
pub fn perfect_applicant() -> ApplicantProfile {
    ApplicantBuilder::new()
        .stats(4.0, 528.0)
        .clinical_hours(2000.0)
        .research_hours(2000.0)
        .volunteer_hours(800.0)
        .shadowing_hours(100.0)
        .leadership_count(6)
        .publications(2, 2, 3)
        .build()
}

/// Median stats and the reference activity profile.
pub fn average_applicant() -> ApplicantProfile {
    ApplicantBuilder::new()
        .stats(3.75, 512.0)
        .typical_experience()
        .build()
}

/// Low stats and thin activities.
pub fn weak_applicant() -> ApplicantProfile {
    ApplicantBuilder::new()
        .stats(2.9, 496.0)
        .clinical_hours(50.0)
        .volunteer_hours(40.0)
        .shadowing_hours(8.0)
        .build()
}

/// Ceiling stats, saturated activities, underrepresented status, upward trend.
pub fn top_urm_applicant() -> ApplicantProfile {
    ApplicantBuilder::new()
        .stats(4.0, 528.0)
        .saturated_experience()
        .urm(true)
        .gpa_trend(GpaTrend::Upward)
        .build()
}
