// --- Public Data Structures ---
// Inputs supplied by the applicant and catalog collaborators, and the small
// records that flow between the model, simulator and uncertainty layers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpaTrend {
    Upward,
    Flat,
    Downward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceEthnicity {
    AmericanIndianOrAlaskaNative,
    Asian,
    BlackOrAfricanAmerican,
    HispanicOrLatino,
    NativeHawaiianOrPacificIslander,
    White,
    Multiracial,
    Other,
}

impl RaceEthnicity {
    /// Groups counted as underrepresented in medicine.
    pub fn is_underrepresented(self) -> bool {
        matches!(
            self,
            Self::AmericanIndianOrAlaskaNative
                | Self::BlackOrAfricanAmerican
                | Self::HispanicOrLatino
                | Self::NativeHawaiianOrPacificIslander
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Publications {
    #[serde(default)]
    pub first_author: u32,
    #[serde(default)]
    pub other: u32,
    #[serde(default)]
    pub posters: u32,
}

/// One applicant, as supplied per request. Never mutated by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub gpa: f64,
    pub mcat: f64,
    #[serde(default)]
    pub gpa_trend: Option<GpaTrend>,
    #[serde(default)]
    pub clinical_hours: f64,
    #[serde(default)]
    pub research_hours: f64,
    #[serde(default)]
    pub volunteer_hours: f64,
    #[serde(default)]
    pub shadowing_hours: f64,
    #[serde(default)]
    pub leadership_count: u32,
    #[serde(default)]
    pub publications: Publications,
    pub state_of_residence: String,
    #[serde(default)]
    pub race_ethnicity: Option<RaceEthnicity>,
    #[serde(default)]
    pub is_urm: bool,
    #[serde(default)]
    pub is_first_gen: bool,
    #[serde(default)]
    pub is_disadvantaged: bool,
    #[serde(default)]
    pub is_rural: bool,
    #[serde(default)]
    pub primary_care_interest: bool,
}

impl ApplicantProfile {
    /// Underrepresented status from either the flag or a known race/ethnicity.
    pub fn counts_as_urm(&self) -> bool {
        self.is_urm || self.race_ethnicity.is_some_and(RaceEthnicity::is_underrepresented)
    }

    pub fn is_black(&self) -> bool {
        self.race_ethnicity == Some(RaceEthnicity::BlackOrAfricanAmerican)
    }

    /// Research strong enough to register with research-intensive schools.
    pub fn has_strong_research(&self) -> bool {
        self.research_hours >= 1000.0 || self.publications.first_author >= 1
    }

    pub fn resides_in(&self, state: &str) -> bool {
        !state.is_empty() && self.state_of_residence.trim().eq_ignore_ascii_case(state.trim())
    }
}

/// GPA or MCAT percentiles of a school's matriculants. Only the median is
/// required; missing entries are estimated when the ladder is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileLadder {
    #[serde(default)]
    pub p10: Option<f64>,
    #[serde(default)]
    pub p25: Option<f64>,
    pub p50: f64,
    #[serde(default)]
    pub p75: Option<f64>,
    #[serde(default)]
    pub p90: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLadder {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

const MCAT_MIN: f64 = 472.0;
const MCAT_MAX: f64 = 528.0;
const MCAT_ASSUMED_SD: f64 = 6.0;

impl PercentileLadder {
    pub fn full(p10: f64, p25: f64, p50: f64, p75: f64, p90: f64) -> Self {
        Self {
            p10: Some(p10),
            p25: Some(p25),
            p50,
            p75: Some(p75),
            p90: Some(p90),
        }
    }

    pub fn median_only(p50: f64) -> Self {
        Self {
            p10: None,
            p25: None,
            p50,
            p75: None,
            p90: None,
        }
    }

    /// Fills gaps for a GPA ladder. GPA is compressed near 4.0, so the upper
    /// tail is estimated much tighter than the lower one.
    pub fn resolve_gpa(&self) -> ResolvedLadder {
        let m = self.p50;
        let round2 = |x: f64| (x * 100.0).round() / 100.0;
        let p10 = self.p10.unwrap_or_else(|| round2((m - 0.3).max(2.5)));
        let p90 = self.p90.unwrap_or_else(|| round2((m + 0.08).min(4.0)));
        ResolvedLadder {
            p10,
            p25: self.p25.unwrap_or_else(|| round2(((m + p10) / 2.0).max(2.5))),
            p50: m,
            p75: self.p75.unwrap_or_else(|| round2(((m + p90) / 2.0).min(4.0))),
            p90,
        }
    }

    /// Fills gaps for an MCAT ladder assuming a roughly normal spread (SD 6).
    pub fn resolve_mcat(&self) -> ResolvedLadder {
        let m = self.p50;
        let estimate = |z: f64| (m + z * MCAT_ASSUMED_SD).clamp(MCAT_MIN, MCAT_MAX).round();
        ResolvedLadder {
            p10: self.p10.unwrap_or_else(|| estimate(-1.28)),
            p25: self.p25.unwrap_or_else(|| estimate(-0.67)),
            p50: m,
            p75: self.p75.unwrap_or_else(|| estimate(0.67)),
            p90: self.p90.unwrap_or_else(|| estimate(1.28)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MissionFeatures {
    #[serde(default)]
    pub rural: bool,
    #[serde(default)]
    pub research_intensive: bool,
    #[serde(default)]
    pub primary_care: bool,
    #[serde(default)]
    pub historically_underrepresented_serving: bool,
    #[serde(default)]
    pub diversity_focused: bool,
}

/// Static reference data for one school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub id: String,
    pub name: String,
    pub state: String,
    pub is_public: bool,
    /// Coarse prestige tier, 1 (most selective) to 4.
    pub tier: u8,
    pub gpa: PercentileLadder,
    pub mcat: PercentileLadder,
    pub applicants: u32,
    pub interviewed: u32,
    pub accepted: u32,
    #[serde(default = "default_pct_in_state")]
    pub pct_in_state_matriculants: f64,
    #[serde(default)]
    pub mission: MissionFeatures,
}

fn default_pct_in_state() -> f64 {
    0.5
}

impl SchoolRecord {
    /// Interviewed / applicants, absent when there were no applicants.
    pub fn interview_rate(&self) -> Option<f64> {
        (self.applicants > 0).then(|| self.interviewed as f64 / self.applicants as f64)
    }

    /// Accepted / interviewed, absent when nobody was interviewed.
    pub fn interview_to_accept_rate(&self) -> Option<f64> {
        (self.interviewed > 0).then(|| self.accepted as f64 / self.interviewed as f64)
    }
}

/// Calibrated logistic parameters of one school.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchoolModelParams {
    pub intercept_interview: f64,
    pub intercept_accept: f64,
    pub slope_c_interview: f64,
    pub slope_c_accept: f64,
    pub in_state_bonus_interview: f64,
    pub in_state_bonus_accept: f64,
}

/// Latent per-cycle shifts shared by every school on one applicant's list.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RandomEffects {
    /// File quality, applied to the interview stage.
    pub u_file: f64,
    /// Interview skill, applied to the acceptance stage.
    pub u_interview: f64,
}

impl RandomEffects {
    pub const ZERO: Self = Self {
        u_file: 0.0,
        u_interview: 0.0,
    };
}

/// One set of stage probabilities. `p_accept` is always the exact product of
/// the two stages because `from_stages` is the only constructor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionSample {
    p_interview: f64,
    p_accept_given_interview: f64,
    p_accept: f64,
}

impl PredictionSample {
    pub fn from_stages(p_interview: f64, p_accept_given_interview: f64) -> Self {
        Self {
            p_interview,
            p_accept_given_interview,
            p_accept: p_interview * p_accept_given_interview,
        }
    }

    pub fn p_interview(&self) -> f64 {
        self.p_interview
    }

    pub fn p_accept_given_interview(&self) -> f64 {
        self.p_accept_given_interview
    }

    pub fn p_accept(&self) -> f64 {
        self.p_accept
    }
}

/// Mean and empirical 80% central interval of a sampled quantity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CredibleEstimate {
    pub mean: f64,
    pub ci80: [f64; 2],
}

impl CredibleEstimate {
    pub fn point(value: f64) -> Self {
        Self {
            mean: value,
            ci80: [value, value],
        }
    }

    pub fn width(&self) -> f64 {
        self.ci80[1] - self.ci80[0]
    }
}
