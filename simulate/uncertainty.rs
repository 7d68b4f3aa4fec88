//! Parametric bootstrap around the two-stage model.
//!
//! A draw perturbs a school's calibrated parameters with independent Gaussian
//! noise, draws a fresh pair of shared random effects, or both, and records the
//! resulting stage probabilities. Intervals are empirical percentiles of the
//! draws (type 7, linear interpolation).

use crate::catalog::Catalog;
use crate::simulate::rng::{EFFECTS_STREAM, draw_random_effects, normal, resolve_seed, substream};
use crate::two_stage::{
    AdmissionModel, Category, FactorBreakdown, SchoolPrediction, SchoolTerms, categorize_for_tier,
};
use crate::types::{
    ApplicantProfile, CredibleEstimate, PredictionSample, RandomEffects, SchoolModelParams,
    SchoolRecord,
};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const MAX_DRAWS: usize = 5_000;

/// Standard deviations of the estimation noise added to calibrated parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterNoise {
    pub intercept_sd: f64,
    pub slope_sd: f64,
    pub in_state_sd: f64,
}

impl Default for ParameterNoise {
    fn default() -> Self {
        Self {
            intercept_sd: 0.3,
            slope_sd: 0.1,
            in_state_sd: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyConfig {
    pub draws: usize,
    pub seed: Option<u64>,
    pub perturb_params: bool,
    pub draw_effects: bool,
    pub noise: ParameterNoise,
    pub sd_file: f64,
    pub sd_interview: f64,
    /// Central mass of the reported interval; 0.8 gives the 10th/90th percentiles.
    pub credible_level: f64,
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            draws: 200,
            seed: None,
            perturb_params: true,
            draw_effects: true,
            noise: ParameterNoise::default(),
            sd_file: 0.5,
            sd_interview: 0.7,
            credible_level: 0.8,
        }
    }
}

impl UncertaintyConfig {
    pub fn seeded(draws: usize, seed: u64) -> Self {
        Self {
            draws,
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn draw_count(&self) -> usize {
        self.draws.min(MAX_DRAWS)
    }

    fn quantile_bounds(&self) -> (f64, f64) {
        let level = if self.credible_level.is_nan() {
            0.8
        } else {
            self.credible_level.clamp(0.0, 1.0)
        };
        let lower = (1.0 - level) / 2.0;
        (lower, 1.0 - lower)
    }
}

/// Type-7 quantile of an ascending slice. Empty input gives 0.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Mean and central interval of `values`. The interval is widened to contain
/// the mean when a skewed sample pushes the mean past a percentile.
pub fn summarize(values: &[f64], lower_q: f64, upper_q: f64) -> CredibleEstimate {
    if values.is_empty() {
        return CredibleEstimate::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    CredibleEstimate {
        mean,
        ci80: [
            percentile(&sorted, lower_q).min(mean),
            percentile(&sorted, upper_q).max(mean),
        ],
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleSummary {
    pub p_interview: CredibleEstimate,
    pub p_accept_given_interview: CredibleEstimate,
    pub p_accept: CredibleEstimate,
}

/// 10th/90th percentile summary of bootstrap samples.
pub fn aggregate_samples(samples: &[PredictionSample]) -> SampleSummary {
    aggregate_samples_at(samples, 0.10, 0.90)
}

pub fn aggregate_samples_at(samples: &[PredictionSample], lower_q: f64, upper_q: f64) -> SampleSummary {
    let column = |f: fn(&PredictionSample) -> f64| -> Vec<f64> { samples.iter().map(f).collect() };
    SampleSummary {
        p_interview: summarize(&column(PredictionSample::p_interview), lower_q, upper_q),
        p_accept_given_interview: summarize(
            &column(PredictionSample::p_accept_given_interview),
            lower_q,
            upper_q,
        ),
        p_accept: summarize(&column(PredictionSample::p_accept), lower_q, upper_q),
    }
}

/// Calibrated parameters plus one draw of estimation noise.
pub fn perturb_params<R: Rng + ?Sized>(
    params: &SchoolModelParams,
    noise: &ParameterNoise,
    rng: &mut R,
) -> SchoolModelParams {
    SchoolModelParams {
        intercept_interview: params.intercept_interview + normal(rng, noise.intercept_sd),
        intercept_accept: params.intercept_accept + normal(rng, noise.intercept_sd),
        slope_c_interview: params.slope_c_interview + normal(rng, noise.slope_sd),
        slope_c_accept: params.slope_c_accept + normal(rng, noise.slope_sd),
        in_state_bonus_interview: params.in_state_bonus_interview + normal(rng, noise.in_state_sd),
        in_state_bonus_accept: params.in_state_bonus_accept + normal(rng, noise.in_state_sd),
    }
}

fn draw_params<R: Rng + ?Sized>(
    params: &SchoolModelParams,
    config: &UncertaintyConfig,
    rng: &mut R,
) -> SchoolModelParams {
    if config.perturb_params {
        perturb_params(params, &config.noise, rng)
    } else {
        *params
    }
}

fn draw_effects<R: Rng + ?Sized>(config: &UncertaintyConfig, rng: &mut R) -> RandomEffects {
    if config.draw_effects {
        draw_random_effects(rng, config.sd_file, config.sd_interview)
    } else {
        RandomEffects::ZERO
    }
}

/// `config.draws` samples for precomputed school terms.
pub fn bootstrap_samples<R: Rng + ?Sized>(
    terms: &SchoolTerms,
    params: &SchoolModelParams,
    config: &UncertaintyConfig,
    rng: &mut R,
) -> Vec<PredictionSample> {
    (0..config.draw_count())
        .map(|_| {
            let drawn = draw_params(params, config, rng);
            terms.sample(&drawn, draw_effects(config, rng))
        })
        .collect()
}

/// Bootstrap summary of one school for one applicant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPrediction {
    pub school_id: String,
    pub school_name: String,
    pub p_interview: CredibleEstimate,
    pub p_accept_given_interview: CredibleEstimate,
    pub p_accept: CredibleEstimate,
    /// Category of the calibrated (unperturbed) point prediction.
    pub category: Category,
    pub factors: FactorBreakdown,
}

fn aggregated(
    school: &SchoolRecord,
    point: &SchoolPrediction,
    summary: SampleSummary,
) -> AggregatedPrediction {
    AggregatedPrediction {
        school_id: school.id.clone(),
        school_name: school.name.clone(),
        p_interview: summary.p_interview,
        p_accept_given_interview: summary.p_accept_given_interview,
        p_accept: summary.p_accept,
        category: categorize_for_tier(point.p_accept(), school.tier),
        factors: point.factors,
    }
}

pub fn bootstrap_prediction<R: Rng + ?Sized>(
    model: &AdmissionModel,
    profile: &ApplicantProfile,
    school: &SchoolRecord,
    params: &SchoolModelParams,
    config: &UncertaintyConfig,
    rng: &mut R,
) -> AggregatedPrediction {
    let terms = model.school_terms(model.applicant_terms(profile), profile, school);
    let samples = bootstrap_samples(&terms, params, config, rng);
    let (lower, upper) = config.quantile_bounds();
    let point = model.predict_for(profile, school, params);
    aggregated(school, &point, aggregate_samples_at(&samples, lower, upper))
}

/// Variance of `p_accept` split by source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VarianceDecomposition {
    /// Parameters perturbed, random effects held at zero.
    pub parameter: f64,
    /// Calibrated parameters, random effects drawn.
    pub random_effect: f64,
    pub combined: f64,
    /// `combined - parameter - random_effect`.
    pub interaction: f64,
}

/// Decomposes the variance of `p_accept` using common random numbers: draw
/// `b` reuses the same parameter noise and the same effects in every
/// component, so the components differ only by what is switched on.
pub fn decompose_variance(
    model: &AdmissionModel,
    profile: &ApplicantProfile,
    school: &SchoolRecord,
    params: &SchoolModelParams,
    config: &UncertaintyConfig,
) -> VarianceDecomposition {
    let seed = resolve_seed(config.seed, "variance decomposition");
    let mut rng = substream(seed.seed, EFFECTS_STREAM);
    let terms = model.school_terms(model.applicant_terms(profile), profile, school);

    let draws = config.draw_count();
    let mut parameter = Vec::with_capacity(draws);
    let mut random_effect = Vec::with_capacity(draws);
    let mut combined = Vec::with_capacity(draws);
    for _ in 0..draws {
        let drawn = perturb_params(params, &config.noise, &mut rng);
        let effects = draw_random_effects(&mut rng, config.sd_file, config.sd_interview);
        parameter.push(terms.sample(&drawn, RandomEffects::ZERO).p_accept());
        random_effect.push(terms.sample(params, effects).p_accept());
        combined.push(terms.sample(&drawn, effects).p_accept());
    }

    let parameter = variance(&parameter);
    let random_effect = variance(&random_effect);
    let combined = variance(&combined);
    VarianceDecomposition {
        parameter,
        random_effect,
        combined,
        interaction: combined - parameter - random_effect,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListUncertainty {
    /// Sorted by descending mean `p_accept`, ties by id.
    pub schools: Vec<AggregatedPrediction>,
    pub omitted: Vec<String>,
    pub expected_interviews: CredibleEstimate,
    pub expected_acceptances: CredibleEstimate,
    pub p_at_least_one: CredibleEstimate,
    pub draws: usize,
    pub reproducible: bool,
}

/// Bootstraps every school of a list. Draw `b` shares one pair of random
/// effects across all schools, so list-level intervals keep the correlation
/// the effects induce. Parameter noise is independent per school.
pub fn bootstrap_list<I>(
    model: &AdmissionModel,
    profile: &ApplicantProfile,
    school_ids: I,
    catalog: &Catalog,
    config: &UncertaintyConfig,
) -> ListUncertainty
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let seed = resolve_seed(config.seed, "list bootstrap");
    let draws = config.draw_count();
    let (lower, upper) = config.quantile_bounds();

    let mut known = Vec::new();
    let mut omitted = Vec::new();
    for id in school_ids {
        match catalog.lookup(id.as_ref()) {
            Some(entry) => known.push(entry),
            None => omitted.push(id.as_ref().to_string()),
        }
    }

    let mut effects_rng = substream(seed.seed, EFFECTS_STREAM);
    let effects: Vec<RandomEffects> = (0..draws)
        .map(|_| draw_effects(config, &mut effects_rng))
        .collect();

    let applicant = model.applicant_terms(profile);
    let per_school: Vec<(AggregatedPrediction, Vec<PredictionSample>)> = known
        .par_iter()
        .enumerate()
        .map(|(idx, &(school, params))| {
            let mut rng = substream(seed.seed, idx as u64 + 1);
            let terms = model.school_terms(applicant, profile, school);
            let samples: Vec<PredictionSample> = effects
                .iter()
                .map(|&u| terms.sample(&draw_params(params, config, &mut rng), u))
                .collect();
            let point = model.predict_for(profile, school, params);
            let summary = aggregate_samples_at(&samples, lower, upper);
            (aggregated(school, &point, summary), samples)
        })
        .collect();

    let mut interviews = vec![0.0; draws];
    let mut acceptances = vec![0.0; draws];
    let mut none_accepted = vec![1.0; draws];
    for (_, samples) in &per_school {
        for (b, s) in samples.iter().enumerate() {
            interviews[b] += s.p_interview();
            acceptances[b] += s.p_accept();
            none_accepted[b] *= 1.0 - s.p_accept();
        }
    }
    let at_least_one: Vec<f64> = none_accepted.iter().map(|n| 1.0 - n).collect();

    let mut schools: Vec<AggregatedPrediction> = per_school.into_iter().map(|(a, _)| a).collect();
    schools.sort_by(|a, b| {
        b.p_accept
            .mean
            .partial_cmp(&a.p_accept.mean)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.school_id.cmp(&b.school_id))
    });
    log::info!(
        "Bootstrapped {} schools with {} draws ({} omitted).",
        schools.len(),
        draws,
        omitted.len()
    );

    ListUncertainty {
        schools,
        omitted,
        expected_interviews: summarize(&interviews, lower, upper),
        expected_acceptances: summarize(&acceptances, lower, upper),
        p_at_least_one: summarize(&at_least_one, lower, upper),
        draws,
        reproducible: seed.reproducible,
    }
}

/// Closed-form interval around a point probability, widest at 0.5.
pub fn quick_uncertainty_estimate(p: f64) -> CredibleEstimate {
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    let half_width = 0.03 + 0.15 * 4.0 * p * (1.0 - p);
    CredibleEstimate {
        mean: p,
        ci80: [(p - half_width).max(0.0), (p + half_width).min(1.0)],
    }
}
