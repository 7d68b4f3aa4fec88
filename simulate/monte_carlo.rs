//! Correlated Monte-Carlo simulation of whole application cycles.
//!
//! Each cycle draws one pair of shared random effects and shifts every school's
//! stage probabilities by them in logit space. Schools on a list therefore
//! succeed and fail together, which widens the spread of acceptance counts
//! beyond what independent coin flips give.
//!
//! Cycles run in fixed-size chunks. Chunk `k` always uses sub-stream `k + 1`
//! of the seed, so a seeded run is bit-identical regardless of thread count.

use crate::link::shift_probability;
use crate::simulate::rng::{draw_random_effects, resolve_seed, substream};
use crate::simulate::uncertainty::percentile;
use crate::two_stage::{ListProbability, SchoolPrediction};
use crate::types::CredibleEstimate;
use ahash::AHashMap;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const MAX_ITERATIONS: usize = 50_000;
pub const DEFAULT_ITERATIONS: usize = 10_000;
pub const DEFAULT_SD_FILE: f64 = 0.5;
pub const DEFAULT_SD_INTERVIEW: f64 = 0.7;
/// Cycles per parallel work unit. Part of the reproducibility contract.
const CHUNK_CYCLES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub iterations: usize,
    pub seed: Option<u64>,
    pub sd_file: f64,
    pub sd_interview: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            seed: None,
            sd_file: DEFAULT_SD_FILE,
            sd_interview: DEFAULT_SD_INTERVIEW,
        }
    }
}

impl SimulationConfig {
    pub fn seeded(iterations: usize, seed: u64) -> Self {
        Self {
            iterations,
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Same configuration with both shared-effect SDs replaced.
    pub fn with_effect_sds(mut self, sd_file: f64, sd_interview: f64) -> Self {
        self.sd_file = sd_file;
        self.sd_interview = sd_interview;
        self
    }
}

/// Baseline stage probabilities of one school entering the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolStageProbabilities {
    pub school_id: String,
    pub p_interview: f64,
    pub p_accept_given_interview: f64,
}

impl From<&SchoolPrediction> for SchoolStageProbabilities {
    fn from(prediction: &SchoolPrediction) -> Self {
        Self {
            school_id: prediction.school_id.clone(),
            p_interview: prediction.p_interview(),
            p_accept_given_interview: prediction.p_accept_given_interview(),
        }
    }
}

/// Share of cycles ending with each acceptance count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionBuckets {
    pub zero: f64,
    pub one: f64,
    pub two_three: f64,
    pub four_plus: f64,
}

impl DistributionBuckets {
    /// All mass on zero acceptances.
    pub const NONE_ACCEPTED: Self = Self {
        zero: 1.0,
        one: 0.0,
        two_three: 0.0,
        four_plus: 0.0,
    };

    pub fn total(&self) -> f64 {
        self.zero + self.one + self.two_three + self.four_plus
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelationDiagnostics {
    /// Mean Pearson correlation of acceptance indicators over school pairs.
    /// Pairs where either school was always or never accepted are skipped.
    pub mean_pairwise_correlation: f64,
    /// Variance of the per-cycle acceptance count.
    pub acceptance_variance: f64,
    /// Variance the count would have if schools were independent.
    pub independent_variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSchoolRate {
    pub school_id: String,
    pub interview_rate: f64,
    pub acceptance_rate: f64,
}

/// One observed set of accepting schools and how often it occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePattern {
    pub accepted: Vec<String>,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub iterations: usize,
    pub reproducible: bool,
    pub expected_interviews: CredibleEstimate,
    pub expected_acceptances: CredibleEstimate,
    pub p_at_least_one: f64,
    pub distribution_buckets: DistributionBuckets,
    pub correlation_diagnostics: CorrelationDiagnostics,
    pub school_rates: Vec<SimulatedSchoolRate>,
    pub modal_outcome: Option<OutcomePattern>,
    pub best_outcome: Option<OutcomePattern>,
    pub worst_outcome: Option<OutcomePattern>,
}

impl SimulationResult {
    fn neutral(schools: &[SchoolStageProbabilities], iterations: usize, reproducible: bool) -> Self {
        Self {
            iterations,
            reproducible,
            expected_interviews: CredibleEstimate::default(),
            expected_acceptances: CredibleEstimate::default(),
            p_at_least_one: 0.0,
            distribution_buckets: DistributionBuckets::NONE_ACCEPTED,
            correlation_diagnostics: CorrelationDiagnostics::default(),
            school_rates: schools
                .iter()
                .map(|s| SimulatedSchoolRate {
                    school_id: s.school_id.clone(),
                    interview_rate: 0.0,
                    acceptance_rate: 0.0,
                })
                .collect(),
            modal_outcome: None,
            best_outcome: None,
            worst_outcome: None,
        }
    }
}

/// Counts gathered by one chunk of cycles. Merging two tallies is plain
/// concatenation and addition, so merge order only affects `cycle_*` order.
#[derive(Debug, Clone, Default)]
struct CycleTally {
    cycle_interviews: Vec<u32>,
    cycle_acceptances: Vec<u32>,
    school_interviews: Vec<u64>,
    school_acceptances: Vec<u64>,
    /// Upper triangle of the co-acceptance matrix, row-major.
    co_acceptances: Vec<u64>,
    patterns: AHashMap<Vec<u32>, u64>,
}

impl CycleTally {
    fn new(num_schools: usize) -> Self {
        Self {
            school_interviews: vec![0; num_schools],
            school_acceptances: vec![0; num_schools],
            co_acceptances: vec![0; num_schools * num_schools.saturating_sub(1) / 2],
            ..Self::default()
        }
    }

    fn merge(mut self, other: CycleTally) -> Self {
        self.cycle_interviews.extend(other.cycle_interviews);
        self.cycle_acceptances.extend(other.cycle_acceptances);
        for (a, b) in self.school_interviews.iter_mut().zip(other.school_interviews) {
            *a += b;
        }
        for (a, b) in self.school_acceptances.iter_mut().zip(other.school_acceptances) {
            *a += b;
        }
        for (a, b) in self.co_acceptances.iter_mut().zip(other.co_acceptances) {
            *a += b;
        }
        for (pattern, count) in other.patterns {
            *self.patterns.entry(pattern).or_insert(0) += count;
        }
        self
    }
}

/// Index of pair `(i, j)`, `i < j`, in the row-major upper triangle.
fn pair_index(i: usize, j: usize, n: usize) -> usize {
    i * (2 * n - i - 1) / 2 + (j - i - 1)
}

fn run_chunk(
    schools: &[SchoolStageProbabilities],
    config: &SimulationConfig,
    seed: u64,
    chunk: usize,
    cycles: usize,
) -> CycleTally {
    let n = schools.len();
    let mut rng = substream(seed, chunk as u64 + 1);
    let mut tally = CycleTally::new(n);
    tally.cycle_interviews.reserve(cycles);
    tally.cycle_acceptances.reserve(cycles);
    let mut accepted: Vec<u32> = Vec::with_capacity(n);

    for _ in 0..cycles {
        let effects = draw_random_effects(&mut rng, config.sd_file, config.sd_interview);
        let mut interviews = 0u32;
        accepted.clear();

        for (idx, school) in schools.iter().enumerate() {
            let p_interview = shift_probability(school.p_interview, effects.u_file);
            if !rng.gen_bool(p_interview) {
                continue;
            }
            interviews += 1;
            tally.school_interviews[idx] += 1;

            let p_accept = shift_probability(school.p_accept_given_interview, effects.u_interview);
            if rng.gen_bool(p_accept) {
                tally.school_acceptances[idx] += 1;
                accepted.push(idx as u32);
            }
        }

        for (a, &i) in accepted.iter().enumerate() {
            for &j in &accepted[a + 1..] {
                tally.co_acceptances[pair_index(i as usize, j as usize, n)] += 1;
            }
        }
        tally.cycle_interviews.push(interviews);
        tally.cycle_acceptances.push(accepted.len() as u32);
        *tally.patterns.entry(accepted.clone()).or_insert(0) += 1;
    }
    tally
}

/// Mean and 10th/90th percentile of per-cycle counts.
fn count_estimate(counts: &[u32]) -> CredibleEstimate {
    if counts.is_empty() {
        return CredibleEstimate::default();
    }
    let mut sorted: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    CredibleEstimate {
        mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        ci80: [percentile(&sorted, 0.10), percentile(&sorted, 0.90)],
    }
}

fn buckets(acceptances: &[u32]) -> DistributionBuckets {
    let mut counts = [0usize; 4];
    for &a in acceptances {
        let slot = match a {
            0 => 0,
            1 => 1,
            2 | 3 => 2,
            _ => 3,
        };
        counts[slot] += 1;
    }
    let n = acceptances.len() as f64;
    DistributionBuckets {
        zero: counts[0] as f64 / n,
        one: counts[1] as f64 / n,
        two_three: counts[2] as f64 / n,
        four_plus: counts[3] as f64 / n,
    }
}

fn correlation_diagnostics(tally: &CycleTally, cycles: usize) -> CorrelationDiagnostics {
    let n_cycles = cycles as f64;
    let rates: Vec<f64> = tally
        .school_acceptances
        .iter()
        .map(|&a| a as f64 / n_cycles)
        .collect();
    let n = rates.len();

    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            let var = rates[i] * (1.0 - rates[i]) * rates[j] * (1.0 - rates[j]);
            if var <= 0.0 {
                continue;
            }
            let joint = tally.co_acceptances[pair_index(i, j, n)] as f64 / n_cycles;
            sum += (joint - rates[i] * rates[j]) / var.sqrt();
            pairs += 1;
        }
    }

    let mean = tally.cycle_acceptances.iter().map(|&a| a as f64).sum::<f64>() / n_cycles;
    let acceptance_variance = tally
        .cycle_acceptances
        .iter()
        .map(|&a| (a as f64 - mean).powi(2))
        .sum::<f64>()
        / n_cycles;

    CorrelationDiagnostics {
        mean_pairwise_correlation: if pairs == 0 { 0.0 } else { sum / pairs as f64 },
        acceptance_variance,
        independent_variance: rates.iter().map(|r| r * (1.0 - r)).sum(),
    }
}

fn pattern_of(
    entry: (&Vec<u32>, &u64),
    schools: &[SchoolStageProbabilities],
    cycles: usize,
) -> OutcomePattern {
    OutcomePattern {
        accepted: entry
            .0
            .iter()
            .map(|&i| schools[i as usize].school_id.clone())
            .collect(),
        frequency: *entry.1 as f64 / cycles as f64,
    }
}

/// Modal, best and worst observed patterns. Ties go to the more frequent
/// pattern, then to the lexicographically smaller index list.
fn outcome_patterns(
    tally: &CycleTally,
    schools: &[SchoolStageProbabilities],
    cycles: usize,
) -> [Option<OutcomePattern>; 3] {
    let stable = |a: (&Vec<u32>, &u64), b: (&Vec<u32>, &u64)| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0));

    let modal = tally.patterns.iter().min_by(|a, b| stable(*a, *b));
    let best = tally
        .patterns
        .iter()
        .min_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| stable(*a, *b)));
    let worst = tally
        .patterns
        .iter()
        .min_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| stable(*a, *b)));

    [modal, best, worst].map(|p| p.map(|e| pattern_of(e, schools, cycles)))
}

/// Simulates `config.iterations` cycles over the given schools.
pub fn simulate_cycles(
    schools: &[SchoolStageProbabilities],
    config: &SimulationConfig,
) -> SimulationResult {
    let iterations = config.iterations.min(MAX_ITERATIONS);
    if iterations < config.iterations {
        log::warn!(
            "Requested {} iterations; capped at {}.",
            config.iterations,
            MAX_ITERATIONS
        );
    }
    let seed = resolve_seed(config.seed, "simulation");
    if iterations == 0 || schools.is_empty() {
        return SimulationResult::neutral(schools, iterations, seed.reproducible);
    }

    let num_chunks = iterations.div_ceil(CHUNK_CYCLES);
    let tallies: Vec<CycleTally> = (0..num_chunks)
        .into_par_iter()
        .map(|chunk| {
            let start = chunk * CHUNK_CYCLES;
            let cycles = CHUNK_CYCLES.min(iterations - start);
            run_chunk(schools, config, seed.seed, chunk, cycles)
        })
        .collect();
    let tally = tallies
        .into_iter()
        .fold(CycleTally::new(schools.len()), CycleTally::merge);

    let distribution_buckets = buckets(&tally.cycle_acceptances);
    let [modal_outcome, best_outcome, worst_outcome] = outcome_patterns(&tally, schools, iterations);
    let n = iterations as f64;
    let school_rates = schools
        .iter()
        .enumerate()
        .map(|(i, s)| SimulatedSchoolRate {
            school_id: s.school_id.clone(),
            interview_rate: tally.school_interviews[i] as f64 / n,
            acceptance_rate: tally.school_acceptances[i] as f64 / n,
        })
        .collect();

    let result = SimulationResult {
        iterations,
        reproducible: seed.reproducible,
        expected_interviews: count_estimate(&tally.cycle_interviews),
        expected_acceptances: count_estimate(&tally.cycle_acceptances),
        p_at_least_one: 1.0 - distribution_buckets.zero,
        distribution_buckets,
        correlation_diagnostics: correlation_diagnostics(&tally, iterations),
        school_rates,
        modal_outcome,
        best_outcome,
        worst_outcome,
    };
    log::info!(
        "Simulated {} cycles over {} schools: P(>=1) = {:.3}, E[acceptances] = {:.2}.",
        iterations,
        schools.len(),
        result.p_at_least_one,
        result.expected_acceptances.mean
    );
    result
}

/// Simulates the schools of an already computed list.
pub fn simulate_list(list: &ListProbability, config: &SimulationConfig) -> SimulationResult {
    let schools: Vec<SchoolStageProbabilities> =
        list.predictions.iter().map(SchoolStageProbabilities::from).collect();
    simulate_cycles(&schools, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn uniform_list(n: usize, p_interview: f64, p_accept: f64) -> Vec<SchoolStageProbabilities> {
        (0..n)
            .map(|i| SchoolStageProbabilities {
                school_id: format!("school-{i:02}"),
                p_interview,
                p_accept_given_interview: p_accept,
            })
            .collect()
    }

    #[test]
    fn pair_index_enumerates_upper_triangle() {
        let n = 5;
        let mut seen = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                seen.push(pair_index(i, j, n));
            }
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn buckets_sum_to_one_and_match_p_at_least_one() {
        let schools = uniform_list(8, 0.4, 0.5);
        let result = simulate_cycles(&schools, &SimulationConfig::seeded(5000, 3));
        assert_abs_diff_eq!(result.distribution_buckets.total(), 1.0, epsilon = 1e-9);
        assert_eq!(result.p_at_least_one, 1.0 - result.distribution_buckets.zero);
        assert_eq!(result.iterations, 5000);
        assert!(result.reproducible);
    }

    #[test]
    fn seeded_runs_are_identical() {
        let schools = uniform_list(6, 0.3, 0.4);
        let config = SimulationConfig::seeded(3000, 99);
        assert_eq!(simulate_cycles(&schools, &config), simulate_cycles(&schools, &config));
    }

    #[test]
    fn expectations_track_stage_products() {
        let schools = uniform_list(10, 0.3, 0.5);
        let config = SimulationConfig::seeded(20_000, 11).with_effect_sds(0.0, 0.0);
        let result = simulate_cycles(&schools, &config);
        assert_abs_diff_eq!(result.expected_interviews.mean, 3.0, epsilon = 0.05);
        assert_abs_diff_eq!(result.expected_acceptances.mean, 1.5, epsilon = 0.05);
        for rate in &result.school_rates {
            assert_abs_diff_eq!(rate.acceptance_rate, 0.15, epsilon = 0.015);
        }
        let ci = result.expected_acceptances.ci80;
        assert!(ci[0] <= result.expected_acceptances.mean && result.expected_acceptances.mean <= ci[1]);
    }

    #[test]
    fn shared_effects_raise_correlation_monotonically() {
        let schools = uniform_list(10, 0.35, 0.45);
        let run = |sd_file: f64, sd_interview: f64| {
            let config = SimulationConfig::seeded(20_000, 5).with_effect_sds(sd_file, sd_interview);
            simulate_cycles(&schools, &config).correlation_diagnostics
        };
        let independent = run(0.0, 0.0);
        let moderate = run(0.5, 0.7);
        let strong = run(1.0, 1.4);

        assert!(independent.mean_pairwise_correlation.abs() < 0.015);
        assert!(moderate.mean_pairwise_correlation > independent.mean_pairwise_correlation + 0.01);
        assert!(strong.mean_pairwise_correlation > moderate.mean_pairwise_correlation + 0.03);
        assert!(moderate.acceptance_variance > moderate.independent_variance);
        assert!(strong.acceptance_variance > moderate.acceptance_variance);
    }

    #[test]
    fn degenerate_inputs_give_neutral_results() {
        let empty = simulate_cycles(&[], &SimulationConfig::seeded(1000, 1));
        assert_eq!(empty.p_at_least_one, 0.0);
        assert_eq!(empty.distribution_buckets, DistributionBuckets::NONE_ACCEPTED);
        assert!(empty.modal_outcome.is_none());

        let schools = uniform_list(3, 0.5, 0.5);
        let none = simulate_cycles(&schools, &SimulationConfig::seeded(0, 1));
        assert_eq!(none.iterations, 0);
        assert_eq!(none.expected_acceptances, CredibleEstimate::default());
        assert_eq!(none.school_rates.len(), 3);
    }

    #[test]
    fn iterations_are_capped() {
        let schools = uniform_list(1, 0.5, 0.5);
        let result = simulate_cycles(&schools, &SimulationConfig::seeded(MAX_ITERATIONS + 10, 2));
        assert_eq!(result.iterations, MAX_ITERATIONS);
    }

    #[test]
    fn outcome_patterns_are_ordered() {
        let schools = uniform_list(4, 0.5, 0.5);
        let result = simulate_cycles(&schools, &SimulationConfig::seeded(4000, 8));
        let best = result.best_outcome.unwrap();
        let worst = result.worst_outcome.unwrap();
        let modal = result.modal_outcome.unwrap();
        assert_eq!(best.accepted.len(), 4);
        assert!(worst.accepted.is_empty());
        assert!(modal.frequency >= best.frequency);
        assert!(modal.frequency >= worst.frequency);
    }
}
