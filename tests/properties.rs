use medadmit::calibrate::grid::ReferenceGrid;
use medadmit::calibrate::validation::{ValidationTargets, validate_against_a23};
use medadmit::catalog::Catalog;
use medadmit::competitiveness::CompetitivenessScorer;
use medadmit::experience::{ExperienceConfig, ThresholdMode, calculate_experience_contribution};
use medadmit::fixtures::{
    ApplicantBuilder, average_applicant, perfect_applicant, top_urm_applicant, weak_applicant,
};
use medadmit::simulate::monte_carlo::{SimulationConfig, simulate_list};
use medadmit::simulate::uncertainty::{UncertaintyConfig, bootstrap_list};
use medadmit::two_stage::{AdmissionModel, Category};
use medadmit::types::ApplicantProfile;

fn builtin() -> (AdmissionModel, Catalog) {
    (AdmissionModel::builtin(), Catalog::builtin().unwrap())
}

fn profiles() -> Vec<ApplicantProfile> {
    vec![
        perfect_applicant(),
        average_applicant(),
        weak_applicant(),
        top_urm_applicant(),
        ApplicantBuilder::new().stats(3.3, 500.0).state("OH").build(),
    ]
}

#[test]
fn competitiveness_is_monotone_in_gpa_and_mcat() {
    let scorer = CompetitivenessScorer::builtin();
    let gpas: Vec<f64> = (0..=80).map(|i| 1.8 + 0.03 * i as f64).collect();
    let mcats: Vec<f64> = (0..=70).map(|i| 468.0 + i as f64).collect();
    for &m in mcats.iter().step_by(7) {
        for pair in gpas.windows(2) {
            assert!(scorer.competitiveness(pair[0], m) <= scorer.competitiveness(pair[1], m));
        }
    }
    for &g in gpas.iter().step_by(8) {
        for pair in mcats.windows(2) {
            assert!(scorer.competitiveness(g, pair[0]) <= scorer.competitiveness(g, pair[1]));
        }
    }
}

#[test]
fn baseline_probability_is_strictly_increasing_and_bounded() {
    let scorer = CompetitivenessScorer::builtin();
    let values: Vec<f64> = (-100..=100)
        .map(|i| scorer.competitiveness_to_baseline_prob(i as f64 * 0.1))
        .collect();
    for pair in values.windows(2) {
        assert!(pair[1] > pair[0]);
    }
    assert!(values.iter().all(|&p| p > 0.0 && p < 1.0));
    let at_zero = scorer.competitiveness_to_baseline_prob(0.0);
    assert!(at_zero > 0.55 && at_zero < 0.75);
}

#[test]
fn every_prediction_is_the_product_of_its_stages() {
    let (model, catalog) = builtin();
    for profile in profiles() {
        for p in model.predict_catalog(&profile, &catalog).predictions {
            assert_eq!(p.p_accept(), p.p_interview() * p.p_accept_given_interview());
        }
    }
}

#[test]
fn simulated_buckets_are_a_distribution() {
    let (model, catalog) = builtin();
    for (seed, profile) in profiles().iter().enumerate() {
        let list = model.predict_catalog(profile, &catalog);
        let result = simulate_list(&list, &SimulationConfig::seeded(3000, seed as u64));
        let b = result.distribution_buckets;
        assert!((b.total() - 1.0).abs() < 1e-9);
        assert_eq!(result.p_at_least_one, 1.0 - b.zero);
    }
}

#[test]
fn stronger_shared_effects_raise_correlation_and_variance() {
    let (model, catalog) = builtin();
    let list = model.predict_catalog(&average_applicant(), &catalog);
    let weak = simulate_list(&list, &SimulationConfig::seeded(20_000, 3).with_effect_sds(0.25, 0.35));
    let strong = simulate_list(&list, &SimulationConfig::seeded(20_000, 3).with_effect_sds(1.0, 1.4));
    let (w, s) = (weak.correlation_diagnostics, strong.correlation_diagnostics);
    assert!(s.mean_pairwise_correlation > w.mean_pairwise_correlation);
    assert!(s.acceptance_variance > w.acceptance_variance);
    assert!(s.acceptance_variance > s.independent_variance);
}

#[test]
fn bootstrap_intervals_contain_their_means() {
    let (model, catalog) = builtin();
    for profile in profiles() {
        let result = bootstrap_list(
            &model,
            &profile,
            catalog.ids(),
            &catalog,
            &UncertaintyConfig::seeded(150, 9),
        );
        for s in &result.schools {
            for e in [s.p_interview, s.p_accept_given_interview, s.p_accept] {
                assert!(e.ci80[0] <= e.mean && e.mean <= e.ci80[1]);
            }
        }
        let p = result.p_at_least_one;
        assert!(p.ci80[0] <= p.mean && p.mean <= p.ci80[1]);
    }
}

#[test]
fn single_draw_bootstrap_has_zero_width() {
    let (model, catalog) = builtin();
    let ids = ["sutter-state", "cedar-med"];
    let single = bootstrap_list(&model, &average_applicant(), ids, &catalog, &UncertaintyConfig::seeded(1, 5));
    for s in &single.schools {
        assert_eq!(s.p_accept.width(), 0.0);
    }
    let many = bootstrap_list(&model, &average_applicant(), ids, &catalog, &UncertaintyConfig::seeded(100, 5));
    for s in &many.schools {
        assert!(s.p_accept.width() > 0.0);
    }
}

#[test]
fn shipped_scorer_matches_the_reference_grid() {
    let result = validate_against_a23(
        &CompetitivenessScorer::builtin(),
        &ReferenceGrid::builtin(),
        &ValidationTargets::default(),
    );
    assert!(result.rmse < 0.03);
    assert!(result.correlation > 0.9);
}

#[test]
fn top_applicant_at_a_reach_school_stays_uncertain() {
    let (model, catalog) = builtin();
    let p = model
        .predict_school(&top_urm_applicant(), "westbrook-med", &catalog)
        .unwrap();
    assert!(p.p_accept() > 0.0 && p.p_accept() < 1.0);
    assert!(p.p_interview() > 0.0 && p.p_interview() < 1.0);
    assert_ne!(p.category, Category::Safety);
}

#[test]
fn zero_clinical_hours_fail_hard_mode_regardless_of_other_inputs() {
    let config = ExperienceConfig::default().with_clinical_mode(ThresholdMode::Hard);
    for profile in profiles() {
        let mut profile = profile;
        profile.clinical_hours = 0.0;
        assert!(calculate_experience_contribution(&profile, &config) <= -2.0);
    }
}

#[test]
fn unknown_school_does_not_disturb_the_list() {
    let (model, catalog) = builtin();
    let profile = weak_applicant();
    let ids = ["halden-med", "delta-state", "prairie-state"];
    let clean = model.calculate_list_probability(&profile, ids, &catalog);
    let noisy = model.calculate_list_probability(
        &profile,
        ["unknown-a", "halden-med", "delta-state", "unknown-b", "prairie-state"],
        &catalog,
    );
    assert_eq!(clean.predictions, noisy.predictions);
    assert_eq!(clean.expected_acceptances, noisy.expected_acceptances);
    assert_eq!(noisy.omitted, ["unknown-a", "unknown-b"]);
}
