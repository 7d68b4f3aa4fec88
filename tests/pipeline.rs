use approx::assert_abs_diff_eq;
use medadmit::calibrate::fit::{FitSettings, fit_scorer};
use medadmit::calibrate::grid::ReferenceGrid;
use medadmit::calibrate::schools::{
    CalibrationSettings, audit_school_params, calibrate_school_params,
};
use medadmit::calibrate::validation::{ValidationTargets, generate_validation_report};
use medadmit::catalog::{Catalog, SchoolParamTable, load_schools, save_schools};
use medadmit::competitiveness::{CompetitivenessScorer, ScorerParams};
use medadmit::simulate::monte_carlo::{SimulationConfig, simulate_list};
use medadmit::two_stage::{AdmissionModel, ModelSettings};
use medadmit::types::ApplicantProfile;
use std::path::Path;

fn demo_applicant(name: &str) -> ApplicantProfile {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("data/applicants")
        .join(name);
    ApplicantProfile::load(&path).unwrap()
}

#[test]
fn demo_applicants_load_with_defaults() {
    let ohio = demo_applicant("ohio_resident.toml");
    assert_eq!(ohio.state_of_residence, "OH");
    assert_eq!(ohio.publications.first_author, 1);
    assert_eq!(ohio.publications.other, 0);
    assert!(!ohio.is_urm);

    let rural = demo_applicant("rural_nontrad.toml");
    assert!(rural.is_rural && rural.primary_care_interest);
    assert_eq!(rural.research_hours, 0.0);
}

#[test]
fn resident_sees_home_state_advantage_end_to_end() {
    let model = AdmissionModel::builtin();
    let catalog = Catalog::builtin().unwrap();
    let ohio = demo_applicant("ohio_resident.toml");
    let mut elsewhere = ohio.clone();
    elsewhere.state_of_residence = "AZ".to_string();

    let home = model.predict_school(&ohio, "sutter-state", &catalog).unwrap();
    let away = model.predict_school(&elsewhere, "sutter-state", &catalog).unwrap();
    assert!(home.p_accept() > away.p_accept());

    let list = model.predict_catalog(&ohio, &catalog);
    let sim = simulate_list(&list, &SimulationConfig::seeded(20_000, 17));
    let diagnostics = sim.correlation_diagnostics;
    assert!(diagnostics.mean_pairwise_correlation > 0.0);
    assert!(diagnostics.acceptance_variance > diagnostics.independent_variance);
}

#[test]
fn rural_applicant_gains_mission_fit_at_rural_school() {
    let model = AdmissionModel::builtin();
    let catalog = Catalog::builtin().unwrap();
    let rural = demo_applicant("rural_nontrad.toml");
    let prediction = model.predict_school(&rural, "prairie-state", &catalog).unwrap();
    assert!(prediction.factors.mission_fit > 0.0);
    assert!(prediction.factors.residency > 0.0);
}

#[test]
fn edited_catalog_files_flow_through_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let builtin = Catalog::builtin().unwrap();

    let mut schools = builtin.schools().to_vec();
    schools.retain(|s| s.tier >= 3);
    let schools_path = dir.path().join("schools.toml");
    save_schools(&schools_path, &schools).unwrap();

    let params_path = dir.path().join("params.toml");
    builtin.param_table().save(&params_path).unwrap();

    let catalog = Catalog::load(&schools_path, &params_path).unwrap();
    assert_eq!(catalog.len(), schools.len());
    assert_eq!(load_schools(&schools_path).unwrap(), schools);

    let model = AdmissionModel::builtin();
    let list = model.predict_catalog(&demo_applicant("rural_nontrad.toml"), &catalog);
    assert_eq!(list.predictions.len(), schools.len());
    assert!(list.omitted.is_empty());
}

#[test]
fn refit_and_recalibrate_reproduce_shipped_model() {
    let dir = tempfile::tempdir().unwrap();
    let grid = ReferenceGrid::builtin();

    let outcome = fit_scorer(&grid, &FitSettings::default()).unwrap();
    let scorer_path = dir.path().join("scorer.toml");
    outcome.params.save(&scorer_path).unwrap();
    let scorer = CompetitivenessScorer::new(ScorerParams::load(&scorer_path).unwrap()).unwrap();

    let builtin = Catalog::builtin().unwrap();
    let table = calibrate_school_params(builtin.schools(), &scorer, &CalibrationSettings::default());
    let params_path = dir.path().join("params.toml");
    table.save(&params_path).unwrap();
    let catalog = builtin
        .with_params(SchoolParamTable::load(&params_path).unwrap())
        .unwrap();
    assert!(audit_school_params(&catalog, &scorer).is_clean());

    let model = AdmissionModel::new(scorer, ModelSettings::default());
    let report = generate_validation_report(&model, &catalog, &grid, &ValidationTargets::default());
    assert!(report.passed, "failed: {:?}", report.summary.failed);
}

#[test]
fn grid_file_replaces_builtin_grid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.toml");
    std::fs::write(
        &path,
        r#"
gpa_labels = ["<3.4", "3.4-3.7", ">=3.7"]
gpa_centers = [3.2, 3.55, 3.85]
mcat_labels = ["<505", "505-512", ">512"]
mcat_centers = [500.0, 508.5, 516.0]
rates_percent = [[8.0, 20.0, 40.0], [15.0, 33.0, 58.0], [24.0, 45.0, 72.0]]
applicants = [[900.0, 700.0, 300.0], [1500.0, 2500.0, 2000.0], [1200.0, 4000.0, 6000.0]]
"#,
    )
    .unwrap();
    let grid = ReferenceGrid::load(&path).unwrap();
    assert_eq!(grid.shape(), (3, 3));
    assert_abs_diff_eq!(grid.rates[[2, 2]], 0.72, epsilon = 1e-12);
    assert_abs_diff_eq!(grid.total_applicants(), 19_100.0);
}
