#![deny(unused_variables)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use medadmit::calibrate::fit::{FitSettings, fit_scorer};
use medadmit::calibrate::grid::ReferenceGrid;
use medadmit::calibrate::schools::{
    CalibrationSettings, audit_school_params, calibrate_school_params,
};
use medadmit::calibrate::validation::{ValidationTargets, generate_validation_report};
use medadmit::catalog::{Catalog, SchoolParamTable, load_schools};
use medadmit::competitiveness::{CompetitivenessScorer, ScorerParams};
use medadmit::experience::ThresholdMode;
use medadmit::fixtures::{average_applicant, perfect_applicant, top_urm_applicant, weak_applicant};
use medadmit::simulate::monte_carlo::{
    DEFAULT_SD_FILE, DEFAULT_SD_INTERVIEW, SimulationConfig, simulate_list,
};
use medadmit::simulate::uncertainty::{UncertaintyConfig, bootstrap_list, decompose_variance};
use medadmit::two_stage::{AdmissionModel, ModelSettings};
use medadmit::types::ApplicantProfile;

mod report;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Clone, Copy, ValueEnum)]
enum DemoApplicant {
    Perfect,
    Average,
    Weak,
    TopUrm,
}

#[derive(Args)]
struct ApplicantArgs {
    /// Applicant profile (.toml)
    #[arg(value_name = "APPLICANT", required_unless_present = "demo")]
    applicant: Option<PathBuf>,

    /// Use a built-in reference applicant instead of a file
    #[arg(long, value_enum, conflicts_with = "applicant")]
    demo: Option<DemoApplicant>,
}

impl ApplicantArgs {
    fn profile(&self) -> Result<ApplicantProfile, Box<dyn std::error::Error>> {
        match (&self.applicant, self.demo) {
            (_, Some(DemoApplicant::Perfect)) => Ok(perfect_applicant()),
            (_, Some(DemoApplicant::Average)) => Ok(average_applicant()),
            (_, Some(DemoApplicant::Weak)) => Ok(weak_applicant()),
            (_, Some(DemoApplicant::TopUrm)) => Ok(top_urm_applicant()),
            (Some(path), None) => Ok(ApplicantProfile::load(path)?),
            (None, None) => Err("an applicant file or --demo is required".into()),
        }
    }
}

#[derive(Args)]
struct ModelArgs {
    /// School catalog (.toml); defaults to the built-in catalog
    #[arg(long, value_name = "PATH")]
    schools: Option<PathBuf>,

    /// Calibrated school parameters (.toml); defaults to the built-in table
    #[arg(long, value_name = "PATH")]
    params: Option<PathBuf>,

    /// Competitiveness scorer parameters (.toml); defaults to the built-in scorer
    #[arg(long, value_name = "PATH")]
    scorer: Option<PathBuf>,

    /// Treat clinical hours below the minimum as disqualifying
    #[arg(long)]
    hard_clinical: bool,
}

impl ModelArgs {
    fn scorer(&self) -> Result<CompetitivenessScorer, Box<dyn std::error::Error>> {
        Ok(match &self.scorer {
            Some(path) => CompetitivenessScorer::new(ScorerParams::load(path)?)?,
            None => CompetitivenessScorer::builtin(),
        })
    }

    fn model(&self) -> Result<AdmissionModel, Box<dyn std::error::Error>> {
        let mut settings = ModelSettings::default();
        if self.hard_clinical {
            settings.experience = settings.experience.with_clinical_mode(ThresholdMode::Hard);
        }
        Ok(AdmissionModel::new(self.scorer()?, settings))
    }

    fn catalog(&self) -> Result<Catalog, Box<dyn std::error::Error>> {
        let catalog = match (&self.schools, &self.params) {
            (Some(schools), Some(params)) => Catalog::load(schools, params)?,
            (Some(schools), None) => {
                Catalog::new(load_schools(schools)?, Catalog::builtin()?.param_table().clone())?
            }
            (None, Some(params)) => Catalog::builtin()?.with_params(SchoolParamTable::load(params)?)?,
            (None, None) => Catalog::builtin()?,
        };
        Ok(catalog)
    }
}

#[derive(Args)]
struct ListArgs {
    /// School id to include (repeatable); defaults to every school in the catalog
    #[arg(long = "school", value_name = "ID")]
    school_ids: Vec<String>,
}

impl ListArgs {
    fn ids(&self, catalog: &Catalog) -> Vec<String> {
        if self.school_ids.is_empty() {
            catalog.ids().map(str::to_string).collect()
        } else {
            self.school_ids.clone()
        }
    }
}

#[derive(Parser)]
#[command(
    name = "medadmit",
    version,
    about = "Medical school admission probability modeling",
    long_about = "Estimates per-school interview and acceptance probabilities for an applicant, \
                  simulates correlated application cycles, and validates the model against \
                  aggregate reference data."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-school probabilities and list-level summary
    Predict {
        #[command(flatten)]
        applicant: ApplicantArgs,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        list: ListArgs,
        /// Also write one row per school to this CSV file
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,
    },

    /// Monte-Carlo simulation of correlated application cycles
    Simulate {
        #[command(flatten)]
        applicant: ApplicantArgs,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        list: ListArgs,
        #[arg(long, default_value_t = 10_000)]
        iterations: usize,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
        /// SD of the shared application-strength effect
        #[arg(long, default_value_t = DEFAULT_SD_FILE)]
        sd_file: f64,
        /// SD of the shared interview-skill effect
        #[arg(long, default_value_t = DEFAULT_SD_INTERVIEW)]
        sd_interview: f64,
    },

    /// Bootstrap credible intervals for each school and the whole list
    Uncertainty {
        #[command(flatten)]
        applicant: ApplicantArgs,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        list: ListArgs,
        #[arg(long, default_value_t = 200)]
        draws: usize,
        #[arg(long)]
        seed: Option<u64>,
        /// Central mass of the reported interval
        #[arg(long, default_value_t = 0.8)]
        level: f64,
        /// Hold calibrated parameters fixed
        #[arg(long)]
        no_parameter_noise: bool,
        /// Hold random effects at zero
        #[arg(long)]
        no_random_effects: bool,
        /// Also split the variance of P(accept) by source at this school
        #[arg(long, value_name = "ID")]
        decompose: Option<String>,
    },

    /// Validate the model against the reference grid, school rates and scenarios
    Validate {
        #[command(flatten)]
        model: ModelArgs,
        /// Reference grid (.toml); defaults to the built-in grid
        #[arg(long, value_name = "PATH")]
        grid: Option<PathBuf>,
        /// Exit with status 1 when any check fails
        #[arg(long)]
        strict: bool,
    },

    /// Derive per-school parameters from catalog statistics
    CalibrateSchools {
        #[command(flatten)]
        model: ModelArgs,
        /// Where to write the parameter table (.toml)
        #[arg(long, value_name = "PATH")]
        output: PathBuf,
        /// Weight on the tier mean when pooling, in [0, 1]
        #[arg(long)]
        shrinkage: Option<f64>,
    },

    /// Refit the competitiveness scorer to a reference grid
    FitScorer {
        /// Reference grid (.toml); defaults to the built-in grid
        #[arg(long, value_name = "PATH")]
        grid: Option<PathBuf>,
        /// Where to write the scorer parameters (.toml)
        #[arg(long, value_name = "PATH")]
        output: PathBuf,
        /// First-difference penalty on adjacent spline coefficients
        #[arg(long)]
        smoothing: Option<f64>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Predict {
            applicant,
            model,
            list,
            csv,
        }) => run_predict(&applicant, &model, &list, csv),
        Some(Commands::Simulate {
            applicant,
            model,
            list,
            iterations,
            seed,
            sd_file,
            sd_interview,
        }) => {
            let config = SimulationConfig {
                iterations,
                seed,
                sd_file,
                sd_interview,
            };
            run_simulate(&applicant, &model, &list, &config)
        }
        Some(Commands::Uncertainty {
            applicant,
            model,
            list,
            draws,
            seed,
            level,
            no_parameter_noise,
            no_random_effects,
            decompose,
        }) => {
            let config = UncertaintyConfig {
                draws,
                seed,
                credible_level: level,
                perturb_params: !no_parameter_noise,
                draw_effects: !no_random_effects,
                ..UncertaintyConfig::default()
            };
            run_uncertainty(&applicant, &model, &list, &config, decompose.as_deref())
        }
        Some(Commands::Validate {
            model,
            grid,
            strict,
        }) => run_validate(&model, grid, strict),
        Some(Commands::CalibrateSchools {
            model,
            output,
            shrinkage,
        }) => run_calibrate_schools(&model, output, shrinkage),
        Some(Commands::FitScorer {
            grid,
            output,
            smoothing,
        }) => run_fit_scorer(grid, output, smoothing),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_predict(
    applicant: &ApplicantArgs,
    model_args: &ModelArgs,
    list_args: &ListArgs,
    csv: Option<PathBuf>,
) -> CliResult {
    let profile = applicant.profile()?;
    let model = model_args.model()?;
    let catalog = model_args.catalog()?;
    let list = model.calculate_list_probability(&profile, list_args.ids(&catalog), &catalog);

    report::write_predictions(&mut io::stdout().lock(), &list)?;
    if let Some(path) = csv {
        report::write_predictions_csv(&path, &list)?;
        log::info!("Wrote {} rows to {}", list.predictions.len(), path.display());
    }
    Ok(())
}

fn run_simulate(
    applicant: &ApplicantArgs,
    model_args: &ModelArgs,
    list_args: &ListArgs,
    config: &SimulationConfig,
) -> CliResult {
    let profile = applicant.profile()?;
    let model = model_args.model()?;
    let catalog = model_args.catalog()?;
    let list = model.calculate_list_probability(&profile, list_args.ids(&catalog), &catalog);
    let result = simulate_list(&list, config);
    report::write_simulation(&mut io::stdout().lock(), &result)?;
    Ok(())
}

fn run_uncertainty(
    applicant: &ApplicantArgs,
    model_args: &ModelArgs,
    list_args: &ListArgs,
    config: &UncertaintyConfig,
    decompose: Option<&str>,
) -> CliResult {
    let profile = applicant.profile()?;
    let model = model_args.model()?;
    let catalog = model_args.catalog()?;
    let result = bootstrap_list(&model, &profile, list_args.ids(&catalog), &catalog, config);

    let mut out = io::stdout().lock();
    report::write_uncertainty(&mut out, &result)?;
    if let Some(id) = decompose {
        let (school, params) = catalog
            .lookup(id)
            .ok_or_else(|| format!("school '{id}' is not in the catalog or has no parameters"))?;
        let variance = decompose_variance(&model, &profile, school, params, config);
        writeln!(out)?;
        report::write_variance(&mut out, id, &variance)?;
    }
    Ok(())
}

fn run_validate(model_args: &ModelArgs, grid: Option<PathBuf>, strict: bool) -> CliResult {
    let model = model_args.model()?;
    let catalog = model_args.catalog()?;
    let grid = match grid {
        Some(path) => ReferenceGrid::load(&path)?,
        None => ReferenceGrid::builtin(),
    };
    let report = generate_validation_report(&model, &catalog, &grid, &ValidationTargets::default());
    report::write_validation(&mut io::stdout().lock(), &report)?;
    if strict && !report.passed {
        return Err(format!("{} validation checks failed", report.summary.failed.len()).into());
    }
    Ok(())
}

fn run_calibrate_schools(model_args: &ModelArgs, output: PathBuf, shrinkage: Option<f64>) -> CliResult {
    let scorer = model_args.scorer()?;
    let catalog = model_args.catalog()?;
    let mut settings = CalibrationSettings::default();
    if let Some(shrinkage) = shrinkage {
        settings.shrinkage = shrinkage.clamp(0.0, 1.0);
    }

    let table = calibrate_school_params(catalog.schools(), &scorer, &settings);
    table.save(&output)?;
    log::info!("Wrote parameters for {} schools to {}", table.len(), output.display());

    let audit = audit_school_params(&catalog.with_params(table)?, &scorer);
    report::write_audit(&mut io::stdout().lock(), &audit)?;
    Ok(())
}

fn run_fit_scorer(grid: Option<PathBuf>, output: PathBuf, smoothing: Option<f64>) -> CliResult {
    let grid = match grid {
        Some(path) => ReferenceGrid::load(&path)?,
        None => ReferenceGrid::builtin(),
    };
    let mut settings = FitSettings::default();
    if let Some(smoothing) = smoothing {
        settings.smoothing = smoothing.max(0.0);
    }

    let outcome = fit_scorer(&grid, &settings)?;
    outcome.params.save(&output)?;
    println!(
        "Fitted in {} iterations ({}); weighted logit RMSE {:.4}",
        outcome.iterations,
        if outcome.converged { "converged" } else { "not converged" },
        outcome.weighted_logit_rmse
    );
    println!("Wrote scorer parameters to {}", output.display());
    Ok(())
}
