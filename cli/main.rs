// ========================================================================================
//
//                               Command-line front end: riskrank
//
// ========================================================================================
//
// Parses arguments, loads configuration and reference tables once, and dispatches to
// the library. All scoring semantics live in the library; this file only formats.

#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use riskrank::batch::run_batch;
use riskrank::config::RiskConfig;
use riskrank::export::ExportPayload;
use riskrank::profile::{HeightUnit, WeightUnit, body_mass_index};
use riskrank::tier::RiskTier;
use riskrank::types::{ExposureHistory, Gender};
use riskrank::{ConditionSelection, ReportOrdering, RiskEngine, RiskReport};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_CONFIG_FILE: &str = "riskrank.toml";

#[derive(Parser)]
#[command(
    name = "riskrank",
    about = "Comparative disease-risk percentiles from a risk-factor profile",
    long_about = "Scores a risk-factor profile with proportional-hazards coefficients and ranks \
                 each score against the empirical distribution of a same-gender, same-age-band \
                 reference cohort."
)]
struct Cli {
    /// TOML configuration file (defaults to ./riskrank.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log progress at info level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess one profile
    #[command(about = "Assess a single profile and print its risk report")]
    Assess(AssessArgs),

    /// Score a table of profiles
    #[command(about = "Score a TSV of profiles (outputs: one line per profile and condition)")]
    Batch(BatchArgs),

    /// List the conditions the loaded tables can score, by category
    #[command(about = "List scorable conditions by category")]
    Conditions,

    /// Load and check the configured tables without scoring anything
    #[command(about = "Validate configuration and reference tables")]
    Validate,

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortOrder {
    /// Keep the requested order
    Requested,
    /// Highest percentile first
    Concerning,
}

impl From<SortOrder> for ReportOrdering {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Requested => ReportOrdering::AsRequested,
            SortOrder::Concerning => ReportOrdering::MostConcerningFirst,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum HeightUnitArg {
    Cm,
    M,
    In,
}

#[derive(Clone, Copy, ValueEnum)]
enum WeightUnitArg {
    Kg,
    Lb,
}

#[derive(Args)]
struct SelectionArgs {
    /// Condition name or alias; repeat for several (default: all)
    #[arg(long = "condition", value_name = "NAME")]
    conditions: Vec<String>,

    /// Condition category; repeat for several
    #[arg(long = "category", value_name = "NAME", conflicts_with = "conditions")]
    categories: Vec<String>,

    /// Result ordering
    #[arg(long, value_enum, default_value_t = SortOrder::Requested)]
    sort: SortOrder,
}

impl SelectionArgs {
    fn selection(&self) -> ConditionSelection {
        if !self.conditions.is_empty() {
            ConditionSelection::Conditions(self.conditions.clone())
        } else if !self.categories.is_empty() {
            ConditionSelection::Categories(self.categories.clone())
        } else {
            ConditionSelection::All
        }
    }
}

#[derive(Args)]
struct AssessArgs {
    #[arg(long)]
    age: u32,

    /// male / female (or 1 / 2)
    #[arg(long)]
    gender: Gender,

    /// Resting heart rate in beats per minute
    #[arg(long = "heart-rate", value_name = "BPM")]
    heart_rate: u32,

    /// Body-mass index; alternatively give --height and --weight
    #[arg(long, required_unless_present_all = ["height", "weight"])]
    bmi: Option<f64>,

    #[arg(long, requires = "weight", conflicts_with = "bmi")]
    height: Option<f64>,

    #[arg(long, requires = "height", conflicts_with = "bmi")]
    weight: Option<f64>,

    #[arg(long, value_enum, default_value_t = HeightUnitArg::Cm)]
    height_unit: HeightUnitArg,

    #[arg(long, value_enum, default_value_t = WeightUnitArg::Kg)]
    weight_unit: WeightUnitArg,

    /// never / former / current
    #[arg(long)]
    smoking: ExposureHistory,

    /// never / former / current
    #[arg(long)]
    drinking: ExposureHistory,

    #[command(flatten)]
    selection: SelectionArgs,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Write the consented event payload (JSON) to this file
    #[arg(long, value_name = "PATH", requires = "consent")]
    export: Option<PathBuf>,

    /// The person agreed to anonymous recording of this assessment
    #[arg(long)]
    consent: bool,

    /// Session identifier for the exported records (generated when omitted)
    #[arg(long, value_name = "ID")]
    session_id: Option<String>,
}

#[derive(Args)]
struct BatchArgs {
    /// Profiles: id, age, gender, resting_heart_rate, bmi (or height_cm and weight_kg), smoking, drinking
    #[arg(value_name = "PROFILES")]
    input: PathBuf,

    /// Results TSV
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    #[command(flatten)]
    selection: SelectionArgs,
}

fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let Cli {
        config, command, ..
    } = cli;
    let result = match command {
        Some(Commands::Assess(args)) => run_assess(config.as_deref(), args),
        Some(Commands::Batch(args)) => run_batch_command(config.as_deref(), args),
        Some(Commands::Conditions) => run_conditions(config.as_deref()),
        Some(Commands::Validate) => run_validate(config.as_deref()),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| Box::new(e) as Box<dyn Error>),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// An explicit `--config` must exist; otherwise `./riskrank.toml` is used when present
/// and the built-in defaults when not.
fn load_config(path: Option<&Path>) -> Result<RiskConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(RiskConfig::load(path)?),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                Ok(RiskConfig::load(default)?)
            } else {
                Ok(RiskConfig::default())
            }
        }
    }
}

fn load_engine(path: Option<&Path>) -> Result<(RiskConfig, RiskEngine), Box<dyn Error>> {
    let config = load_config(path)?;
    let engine = RiskEngine::load(&config)?;
    Ok((config, engine))
}

fn run_assess(config: Option<&Path>, args: AssessArgs) -> Result<(), Box<dyn Error>> {
    let (_, engine) = load_engine(config)?;

    let bmi = match (args.bmi, args.height, args.weight) {
        (Some(bmi), _, _) => bmi,
        (None, Some(height), Some(weight)) => {
            let height_unit = match args.height_unit {
                HeightUnitArg::Cm => HeightUnit::Centimetres,
                HeightUnitArg::M => HeightUnit::Metres,
                HeightUnitArg::In => HeightUnit::Inches,
            };
            let weight_unit = match args.weight_unit {
                WeightUnitArg::Kg => WeightUnit::Kilograms,
                WeightUnitArg::Lb => WeightUnit::Pounds,
            };
            body_mass_index(height, height_unit, weight, weight_unit)?
        }
        _ => return Err("either --bmi or both --height and --weight are required".into()),
    };
    let profile = engine.profile(
        args.age,
        args.gender,
        args.heart_rate,
        bmi,
        args.smoking,
        args.drinking,
    )?;
    let age_band = engine.age_band(profile.age());
    let report = engine.assess(
        &profile,
        &args.selection.selection(),
        args.selection.sort.into(),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, profile.gender(), &age_band, bmi);
    }

    if let Some(path) = &args.export {
        let session_id = args.session_id.clone().unwrap_or_else(generate_session_id);
        match ExportPayload::build(
            args.consent,
            &session_id,
            &profile,
            &age_band,
            &report,
            engine.export_settings(),
        ) {
            Some(payload) => {
                fs::write(path, payload.to_json()?)?;
                eprintln!(
                    "Recorded {} result(s) for session {} in {}",
                    payload.events.len(),
                    session_id,
                    path.display()
                );
            }
            None => eprintln!("No consent given; nothing was exported."),
        }
    }
    Ok(())
}

fn print_report(report: &RiskReport, gender: Gender, age_band: &str, bmi: f64) {
    println!("Cohort: {gender}, age band {age_band} (BMI {bmi:.1})");
    println!();
    if report.results.is_empty() {
        println!("No condition could be scored for this cohort.");
    } else {
        println!(
            "{:<34} {:<30} {:>8} {:>10} {:>8}  {}",
            "Condition", "Category", "LP", "Percentile", "Bracket", "Tier"
        );
        for result in &report.results {
            println!(
                "{:<34} {:<30} {:>8.3} {:>10} {:>8}  {}",
                result.condition,
                result.category,
                result.linear_predictor,
                result.percentile,
                result.bracket_percentile,
                result.tier
            );
        }
    }
    println!();
    println!(
        "Tier counts: {}",
        RiskTier::ALL
            .iter()
            .rev()
            .map(|tier| format!(
                "{tier} {}",
                report.tier_counts.get(tier).copied().unwrap_or(0)
            ))
            .join(", ")
    );
    if !report.gaps.is_empty() {
        println!("Not scored:");
        for gap in &report.gaps {
            println!("  - {gap}");
        }
    }
}

fn generate_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{nanos:x}-{:x}", process::id())
}

fn run_batch_command(config: Option<&Path>, args: BatchArgs) -> Result<(), Box<dyn Error>> {
    let (_, engine) = load_engine(config)?;
    let summary = run_batch(
        &engine,
        &args.input,
        &args.output,
        &args.selection.selection(),
        args.selection.sort.into(),
    )?;
    println!(
        "Scored {} of {} profile(s): {} result line(s), {} gap(s). Rejected rows: {}.",
        summary.profiles - summary.rejected,
        summary.profiles,
        summary.results,
        summary.gaps,
        summary.rejected
    );
    println!("Results written to {}", args.output.display());
    Ok(())
}

fn run_conditions(config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let (_, engine) = load_engine(config)?;
    let available = engine.available_conditions();
    let catalog = engine.catalog();

    let mut listed = 0usize;
    for category in catalog.categories() {
        let members: Vec<&str> = available
            .iter()
            .copied()
            .filter(|name| catalog.category_of(name) == category.name)
            .collect();
        if members.is_empty() {
            continue;
        }
        listed += members.len();
        println!("{} ({})", category.name, members.len());
        for name in members {
            println!("  {name}");
        }
    }
    // Conditions outside every configured category.
    let stray: Vec<&str> = available
        .iter()
        .copied()
        .filter(|name| {
            !catalog
                .categories()
                .iter()
                .any(|c| c.name == catalog.category_of(name))
        })
        .collect();
    if !stray.is_empty() {
        listed += stray.len();
        println!("Uncategorised ({})", stray.len());
        for name in stray {
            println!("  {name}");
        }
    }

    let unranked: Vec<&str> = engine
        .coefficients()
        .conditions()
        .filter(|name| !available.contains(name))
        .collect();
    if !unranked.is_empty() {
        println!(
            "Without a reference distribution: {}",
            unranked.iter().join(", ")
        );
    }
    log::info!("{listed} scorable condition(s)");
    Ok(())
}

fn run_validate(config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let (config, engine) = load_engine(config)?;
    if let Some(files) = engine.data_files() {
        println!(
            "Coefficients: {} (version {})",
            files.coefficients.display(),
            files.coef_version
        );
        println!(
            "Percentiles:  {} (version {})",
            files.percentiles.display(),
            files.pct_version
        );
    }
    println!(
        "{} condition(s) with coefficients, {} percentile row(s), {} scorable.",
        engine.coefficients().len(),
        engine.percentiles().len(),
        engine.available_conditions().len()
    );
    println!(
        "Age bands: {} (table: {})",
        config.age_bands()?.labels().iter().join(", "),
        engine.percentiles().age_bands().iter().join(", ")
    );
    println!("Ranking: {:?}", config.ranking.method);
    println!("OK");
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;
    const YEAR: u64 = 365 * DAY;

    let (amount, unit) = match seconds {
        s if s < MINUTE => return format!("{s} seconds ago"),
        s if s < HOUR => (s as f64 / MINUTE as f64, "minutes"),
        s if s < DAY => (s as f64 / HOUR as f64, "hours"),
        s if s < YEAR => (s as f64 / DAY as f64, "days"),
        s => (s as f64 / YEAR as f64, "years"),
    };
    format!("{amount:.1} {unit} ago")
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let release_tag = option_env!("RISKRANK_RELEASE_TAG");
    let build_timestamp: u64 = env!("RISKRANK_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("riskrank {version}");
    match release_tag {
        Some(tag) => println!("Release: {tag}"),
        None => println!("Release: development build"),
    }

    if build_timestamp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
