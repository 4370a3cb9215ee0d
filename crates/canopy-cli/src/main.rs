use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use canopy_contract::{validate_treesum, ContractError, ImportContract};
use canopy_pipeline::{
    aggregate_stands, build_auto_events, compute_cashflows, load_events_csv,
    read_stand_summary_csv, render_owner_report, write_events_csv, write_stand_summary_csv,
    CalibrationTable, CruiseDesign, CruiseType, PriceSheet, ReportContext,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Canopy cruise-to-report pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a TreeSum file against the import contract
    Validate(ValidateArgs),
    /// Aggregate validated tree-level data to stand summaries
    Aggregate(AggregateArgs),
    /// Build the owner report from stand summaries and prices
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// TreeSum CSV to validate
    treesum: PathBuf,
    /// Import contract JSON (defaults to the built-in contract)
    #[arg(long)]
    contract: Option<PathBuf>,
    /// Prefix for the generated artifacts
    #[arg(long, default_value = "out")]
    out_prefix: String,
}

#[derive(Args, Debug)]
struct AggregateArgs {
    /// Canopy tree-level CSV produced by `validate`
    treelevel: PathBuf,
    #[arg(long, default_value = "out")]
    out_prefix: String,
    #[arg(long, value_enum)]
    cruise_type: CruiseTypeArg,
    /// Plot acreage for Plot cruises, BAF for Point cruises
    #[arg(long)]
    size_value: f64,
    /// Calibration factors JSON
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Column used for per-species calibration groups
    #[arg(long, default_value = "CalSpecies")]
    species_col: String,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Stand summary CSV produced by `aggregate`
    stand_summary: PathBuf,
    /// Prices JSON
    prices: PathBuf,
    /// Output HTML path
    out: PathBuf,
    /// Event schedule CSV; auto-generated when absent
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "Owner")]
    owner: String,
    #[arg(long, default_value = "Tract")]
    tract: String,
    /// Discount rate as a percentage
    #[arg(long, default_value_t = 5.0)]
    discount: f64,
    #[arg(long)]
    calibration: Option<PathBuf>,
    #[arg(long, default_value = "CalSpecies")]
    species_col: String,
    #[arg(long, value_enum)]
    cruise_type: Option<CruiseTypeArg>,
    #[arg(long)]
    size_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CruiseTypeArg {
    Plot,
    Point,
}

impl From<CruiseTypeArg> for CruiseType {
    fn from(value: CruiseTypeArg) -> Self {
        match value {
            CruiseTypeArg::Plot => CruiseType::Plot,
            CruiseTypeArg::Point => CruiseType::Point,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Aggregate(args) => run_aggregate(args),
        Command::Report(args) => run_report(args),
    }
}

fn run_validate(args: ValidateArgs) -> Result<()> {
    let contract = match &args.contract {
        Some(path) => ImportContract::load(path)?,
        None => ImportContract::builtin(),
    };
    let bytes = std::fs::read(&args.treesum)
        .with_context(|| format!("reading {}", args.treesum.display()))?;

    match validate_treesum(&bytes, &contract) {
        Ok(validated) => {
            let normalized = format!("{}_treesum_normalized.csv", args.out_prefix);
            let treelevel = format!("{}_canopy_treelevel.csv", args.out_prefix);
            let report = format!("{}_import_report.json", args.out_prefix);
            std::fs::write(&normalized, validated.normalized.to_csv_bytes()?)?;
            std::fs::write(&treelevel, validated.canopy.to_csv_bytes()?)?;
            std::fs::write(&report, serde_json::to_vec_pretty(&validated.report)?)?;
            info!(
                rows = validated.report.rows,
                warnings = validated.report.warnings.len(),
                "import passed"
            );
            println!("Saved: {normalized}, {treelevel}, {report}");
            Ok(())
        }
        Err(ContractError::Violations(report)) => {
            let path = format!("{}_import_report.json", args.out_prefix);
            std::fs::write(&path, serde_json::to_vec_pretty(&report)?)?;
            for violation in &report.errors {
                eprintln!("violation: {violation}");
            }
            anyhow::bail!("import contract violated, details in {path}");
        }
        Err(err) => Err(err.into()),
    }
}

fn run_aggregate(args: AggregateArgs) -> Result<()> {
    let bytes = std::fs::read(&args.treelevel)
        .with_context(|| format!("reading {}", args.treelevel.display()))?;
    let table = canopy_contract::Table::from_csv(&bytes)?;

    let design = CruiseDesign::new(args.cruise_type.into(), args.size_value)
        .map_err(anyhow::Error::msg)?;
    let calibration = load_calibration(args.calibration.as_deref())?;

    let stands = aggregate_stands(&table, design, &calibration, &args.species_col)?;
    let path = format!("{}_stand_summary.csv", args.out_prefix);
    std::fs::write(&path, write_stand_summary_csv(&stands)?)?;
    info!(stands = stands.len(), "aggregation complete");
    println!("Saved stand summary: {path}");
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    let stands_bytes = std::fs::read(&args.stand_summary)
        .with_context(|| format!("reading {}", args.stand_summary.display()))?;
    let stands = read_stand_summary_csv(&stands_bytes)?;

    let prices_bytes = std::fs::read(&args.prices)
        .with_context(|| format!("reading {}", args.prices.display()))?;
    let sheet = PriceSheet::from_json(&prices_bytes).context("parsing prices JSON")?;

    let calibration = load_calibration(args.calibration.as_deref())?;
    let reference_date = Utc::now().date_naive();

    let events = match &args.events {
        Some(path) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            load_events_csv(&bytes, &calibration)?
        }
        None => build_auto_events(&stands, &calibration, reference_date.year()),
    };
    let schedule_path = args.out.with_extension("events.csv");
    std::fs::write(&schedule_path, write_events_csv(&events)?)?;

    let discount_rate = args.discount / 100.0;
    let roi = compute_cashflows(&events, &sheet, discount_rate, reference_date.year())?;

    let design = CruiseDesign::new(
        args.cruise_type.map(Into::into).unwrap_or(CruiseType::Plot),
        args.size_value.unwrap_or(0.1),
    )
    .map_err(anyhow::Error::msg)?;

    let html = render_owner_report(&ReportContext {
        owner: &args.owner,
        tract: &args.tract,
        generated_on: reference_date,
        discount_rate,
        design,
        species_col: &args.species_col,
        stands: &stands,
        events: &events,
        sheet: &sheet,
        roi: &roi,
        calibration: &calibration,
        import: None,
    });
    std::fs::write(&args.out, html)?;
    info!(npv = roi.npv, "report complete");
    println!("Saved {}", args.out.display());
    Ok(())
}

fn load_calibration(path: Option<&std::path::Path>) -> Result<CalibrationTable> {
    match path {
        Some(path) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            CalibrationTable::from_json(&bytes).context("parsing calibration JSON")
        }
        None => Ok(CalibrationTable::default()),
    }
}
