// 🏷️ award-pipeline - extract, classify and repair award notices

use anyhow::Result;
use award_pipeline::{
    analyze, AwardClassifier, BatchReport, CliOverrides, IssueClassifier, JsonStore, Pipeline, PipelineConfig,
    RepairStrategy,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "award-pipeline", version, about = "Award notice extraction and repair pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract, classify, score and repair a batch of notices
    Run(RunArgs),
    /// Fill empty fields of stored records from their source documents
    Repair(RepairArgs),
    /// Re-score an existing output directory without extraction
    Analyze(AnalyzeArgs),
    /// Compare two location strings through the normalizer
    Locations(LocationsArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// TOML configuration file
    #[arg(long, env = "AWARD_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of `<awardNum>.html` source documents
    #[arg(long, value_name = "DIR")]
    source_dir: Option<PathBuf>,

    /// Directory for output records and reports
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Directory for pre-repair backups
    #[arg(long, value_name = "DIR")]
    backup_dir: Option<PathBuf>,

    /// JSON override table
    #[arg(long, value_name = "FILE")]
    overrides: Option<PathBuf>,

    /// Score only, never repair
    #[arg(long)]
    no_repair: bool,

    /// full | measurements
    #[arg(long)]
    repair_strategy: Option<RepairStrategy>,

    /// Identifiers to process (default: every document in the source directory)
    ids: Vec<String>,
}

#[derive(Parser, Debug)]
struct RepairArgs {
    #[arg(long, env = "AWARD_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    source_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    backup_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    overrides: Option<PathBuf>,

    /// full | measurements
    #[arg(long)]
    repair_strategy: Option<RepairStrategy>,

    /// Identifiers to repair (default: every stored record)
    ids: Vec<String>,
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    #[arg(long, env = "AWARD_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct LocationsArgs {
    #[arg(long, env = "AWARD_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    first: String,
    second: String,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "award_pipeline=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Commands::Run(args) => run(args),
        Commands::Repair(args) => run_repair(args),
        Commands::Analyze(args) => run_analyze(args),
        Commands::Locations(args) => run_locations(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let cli = CliOverrides {
        source_dir: args.source_dir,
        output_dir: args.output_dir,
        backup_dir: args.backup_dir,
        override_file: args.overrides,
        no_repair: args.no_repair,
        repair_strategy: args.repair_strategy,
    };
    let config = PipelineConfig::resolve(args.config.as_deref(), &cli)?;

    println!("🏷️  Award Pipeline v{}", award_pipeline::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📂 Source:  {}", config.source_dir.display());
    println!("💾 Output:  {}", config.output_dir.display());
    println!("🗣️  Dialect: {}", config.dialect.name);

    let pipeline = Pipeline::from_config(&config)?;
    let ids = (!args.ids.is_empty()).then_some(args.ids);
    let report = pipeline.run_batch(ids, None)?;
    pipeline.persist(&report)?;

    print_report(&report);
    println!("📄 Reports: {}", pipeline.store().reports_dir().display());

    Ok(())
}

fn run_repair(args: RepairArgs) -> Result<()> {
    let cli = CliOverrides {
        source_dir: args.source_dir,
        output_dir: args.output_dir,
        backup_dir: args.backup_dir,
        override_file: args.overrides,
        no_repair: false,
        repair_strategy: args.repair_strategy,
    };
    let mut config = PipelineConfig::resolve(args.config.as_deref(), &cli)?;
    config.repair = true;

    println!("🔧 Repairing stored records in {}", config.output_dir.display());
    println!("   strategy: {:?}, backups: {}", config.repair_strategy, config.backup_dir.display());

    let pipeline = Pipeline::from_config(&config)?;
    let ids = (!args.ids.is_empty()).then_some(args.ids);
    let report = pipeline.repair_stored(ids, None)?;
    pipeline.persist(&report)?;

    print_report(&report);
    println!("💾 Backups: {}", config.backup_dir.join(pipeline.run_id()).display());
    Ok(())
}

fn print_report(report: &BatchReport) {
    let summary = &report.summary;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ {}", summary.summary());
    println!(
        "  before repair: {} critical, {} important, {} measurement, {} clean",
        summary.initial_severity.critical,
        summary.initial_severity.important,
        summary.initial_severity.measurement,
        summary.initial_severity.clean
    );
    println!("  after repair:  {}", report.issues.summary());
    for failure in &summary.failures {
        println!("❌ {} [{}] {}", failure.award_num, failure.reason_code, failure.message);
    }
    for conflict in &summary.location_conflicts {
        println!("⚠️  {}", conflict.summary());
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let cli = CliOverrides {
        output_dir: args.output_dir,
        ..Default::default()
    };
    let config = PipelineConfig::resolve(args.config.as_deref(), &cli)?;

    let store = JsonStore::new(&config.output_dir, &config.backup_dir);
    let scorer = IssueClassifier::new(AwardClassifier::new(config.catalog()?));
    let report = analyze(&store, &scorer)?;

    println!("📊 {}", report.summary());
    for (award, counts) in &report.by_award_type {
        println!("  {:<6} {:>4} records", award, counts.total());
    }
    for listing in report.listings().take(20) {
        println!(
            "  {} [{}] {} missing: {}",
            listing.award_num,
            listing.severity.as_str(),
            listing.plant,
            listing.missing_fields.join(", ")
        );
    }
    println!("📄 Reports: {}", store.reports_dir().display());
    Ok(())
}

fn run_locations(args: LocationsArgs) -> Result<()> {
    let config = PipelineConfig::resolve(args.config.as_deref(), &CliOverrides::default())?;
    let normalizer = config.normalizer();

    let (a, b) = (normalizer.canonical(&args.first), normalizer.canonical(&args.second));
    if normalizer.equivalent(&args.first, &args.second) {
        println!("✅ equivalent: \"{}\" = \"{}\"", a, b);
    } else {
        println!("❌ different: \"{}\" vs \"{}\"", a, b);
    }
    Ok(())
}
