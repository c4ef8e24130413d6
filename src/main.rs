//! quake-alert CLI
//!
//! Generates synthetic datasets, trains the alert classifier, runs single
//! predictions and summarizes datasets.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use quake_alert::config::Config;
use quake_alert::dataset::{read_table, DatasetGenerator, DatasetSummary};
use quake_alert::error::AppError;
use quake_alert::ml::{ModelHandle, ModelTrainer, ParamGrid};
use quake_alert::models::Observation;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use validator::Validate;

#[derive(Parser, Debug)]
#[command(name = "quake-alert")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Earthquake alert-level classifier", long_about = None)]
struct Cli {
    /// Configuration file (overrides QUAKE_ALERT_CONFIG)
    #[arg(short, long, global = true, env = "QUAKE_ALERT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a synthetic labeled dataset
    Generate(GenerateArgs),

    /// Train the classifier and write the model artifacts
    Train(TrainArgs),

    /// Predict the alert level of a single event
    Predict(PredictArgs),

    /// Print alert statistics for a dataset
    Summary(SummaryArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Number of rows
    #[arg(short, long)]
    rows: Option<usize>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Output CSV path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Input CSV dataset
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Directory to write best_model.bin and label_encoder.json into
    #[arg(short, long)]
    artifacts: Option<PathBuf>,

    /// Search a reduced hyperparameter grid
    #[arg(long)]
    quick: bool,

    /// Worker threads for the search (0 = all cores)
    #[arg(long)]
    n_jobs: Option<usize>,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Event magnitude
    #[arg(long)]
    magnitude: f64,

    /// Hypocenter depth in km
    #[arg(long)]
    depth: f64,

    /// Community decimal intensity
    #[arg(long)]
    cdi: f64,

    /// Modified Mercalli intensity
    #[arg(long)]
    mmi: f64,

    /// Significance
    #[arg(long)]
    sig: f64,

    /// Directory holding the model artifacts
    #[arg(short, long)]
    artifacts: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    /// Input CSV dataset
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let app_error = err.chain().find_map(|cause| cause.downcast_ref::<AppError>());
            match app_error {
                Some(app_error) => {
                    eprintln!("Error [{}]: {:#}", app_error.error_code(), err);
                    ExitCode::from(app_error.exit_code())
                }
                None => {
                    eprintln!("Error: {:#}", err);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from(cli.config.as_deref())
        .map_err(AppError::from)
        .context("failed to load configuration")?;
    init_tracing(&config);

    match cli.command {
        Commands::Generate(args) => run_generate(&config, args),
        Commands::Train(args) => run_train(&config, args),
        Commands::Predict(args) => run_predict(&config, args),
        Commands::Summary(args) => run_summary(&config, args),
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("quake_alert={}", config.observability.log_level))
    });
    let json = config.observability.json_logs;

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr)))
        .try_init();
}

fn run_generate(config: &Config, args: GenerateArgs) -> Result<()> {
    let generator = DatasetGenerator::new(
        args.rows.unwrap_or(config.generator.rows),
        args.seed.unwrap_or(config.generator.seed),
    );
    let output = args.output.unwrap_or_else(|| config.paths.dataset.clone());

    let rows = generator
        .write_csv(&output)
        .with_context(|| format!("failed to generate dataset at {}", output.display()))?;

    println!("Wrote {} rows to {}", rows, output.display());
    Ok(())
}

fn run_train(config: &Config, args: TrainArgs) -> Result<()> {
    let dataset = args.dataset.unwrap_or_else(|| config.paths.dataset.clone());
    let artifacts = args.artifacts.unwrap_or_else(|| config.paths.artifacts_dir.clone());

    let mut training = config.training.clone();
    if let Some(n_jobs) = args.n_jobs {
        training.n_jobs = n_jobs;
    }

    let mut trainer = ModelTrainer::new(training);
    if args.quick {
        info!("Using the reduced hyperparameter grid");
        trainer = trainer.with_grid(ParamGrid::quick());
    }

    let summary = trainer
        .train_and_persist(&dataset, &artifacts)
        .with_context(|| format!("training on {} failed", dataset.display()))?;

    println!("Run id:          {}", summary.run_id);
    println!("Best parameters: {}", summary.best_params);
    println!("CV weighted F1:  {:.4}", summary.best_cv_score);
    println!("Test accuracy:   {:.2}%", summary.test_metrics.accuracy * 100.0);
    println!("Train/test rows: {}/{}", summary.n_train, summary.n_test);
    println!();
    println!("{}", summary.report);
    if let Some(paths) = &summary.artifacts {
        println!("Model saved to {}", paths.model);
        println!("Label encoder saved to {}", paths.encoder);
    }
    Ok(())
}

fn run_predict(config: &Config, args: PredictArgs) -> Result<()> {
    let observation = Observation::new(args.magnitude, args.depth, args.cdi, args.mmi, args.sig);
    observation
        .validate()
        .map_err(AppError::from)
        .context("invalid earthquake parameters")?;

    let artifacts = args.artifacts.unwrap_or_else(|| config.paths.artifacts_dir.clone());
    let handle = ModelHandle::from_dir(&artifacts);
    let result = handle
        .predict(&observation)
        .with_context(|| format!("prediction with artifacts in {} failed", artifacts.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "Alert level:            {} ({})",
        result.alert.as_str().to_uppercase(),
        result.alert.description()
    );
    println!("Confidence:             {:.1}%", result.confidence);
    println!("Risk score:             {:.1} / 100", result.risk_score);
    println!("Aftershock probability: {:.1}%", result.aftershock_probability);
    Ok(())
}

fn run_summary(config: &Config, args: SummaryArgs) -> Result<()> {
    let dataset = args.dataset.unwrap_or_else(|| config.paths.dataset.clone());
    let table = read_table(&dataset)
        .with_context(|| format!("failed to read {}", dataset.display()))?;
    let summary = DatasetSummary::from_table(&table)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary);
    }
    Ok(())
}
