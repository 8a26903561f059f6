use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod backend;
mod cases;
mod config;
mod consistency;
mod evaluation;
mod extract;
mod ledger;
mod models;
mod output;
mod pricing;
mod prompts;
mod report;
mod runner;
mod statistics;

use crate::backend::{Backend, build_backend};
use crate::cases::CaseSuite;
use crate::config::Config;
use crate::ledger::CostLedger;
use crate::models::TaskKind;
use crate::output::OutputFormat;
use crate::pricing::PricingTable;
use crate::prompts::SystemPrompts;
use crate::runner::{RunSettings, Runner};

/// Restaurant LLM Evaluation CLI - Benchmark models on persona and menu tasks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    run_file: PathBuf,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log every backend call
    #[arg(short, long)]
    verbose: bool,

    /// Only evaluate these models (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    models: Vec<String>,

    /// Only run these task kinds (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    tasks: Vec<TaskKind>,

    /// Directory for raw results, cost log and report; overrides the config
    #[arg(long)]
    storage_path: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("restaurant_llm_eval={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = Config::from_file(&args.run_file)?;
    config.retain_models(&args.models);
    if !args.tasks.is_empty() {
        config.tasks = args.tasks.clone();
    }
    if args.storage_path.is_some() {
        config.storage_path = args.storage_path.clone();
    }
    config.validate()?;

    let pricing = PricingTable::with_overrides(&config.pricing);
    let settings = config.backend_settings();
    let backends: Vec<Arc<dyn Backend>> = config
        .models
        .iter()
        .map(|model| {
            if let Some(var) = model.api_key_var() {
                if std::env::var(var).is_err() {
                    tracing::warn!(model = %model.name, env_var = %var, "API key not set; calls will fail");
                }
            }
            build_backend(model, &settings, pricing.price_for(&model.name))
        })
        .collect();

    let suite = match &config.cases_path {
        Some(path) => CaseSuite::load_from_file(path)?,
        None => CaseSuite::builtin(),
    };
    let cases = config
        .selected_tasks()
        .into_iter()
        .flat_map(|kind| suite.for_task(kind).to_vec())
        .collect();

    let runner = Runner::new(
        backends,
        cases,
        SystemPrompts::with_overrides(&config.prompts),
        Arc::new(CostLedger::new()),
        RunSettings::from_config(&config),
    );

    let results = runner.run_evaluations().await;
    let ledger = runner.ledger();
    if ledger.is_empty() {
        tracing::warn!("No backend calls were made; check the model and task selection");
    }
    let final_report = report::assemble(results, ledger, report::timestamp());

    output::print_results(&final_report, args.output);

    if let Some(storage_path) = &config.storage_path {
        report::store_report(&final_report, &ledger.entries(), &pricing, Path::new(storage_path))
            .context("Failed to store reports")?;
    }

    Ok(())
}
