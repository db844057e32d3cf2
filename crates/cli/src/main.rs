use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use stockwatch_anomalies::DetectionPass;
use stockwatch_core::UserId;
use stockwatch_events::TracingNotificationSink;
use stockwatch_infra::{PipelineConfig, Scenario, StockPipeline, session};
use stockwatch_observability::LogFormat;

/// Stock mutation and anomaly detection pipeline.
#[derive(Parser)]
#[command(name = "stockwatch", version, about = "Stock mutation and anomaly detection pipeline")]
struct Cli {
    /// Log line format (json or pretty)
    #[arg(long, global = true, default_value = "json")]
    log_format: LogFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed fixture products, drive them through the pipeline and run detection
    Scenario {
        /// Scenarios to run (low_stock, theft, shrinkage, unauthorized_access, general)
        #[arg(required_unless_present = "all")]
        names: Vec<Scenario>,
        /// Run every scenario
        #[arg(long)]
        all: bool,
        /// Delete fixture products afterwards
        #[arg(long)]
        cleanup: bool,
    },

    /// Run a single detection pass and merge its findings
    Detect {
        /// general or theft
        pass: DetectionPass,
    },

    /// Summarize loss-type anomalies over a trailing window
    Analytics {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioReport<T> {
    results: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cleaned_up: Option<usize>,
}

fn emit(value: &impl Serialize, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

async fn run(cli: Cli, pipeline: &StockPipeline) -> anyhow::Result<()> {
    match cli.command {
        Commands::Scenario { names, all, cleanup } => {
            let operator = session::current_actor().context("no operator session")?;
            let scenarios = if all { Scenario::ALL.to_vec() } else { names };
            let mut results = Vec::with_capacity(scenarios.len());
            for scenario in scenarios {
                let result = pipeline
                    .harness
                    .run_scenario_as(scenario, operator)
                    .await
                    .with_context(|| format!("scenario {scenario} failed"))?;
                results.push(result);
            }
            let cleaned_up = if cleanup {
                Some(pipeline.harness.cleanup().await.context("cleanup failed")?)
            } else {
                None
            };
            emit(&ScenarioReport { results, cleaned_up }, cli.pretty)
        }
        Commands::Detect { pass } => {
            let round = pipeline.orchestrator.detect_and_merge(&[pass]).await?;
            for failure in &round.partial_failures {
                tracing::warn!(pass = %failure.pass, reason = %failure.reason, "detection pass failed");
            }
            emit(&round, cli.pretty)
        }
        Commands::Analytics { days } => {
            let report = pipeline
                .trigger
                .theft_analytics(days)
                .await
                .context("theft analytics unavailable")?;
            emit(&report, cli.pretty)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    stockwatch_observability::tracing::init(cli.log_format);

    let config = PipelineConfig::from_env();
    let pipeline = StockPipeline::in_memory(config, Arc::new(TracingNotificationSink))
        .context("failed to assemble pipeline")?;

    let operator = UserId::new();
    session::initialize(operator);
    tracing::info!(%operator, "operator session started");

    let result = run(cli, &pipeline).await;

    if let Some(actor) = session::teardown() {
        tracing::info!(%actor, "operator session ended");
    }
    result
}
