// PDF chat worker
//
// Design Decision: Use clap derive; `run` is the long-lived worker, the other
// subcommands are operational one-shots against the same backends.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdfchat_core::telemetry::{init_telemetry, TelemetryConfig};
use pdfchat_worker::{Backends, IngestWorker, QueueConsumer, WorkerConfig};

#[derive(Parser)]
#[command(name = "pdfchat-worker")]
#[command(about = "PDF chat Q&A history worker - ingest, batch commit, reconcile")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume Q&A events and commit them in batches (default)
    Run,

    /// Print the reconciled history of a document as JSON
    History {
        /// Document id
        document_id: String,
    },

    /// Replay dead-lettered batches and exit
    Replay,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter
    // - LOG_FORMAT=json: JSON lines
    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "pdfchat" {
        telemetry_config.service_name = "pdfchat-worker".to_string();
    }
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter =
            Some("pdfchat_worker=debug,pdfchat_core=debug,pdfchat_storage=info".to_string());
    }
    init_telemetry(telemetry_config);

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    let backends = Backends::connect(&config).await?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, backends).await,
        Commands::History { document_id } => {
            let history = backends.reconciler().history(&document_id).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
            Ok(())
        }
        Commands::Replay => {
            let worker = IngestWorker::new(&config, backends);
            if let Some(report) = worker.replay_dead_letters().await {
                println!("replayed: {}, failed: {}", report.replayed, report.failed);
            }
            Ok(())
        }
    }
}

async fn run(config: WorkerConfig, backends: Backends) -> Result<()> {
    tracing::info!(
        queue = %config.queue,
        flush_interval_secs = config.flush_interval.as_secs(),
        "pdfchat-worker starting..."
    );

    let consumer = QueueConsumer::connect(&config)
        .await
        .context("Failed to connect to RabbitMQ")?;
    let worker = IngestWorker::new(&config, backends);

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown.trigger();
        }
    });

    worker
        .run(|ingestor, shutdown_rx| consumer.run(ingestor, shutdown_rx))
        .await?;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
