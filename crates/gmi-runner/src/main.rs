//! # gmi-runner
//!
//! Main entry point for the market indexer.
//!
//! Loads a JSON configuration file, prepares the target index, starts one
//! supervised stream per (market, channel) feeding a shared bulk indexer, and
//! runs until SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! gmi-runner --config config.json --log-level debug
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gmi_core::lifecycle::ShutdownCoordinator;
use gmi_index::bulk::log_flush;
use gmi_index::{BulkIndexer, EsClient};
use gmi_stream::{Pipeline, PipelineContext, StreamSettings};
use tracing::info;

/// Exchange market data to Elasticsearch indexer.
#[derive(Parser)]
#[command(name = "gmi-runner", about = "Exchange market data to Elasticsearch indexer")]
struct Cli {
    /// Configuration file path (JSON).
    #[arg(short, long, default_value = "./config.json")]
    config: PathBuf,

    /// Log level, overrides the config file (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output, overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = gmi_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let log_dir = cli.log_dir.as_deref().or(config.log_dir.as_deref());
    gmi_core::logging::init_logging(log_level, log_dir, "gmi-runner")?;

    info!(
        "gmi-runner starting, config={} index={} markets={:?}",
        cli.config.display(),
        config.elastic.index,
        config.markets
    );

    // 3. Connect to the index store and make sure the index exists
    let client = EsClient::connect(&config.elastic).await.context("unable to connect to elasticsearch")?;
    info!("[elastic] connected to {} node(s): {:?}", client.nodes().len(), client.nodes());
    gmi_index::bootstrap::ensure_index(&client, &config.elastic.index, Path::new(&config.elastic.template_path))
        .await?;

    // 4. Bulk indexer, closed by the coordinator on shutdown
    let coordinator = ShutdownCoordinator::new();
    let indexer = BulkIndexer::start(Arc::new(client), (&config.bulk).into(), Arc::new(log_flush));
    indexer.spawn_shutdown_task(&coordinator);

    // 5. One supervised stream per (market, channel)
    let ctx = PipelineContext {
        coordinator: coordinator.clone(),
        sink: Arc::new(indexer),
        settings: Arc::new(StreamSettings {
            feed_url: config.feed_url.clone(),
            index_name: config.elastic.index.clone(),
        }),
        restart_backoff: config.restart_backoff(),
    };
    let pipeline = Pipeline::start(&ctx, &config.markets);
    info!("all {} stream(s) started, press Ctrl+C to stop", pipeline.len());

    // 6. Wait for a termination signal, then for every task to finish.
    //    The token is cancelled either way, so the pending batch is drained
    //    before a signal setup error is reported.
    let signal = coordinator.shutdown_on_signal().await;
    coordinator.wait_idle().await;
    pipeline.join().await;

    info!("all tasks finished, goodbye");
    signal?;
    Ok(())
}
