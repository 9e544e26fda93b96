use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use logscan::ingest::{IngestPipeline, JobTracker};
use logscan::parser::ParserRegistry;
use logscan::query::QueryService;
use logscan::server::{AppState, CliArgs, LogServer, ServerConfig};
use logstore::MemoryStore;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let server_config = ServerConfig::from(&args);
    let config = Arc::new(args.to_app_config());

    let store = Arc::new(MemoryStore::new());
    let tracker = Arc::new(JobTracker::new());
    let registry = Arc::new(ParserRegistry::with_defaults());

    let pipeline = IngestPipeline::start(
        store.clone(),
        tracker.clone(),
        registry,
        config.clone(),
    );
    let query = Arc::new(QueryService::new(store, tracker.clone()));

    // Periodic sweep of expired terminal job statuses.
    let status_ttl = config.store.status_ttl;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            tick.tick().await;
            tracker.reclaim_expired(status_ttl).await;
        }
    });

    let state = AppState {
        pipeline,
        query,
        metrics: Arc::new(logscan::server::metrics::Metrics::new()),
        config,
    };

    LogServer::new(state, server_config).run().await
}
