use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use flushlog::config::{DemoConfig, load_config};
use flushlog::simulator::{SimulationSummary, simulate_service};
use flushlog::{BufferPool, Flusher};

#[derive(Debug, Parser)]
#[command(about = "Simulate services that only ship their logs when a request fails")]
struct Args {
    /// YAML config; `${VAR}` references are expanded from the environment
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

fn config_or_default(path: &Path) -> DemoConfig {
    if !path.exists() {
        info!("No {} found, using defaults", path.display());
        return DemoConfig::default();
    }
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = config_or_default(&args.config);
    let duration = Duration::from_secs(config.run_duration_secs);

    info!(
        "Starting demo: {} services, {}s duration, max_buffers={}, max_files={}",
        config.services.len(),
        config.run_duration_secs,
        config.flushlog.max_buffers,
        config.flushlog.max_files,
    );

    let pool = Arc::new(BufferPool::from_config(&config.flushlog));
    let flusher = match Flusher::from_config(&config.flushlog) {
        Ok(flusher) => Arc::new(flusher),
        Err(e) => {
            error!("Failed to build object store client: {e}");
            std::process::exit(2);
        }
    };

    let mut tasks = JoinSet::new();
    for service in config.services {
        let pool = Arc::clone(&pool);
        let flusher = Arc::clone(&flusher);
        tasks.spawn(async move {
            let name = service.name.clone();
            (name, simulate_service(service, pool, flusher, duration).await)
        });
    }

    let mut total = SimulationSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, summary)) => {
                info!(
                    service = %name,
                    requests = summary.requests,
                    errors = summary.errors,
                    flushed = summary.flushed,
                    flush_failures = summary.flush_failures,
                    "Service finished"
                );
                total.requests += summary.requests;
                total.errors += summary.errors;
                total.flushed += summary.flushed;
                total.flush_failures += summary.flush_failures;
            }
            Err(e) => error!("Service task failed: {e}"),
        }
    }

    info!(
        "Done. {} requests, {} errors, {} flushed, {} flush failures, {} buffers pooled",
        total.requests,
        total.errors,
        total.flushed,
        total.flush_failures,
        pool.len()
    );
}
