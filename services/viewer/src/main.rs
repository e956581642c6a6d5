//! cubeview viewer.
//!
//! Runs a session file headlessly: builds the layer stack, applies the
//! session's steps and writes composites (PNG) and histogram tables.

use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use histogram::PipelineConfig;
use storage::{ArtifactCache, CacheConfig};
use viewer::{Session, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "cubeview")]
#[command(about = "Headless image cube viewer")]
struct Args {
    /// Session file (YAML)
    session: PathBuf,

    /// Directory for saved composites and histogram tables
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Artifact cache directory (overrides ARTIFACT_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "CUBEVIEW_LOG_JSON")]
    log_json: bool,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,

    /// Print Prometheus metrics when the session ends
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Build tokio runtime with configurable worker threads
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Ok(threads_str) = env::var("TOKIO_WORKER_THREADS") {
        if let Ok(threads) = threads_str.parse::<usize>() {
            runtime_builder.worker_threads(threads);
        }
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder().with_max_level(level);
    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let session = SessionConfig::load(&args.session)?;
    info!(
        session = %args.session.display(),
        sources = session.sources.len(),
        layers = session.layers.len(),
        steps = session.steps.len(),
        "Starting session"
    );

    let mut cache_config = CacheConfig::from_env();
    if let Some(dir) = args.cache_dir {
        cache_config.path = dir;
    }
    cache_config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid cache configuration: {}", e))?;
    let cache = Arc::new(ArtifactCache::open(&cache_config).await);

    let base_dir = args
        .session
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let runner = Session::build(
        &session,
        cache.clone(),
        PipelineConfig::from_env(),
        &base_dir,
        &args.output_dir,
    )?;
    let report = runner.run(&session.steps).await?;

    let stats = cache.stats();
    info!(
        repaints = report.repaints,
        layer_renders = report.layer_renders,
        saved = report.saved.len(),
        histograms = report.histograms.len(),
        cache_entries = cache.entry_count(),
        cache_used_bytes = cache.used_storage(),
        cache_hit_rate = stats.hit_rate(),
        "Session complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.metrics {
        println!("{}", prometheus_handle.render());
    }

    Ok(())
}
