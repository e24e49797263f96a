use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use tunesim_core::config;
use tunesim_core::hnsw::HnswConfig;
use tunesim_core::{Engine, EngineConfig, IndexKind};
use tunesim_server::api::create_router;
use tunesim_server::api::handlers::AppState;
use tunesim_server::api::metrics;

/// How often engine gauges are refreshed.
const METRICS_INTERVAL_SECS: u64 = 15;

#[derive(Parser)]
#[command(name = "tunesim", about = "Music similarity search server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "TUNESIM_PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Data directory for the WAL and snapshot
    #[arg(short, long, env = "TUNESIM_DATA_DIR", default_value = config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Embedding dimension (fixed for the lifetime of the data directory)
    #[arg(long, env = "TUNESIM_DIMENSION", default_value_t = config::DEFAULT_DIMENSION)]
    dimension: usize,

    /// Index implementation: "hnsw" or "flat"
    #[arg(long, env = "TUNESIM_INDEX", default_value_t = IndexKind::Hnsw)]
    index: IndexKind,

    /// HNSW ef parameter at query time
    #[arg(long, env = "TUNESIM_EF_SEARCH", default_value_t = config::HNSW_DEFAULT_EF_SEARCH)]
    ef_search: usize,

    /// Checkpoint interval in seconds (0 = disabled)
    #[arg(long, env = "TUNESIM_CHECKPOINT_INTERVAL", default_value_t = config::DEFAULT_CHECKPOINT_INTERVAL_SECS)]
    checkpoint_interval: u64,

    /// Index compaction threshold (0.0 = disabled, default 0.2 = rebuild when >20% tombstones)
    #[arg(long, env = "TUNESIM_COMPACT_RATIO", default_value_t = config::DEFAULT_COMPACT_RATIO)]
    compact_ratio: f32,

    /// Graceful shutdown timeout in seconds
    #[arg(long, env = "TUNESIM_SHUTDOWN_TIMEOUT", default_value_t = config::DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tunesim_server=info".parse()?)
                .add_directive("tunesim_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if args.port == 0 {
        eprintln!("Error: port must be > 0");
        std::process::exit(1);
    }
    if args.data_dir.exists() && !args.data_dir.is_dir() {
        eprintln!(
            "Error: data_dir '{}' exists but is not a directory",
            args.data_dir.display()
        );
        std::process::exit(1);
    }

    let engine_config = EngineConfig {
        index_kind: args.index,
        hnsw: HnswConfig::with_ef_search(args.ef_search),
        compact_ratio: args.compact_ratio,
        ..EngineConfig::durable(args.dimension, args.data_dir.clone())
    };
    let open_start = Instant::now();
    let engine = Arc::new(Engine::open(engine_config)?);
    let stats = engine.stats();

    let prometheus_handle =
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let state = AppState {
        engine: engine.clone(),
        prometheus_handle,
        start_time: Instant::now(),
    };
    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", args.port);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = args.port,
        data_dir = %args.data_dir.display(),
        dimension = args.dimension,
        index = %args.index,
        ef_search = args.ef_search,
        checkpoint_interval_secs = args.checkpoint_interval,
        records = stats.records,
        open_ms = open_start.elapsed().as_millis() as u64,
        "tunesim ready"
    );

    let metrics_engine = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(METRICS_INTERVAL_SECS));
        loop {
            interval.tick().await;
            metrics::update_engine_metrics(&metrics_engine);
        }
    });

    if args.checkpoint_interval > 0 {
        let maint_engine = engine.clone();
        let maint_interval = args.checkpoint_interval;
        tracing::info!("Periodic checkpoints enabled every {}s", maint_interval);
        if args.compact_ratio > 0.0 {
            tracing::info!(
                "Index compaction enabled (threshold: {:.0}% tombstones)",
                args.compact_ratio * 100.0
            );
        }
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(maint_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                let engine = maint_engine.clone();
                let result = tokio::task::spawn_blocking(move || {
                    let compacted = engine.compact_if_needed();
                    engine.checkpoint().map(|records| (records, compacted))
                })
                .await;
                match result {
                    Ok(Ok((records, compacted))) => {
                        tracing::info!(records, compacted, "periodic checkpoint complete")
                    }
                    Ok(Err(e)) => tracing::error!("Periodic checkpoint failed: {}", e),
                    Err(e) => tracing::error!("Maintenance task panicked: {}", e),
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    flush_and_shutdown(engine, args.shutdown_timeout).await;
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down gracefully, draining in-flight requests...");
}

/// Checkpoint and close the engine, giving up after `timeout_secs`.
/// On timeout the WAL stays in place and is replayed on the next start.
async fn flush_and_shutdown(engine: Arc<Engine>, timeout_secs: u64) {
    tracing::info!("All requests drained, flushing data...");
    let close = tokio::task::spawn_blocking(move || engine.close());
    match tokio::time::timeout(Duration::from_secs(timeout_secs), close).await {
        Ok(Ok(Ok(()))) => tracing::info!("Engine closed cleanly"),
        Ok(Ok(Err(e))) => tracing::error!("Failed to close engine: {}. WAL preserved for recovery", e),
        Ok(Err(e)) => tracing::error!("Close task panicked: {}", e),
        Err(_) => tracing::error!(
            "Shutdown flush timeout ({}s) exceeded, WAL preserved for recovery",
            timeout_secs
        ),
    }
}
