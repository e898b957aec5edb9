use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::Layer, layer::SubscriberExt, util::SubscriberInitExt};

use symproxy::app;
use symproxy::cache::{CacheStore, DiskStore, MemoryStore, PersistSupervisor};
use symproxy::config::{Config, LogFormat, StoreKind};
use symproxy::origin::HttpOrigin;
use symproxy::pipeline::Pipeline;
use symproxy::server::Server;

// How long shutdown waits for in-flight cache writes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing(format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("symproxy=info"));
    let layer = match format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
    };
    tracing_subscriber::registry().with(filter).with(layer).try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(config.log_format)?;
    config.validate()?;

    let store: Arc<dyn CacheStore> = match config.store {
        StoreKind::Memory => {
            let memory = Arc::new(MemoryStore::new());
            memory.spawn_purger(config.purge_interval());
            memory as Arc<dyn CacheStore>
        }
        StoreKind::Disk => Arc::new(DiskStore::open(config.cache_dir.clone()).await?),
    };
    let origin = HttpOrigin::new(&config.symbol_server, &config.origin_options())?;
    info!(
        upstream = origin.base(),
        store = ?config.store,
        max_file_size = config.max_file_size,
        "starting symbol proxy"
    );

    let pipeline = Arc::new(Pipeline::new(
        store,
        Arc::new(origin),
        config.cache_policy(),
        config.limits(),
        PersistSupervisor::start(),
    ));
    let stack = app::build(Arc::clone(&pipeline));

    let server = Server::bind(config.listen.to_string()).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    server
        .run_until(
            move |request| {
                let stack = stack.clone();
                async move { stack.handle(request).await }
            },
            shutdown,
        )
        .await?;

    let stats = pipeline.persist_stats();
    if stats.in_flight > 0 {
        info!(in_flight = stats.in_flight, "waiting for cache writes to finish");
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, pipeline.wait_idle()).await.is_err() {
        warn!(in_flight = pipeline.persist_stats().in_flight, "gave up waiting for cache writes");
    }
    info!(stats = ?pipeline.persist_stats(), "shut down");
    Ok(())
}
