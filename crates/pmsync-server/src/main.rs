//! PM File Sync Server - Main entry point

use anyhow::Result;
use pmsync_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use pmsync_server::{
    api::{self, AppState},
    config::Config,
    consumer::{ConsumerOrchestrator, SourceFactory},
    db,
    ingest::{
        IngestionCoordinator, MessageDispatcher, PgFileRecordRepository, ProcessingCounters,
        RecordUpserter, SimulatedArchiveLister,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("pm-file-sync")
        .filter_directives("pmsync_server=debug,tower_http=debug,sqlx=warn,rdkafka=info")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting PM File Sync Server");

    let config = Config::load()?;
    info!(
        topics = config.consumers.topics.len(),
        "Configuration loaded - server will bind to {}:{}", config.server.host, config.server.port
    );

    let db_pool = db::create_pool(&db::DbConfig::from(&config.database)).await?;
    db::run_migrations(&db_pool).await?;

    let counters = Arc::new(ProcessingCounters::new());
    let coordinator = IngestionCoordinator::new(
        Arc::new(SimulatedArchiveLister),
        RecordUpserter::new(Arc::new(PgFileRecordRepository::new(db_pool.clone()))),
    );
    let dispatcher = MessageDispatcher::new(
        Arc::new(coordinator),
        counters.clone(),
        config.consumers.retry.policy(),
    );

    let orchestrator = Arc::new(ConsumerOrchestrator::new(
        source_factory(&config)?,
        Arc::new(dispatcher),
        config.consumers.stop_grace(),
    ));
    let report = orchestrator.start(&config.consumers.topics)?;
    if !report.failed.is_empty() {
        tracing::warn!(failed = ?report.failed, "Some topics have no running consumer");
    }

    let state = AppState {
        db: db_pool.clone(),
        counters,
        orchestrator: orchestrator.clone(),
    };
    let app = api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Consumers first so nothing writes once the pool closes
    let shutdown = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown, orchestrator.stop()).await.is_err() {
        tracing::warn!("Consumers did not stop within {:?}", shutdown);
    }
    db_pool.close().await;

    info!("Server shut down gracefully");

    Ok(())
}

#[cfg(feature = "kafka")]
fn source_factory(config: &Config) -> Result<Arc<dyn SourceFactory>> {
    Ok(Arc::new(pmsync_server::consumer::KafkaSourceFactory::new(
        &config.consumers,
    )))
}

#[cfg(not(feature = "kafka"))]
fn source_factory(_config: &Config) -> Result<Arc<dyn SourceFactory>> {
    anyhow::bail!("pmsync-server was built without the `kafka` feature")
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
