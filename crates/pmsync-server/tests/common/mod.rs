//! Common test utilities for PM file sync integration tests
//!
//! - PostgreSQL container with migrations applied (testcontainers)
//! - Pipeline wiring over the in-memory repository
//! - Archive listers with scripted behaviour
//! - VES event payload builders
//!
//! Tests that need Docker are marked `#[ignore = "requires Docker"]`:
//!
//! ```bash
//! cargo test -p pmsync-server --test repository_tests -- --ignored --nocapture
//! ```

#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::time::Instant;
use tracing::{debug, info};

use pmsync_server::ingest::transport::TransportError;
use pmsync_server::ingest::{
    ArchiveLister, FileRecordRepository, IngestionCoordinator, InMemoryFileRecordRepository,
    MessageDispatcher, ProcessingCounters, RecordUpserter, RetryPolicy, SimulatedArchiveLister,
};

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the service migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        pmsync_server::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}

/// Initialize tracing for tests; safe to call from every test
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pmsync_server=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Pipeline wiring
// ============================================================================

/// Dispatcher over `lister` and `repository` with the default retry policy
pub fn dispatcher(
    lister: Arc<dyn ArchiveLister>,
    repository: Arc<dyn FileRecordRepository>,
) -> (Arc<MessageDispatcher>, Arc<ProcessingCounters>) {
    let counters = Arc::new(ProcessingCounters::new());
    let coordinator = IngestionCoordinator::new(lister, RecordUpserter::new(repository));
    let dispatcher =
        MessageDispatcher::new(Arc::new(coordinator), counters.clone(), RetryPolicy::default());
    (Arc::new(dispatcher), counters)
}

/// Dispatcher backed by a fresh in-memory repository
pub fn in_memory_dispatcher(
    lister: Arc<dyn ArchiveLister>,
) -> (
    Arc<MessageDispatcher>,
    Arc<ProcessingCounters>,
    Arc<InMemoryFileRecordRepository>,
) {
    let repository = Arc::new(InMemoryFileRecordRepository::new());
    let (dispatcher, counters) = dispatcher(lister, repository.clone());
    (dispatcher, counters, repository)
}

// ============================================================================
// Archive listers
// ============================================================================

/// Returns the same file names for every location
pub struct FixedLister(pub Vec<String>);

impl FixedLister {
    pub fn new(files: &[&str]) -> Self {
        Self(files.iter().map(|f| f.to_string()).collect())
    }
}

#[async_trait]
impl ArchiveLister for FixedLister {
    async fn list_files(&self, _location: &str) -> Result<Vec<String>, TransportError> {
        Ok(self.0.clone())
    }
}

/// Always fails, recording when each call happened
#[derive(Default)]
pub struct FailingLister {
    calls: Mutex<Vec<Instant>>,
}

impl FailingLister {
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveLister for FailingLister {
    async fn list_files(&self, location: &str) -> Result<Vec<String>, TransportError> {
        self.calls.lock().unwrap().push(Instant::now());
        Err(TransportError::Listing {
            location: location.to_string(),
            reason: "connection reset by peer".to_string(),
        })
    }
}

/// Hangs forever on locations containing `/stuck/`, lists the simulated
/// archive otherwise
#[derive(Default)]
pub struct StuckLister {
    entered: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

impl StuckLister {
    /// A stuck listing has started
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    /// A stuck listing was dropped before finishing
    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArchiveLister for StuckLister {
    async fn list_files(&self, location: &str) -> Result<Vec<String>, TransportError> {
        if !location.contains("/stuck/") {
            return SimulatedArchiveLister.list_files(location).await;
        }
        let _flag = DropFlag(self.dropped.clone());
        self.entered.store(true, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// VES file-ready event announcing `locations`
pub fn file_ready_event(source_name: &str, locations: &[&str]) -> Vec<u8> {
    let entries: Vec<_> = locations
        .iter()
        .enumerate()
        .map(|(i, location)| {
            json!({
                "name": format!("archive-{i}.tar"),
                "hashMap": {
                    "location": location,
                    "compression": "gzip",
                    "fileFormatType": "org.3GPP.32.435#measCollec",
                    "fileFormatVersion": "V10",
                    "md5Checksum": "0f343b0931126a20f133d67c2b018a3b"
                }
            })
        })
        .collect();

    json!({
        "event": {
            "commonEventHeader": {
                "domain": "notification",
                "version": "4.0.1",
                "eventId": "FileReady_0001",
                "eventName": "Notification_gnb-Nokia_FileReady",
                "sourceName": source_name,
                "reportingEntityName": "otenb5309"
            },
            "notificationFields": {
                "changeIdentifier": "PM_MEAS_FILES",
                "changeType": "FileReady",
                "notificationFieldsVersion": "2.0",
                "arrayOfNamedHashMap": entries
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
