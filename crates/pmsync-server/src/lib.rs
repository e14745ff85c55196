//! PM File Sync Server Library
//!
//! Consumes VES file-ready notifications from Kafka and keeps one metadata row
//! per performance-management file in Postgres, split into DU and CU tables.
//!
//! # Overview
//!
//! - **Consumers**: one independent consumption unit per configured topic,
//!   each with its own pool of worker tasks
//! - **Ingestion**: event decoding, DU/CU classification, filename metadata
//!   extraction and race-safe upserts
//! - **Retry**: bounded exponential backoff around transient failures
//! - **Health**: `/health` and `/health/metrics` over axum
//!
//! # Delivery
//!
//! Offsets are stored after each message is dispatched and committed
//! periodically, so messages may be redelivered after a crash. Re-processing
//! is idempotent: rows are keyed on the file path and overwritten in place.
//!
//! # Example
//!
//! ```no_run
//! use pmsync_server::{config::Config, db};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&db::DbConfig::from(&config.database)).await?;
//!     db::run_migrations(&pool).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod ingest;

pub use error::{PipelineError, PipelineResult};
