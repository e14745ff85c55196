//! PM file ingestion pipeline
//!
//! # Architecture
//!
//! - **dispatcher**: per-message entry point, retry policy, counters
//! - **event**: VES file-ready envelope decoding
//! - **coordinator**: DU/CU classification and per-file processing of one location
//! - **filename**: capture time and serial number from PM filenames
//! - **upsert**: race-safe insert-or-update keyed on file path
//! - **repository**: Postgres and in-memory record storage
//! - **transport**: archive listing collaborator
//! - **retry**: bounded exponential backoff
//! - **metrics**: processed / error counters

pub mod coordinator;
pub mod dispatcher;
pub mod event;
pub mod filename;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod retry;
pub mod transport;
pub mod upsert;

pub use coordinator::{classify, IngestOutcome, IngestSummary, IngestionCoordinator};
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use metrics::{CounterSnapshot, ProcessingCounters};
pub use models::{FileRecord, FileStatus, NfClass};
pub use repository::{FileRecordRepository, InMemoryFileRecordRepository, PgFileRecordRepository};
pub use retry::RetryPolicy;
pub use transport::{ArchiveLister, SimulatedArchiveLister};
pub use upsert::RecordUpserter;
