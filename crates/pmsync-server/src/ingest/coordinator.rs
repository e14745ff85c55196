//! Per-location ingestion
//!
//! Classifies an archive location as DU or CU, lists its files through the
//! [`ArchiveLister`], and upserts one record per parsable PM filename. Files
//! are handled in listing order; a bad filename or an unresolved insert race
//! only skips that one file.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::filename;
use super::models::NfClass;
use super::transport::ArchiveLister;
use super::upsert::{RecordUpserter, UpsertError, UpsertOutcome, UpsertRequest};
use crate::error::{PipelineError, PipelineResult};

const DU_MARKERS: [&str; 2] = ["/o-du/", "_du_"];
const CU_MARKERS: [&str; 2] = ["/o-cu/", "_cu_"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("Location '{0}' carries no DU or CU marker")]
    NoMarker(String),

    #[error("Location '{0}' carries both DU and CU markers")]
    Ambiguous(String),
}

/// Decide which relation a location's files belong to (case-insensitive)
pub fn classify(location: &str) -> Result<NfClass, ClassificationError> {
    let lowered = location.to_ascii_lowercase();
    let is_du = DU_MARKERS.iter().any(|m| lowered.contains(m));
    let is_cu = CU_MARKERS.iter().any(|m| lowered.contains(m));

    match (is_du, is_cu) {
        (true, false) => Ok(NfClass::Du),
        (false, true) => Ok(NfClass::Cu),
        (true, true) => Err(ClassificationError::Ambiguous(location.to_string())),
        (false, false) => Err(ClassificationError::NoMarker(location.to_string())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub files_listed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped_files: usize,
    pub skipped_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Completed { class: NfClass, summary: IngestSummary },
    /// Location could not be classified; nothing was written
    Unclassified,
}

pub struct IngestionCoordinator {
    lister: Arc<dyn ArchiveLister>,
    upserter: RecordUpserter,
}

impl IngestionCoordinator {
    pub fn new(lister: Arc<dyn ArchiveLister>, upserter: RecordUpserter) -> Self {
        Self { lister, upserter }
    }

    /// Ingest every file of one archive location under `correlation_id`
    #[instrument(skip(self), fields(correlation_id = %correlation_id))]
    pub async fn ingest(
        &self,
        location: &str,
        source_name: &str,
        correlation_id: Uuid,
    ) -> PipelineResult<IngestOutcome> {
        let class = match classify(location) {
            Ok(class) => class,
            Err(e) => {
                warn!(error = %e, "Skipping unclassifiable location");
                return Ok(IngestOutcome::Unclassified);
            },
        };

        let files = self.lister.list_files(location).await.map_err(|source| {
            PipelineError::Transport {
                location: location.to_string(),
                source,
            }
        })?;

        let mut summary = IngestSummary {
            files_listed: files.len(),
            ..Default::default()
        };

        for file in &files {
            let meta = match filename::extract(file) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(error = %e, "Skipping file");
                    summary.skipped_files += 1;
                    continue;
                },
            };

            let request = UpsertRequest {
                correlation_id,
                capture_time: meta.capture_time,
                serial_number: &meta.serial_number,
                file_path: file,
            };

            match self.upserter.upsert(class, &request).await {
                Ok(UpsertOutcome::Inserted(_)) => summary.inserted += 1,
                Ok(UpsertOutcome::Updated(_) | UpsertOutcome::UpdatedAfterConflict(_)) => {
                    summary.updated += 1
                },
                Err(UpsertError::ConstraintRace { .. }) => summary.skipped_records += 1,
                Err(UpsertError::Repository(source)) => {
                    return Err(PipelineError::Repository {
                        location: location.to_string(),
                        source,
                    });
                },
            }
            debug!(file = %file, table = class.table_name(), "File record stored");
        }

        info!(
            class = %class,
            files = summary.files_listed,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped_files + summary.skipped_records,
            "Location ingested"
        );

        Ok(IngestOutcome::Completed { class, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::models::{FileRecord, NewFileRecord};
    use crate::ingest::repository::{
        FileRecordRepository, InMemoryFileRecordRepository, RepositoryError,
    };
    use crate::ingest::transport::{SimulatedArchiveLister, TransportError};
    use async_trait::async_trait;

    struct FixedListing(Vec<&'static str>);

    #[async_trait]
    impl ArchiveLister for FixedListing {
        async fn list_files(&self, _location: &str) -> Result<Vec<String>, TransportError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl ArchiveLister for Unreachable {
        async fn list_files(&self, location: &str) -> Result<Vec<String>, TransportError> {
            Err(TransportError::Listing {
                location: location.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct BrokenDatabase;

    #[async_trait]
    impl FileRecordRepository for BrokenDatabase {
        async fn find_by_path(
            &self,
            _class: NfClass,
            _file_path: &str,
        ) -> Result<Option<FileRecord>, RepositoryError> {
            Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn insert(
            &self,
            _class: NfClass,
            _record: NewFileRecord,
        ) -> Result<FileRecord, RepositoryError> {
            Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn update(
            &self,
            _class: NfClass,
            _record: &FileRecord,
        ) -> Result<(), RepositoryError> {
            Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn coordinator(
        lister: impl ArchiveLister + 'static,
    ) -> (IngestionCoordinator, Arc<InMemoryFileRecordRepository>) {
        let repo = Arc::new(InMemoryFileRecordRepository::new());
        let coordinator =
            IngestionCoordinator::new(Arc::new(lister), RecordUpserter::new(repo.clone()));
        (coordinator, repo)
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("/O-DU/site1/archive.tar"), Ok(NfClass::Du));
        assert_eq!(classify("/O-CU/site2/archive.tar"), Ok(NfClass::Cu));
        assert_eq!(classify("sftp://pm@host:22/pm/node_du_7.tar"), Ok(NfClass::Du));
        assert!(matches!(classify("/unknown/path"), Err(ClassificationError::NoMarker(_))));
        assert!(matches!(
            classify("/o-du/mixed_cu_archive.tar"),
            Err(ClassificationError::Ambiguous(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_simulated_du_archive() {
        let (coordinator, repo) = coordinator(SimulatedArchiveLister);
        let correlation_id = Uuid::new_v4();

        let outcome = coordinator
            .ingest("/O-DU/site1/archive.tar", "o-du-1122", correlation_id)
            .await
            .unwrap();

        let IngestOutcome::Completed { class, summary } = outcome else {
            panic!("expected completed ingest, got {outcome:?}");
        };
        assert_eq!(class, NfClass::Du);
        assert_eq!(summary.inserted, 3);
        let rows = repo.records(NfClass::Du);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.correlation_id == correlation_id));
        assert_eq!(repo.count(NfClass::Cu), 0);
    }

    #[tokio::test]
    async fn test_unclassified_location_writes_nothing() {
        let (coordinator, repo) = coordinator(SimulatedArchiveLister);

        let outcome = coordinator
            .ingest("/unknown/path", "node", Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Unclassified);
        assert_eq!(repo.count(NfClass::Du) + repo.count(NfClass::Cu), 0);
    }

    #[tokio::test]
    async fn test_bad_filename_skips_only_that_file() {
        let (coordinator, repo) = coordinator(FixedListing(vec![
            "A20250827.1800+0530-1815+0530_001-01-00001_NRCELL_CU.xml",
            "A20250827.1800+0530-1815+0530_NRCELL_CU.xml",
            "A20250827.1815+0530-1830+0530_001-01-00003_NRCELL_CU.xml",
        ]));

        let outcome = coordinator
            .ingest("/O-CU/site2/archive.tar", "o-cu-1", Uuid::new_v4())
            .await
            .unwrap();

        let IngestOutcome::Completed { summary, .. } = outcome else {
            panic!("expected completed ingest");
        };
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped_files, 1);

        let serials: Vec<_> = repo
            .records(NfClass::Cu)
            .into_iter()
            .map(|r| r.serial_number)
            .collect();
        assert_eq!(serials, ["001-01-00001", "001-01-00003"]);
    }

    #[tokio::test]
    async fn test_failures_are_transient() {
        let (coordinator, _) = coordinator(Unreachable);
        let err = coordinator
            .ingest("/O-DU/a.tar", "node", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport { .. }));
        assert!(err.is_transient());

        let coordinator = IngestionCoordinator::new(
            Arc::new(SimulatedArchiveLister),
            RecordUpserter::new(Arc::new(BrokenDatabase)),
        );
        let err = coordinator
            .ingest("/O-DU/a.tar", "node", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Repository { .. }));
        assert!(err.is_transient());
    }
}
