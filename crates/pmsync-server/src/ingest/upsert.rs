//! Race-safe insert-or-update of file records

use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{FileRecord, FileStatus, NewFileRecord, NfClass};
use super::repository::{FileRecordRepository, RepositoryError};

#[derive(Error, Debug)]
pub enum UpsertError {
    /// Insert lost a uniqueness race and the single follow-up update failed too
    #[error("Unresolved insert conflict for '{file_path}': {reason}")]
    ConstraintRace { file_path: String, reason: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    Updated(Uuid),
    /// Insert hit the unique key and was resolved by updating the winner's row
    UpdatedAfterConflict(Uuid),
}

impl UpsertOutcome {
    pub fn record_id(self) -> Uuid {
        match self {
            UpsertOutcome::Inserted(id)
            | UpsertOutcome::Updated(id)
            | UpsertOutcome::UpdatedAfterConflict(id) => id,
        }
    }
}

/// Values written for one file
#[derive(Debug, Clone)]
pub struct UpsertRequest<'a> {
    pub correlation_id: Uuid,
    pub capture_time: DateTime<FixedOffset>,
    pub serial_number: &'a str,
    pub file_path: &'a str,
}

#[derive(Clone)]
pub struct RecordUpserter {
    repository: Arc<dyn FileRecordRepository>,
}

impl RecordUpserter {
    pub fn new(repository: Arc<dyn FileRecordRepository>) -> Self {
        Self { repository }
    }

    /// Upsert keyed on `file_path` within `class`.
    ///
    /// Re-ingesting an existing path overwrites it and resets both
    /// `created_at` and `updated_at` to now. A uniqueness violation on insert
    /// is retried exactly once as an update.
    pub async fn upsert(
        &self,
        class: NfClass,
        request: &UpsertRequest<'_>,
    ) -> Result<UpsertOutcome, UpsertError> {
        if let Some(existing) = self
            .repository
            .find_by_path(class, request.file_path)
            .await?
        {
            let id = self.overwrite(class, existing, request).await?;
            return Ok(UpsertOutcome::Updated(id));
        }

        let record = NewFileRecord {
            correlation_id: request.correlation_id,
            capture_time: request.capture_time,
            serial_number: request.serial_number.to_string(),
            file_path: request.file_path.to_string(),
            created_at: Utc::now().fixed_offset(),
        };

        match self.repository.insert(class, record).await {
            Ok(stored) => Ok(UpsertOutcome::Inserted(stored.id)),
            Err(RepositoryError::UniqueViolation { .. }) => {
                debug!(
                    table = class.table_name(),
                    file_path = request.file_path,
                    "Concurrent insert detected, retrying as update"
                );
                self.resolve_conflict(class, request).await
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_conflict(
        &self,
        class: NfClass,
        request: &UpsertRequest<'_>,
    ) -> Result<UpsertOutcome, UpsertError> {
        let race = |reason: String| {
            warn!(
                table = class.table_name(),
                file_path = request.file_path,
                %reason,
                "Insert conflict could not be resolved"
            );
            UpsertError::ConstraintRace {
                file_path: request.file_path.to_string(),
                reason,
            }
        };

        let existing = match self.repository.find_by_path(class, request.file_path).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return Err(race("conflicting row is not visible".to_string())),
            Err(e) => return Err(race(e.to_string())),
        };

        self.overwrite(class, existing, request)
            .await
            .map(UpsertOutcome::UpdatedAfterConflict)
            .map_err(|e| race(e.to_string()))
    }

    async fn overwrite(
        &self,
        class: NfClass,
        existing: FileRecord,
        request: &UpsertRequest<'_>,
    ) -> Result<Uuid, RepositoryError> {
        let now = Utc::now().fixed_offset();
        let record = FileRecord {
            correlation_id: request.correlation_id,
            capture_time: request.capture_time,
            serial_number: request.serial_number.to_string(),
            status: FileStatus::Created,
            created_at: now,
            updated_at: now,
            ..existing
        };

        self.repository.update(class, &record).await?;
        Ok(record.id)
    }
}
