//! File record storage
//!
//! [`FileRecordRepository`] is the only way the ingest pipeline touches
//! persisted rows. The Postgres implementation targets one table per
//! [`NfClass`]; the in-memory one backs tests and local runs without a
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use super::models::{FileRecord, FileStatus, NewFileRecord, NfClass};
use crate::db::is_unique_violation;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("A record for '{file_path}' already exists")]
    UniqueViolation { file_path: String },

    #[error("No record with id {id} for '{file_path}'")]
    NotFound { id: Uuid, file_path: String },

    #[error("Unknown status code {0}")]
    InvalidStatus(i16),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait FileRecordRepository: Send + Sync {
    async fn find_by_path(
        &self,
        class: NfClass,
        file_path: &str,
    ) -> Result<Option<FileRecord>, RepositoryError>;

    /// Insert a new row; fails with `UniqueViolation` when the path exists
    async fn insert(
        &self,
        class: NfClass,
        record: NewFileRecord,
    ) -> Result<FileRecord, RepositoryError>;

    /// Overwrite every mutable column of an existing row
    async fn update(&self, class: NfClass, record: &FileRecord) -> Result<(), RepositoryError>;
}

// ============================================================================
// Postgres
// ============================================================================

pub struct PgFileRecordRepository {
    pool: PgPool,
}

impl PgFileRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FileRecordRow {
    id: Uuid,
    rsync_id: Uuid,
    time: DateTime<Utc>,
    serial_number: String,
    file_path: String,
    status: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FileRecordRow> for FileRecord {
    type Error = RepositoryError;

    fn try_from(row: FileRecordRow) -> Result<Self, Self::Error> {
        Ok(FileRecord {
            id: row.id,
            correlation_id: row.rsync_id,
            capture_time: row.time.fixed_offset(),
            serial_number: row.serial_number,
            file_path: row.file_path,
            status: FileStatus::from_code(row.status)
                .ok_or(RepositoryError::InvalidStatus(row.status))?,
            created_at: row.created_at.fixed_offset(),
            updated_at: row.updated_at.fixed_offset(),
        })
    }
}

#[async_trait]
impl FileRecordRepository for PgFileRecordRepository {
    #[instrument(skip(self), level = "debug")]
    async fn find_by_path(
        &self,
        class: NfClass,
        file_path: &str,
    ) -> Result<Option<FileRecord>, RepositoryError> {
        let sql = format!(
            "SELECT id, rsync_id, time, serial_number, file_path, status, created_at, updated_at \
             FROM {} WHERE file_path = $1",
            class.table_name()
        );

        sqlx::query_as::<_, FileRecordRow>(&sql)
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?
            .map(FileRecord::try_from)
            .transpose()
    }

    #[instrument(skip(self, record), fields(file_path = %record.file_path), level = "debug")]
    async fn insert(
        &self,
        class: NfClass,
        record: NewFileRecord,
    ) -> Result<FileRecord, RepositoryError> {
        let sql = format!(
            "INSERT INTO {} (rsync_id, time, serial_number, file_path, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING id",
            class.table_name()
        );

        let id: Uuid = sqlx::query_scalar(&sql)
            .bind(record.correlation_id)
            .bind(record.capture_time)
            .bind(&record.serial_number)
            .bind(&record.file_path)
            .bind(FileStatus::Created.code())
            .bind(record.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::UniqueViolation {
                        file_path: record.file_path.clone(),
                    }
                } else {
                    RepositoryError::Database(e)
                }
            })?;

        Ok(record.into_record(id))
    }

    #[instrument(skip(self, record), fields(file_path = %record.file_path), level = "debug")]
    async fn update(&self, class: NfClass, record: &FileRecord) -> Result<(), RepositoryError> {
        let sql = format!(
            "UPDATE {} SET rsync_id = $2, time = $3, serial_number = $4, status = $5, \
             created_at = $6, updated_at = $7 WHERE id = $1",
            class.table_name()
        );

        let result = sqlx::query(&sql)
            .bind(record.id)
            .bind(record.correlation_id)
            .bind(record.capture_time)
            .bind(&record.serial_number)
            .bind(record.status.code())
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                id: record.id,
                file_path: record.file_path.clone(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Repository holding rows in process memory, keyed like the unique constraint
#[derive(Debug, Default)]
pub struct InMemoryFileRecordRepository {
    rows: DashMap<(NfClass, String), FileRecord>,
}

impl InMemoryFileRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for `class`
    pub fn count(&self, class: NfClass) -> usize {
        self.rows.iter().filter(|entry| entry.key().0 == class).count()
    }

    /// Rows for `class`, ordered by file path
    pub fn records(&self, class: NfClass) -> Vec<FileRecord> {
        let mut records: Vec<FileRecord> = self
            .rows
            .iter()
            .filter(|entry| entry.key().0 == class)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        records
    }
}

#[async_trait]
impl FileRecordRepository for InMemoryFileRecordRepository {
    async fn find_by_path(
        &self,
        class: NfClass,
        file_path: &str,
    ) -> Result<Option<FileRecord>, RepositoryError> {
        Ok(self
            .rows
            .get(&(class, file_path.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn insert(
        &self,
        class: NfClass,
        record: NewFileRecord,
    ) -> Result<FileRecord, RepositoryError> {
        match self.rows.entry((class, record.file_path.clone())) {
            Entry::Occupied(_) => Err(RepositoryError::UniqueViolation {
                file_path: record.file_path,
            }),
            Entry::Vacant(slot) => {
                let stored = record.into_record(Uuid::new_v4());
                slot.insert(stored.clone());
                Ok(stored)
            },
        }
    }

    async fn update(&self, class: NfClass, record: &FileRecord) -> Result<(), RepositoryError> {
        match self.rows.get_mut(&(class, record.file_path.clone())) {
            Some(mut existing) if existing.id == record.id => {
                *existing = record.clone();
                Ok(())
            },
            _ => Err(RepositoryError::NotFound {
                id: record.id,
                file_path: record.file_path.clone(),
            }),
        }
    }
}
