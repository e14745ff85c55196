//! Domain records for synchronized PM files

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Network-function class of an archive location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NfClass {
    Du,
    Cu,
}

impl NfClass {
    /// Table holding this class's file records
    pub fn table_name(self) -> &'static str {
        match self {
            NfClass::Du => "du_pm_file_sync",
            NfClass::Cu => "cu_pm_file_sync",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NfClass::Du => "DU",
            NfClass::Cu => "CU",
        }
    }
}

impl fmt::Display for NfClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Downstream processing state of a file record, stored as SMALLINT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum FileStatus {
    Created = 0,
    InProgress = 1,
    Completed = 2,
}

impl FileStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(FileStatus::Created),
            1 => Some(FileStatus::InProgress),
            2 => Some(FileStatus::Completed),
            _ => None,
        }
    }
}

/// A persisted file record
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: Uuid,
    /// Correlation id of the event that last touched this record
    pub correlation_id: Uuid,
    pub capture_time: DateTime<FixedOffset>,
    pub serial_number: String,
    pub file_path: String,
    pub status: FileStatus,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

/// Values for a record that does not exist yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewFileRecord {
    pub correlation_id: Uuid,
    pub capture_time: DateTime<FixedOffset>,
    pub serial_number: String,
    pub file_path: String,
    pub created_at: DateTime<FixedOffset>,
}

impl NewFileRecord {
    /// Materialize the row a successful insert produces
    pub fn into_record(self, id: Uuid) -> FileRecord {
        FileRecord {
            id,
            correlation_id: self.correlation_id,
            capture_time: self.capture_time,
            serial_number: self.serial_number,
            file_path: self.file_path,
            status: FileStatus::Created,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}
