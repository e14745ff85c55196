//! Archive listing collaborator

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Cannot list '{location}': {reason}")]
    Listing { location: String, reason: String },
}

/// Lists the PM file names contained in a remote archive
#[async_trait]
pub trait ArchiveLister: Send + Sync {
    /// File names in archive order; may be empty
    async fn list_files(&self, location: &str) -> Result<Vec<String>, TransportError>;
}

const SIMULATED_SERIALS: [&str; 3] = ["001-01-64160", "001-01-80160", "001-01-96160"];

/// Stand-in for the remote transport. Returns three fixed PM files for DU
/// and CU archives, nothing for anything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedArchiveLister;

#[async_trait]
impl ArchiveLister for SimulatedArchiveLister {
    async fn list_files(&self, location: &str) -> Result<Vec<String>, TransportError> {
        let location = location.to_ascii_lowercase();
        let suffix = if location.contains("o-du") {
            "DU"
        } else if location.contains("o-cu") {
            "CU"
        } else {
            return Ok(Vec::new());
        };

        Ok(SIMULATED_SERIALS
            .iter()
            .map(|serial| format!("A20250827.1800+0530-1815+0530_{serial}_NRCELL_{suffix}.xml"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_listing() {
        let lister = SimulatedArchiveLister;

        let du = lister.list_files("sftp://pm@node:22/O-DU/site1/a.tar").await.unwrap();
        assert_eq!(du.len(), 3);
        assert!(du.iter().all(|f| f.ends_with("_NRCELL_DU.xml")));

        let cu = lister.list_files("/o-cu/site2/a.tar").await.unwrap();
        assert_eq!(cu[0], "A20250827.1800+0530-1815+0530_001-01-64160_NRCELL_CU.xml");

        assert!(lister.list_files("/unknown/path").await.unwrap().is_empty());
    }
}
