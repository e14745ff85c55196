//! PM File Sync Common Library
//!
//! Shared error handling and logging for the PM file sync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the shared [`PmSyncError`] type and [`Result`] alias
//! - **Logging**: centralized `tracing` subscriber setup driven by `LOG_*`
//!   environment variables
//!
//! # Example
//!
//! ```no_run
//! use pmsync_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{PmSyncError, Result};
