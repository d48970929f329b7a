//! Scan error taxonomy.
//!
//! Configuration errors abort before capture. Device, detection, storage and
//! archival errors abort the scan after releasing the capture device. Encryption
//! failures are recoverable per frame: they are collected while the scan
//! continues and surfaced once the scan has finished.

use std::path::PathBuf;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("capture device error: {0:#}")]
    Device(anyhow::Error),
    #[error("face detection failed: {0:#}")]
    Detection(anyhow::Error),
    #[error("{} frame(s) could not be encrypted; last: {}", failures.len(), last_failure(failures))]
    Encryption {
        failures: Vec<EncryptionFailure>,
        /// Archive written from the artifacts that did persist.
        archive: Option<PathBuf>,
    },
    #[error("artifact storage failed: {0:#}")]
    Storage(anyhow::Error),
    #[error("archiving failed: {0:#}")]
    Archival(anyhow::Error),
    #[error("scan cancelled after {} artifact(s) were written", artifacts.len())]
    Cancelled {
        /// Artifacts left in the target directory, unarchived.
        artifacts: Vec<PathBuf>,
    },
}

/// A candidate that was selected but could not be encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionFailure {
    pub slot: usize,
    pub frame_index: u64,
    pub message: String,
}

impl std::fmt::Display for EncryptionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "slot {} frame {}: {}",
            self.slot, self.frame_index, self.message
        )
    }
}

fn last_failure(failures: &[EncryptionFailure]) -> String {
    failures
        .last()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}
