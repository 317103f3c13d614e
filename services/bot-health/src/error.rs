//! Error types for the health gate.

use std::path::PathBuf;

use thiserror::Error;

/// Health gate errors with standardized reason codes.
#[derive(Debug, Error)]
pub enum HealthError {
    /// An environment setting could not be parsed.
    #[error("config_invalid: {key}={value}: {reason}")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// Filesystem statistics unavailable for a volume.
    #[error("statvfs_failed: {}: {source}", .path.display())]
    Statvfs {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    /// Readiness marker could not be written or removed.
    #[error("marker_failed: {}: {source}", .path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HealthError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            HealthError::InvalidConfig { .. } => "config_invalid",
            HealthError::Statvfs { .. } => "statvfs_failed",
            HealthError::Marker { .. } => "marker_failed",
            HealthError::Io(_) => "io_error",
        }
    }
}
