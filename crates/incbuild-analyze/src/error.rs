//! Error types for graph building, baseline storage and passes.

use std::path::PathBuf;

use thiserror::Error;

use incbuild_core::{PatternError, ScanError};

/// A fatal error abandoning one root's graph build.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reading or writing stored graphs and baselines.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed store {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that stop a whole incremental pass.
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}
