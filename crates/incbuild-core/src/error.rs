//! Error and warning types shared across the workspace.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Errors that can occur while snapshotting a tree.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors raised by [`FileTreeElement`](crate::FileTreeElement) views.
#[derive(Debug, Error)]
pub enum ElementError {
    /// The view carries metadata only.
    #[error("Unsupported operation on snapshot element: {operation}")]
    Unsupported { operation: &'static str },

    /// Lazily resolved metadata could not be read.
    #[error("Cannot read metadata for {path}: {kind}")]
    Metadata {
        path: PathBuf,
        kind: std::io::ErrorKind,
    },
}

/// Errors compiling a pattern set.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid pattern '{pattern}': {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Errors loading an [`AnalysisConfig`](crate::AnalysisConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// Error reading file content; the file carries the unreadable sentinel.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal warning encountered during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a broken symlink warning.
    pub fn broken_symlink(path: impl Into<PathBuf>, target: &str) -> Self {
        let path = path.into();
        Self {
            message: format!("Broken symlink: {} -> {target}", path.display()),
            path,
            kind: WarningKind::BrokenSymlink,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        let kind = if error.kind() == std::io::ErrorKind::PermissionDenied {
            WarningKind::PermissionDenied
        } else {
            WarningKind::ReadError
        };
        Self {
            message: format!("Read error: {error}"),
            path,
            kind,
        }
    }
}

/// Why a source file could not be analyzed (or must be treated as dirty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum FailureReason {
    /// The file could not be read; it stays dirty until it can be.
    #[strum(to_string = "unreadable file: {message}")]
    UnreadableFile { message: String },

    /// An include token did not reduce to an existing file.
    #[strum(to_string = "unresolved include {token}")]
    UnresolvedInclude { token: String },

    /// Macro expansion exceeded the depth or fan-out bound.
    #[strum(to_string = "macro expansion overflow in {token}")]
    MacroExpansionOverflow { token: String },

    /// A fatal I/O error abandoned this file's graph build.
    #[strum(to_string = "graph build abandoned: {message}")]
    Abandoned { message: String },
}

/// A per-source failure, reported alongside the other results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// The root source file the failure belongs to.
    pub source: PathBuf,
    pub reason: FailureReason,
}

impl Failure {
    pub fn new(source: impl Into<PathBuf>, reason: FailureReason) -> Self {
        Self {
            source: source.into(),
            reason,
        }
    }
}
