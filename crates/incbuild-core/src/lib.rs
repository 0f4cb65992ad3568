//! Core types for incbuild.
//!
//! This crate provides the snapshot model shared by the rest of the
//! workspace: content fingerprints, per-file and per-tree snapshots, the
//! read-only element view used for pattern filtering, and the analysis
//! configuration.

mod config;
mod element;
mod error;
mod fingerprint;
mod pattern;
mod snapshot;
mod tree;

pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, DEFAULT_MAX_ALTERNATIVES, DEFAULT_MAX_EXPANSION_DEPTH,
};
pub use element::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, FileTreeElement, SnapshotElement};
pub use error::{
    ConfigError, ElementError, Failure, FailureReason, PatternError, ScanError, ScanWarning,
    WarningKind,
};
pub use fingerprint::Fingerprint;
pub use pattern::PatternSet;
pub use snapshot::{FileSnapshot, FileType, RelativePath, normalize_path, normalized};
pub use tree::{DirectoryTreeSnapshot, SnapshotDiff, SnapshotSet, SnapshotView, entry_changed, is_under};
