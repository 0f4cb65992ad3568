//! Snapshot store for incbuild.
//!
//! This crate captures directory trees as immutable, content-fingerprinted
//! snapshots using jwalk for traversal.
//!
//! # Overview
//!
//! `incbuild-scan` walks a root once per pass and records, for every
//! descendant, its type and a fingerprint of its content. Key features:
//!
//! - **Parallel traversal** via jwalk/rayon
//! - **Shared fingerprint cache** so a file is hashed at most once per pass
//! - **Progress updates** via broadcast channels
//! - **Degraded reads**: unreadable files are captured, never skipped
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use incbuild_scan::SnapshotScanner;
//!
//! let scanner = SnapshotScanner::new();
//! let tree = scanner.snapshot(Path::new("/path/to/project")).unwrap();
//!
//! println!("{} regular files", tree.regular_files().count());
//! println!("Total size: {} bytes", tree.total_size());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use incbuild_scan::SnapshotScanner;
//!
//! let scanner = SnapshotScanner::new();
//! let mut progress_rx = scanner.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         println!("Fingerprinted {} files", progress.files_scanned);
//!     }
//! });
//! ```

mod cache;
mod progress;
mod scanner;

pub use cache::{FingerprintCache, PathInterner};
pub use progress::ScanProgress;
pub use scanner::{ScanOptions, SnapshotScanner, TreeScan};

// Re-export core types for convenience
pub use incbuild_core::{
    DirectoryTreeSnapshot, FileSnapshot, Fingerprint, ScanError, ScanWarning, WarningKind,
};
