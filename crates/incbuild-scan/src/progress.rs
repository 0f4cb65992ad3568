//! Snapshot progress reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Progress information during a snapshot walk.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Number of regular files fingerprinted so far.
    pub files_scanned: u64,
    /// Number of directories seen so far.
    pub dirs_scanned: u64,
    /// Total bytes of regular files seen so far.
    pub bytes_scanned: u64,
    /// Current path being scanned.
    pub current_path: PathBuf,
    /// Number of unreadable files or other warnings.
    pub errors_count: u64,
    /// Time elapsed since the walk started.
    pub elapsed: Duration,
    /// Whether this is the final update for the walk.
    pub finished: bool,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            files_scanned: 0,
            dirs_scanned: 0,
            bytes_scanned: 0,
            current_path: PathBuf::new(),
            errors_count: 0,
            elapsed: Duration::ZERO,
            finished: false,
        }
    }

    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total items scanned (files + dirs).
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}
