//! JWalk-based parallel snapshot scanner.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tokio::sync::broadcast;

use incbuild_core::{
    AnalysisConfig, DirectoryTreeSnapshot, FileSnapshot, Fingerprint, RelativePath, ScanError,
    ScanWarning, WarningKind, normalize_path,
};

use crate::cache::{FingerprintCache, PathInterner};
use crate::progress::ScanProgress;

/// Walk options.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Include hidden files (starting with .).
    pub include_hidden: bool,
    /// Number of threads for walking (0 = auto-detect).
    pub threads: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            threads: 0,
        }
    }
}

impl From<&AnalysisConfig> for ScanOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            follow_symlinks: config.follow_symlinks,
            include_hidden: config.include_hidden,
            threads: config.threads,
        }
    }
}

/// Result of one snapshot walk.
#[derive(Debug, Clone)]
pub struct TreeScan {
    /// The captured tree.
    pub tree: Arc<DirectoryTreeSnapshot>,
    /// Non-fatal problems met on the way.
    pub warnings: Vec<ScanWarning>,
    /// Duration of the walk.
    pub duration: Duration,
}

/// Snapshot store walker using jwalk for parallel traversal.
pub struct SnapshotScanner {
    options: ScanOptions,
    cache: Arc<FingerprintCache>,
    interner: Arc<PathInterner>,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl SnapshotScanner {
    /// Create a scanner with default options and a private cache.
    pub fn new() -> Self {
        Self::with_options(ScanOptions::default())
    }

    pub fn with_options(options: ScanOptions) -> Self {
        Self::with_cache(options, Arc::new(FingerprintCache::new()))
    }

    /// Create a scanner sharing `cache` with other workers of the same pass.
    pub fn with_cache(options: ScanOptions, cache: Arc<FingerprintCache>) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            options,
            cache,
            interner: Arc::new(PathInterner::new()),
            progress_tx,
        }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    pub fn cache(&self) -> &Arc<FingerprintCache> {
        &self.cache
    }

    /// Snapshot `root`, logging warnings instead of returning them.
    pub fn snapshot(&self, root: &Path) -> Result<Arc<DirectoryTreeSnapshot>, ScanError> {
        let scan = self.scan(root)?;
        for warning in &scan.warnings {
            tracing::warn!(path = %warning.path.display(), kind = %warning.kind, "{}", warning.message);
        }
        Ok(scan.tree)
    }

    /// Walk `root` once and fingerprint every regular file.
    ///
    /// A missing root yields an empty snapshot. Unreadable files carry
    /// [`Fingerprint::UNREADABLE`] and a warning; the walk continues.
    pub fn scan(&self, root: &Path) -> Result<TreeScan, ScanError> {
        let start = Instant::now();

        let root_path = match root.canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(root = %root.display(), "snapshot root missing, nothing to capture");
                return Ok(TreeScan {
                    tree: Arc::new(DirectoryTreeSnapshot::empty(normalize_path(root))),
                    warnings: Vec::new(),
                    duration: start.elapsed(),
                });
            }
            Err(e) => return Err(ScanError::io(root, e)),
        };

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory { path: root_path });
        }

        let root_key = self.interner.intern(&normalize_path(&root_path));
        let mut warnings = Vec::new();
        let mut progress = ScanProgress::new();

        let collected = self.collect_entries(&root_path, &mut warnings, &mut progress);
        let files = self.fingerprint_files(collected.files, &mut warnings);
        let directories = combine_directories(&root_key, collected.directories, &files, &collected.symlinks);

        let mut descendants = Vec::with_capacity(files.len() + directories.len() + collected.symlinks.len());
        descendants.extend(directories);
        descendants.extend(collected.symlinks);
        descendants.extend(files);

        progress.files_scanned = descendants.iter().filter(|d| d.is_regular_file()).count() as u64;
        progress.errors_count = warnings.len() as u64;
        progress.elapsed = start.elapsed();
        progress.finished = true;
        let _ = self.progress_tx.send(progress);

        let tree = Arc::new(DirectoryTreeSnapshot::new(root_key, descendants));
        tracing::debug!(
            root = %tree.path(),
            entries = tree.len(),
            warnings = warnings.len(),
            "snapshot captured"
        );

        Ok(TreeScan {
            tree,
            warnings,
            duration: start.elapsed(),
        })
    }

    /// Capture one file on its own, following symlinks.
    ///
    /// Returns `None` when no regular file exists at `path`. A file that
    /// exists but cannot be read carries [`Fingerprint::UNREADABLE`].
    pub fn capture_file(&self, path: &Path) -> Option<FileSnapshot> {
        let key = self.interner.intern(&normalize_path(path));
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let relative = RelativePath::parse(&name, true);

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if matches!(err.kind(), std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory) => {
                return None;
            }
            Err(err) => {
                tracing::warn!(path = %key, error = %err, "file unreadable, marked dirty");
                return Some(FileSnapshot::regular(key, relative, Fingerprint::UNREADABLE, 0));
            }
        };
        if !metadata.is_file() {
            return None;
        }

        let fingerprint = self.cache.get_or_compute(&key, || match Fingerprint::of_file(path) {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "file unreadable, marked dirty");
                Fingerprint::UNREADABLE
            }
        });
        Some(FileSnapshot::regular(key, relative, fingerprint, metadata.len()))
    }

    /// Collect all entries using jwalk.
    fn collect_entries(
        &self,
        root_path: &Path,
        warnings: &mut Vec<ScanWarning>,
        progress: &mut ScanProgress,
    ) -> Collected {
        let parallelism = match self.options.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let walker = WalkDir::new(root_path)
            .parallelism(parallelism)
            .skip_hidden(!self.options.include_hidden)
            .follow_links(self.options.follow_symlinks)
            .min_depth(1);

        let mut collected = Collected::default();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warnings.push(ScanWarning::new(path, err.to_string(), WarningKind::ReadError));
                    continue;
                }
            };

            let path = entry.path();
            let Some(relative) = RelativePath::between(root_path, &path, !entry.file_type().is_dir())
            else {
                continue;
            };
            let key = self.interner.intern(&normalize_path(&path));
            let file_type = entry.file_type();

            if file_type.is_dir() {
                progress.dirs_scanned += 1;
                collected.directories.push((key, relative));
            } else if file_type.is_file() {
                let size = match entry.metadata() {
                    Ok(m) => m.len(),
                    Err(err) => {
                        warnings.push(ScanWarning::new(&path, err.to_string(), WarningKind::MetadataError));
                        0
                    }
                };
                progress.bytes_scanned += size;
                collected.files.push(PendingFile { key, relative, path: path.clone(), size });

                if collected.files.len() % 1000 == 0 {
                    progress.files_scanned = collected.files.len() as u64;
                    progress.current_path = path;
                    progress.errors_count = warnings.len() as u64;
                    let _ = self.progress_tx.send(progress.clone());
                }
            } else if file_type.is_symlink() && path.is_file() {
                // Links to regular files are captured by their target's content,
                // the way the include resolver sees them.
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                progress.bytes_scanned += size;
                collected.files.push(PendingFile { key, relative, path: path.clone(), size });
            } else if file_type.is_symlink() {
                let target = std::fs::read_link(&path)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !path.exists() {
                    warnings.push(ScanWarning::broken_symlink(&path, &target));
                }
                collected.symlinks.push(FileSnapshot::symlink(
                    key,
                    relative,
                    Fingerprint::of(target.as_bytes()),
                ));
            }
        }

        collected
    }

    /// Fingerprint regular files in parallel through the shared cache.
    fn fingerprint_files(&self, files: Vec<PendingFile>, warnings: &mut Vec<ScanWarning>) -> Vec<FileSnapshot> {
        let results: Vec<(FileSnapshot, Option<ScanWarning>)> = files
            .into_par_iter()
            .map(|pending| {
                let mut failure = None;
                let fingerprint = self.cache.get_or_compute(&pending.key, || {
                    match Fingerprint::of_file(&pending.path) {
                        Ok(f) => f,
                        Err(err) => {
                            failure = Some(ScanWarning::read_error(&pending.path, &err));
                            Fingerprint::UNREADABLE
                        }
                    }
                });
                let snapshot = FileSnapshot::regular(pending.key, pending.relative, fingerprint, pending.size);
                (snapshot, failure)
            })
            .collect();

        let mut snapshots = Vec::with_capacity(results.len());
        for (snapshot, failure) in results {
            if let Some(warning) = failure {
                tracing::warn!(path = %snapshot.path(), "file unreadable, marked dirty");
                warnings.push(warning);
            }
            snapshots.push(snapshot);
        }
        snapshots
    }
}

impl Default for SnapshotScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Collected {
    directories: Vec<(Arc<str>, RelativePath)>,
    files: Vec<PendingFile>,
    symlinks: Vec<FileSnapshot>,
}

struct PendingFile {
    key: Arc<str>,
    relative: RelativePath,
    path: PathBuf,
    size: u64,
}

/// Compute directory fingerprints bottom-up from their direct children.
fn combine_directories(
    root: &str,
    mut directories: Vec<(Arc<str>, RelativePath)>,
    files: &[FileSnapshot],
    symlinks: &[FileSnapshot],
) -> Vec<FileSnapshot> {
    let mut children: HashMap<String, Vec<(String, Fingerprint)>> = HashMap::new();
    for entry in files.iter().chain(symlinks) {
        if let Some(fingerprint) = entry.fingerprint() {
            children
                .entry(parent_of(root, entry.relative_path()))
                .or_default()
                .push((entry.name().to_string(), fingerprint));
        }
    }

    // Deepest first, so every child directory is finished before its parent.
    directories.sort_by_key(|(_, rel)| std::cmp::Reverse(rel.segments().len()));

    let mut out = Vec::with_capacity(directories.len());
    for (key, relative) in directories {
        let own = children.remove(&*key).unwrap_or_default();
        let fingerprint = Fingerprint::combine(own.iter().map(|(n, f)| (n.as_str(), *f)));
        children
            .entry(parent_of(root, &relative))
            .or_default()
            .push((relative.last_name().to_string(), fingerprint));
        out.push(FileSnapshot::directory(key, relative, fingerprint));
    }
    out
}

fn parent_of(root: &str, relative: &RelativePath) -> String {
    let segments = relative.segments();
    let parent = &segments[..segments.len().saturating_sub(1)];
    if parent.is_empty() {
        root.to_string()
    } else {
        format!("{}/{}", root.trim_end_matches('/'), parent.join("/"))
    }
}
