//! The incremental pass: snapshot, compute impact, rebuild stale graphs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use incbuild_core::{
    AnalysisConfig, Failure, FailureReason, FileSnapshot, Fingerprint, PatternSet, SnapshotSet, SnapshotView, is_under,
    normalize_path, normalized,
};
use incbuild_scan::{ScanOptions, SnapshotScanner};

use crate::error::PassError;
use crate::graph::{GraphBuilder, GraphOptions, IncludeGraph};
use crate::impact::{ImpactReason, ImpactReport, impacted_roots};
use crate::resolver::LiveFileSystem;

/// Everything the next pass compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub created_at: DateTime<Utc>,
    pub snapshots: SnapshotSet,
    /// Graphs keyed by normalized source path.
    pub graphs: IndexMap<String, IncludeGraph>,
}

impl Baseline {
    pub fn new(snapshots: SnapshotSet, graphs: IndexMap<String, IncludeGraph>) -> Self {
        Self {
            created_at: Utc::now(),
            snapshots,
            graphs,
        }
    }

    pub fn graph(&self, source: &Path) -> Option<&IncludeGraph> {
        self.graphs.get(&normalize_path(source))
    }
}

/// Result of one pass.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    /// Sources to recompile, with reasons.
    pub recompile: ImpactReport,
    /// Baseline for the next pass.
    pub baseline: Baseline,
    /// Per-source problems met while rebuilding graphs.
    pub failures: Vec<Failure>,
    /// Graphs rebuilt in this pass.
    pub rebuilt: usize,
    /// Graphs carried over from the previous baseline.
    pub reused: usize,
}

/// Drives incremental passes over one project.
pub struct IncrementalBuild {
    config: AnalysisConfig,
    patterns: PatternSet,
    scanner: SnapshotScanner,
    pool: Option<rayon::ThreadPool>,
}

impl IncrementalBuild {
    /// Prepare passes for `config`. Paths in the config are made absolute
    /// and canonical where they exist.
    pub fn new(config: AnalysisConfig) -> Result<Self, PassError> {
        let config = anchor_config(config);
        let patterns = config.pattern_set()?;
        let scanner = SnapshotScanner::with_options(ScanOptions::from(&config));

        let pool = if config.threads > 0 {
            match rayon::ThreadPoolBuilder::new().num_threads(config.threads).build() {
                Ok(pool) => Some(pool),
                Err(err) => {
                    tracing::warn!(error = %err, "could not build worker pool, using the global pool");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            patterns,
            scanner,
            pool,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The scanner, e.g. to subscribe to progress.
    pub fn scanner(&self) -> &SnapshotScanner {
        &self.scanner
    }

    /// Directories captured by a pass: the project root, then every
    /// include search directory not already under it, in search order.
    pub fn snapshot_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.config.root.clone()];
        let search = self
            .config
            .quoted_include_paths
            .iter()
            .chain(&self.config.system_include_paths);
        for dir in search {
            let key = normalize_path(dir);
            let covered = roots.iter().any(|r| is_under(&normalize_path(r), &key));
            if !covered {
                roots.push(dir.clone());
            }
        }
        roots
    }

    /// Capture every snapshot root whole. The configured patterns only
    /// select root sources, see [`discover_roots`](Self::discover_roots).
    pub fn snapshot(&self) -> Result<SnapshotSet, PassError> {
        self.scanner.cache().clear();
        let mut set = SnapshotSet::default();
        for root in self.snapshot_roots() {
            set.push(self.scanner.snapshot(&root)?);
        }
        Ok(set)
    }

    /// Capture on its own every path `previous` depends on that the trees
    /// in `snapshots` do not hold: files outside every root, files reached
    /// through directory links, and examined paths.
    pub fn capture_reached(&self, previous: &Baseline, snapshots: &mut SnapshotSet) {
        let mut pending = BTreeSet::new();
        for graph in previous.graphs.values() {
            let nodes = graph
                .nodes
                .iter()
                .filter(|(_, fingerprint)| **fingerprint != Fingerprint::UNRESOLVED)
                .map(|(path, _)| path.clone());
            let examined = graph.examined_paths().map(normalize_path);
            for path in nodes.chain(examined) {
                if snapshots.lookup(&path).is_none() {
                    pending.insert(path);
                }
            }
        }

        let captured: Vec<(String, Option<FileSnapshot>)> = pending
            .into_par_iter()
            .map(|path| {
                let entry = self.scanner.capture_file(Path::new(&path));
                (path, entry)
            })
            .collect();
        for (path, entry) in captured {
            // A covered path already reads as absent.
            if entry.is_some() || !snapshots.covers(&path) {
                snapshots.push_file(path, entry);
            }
        }
        tracing::debug!(files = snapshots.files().len(), "captured files outside the trees");
    }

    /// Root sources: the configured list, else every file under the
    /// project root with a source extension that the patterns keep.
    pub fn discover_roots(&self, snapshots: &SnapshotSet) -> Vec<PathBuf> {
        if !self.config.sources.is_empty() {
            return self.config.sources.clone();
        }
        let Some(project) = snapshots.trees().first() else {
            return Vec::new();
        };
        let project = project.filter(&self.patterns);
        let mut roots: Vec<PathBuf> = project
            .regular_files()
            .map(|f| PathBuf::from(f.path()))
            .filter(|p| self.config.is_source_file(p))
            .collect();
        roots.sort();
        roots
    }

    /// Run a pass over the discovered roots.
    pub fn run(&self, previous: Option<&Baseline>) -> Result<PassOutcome, PassError> {
        let snapshots = self.snapshot()?;
        let roots = self.discover_roots(&snapshots);
        Ok(self.pass_over(previous, snapshots, &roots))
    }

    /// Run a pass over `roots`.
    ///
    /// With no `previous` baseline every root is recompiled. Graphs of
    /// roots that are not impacted are carried over unchanged.
    pub fn run_pass(&self, previous: Option<&Baseline>, roots: &[PathBuf]) -> Result<PassOutcome, PassError> {
        let snapshots = self.snapshot()?;
        let roots: Vec<PathBuf> = roots.iter().map(|r| anchor(r)).collect();
        Ok(self.pass_over(previous, snapshots, &roots))
    }

    fn pass_over(&self, previous: Option<&Baseline>, mut snapshots: SnapshotSet, roots: &[PathBuf]) -> PassOutcome {
        let start = Instant::now();
        if let Some(baseline) = previous {
            self.capture_reached(baseline, &mut snapshots);
        }

        let mut recompile = match previous {
            Some(baseline) => impacted_roots(roots, &baseline.snapshots, &snapshots, &baseline.graphs),
            None => {
                let mut report = ImpactReport::default();
                for root in roots {
                    report.add(normalize_path(root), ImpactReason::NoBaseline);
                }
                report
            }
        };

        let stale: Vec<PathBuf> = recompile.recompile().map(PathBuf::from).collect();
        let builder = GraphBuilder::new(
            GraphOptions::from_config(&self.config),
            Arc::new(LiveFileSystem),
            Arc::clone(self.scanner.cache()),
        );
        let mut batch = match &self.pool {
            Some(pool) => pool.install(|| builder.build_all(&stale)),
            None => builder.build_all(&stale),
        };

        for failure in &batch.failures {
            if let FailureReason::Abandoned { message } = &failure.reason {
                recompile.add(
                    normalize_path(&failure.source),
                    ImpactReason::GraphFailed {
                        message: message.clone(),
                    },
                );
            }
        }

        let mut graphs = IndexMap::with_capacity(roots.len());
        let mut reused = 0;
        for root in roots {
            let source = normalize_path(root);
            if let Some(graph) = batch.graphs.shift_remove(&source) {
                graphs.insert(source, graph);
                continue;
            }
            if recompile.contains(&source) {
                continue;
            }
            if let Some(graph) = previous.and_then(|b| b.graphs.get(&source)) {
                graphs.insert(source, graph.clone());
                reused += 1;
            }
        }
        let rebuilt = graphs.len() - reused;

        tracing::info!(
            roots = roots.len(),
            recompile = recompile.len(),
            rebuilt,
            reused,
            failures = batch.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "incremental pass complete"
        );

        PassOutcome {
            recompile,
            baseline: Baseline::new(snapshots, graphs),
            failures: batch.failures,
            rebuilt,
            reused,
        }
    }
}

/// Absolute and canonical if it exists, else lexically normalized.
fn anchor(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match std::path::absolute(path) {
        Ok(absolute) => normalized(&absolute),
        Err(_) => normalized(path),
    }
}

fn anchor_config(mut config: AnalysisConfig) -> AnalysisConfig {
    config.root = anchor(&config.root);
    for path in config
        .sources
        .iter_mut()
        .chain(&mut config.quoted_include_paths)
        .chain(&mut config.system_include_paths)
    {
        *path = anchor(path);
    }
    config
}
