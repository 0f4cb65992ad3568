//! Include analysis for incbuild.
//!
//! This crate turns snapshots and parsed directives into recompilation
//! decisions:
//!
//! - **Include resolution** - Expand macro-indirected include targets and
//!   look them up along the search paths
//! - **Dependency graphs** - One include graph per root source, built
//!   depth-first in inclusion order
//! - **Change impact** - Intersect snapshot changes with graphs to decide
//!   which sources to recompile
//! - **Incremental passes** - Tie it together and keep a baseline between
//!   runs
//!
//! # Incremental Pass
//!
//! ```rust,ignore
//! use incbuild_analyze::{IncrementalBuild, JsonFileStore};
//! use incbuild_core::AnalysisConfig;
//!
//! let build = IncrementalBuild::new(AnalysisConfig::new("/path/to/project"))?;
//! let store = JsonFileStore::new("/path/to/project/.incbuild/baseline.json");
//!
//! let previous = store.load_baseline()?;
//! let outcome = build.run(previous.as_ref())?;
//!
//! for source in outcome.recompile.recompile() {
//!     println!("recompile {source}");
//! }
//! store.save_baseline(&outcome.baseline)?;
//! ```
//!
//! # Single Graph
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use incbuild_analyze::{GraphBuilder, GraphOptions, LiveFileSystem, SearchPaths};
//! use incbuild_scan::FingerprintCache;
//!
//! let options = GraphOptions::builder()
//!     .search_paths(SearchPaths::new(vec![], vec!["/usr/include".into()]))
//!     .build()?;
//! let builder = GraphBuilder::new(options, Arc::new(LiveFileSystem), Arc::new(FingerprintCache::new()));
//! let graph = builder.build_graph("src/main.c".as_ref())?;
//!
//! for (header, fingerprint) in graph.headers() {
//!     println!("{header} {}", fingerprint.short());
//! }
//! ```

mod error;
mod expand;
mod graph;
mod impact;
mod pass;
mod resolver;
mod store;

pub use error::{GraphError, PassError, StoreError};
pub use expand::{Expansion, ExpansionLimits, IncludeTarget, UnresolvedReason, expand_include};
pub use graph::{
    DirectiveCache, GraphBatch, GraphBuilder, GraphOptions, GraphOptionsBuilder, IncludeEdge, IncludeGraph,
    IncludeRecord, UNRESOLVED_PREFIX,
};
pub use impact::{ImpactReason, ImpactReport, graph_impact, impacted_roots, impacted_sources};
pub use pass::{Baseline, IncrementalBuild, PassOutcome};
pub use resolver::{FileLookup, IncludeResolution, LiveFileSystem, SearchPaths, resolve};
pub use store::{GraphStore, JsonFileStore, MemoryGraphStore};

// Re-export core types
pub use incbuild_core::{Failure, FailureReason, Fingerprint, SnapshotSet, SnapshotView};
