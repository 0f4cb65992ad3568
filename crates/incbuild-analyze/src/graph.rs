//! Per-source include dependency graphs.

use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use derive_builder::Builder;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use incbuild_core::{AnalysisConfig, Failure, FailureReason, Fingerprint, normalize_path};
use incbuild_parse::{DirectiveKind, MacroTable, SourceDirectives, parse};
use incbuild_scan::FingerprintCache;

use crate::error::GraphError;
use crate::expand::ExpansionLimits;
use crate::resolver::{FileLookup, IncludeResolution, SearchPaths, resolve};

/// Node key prefix for includes that never resolved.
pub const UNRESOLVED_PREFIX: &str = "unresolved:";

/// One `#include` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeEdge {
    pub from: String,
    pub to: String,
    /// The target had already been visited in this traversal.
    pub back_edge: bool,
    /// The target was on the include stack, i.e. the edge closes a cycle.
    pub cycle: bool,
}

/// One include directive met during traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeRecord {
    pub including_file: String,
    pub line: usize,
    pub resolution: IncludeResolution,
}

impl IncludeRecord {
    /// Graph node key used when this include did not resolve.
    pub fn unresolved_key(&self) -> String {
        format!(
            "{UNRESOLVED_PREFIX}{}:{}:{}",
            self.including_file, self.line, self.resolution.token
        )
    }
}

/// Include dependency graph of one root source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeGraph {
    /// The root source file.
    pub source: String,
    /// Every file reached, root first, with the fingerprint it had when
    /// parsed. Unresolved includes appear under [`UNRESOLVED_PREFIX`] keys.
    pub nodes: IndexMap<String, Fingerprint>,
    pub edges: Vec<IncludeEdge>,
    pub includes: Vec<IncludeRecord>,
    /// Node keys of unresolved includes.
    pub unresolved: BTreeSet<String>,
}

impl IncludeGraph {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            nodes: IndexMap::new(),
            edges: Vec::new(),
            includes: Vec::new(),
            unresolved: BTreeSet::new(),
        }
    }

    pub fn source_fingerprint(&self) -> Option<Fingerprint> {
        self.nodes.get(&self.source).copied()
    }

    /// Reached files other than the root, excluding unresolved markers.
    pub fn headers(&self) -> impl Iterator<Item = (&str, Fingerprint)> {
        self.nodes
            .iter()
            .filter(|(path, fingerprint)| {
                **path != self.source && **fingerprint != Fingerprint::UNRESOLVED
            })
            .map(|(path, fingerprint)| (path.as_str(), *fingerprint))
    }

    pub fn has_unresolved(&self) -> bool {
        !self.unresolved.is_empty()
    }

    pub fn has_cycle(&self) -> bool {
        self.edges.iter().any(|e| e.cycle)
    }

    /// Files that could not be read.
    pub fn unreadable(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, fingerprint)| **fingerprint == Fingerprint::UNREADABLE)
            .map(|(path, _)| path.as_str())
    }

    /// Examined-but-absent paths of every include.
    pub fn examined_paths(&self) -> impl Iterator<Item = &Path> {
        self.includes
            .iter()
            .flat_map(|r| r.resolution.examined.iter().map(PathBuf::as_path))
    }

    /// Per-file problems this graph carries.
    pub fn failures(&self) -> Vec<Failure> {
        let mut failures = Vec::new();
        for path in self.unreadable() {
            failures.push(Failure::new(
                &self.source,
                FailureReason::UnreadableFile {
                    message: path.to_string(),
                },
            ));
        }
        for record in self.includes.iter().filter(|r| !r.resolution.unresolved.is_empty()) {
            let token = record.resolution.token.clone();
            let reason = if record.resolution.overflowed() {
                FailureReason::MacroExpansionOverflow { token }
            } else {
                FailureReason::UnresolvedInclude { token }
            };
            failures.push(Failure::new(&self.source, reason));
        }
        failures
    }
}

/// Options for [`GraphBuilder`].
#[derive(Debug, Clone, Default, Builder)]
#[builder(setter(into))]
pub struct GraphOptions {
    #[builder(default)]
    pub search_paths: SearchPaths,

    #[builder(default)]
    pub limits: ExpansionLimits,
}

impl GraphOptions {
    pub fn builder() -> GraphOptionsBuilder {
        GraphOptionsBuilder::default()
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            search_paths: SearchPaths::from_config(config),
            limits: ExpansionLimits {
                max_depth: config.max_expansion_depth,
                max_alternatives: config.max_alternatives,
            },
        }
    }
}

/// Graphs built in one batch.
#[derive(Debug, Clone, Default)]
pub struct GraphBatch {
    pub graphs: IndexMap<String, IncludeGraph>,
    pub failures: Vec<Failure>,
}

/// Parsed directives keyed by file and content.
pub type DirectiveCache = DashMap<(String, Fingerprint), Arc<SourceDirectives>>;

/// Builds include graphs, sharing fingerprints and parses across roots.
pub struct GraphBuilder {
    options: GraphOptions,
    files: Arc<dyn FileLookup>,
    fingerprints: Arc<FingerprintCache>,
    directives: Arc<DirectiveCache>,
}

struct Loaded {
    fingerprint: Fingerprint,
    directives: Option<Arc<SourceDirectives>>,
}

/// Mutable state of one root's traversal.
struct Walk {
    graph: IncludeGraph,
    table: MacroTable,
    stack: Vec<String>,
    visited: HashSet<String>,
}

impl GraphBuilder {
    pub fn new(options: GraphOptions, files: Arc<dyn FileLookup>, fingerprints: Arc<FingerprintCache>) -> Self {
        Self {
            options,
            files,
            fingerprints,
            directives: Arc::new(DashMap::new()),
        }
    }

    /// Share a parsed-directive cache with other builders.
    pub fn with_directive_cache(mut self, directives: Arc<DirectiveCache>) -> Self {
        self.directives = directives;
        self
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    pub fn directive_cache(&self) -> &Arc<DirectiveCache> {
        &self.directives
    }

    /// Build the graph of one root, depth-first in inclusion order.
    ///
    /// Unreadable files become [`Fingerprint::UNREADABLE`] nodes. Any other
    /// I/O error abandons this root.
    pub fn build_graph(&self, root: &Path) -> Result<IncludeGraph, GraphError> {
        let source = normalize_path(root);
        let mut walk = Walk {
            graph: IncludeGraph::new(source.clone()),
            table: MacroTable::new(),
            stack: Vec::new(),
            visited: HashSet::from([source.clone()]),
        };

        self.visit(&source, &mut walk)?;
        walk.table.close_all();

        tracing::debug!(
            source = %source,
            nodes = walk.graph.nodes.len(),
            unresolved = walk.graph.unresolved.len(),
            cycle = walk.graph.has_cycle(),
            "include graph built"
        );
        Ok(walk.graph)
    }

    /// Build graphs for many roots in parallel.
    ///
    /// A root that fails is reported in `failures`; the others still build.
    pub fn build_all(&self, roots: &[PathBuf]) -> GraphBatch {
        let results: Vec<(&PathBuf, Result<IncludeGraph, GraphError>)> =
            roots.par_iter().map(|root| (root, self.build_graph(root))).collect();

        let mut batch = GraphBatch::default();
        for (root, result) in results {
            match result {
                Ok(graph) => {
                    batch.failures.extend(graph.failures());
                    batch.graphs.insert(graph.source.clone(), graph);
                }
                Err(err) => {
                    tracing::warn!(root = %root.display(), error = %err, "graph build abandoned");
                    batch.failures.push(Failure::new(
                        root,
                        FailureReason::Abandoned {
                            message: err.to_string(),
                        },
                    ));
                }
            }
        }
        batch
    }

    fn visit(&self, path: &str, walk: &mut Walk) -> Result<(), GraphError> {
        let loaded = self.load(path)?;
        walk.graph.nodes.insert(path.to_string(), loaded.fingerprint);
        let Some(directives) = loaded.directives else {
            return Ok(());
        };

        walk.stack.push(path.to_string());
        let including = Path::new(path);

        for directive in directives.iter() {
            let DirectiveKind::Include { expression, .. } = &directive.kind else {
                walk.table.apply(&directive.kind);
                continue;
            };

            let resolution = resolve(
                expression,
                including,
                &walk.table,
                &self.options.search_paths,
                self.files.as_ref(),
                &self.options.limits,
            );
            let candidates: Vec<String> = resolution.candidates.iter().map(|c| normalize_path(c)).collect();
            let record = IncludeRecord {
                including_file: path.to_string(),
                line: directive.line,
                resolution,
            };
            if !record.resolution.unresolved.is_empty() {
                let key = record.unresolved_key();
                walk.graph.nodes.insert(key.clone(), Fingerprint::UNRESOLVED);
                walk.graph.unresolved.insert(key);
            }
            walk.graph.includes.push(record);

            for target in candidates {
                let seen = walk.visited.contains(&target);
                let cycle = seen && walk.stack.contains(&target);
                walk.graph.edges.push(IncludeEdge {
                    from: path.to_string(),
                    to: target.clone(),
                    back_edge: seen,
                    cycle,
                });
                if !seen {
                    walk.visited.insert(target.clone());
                    self.visit(&target, walk)?;
                }
            }
        }

        walk.stack.pop();
        Ok(())
    }

    /// Fingerprint and parse `path`, reusing cached work.
    fn load(&self, path: &str) -> Result<Loaded, GraphError> {
        if let Some(fingerprint) = self.fingerprints.get(path) {
            let key = (path.to_string(), fingerprint);
            if let Some(cached) = self.directives.get(&key) {
                return Ok(Loaded {
                    fingerprint,
                    directives: Some(Arc::clone(cached.value())),
                });
            }
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                tracing::warn!(path, error = %err, "unreadable file, node marked dirty");
                return Ok(Loaded {
                    fingerprint: Fingerprint::UNREADABLE,
                    directives: None,
                });
            }
            Err(source) => {
                return Err(GraphError::Io {
                    path: PathBuf::from(path),
                    source,
                });
            }
        };

        // The node records the bytes parsed here, even if the file changed
        // since the scan cached it.
        let fingerprint = Fingerprint::of(&bytes);
        let cached = self.fingerprints.get_or_compute(path, || fingerprint);
        if cached != fingerprint {
            tracing::debug!(path, "file changed since it was fingerprinted");
        }

        let entry = self
            .directives
            .entry((path.to_string(), fingerprint))
            .or_insert_with(|| Arc::new(parse(&String::from_utf8_lossy(&bytes))));
        Ok(Loaded {
            fingerprint,
            directives: Some(Arc::clone(entry.value())),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::resolver::LiveFileSystem;
    use tempfile::TempDir;

    fn builder(search_paths: SearchPaths) -> GraphBuilder {
        let options = GraphOptions::builder().search_paths(search_paths).build().unwrap();
        GraphBuilder::new(options, Arc::new(LiveFileSystem), Arc::new(FingerprintCache::new()))
    }

    fn key(path: &Path) -> String {
        normalize_path(path)
    }

    #[test]
    fn test_chain_in_inclusion_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.c"), "#include \"b.h\"\n#include \"d.h\"\n").unwrap();
        fs::write(root.join("b.h"), "#include \"c.h\"\n").unwrap();
        fs::write(root.join("c.h"), "int c;\n").unwrap();
        fs::write(root.join("d.h"), "int d;\n").unwrap();

        let graph = builder(SearchPaths::default()).build_graph(&root.join("a.c")).unwrap();
        let order: Vec<&str> = graph.nodes.keys().map(|k| k.rsplit('/').next().unwrap()).collect();
        assert_eq!(order, ["a.c", "b.h", "c.h", "d.h"]);
        assert_eq!(graph.source_fingerprint(), Some(Fingerprint::of(b"#include \"b.h\"\n#include \"d.h\"\n")));
        assert_eq!(graph.edges.len(), 3);
        assert!(!graph.has_unresolved());
        assert!(graph.failures().is_empty());
    }

    #[test]
    fn test_mutual_include_terminates() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("main.c"), "#include \"x.h\"\n").unwrap();
        fs::write(root.join("x.h"), "#include \"y.h\"\n").unwrap();
        fs::write(root.join("y.h"), "#include \"x.h\"\n").unwrap();

        let graph = builder(SearchPaths::default()).build_graph(&root.join("main.c")).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert!(graph.has_cycle());
        let back: Vec<&IncludeEdge> = graph.edges.iter().filter(|e| e.back_edge).collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].to, key(&root.join("x.h")));
        assert!(back[0].cycle);
    }

    #[test]
    fn test_diamond_is_back_edge_without_cycle() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("m.c"), "#include \"l.h\"\n#include \"r.h\"\n").unwrap();
        fs::write(root.join("l.h"), "#include \"base.h\"\n").unwrap();
        fs::write(root.join("r.h"), "#include \"base.h\"\n").unwrap();
        fs::write(root.join("base.h"), "").unwrap();

        let graph = builder(SearchPaths::default()).build_graph(&root.join("m.c")).unwrap();
        assert_eq!(graph.nodes.len(), 4);
        assert!(graph.edges.iter().any(|e| e.back_edge && !e.cycle));
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_unresolved_becomes_node() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.c"), "#include \"missing.h\"\n#include UNKNOWN\n").unwrap();

        let graph = builder(SearchPaths::default()).build_graph(&root.join("a.c")).unwrap();
        assert_eq!(graph.unresolved.len(), 2);
        assert_eq!(
            graph.nodes.values().filter(|f| **f == Fingerprint::UNRESOLVED).count(),
            2
        );
        assert_eq!(graph.headers().count(), 0);
        assert_eq!(graph.failures().len(), 2);
    }

    #[test]
    fn test_macro_table_follows_inclusion_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.c"), "#include \"config.h\"\n#include TARGET\n").unwrap();
        fs::write(root.join("config.h"), "#define TARGET \"real.h\"\n").unwrap();
        fs::write(root.join("real.h"), "").unwrap();

        let graph = builder(SearchPaths::default()).build_graph(&root.join("a.c")).unwrap();
        assert!(graph.nodes.contains_key(&key(&root.join("real.h"))));
        assert!(!graph.has_unresolved());
    }

    #[test]
    fn test_macro_redefined_after_undef() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(
            root.join("a.c"),
            "#define H \"one.h\"\n#include H\n#undef H\n#define H \"two.h\"\n#include H\n",
        )
        .unwrap();
        fs::write(root.join("one.h"), "").unwrap();
        fs::write(root.join("two.h"), "").unwrap();

        let graph = builder(SearchPaths::default()).build_graph(&root.join("a.c")).unwrap();
        let resolved: Vec<String> = graph
            .includes
            .iter()
            .flat_map(|r| r.resolution.candidates.iter().map(|c| normalize_path(c)))
            .collect();
        assert_eq!(resolved, [key(&root.join("one.h")), key(&root.join("two.h"))]);
    }

    #[test]
    fn test_missing_root_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let graph = builder(SearchPaths::default())
            .build_graph(&temp.path().join("gone.c"))
            .unwrap();
        assert_eq!(graph.source_fingerprint(), Some(Fingerprint::UNREADABLE));
        assert_eq!(graph.unreadable().count(), 1);
    }

    #[test]
    fn test_directory_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("dir.c")).unwrap();
        fs::write(temp.path().join("ok.c"), "").unwrap();

        let batch = builder(SearchPaths::default())
            .build_all(&[temp.path().join("dir.c"), temp.path().join("ok.c")]);
        assert_eq!(batch.graphs.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(matches!(batch.failures[0].reason, FailureReason::Abandoned { .. }));
    }

    #[test]
    fn test_directives_parsed_once_across_roots() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("one.c"), "#include \"shared.h\"\n").unwrap();
        fs::write(root.join("two.c"), "#include \"shared.h\"\n").unwrap();
        fs::write(root.join("shared.h"), "#define X 1\n").unwrap();

        let builder = builder(SearchPaths::default());
        let batch = builder.build_all(&[root.join("one.c"), root.join("two.c")]);
        assert_eq!(batch.graphs.len(), 2);
        assert_eq!(builder.directive_cache().len(), 3);
        assert_eq!(builder.fingerprints.computed_count(), 3);
    }

    #[test]
    fn test_node_records_parsed_content() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.c"), "#include \"b.h\"\n").unwrap();
        fs::write(root.join("b.h"), "int now;\n").unwrap();

        let builder = builder(SearchPaths::default());
        let header = key(&root.join("b.h"));
        builder
            .fingerprints
            .get_or_compute(&header, || Fingerprint::of(b"int before;\n"));

        let graph = builder.build_graph(&root.join("a.c")).unwrap();
        let current = Fingerprint::of(b"int now;\n");
        assert_eq!(graph.nodes[&header], current);
        assert!(builder.directive_cache().contains_key(&(header, current)));
    }
}
