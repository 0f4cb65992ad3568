//! Change impact: which sources must be recompiled.
//!
//! A source is recompiled when its own content changed, when any file it
//! reaches changed (including disappearing or becoming unreadable), when
//! its graph holds an unresolved include, or when a path examined and found
//! absent while resolving one of its includes now exists.

use std::collections::BTreeMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use incbuild_core::{Fingerprint, SnapshotView, entry_changed, normalize_path};

use crate::graph::IncludeGraph;

/// Why a source is in the recompilation set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum ImpactReason {
    #[strum(to_string = "source changed")]
    SourceChanged,

    #[strum(to_string = "header changed: {path}")]
    HeaderChanged { path: String },

    #[strum(to_string = "unreadable: {path}")]
    Unreadable { path: String },

    #[strum(to_string = "unresolved include {token}")]
    UnresolvedInclude { token: String },

    #[strum(to_string = "include would now resolve to {path}")]
    ResolutionShift { path: String },

    #[strum(to_string = "no baseline graph")]
    NoBaseline,

    #[strum(to_string = "graph build failed: {message}")]
    GraphFailed { message: String },
}

/// Sources to recompile, each with its reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub reasons: BTreeMap<String, Vec<ImpactReason>>,
}

impl ImpactReport {
    pub fn add(&mut self, source: impl Into<String>, reason: ImpactReason) {
        let reasons = self.reasons.entry(source.into()).or_default();
        if !reasons.contains(&reason) {
            reasons.push(reason);
            reasons.sort();
        }
    }

    /// Sources to recompile, sorted.
    pub fn recompile(&self) -> impl Iterator<Item = &str> {
        self.reasons.keys().map(String::as_str)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.reasons.contains_key(source)
    }

    pub fn reasons_for(&self, source: &str) -> &[ImpactReason] {
        self.reasons.get(source).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// Every reason `graph`'s source must be recompiled, given the snapshots
/// before and after the change.
///
/// A reached file `new` does not cover is unknown and counts as changed.
/// Examined paths `new` does not cover are skipped.
pub fn graph_impact(graph: &IncludeGraph, old: &dyn SnapshotView, new: &dyn SnapshotView) -> Vec<ImpactReason> {
    let mut reasons = Vec::new();

    for (path, recorded) in &graph.nodes {
        if *recorded == Fingerprint::UNRESOLVED {
            continue;
        }
        if *recorded == Fingerprint::UNREADABLE {
            reasons.push(ImpactReason::Unreadable { path: path.clone() });
            continue;
        }
        let changed = if new.covers(path) {
            node_changed(path, *recorded, old, new)
        } else {
            tracing::debug!(path = %path, "not captured by any snapshot, assumed changed");
            true
        };
        if changed {
            reasons.push(if *path == graph.source {
                ImpactReason::SourceChanged
            } else {
                ImpactReason::HeaderChanged { path: path.clone() }
            });
        }
    }

    for record in &graph.includes {
        if !record.resolution.unresolved.is_empty() {
            reasons.push(ImpactReason::UnresolvedInclude {
                token: record.resolution.token.clone(),
            });
        }
        for examined in &record.resolution.examined {
            let examined = normalize_path(examined);
            if new.has_file(&examined) {
                reasons.push(ImpactReason::ResolutionShift { path: examined });
            }
        }
    }

    reasons.sort();
    reasons.dedup();
    reasons
}

fn node_changed(path: &str, recorded: Fingerprint, old: &dyn SnapshotView, new: &dyn SnapshotView) -> bool {
    let Some(current) = new.lookup(path) else {
        return true;
    };
    if !current.is_regular_file() || current.is_unreadable() || current.fingerprint() != Some(recorded) {
        return true;
    }
    old.lookup(path)
        .is_some_and(|previous| entry_changed(previous, current))
}

/// The recompilation set over baseline `graphs`.
pub fn impacted_sources<'g, I>(old: &dyn SnapshotView, new: &dyn SnapshotView, graphs: I) -> ImpactReport
where
    I: IntoIterator<Item = &'g IncludeGraph>,
{
    let mut report = ImpactReport::default();
    for graph in graphs {
        for reason in graph_impact(graph, old, new) {
            report.add(graph.source.clone(), reason);
        }
    }
    report
}

/// The recompilation set for `roots`. Roots without a baseline graph are
/// always included.
pub fn impacted_roots(
    roots: &[PathBuf],
    old: &dyn SnapshotView,
    new: &dyn SnapshotView,
    graphs: &IndexMap<String, IncludeGraph>,
) -> ImpactReport {
    let mut report = ImpactReport::default();
    for root in roots {
        let source = normalize_path(root);
        match graphs.get(&source) {
            Some(graph) => {
                for reason in graph_impact(graph, old, new) {
                    report.add(source.clone(), reason);
                }
            }
            None => report.add(source, ImpactReason::NoBaseline),
        }
    }
    report
}
