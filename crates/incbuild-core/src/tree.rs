//! Directory tree snapshots, multi-root views and snapshot diffs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::element::SnapshotElement;
use crate::pattern::PatternSet;
use crate::snapshot::FileSnapshot;

/// Lookup capability shared by single-root and multi-root snapshots.
pub trait SnapshotView {
    /// The snapshot of `path`, if captured.
    fn lookup(&self, path: &str) -> Option<&FileSnapshot>;

    /// Whether `path` lies under a root this view captured.
    ///
    /// A covered path with no entry is known to be absent; an uncovered
    /// path is simply unknown.
    fn covers(&self, path: &str) -> bool;

    /// Every captured entry, each path once.
    fn entries(&self) -> Box<dyn Iterator<Item = &FileSnapshot> + '_>;

    /// Whether `path` exists as a regular file in this view.
    fn has_file(&self, path: &str) -> bool {
        self.lookup(path).is_some_and(FileSnapshot::is_regular_file)
    }
}

/// Whether `path` is `root` or lexically below it.
pub fn is_under(root: &str, path: &str) -> bool {
    if root == "/" {
        return path.starts_with('/');
    }
    let root = root.trim_end_matches('/');
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Immutable snapshot of a directory subtree.
///
/// Holds every descendant (not only direct children) in a flat arena,
/// indexed by path.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "TreeRepr", into = "TreeRepr")]
pub struct DirectoryTreeSnapshot {
    path: Arc<str>,
    descendants: Vec<FileSnapshot>,
    index: HashMap<Arc<str>, usize>,
}

impl DirectoryTreeSnapshot {
    /// Create a snapshot rooted at `path`.
    ///
    /// Descendants whose path is not under the root are dropped.
    pub fn new(path: impl Into<Arc<str>>, descendants: Vec<FileSnapshot>) -> Self {
        let path = path.into();
        let before = descendants.len();
        let descendants: Vec<FileSnapshot> = descendants
            .into_iter()
            .filter(|d| is_under(&path, d.path()))
            .collect();
        if descendants.len() != before {
            tracing::warn!(
                root = %path,
                dropped = before - descendants.len(),
                "dropped snapshot entries outside the root"
            );
        }
        let index = descendants
            .iter()
            .enumerate()
            .map(|(i, d)| (Arc::clone(d.path_arc()), i))
            .collect();
        Self {
            path,
            descendants,
            index,
        }
    }

    /// Snapshot of a root with nothing in it (or a root that does not exist).
    pub fn empty(path: impl Into<Arc<str>>) -> Self {
        Self::new(path, Vec::new())
    }

    /// Root path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All descendants, in capture order.
    pub fn descendants(&self) -> &[FileSnapshot] {
        &self.descendants
    }

    pub fn len(&self) -> usize {
        self.descendants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descendants.is_empty()
    }

    /// Look up a descendant by its normalized path.
    pub fn get(&self, path: &str) -> Option<&FileSnapshot> {
        self.index.get(path).map(|&i| &self.descendants[i])
    }

    /// Regular files only.
    pub fn regular_files(&self) -> impl Iterator<Item = &FileSnapshot> {
        self.descendants.iter().filter(|d| d.is_regular_file())
    }

    /// Total size of all regular files.
    pub fn total_size(&self) -> u64 {
        self.regular_files().map(FileSnapshot::size).sum()
    }

    /// Keep only the descendants satisfying `patterns`.
    ///
    /// An empty pattern set returns the same `Arc` without copying.
    /// No file system access happens here.
    pub fn filter(self: &Arc<Self>, patterns: &PatternSet) -> Arc<Self> {
        if patterns.is_empty() {
            return Arc::clone(self);
        }
        let kept = self
            .descendants
            .iter()
            .filter(|d| patterns.is_satisfied_by(&SnapshotElement::new(d)))
            .cloned()
            .collect();
        Arc::new(Self::new(Arc::clone(&self.path), kept))
    }
}

impl SnapshotView for DirectoryTreeSnapshot {
    fn lookup(&self, path: &str) -> Option<&FileSnapshot> {
        self.get(path)
    }

    fn covers(&self, path: &str) -> bool {
        is_under(&self.path, path)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = &FileSnapshot> + '_> {
        Box::new(self.descendants.iter())
    }
}

impl PartialEq for DirectoryTreeSnapshot {
    fn eq(&self, other: &Self) -> bool {
        if self.path != other.path || self.descendants.len() != other.descendants.len() {
            return false;
        }
        self.descendants
            .iter()
            .all(|d| other.get(d.path()) == Some(d))
    }
}

impl Eq for DirectoryTreeSnapshot {}

impl fmt::Debug for DirectoryTreeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryTreeSnapshot")
            .field("path", &self.path)
            .field("descendants", &self.descendants.len())
            .finish()
    }
}

impl fmt::Display for DirectoryTreeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} descendants)", self.path, self.descendants.len())
    }
}

#[derive(Serialize, Deserialize)]
struct TreeRepr {
    path: Arc<str>,
    descendants: Vec<FileSnapshot>,
}

impl From<TreeRepr> for DirectoryTreeSnapshot {
    fn from(repr: TreeRepr) -> Self {
        Self::new(repr.path, repr.descendants)
    }
}

impl From<DirectoryTreeSnapshot> for TreeRepr {
    fn from(tree: DirectoryTreeSnapshot) -> Self {
        Self {
            path: tree.path,
            descendants: tree.descendants,
        }
    }
}

/// Several tree snapshots queried as one view.
///
/// Used to cover the project root together with include search paths
/// that live outside it. Paths the trees do not hold can be captured one
/// by one; a single capture of `None` records the path as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSet {
    trees: Vec<Arc<DirectoryTreeSnapshot>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    files: BTreeMap<String, Option<FileSnapshot>>,
}

impl SnapshotSet {
    pub fn new(trees: Vec<Arc<DirectoryTreeSnapshot>>) -> Self {
        Self {
            trees,
            files: BTreeMap::new(),
        }
    }

    /// Record a path captured on its own.
    pub fn push_file(&mut self, path: impl Into<String>, entry: Option<FileSnapshot>) {
        self.files.insert(path.into(), entry);
    }

    /// Paths captured on their own.
    pub fn files(&self) -> &BTreeMap<String, Option<FileSnapshot>> {
        &self.files
    }

    pub fn push(&mut self, tree: Arc<DirectoryTreeSnapshot>) {
        self.trees.push(tree);
    }

    pub fn trees(&self) -> &[Arc<DirectoryTreeSnapshot>] {
        &self.trees
    }

    /// Apply `patterns` to every tree. Single captures are kept.
    pub fn filter(&self, patterns: &PatternSet) -> Self {
        Self {
            trees: self.trees.iter().map(|t| t.filter(patterns)).collect(),
            files: self.files.clone(),
        }
    }
}

impl SnapshotView for SnapshotSet {
    fn lookup(&self, path: &str) -> Option<&FileSnapshot> {
        self.trees
            .iter()
            .find_map(|t| t.get(path))
            .or_else(|| self.files.get(path).and_then(Option::as_ref))
    }

    fn covers(&self, path: &str) -> bool {
        self.trees.iter().any(|t| t.covers(path)) || self.files.contains_key(path)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = &FileSnapshot> + '_> {
        let mut seen = HashSet::new();
        Box::new(
            self.trees
                .iter()
                .flat_map(|t| t.descendants().iter())
                .chain(self.files.values().flatten())
                .filter(move |d| seen.insert(Arc::clone(d.path_arc()))),
        )
    }
}

/// Paths that differ between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Present only in the new snapshot.
    pub added: BTreeSet<Arc<str>>,
    /// Present only in the old snapshot.
    pub removed: BTreeSet<Arc<str>>,
    /// Present in both with a different type or fingerprint, or unreadable now.
    pub modified: BTreeSet<Arc<str>>,
}

impl SnapshotDiff {
    /// Compare two views entry by entry.
    pub fn between(old: &dyn SnapshotView, new: &dyn SnapshotView) -> Self {
        let mut diff = Self::default();
        for entry in new.entries() {
            match old.lookup(entry.path()) {
                None => {
                    diff.added.insert(Arc::clone(entry.path_arc()));
                }
                Some(previous) if entry_changed(previous, entry) => {
                    diff.modified.insert(Arc::clone(entry.path_arc()));
                }
                Some(_) => {}
            }
        }
        for entry in old.entries() {
            if new.lookup(entry.path()).is_none() {
                diff.removed.insert(Arc::clone(entry.path_arc()));
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Every path that was added, removed or modified.
    pub fn changed_paths(&self) -> BTreeSet<Arc<str>> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.modified)
            .cloned()
            .collect()
    }
}

/// Whether an entry must be considered changed between two captures.
///
/// Unreadable entries never compare as unchanged.
pub fn entry_changed(old: &FileSnapshot, new: &FileSnapshot) -> bool {
    old.file_type() != new.file_type()
        || old.fingerprint() != new.fingerprint()
        || new.is_unreadable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::snapshot::RelativePath;

    fn file(path: &str, content: &[u8]) -> FileSnapshot {
        let rel = path.strip_prefix("/proj/").unwrap_or(path);
        FileSnapshot::regular(
            Arc::from(path),
            RelativePath::parse(rel, true),
            Fingerprint::of(content),
            content.len() as u64,
        )
    }

    #[test]
    fn test_is_under() {
        assert!(is_under("/proj", "/proj"));
        assert!(is_under("/proj", "/proj/a.c"));
        assert!(is_under("/proj/", "/proj/a.c"));
        assert!(!is_under("/proj", "/project/a.c"));
        assert!(is_under("/", "/anything"));
    }

    #[test]
    fn test_new_drops_outside_entries() {
        let tree = DirectoryTreeSnapshot::new(
            "/proj",
            vec![file("/proj/a.c", b"a"), file("/other/b.c", b"b")],
        );
        assert_eq!(tree.len(), 1);
        assert!(tree.get("/proj/a.c").is_some());
        assert!(tree.get("/other/b.c").is_none());
    }

    #[test]
    fn test_display() {
        let tree = DirectoryTreeSnapshot::new("/proj", vec![file("/proj/a.c", b"a")]);
        assert_eq!(tree.to_string(), "/proj (1 descendants)");
    }

    #[test]
    fn test_diff() {
        let old = DirectoryTreeSnapshot::new(
            "/proj",
            vec![file("/proj/a.c", b"a"), file("/proj/b.h", b"b"), file("/proj/gone.h", b"g")],
        );
        let new = DirectoryTreeSnapshot::new(
            "/proj",
            vec![file("/proj/a.c", b"a"), file("/proj/b.h", b"B"), file("/proj/new.h", b"n")],
        );
        let diff = SnapshotDiff::between(&old, &new);
        assert_eq!(diff.added.iter().map(|p| &**p).collect::<Vec<_>>(), ["/proj/new.h"]);
        assert_eq!(diff.removed.iter().map(|p| &**p).collect::<Vec<_>>(), ["/proj/gone.h"]);
        assert_eq!(diff.modified.iter().map(|p| &**p).collect::<Vec<_>>(), ["/proj/b.h"]);
        assert_eq!(diff.changed_paths().len(), 3);
        assert!(SnapshotDiff::between(&old, &old).is_empty());
    }

    #[test]
    fn test_snapshot_set_lookup() {
        let proj = Arc::new(DirectoryTreeSnapshot::new("/proj", vec![file("/proj/a.c", b"a")]));
        let sys = Arc::new(DirectoryTreeSnapshot::new("/sys", vec![file("/sys/stdio.h", b"s")]));
        let set = SnapshotSet::new(vec![proj, sys]);

        assert!(set.has_file("/proj/a.c"));
        assert!(set.has_file("/sys/stdio.h"));
        assert!(set.covers("/sys/missing.h"));
        assert!(!set.covers("/usr/include/x.h"));
        assert_eq!(set.entries().count(), 2);
    }

    #[test]
    fn test_single_captures() {
        let proj = Arc::new(DirectoryTreeSnapshot::new("/proj", vec![file("/proj/a.c", b"a")]));
        let mut set = SnapshotSet::new(vec![proj]);
        set.push_file("/shared/x.h", Some(file("/shared/x.h", b"x")));
        set.push_file("/shared/gone.h", None);

        assert!(set.has_file("/shared/x.h"));
        assert!(set.covers("/shared/gone.h"));
        assert!(set.lookup("/shared/gone.h").is_none());
        assert!(!set.covers("/shared/other.h"));
        assert_eq!(set.entries().count(), 2);

        let json = serde_json::to_string(&set).unwrap();
        let back: SnapshotSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
