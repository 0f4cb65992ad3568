//! Graph and baseline persistence.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;
use indexmap::IndexMap;

use incbuild_core::SnapshotSet;

use crate::error::StoreError;
use crate::graph::IncludeGraph;
use crate::pass::Baseline;

/// Key-value storage of include graphs, keyed by normalized source path.
pub trait GraphStore: Send + Sync {
    fn get(&self, source: &str) -> Result<Option<IncludeGraph>, StoreError>;
    fn put(&self, graph: IncludeGraph) -> Result<(), StoreError>;
    fn remove(&self, source: &str) -> Result<Option<IncludeGraph>, StoreError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graphs: DashMap<String, IncludeGraph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

impl GraphStore for MemoryGraphStore {
    fn get(&self, source: &str) -> Result<Option<IncludeGraph>, StoreError> {
        Ok(self.graphs.get(source).map(|g| g.clone()))
    }

    fn put(&self, graph: IncludeGraph) -> Result<(), StoreError> {
        self.graphs.insert(graph.source.clone(), graph);
        Ok(())
    }

    fn remove(&self, source: &str) -> Result<Option<IncludeGraph>, StoreError> {
        Ok(self.graphs.remove(source).map(|(_, g)| g))
    }
}

/// A [`Baseline`] kept as one JSON file.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so readers never see a partial document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored baseline, or `None` if nothing was stored yet.
    pub fn load_baseline(&self) -> Result<Option<Baseline>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let baseline = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(baseline))
    }

    pub fn save_baseline(&self, baseline: &Baseline) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec(baseline).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), graphs = baseline.graphs.len(), "baseline saved");
        Ok(())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Baseline) -> T) -> Result<T, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut baseline = self
            .load_baseline()?
            .unwrap_or_else(|| Baseline::new(SnapshotSet::default(), IndexMap::new()));
        let out = f(&mut baseline);
        self.save_baseline(&baseline)?;
        Ok(out)
    }
}

impl GraphStore for JsonFileStore {
    fn get(&self, source: &str) -> Result<Option<IncludeGraph>, StoreError> {
        Ok(self
            .load_baseline()?
            .and_then(|mut b| b.graphs.shift_remove(source)))
    }

    fn put(&self, graph: IncludeGraph) -> Result<(), StoreError> {
        self.modify(|b| {
            b.graphs.insert(graph.source.clone(), graph);
        })
    }

    fn remove(&self, source: &str) -> Result<Option<IncludeGraph>, StoreError> {
        self.modify(|b| b.graphs.shift_remove(source))
    }
}
