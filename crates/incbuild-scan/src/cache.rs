//! Shared fingerprint cache and path interner.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::{DashMap, DashSet};
use incbuild_core::Fingerprint;

/// Fingerprints keyed by absolute path, shared by every worker in a pass.
///
/// Each path owns a cell that is filled at most once. The shard lock is
/// only held to find or create the cell, so hashing one file never blocks
/// lookups of other paths; workers asking for the same path wait on its
/// cell instead.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: DashMap<Arc<str>, Arc<OnceLock<Fingerprint>>>,
    computed: AtomicU64,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached fingerprint of `path`, computing it if absent.
    pub fn get_or_compute<F>(&self, path: &str, compute: F) -> Fingerprint
    where
        F: FnOnce() -> Fingerprint,
    {
        let found = self.entries.get(path).map(|cell| Arc::clone(cell.value()));
        let cell = match found {
            Some(cell) => cell,
            None => Arc::clone(self.entries.entry(Arc::from(path)).or_default().value()),
        };
        *cell.get_or_init(|| {
            self.computed.fetch_add(1, Ordering::Relaxed);
            compute()
        })
    }

    /// Cached fingerprint of `path`, without computing.
    pub fn get(&self, path: &str) -> Option<Fingerprint> {
        self.entries.get(path).and_then(|cell| cell.get().copied())
    }

    /// Forget one path, e.g. after it was rewritten.
    pub fn invalidate(&self, path: &str) {
        self.entries.remove(path);
    }

    /// Forget everything; called between passes.
    pub fn clear(&self) {
        self.entries.clear();
        self.computed.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times a compute closure actually ran.
    pub fn computed_count(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }
}

/// Interns normalized path strings so snapshots share one allocation per path.
#[derive(Debug, Default)]
pub struct PathInterner {
    paths: DashSet<Arc<str>>,
}

impl PathInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, path: &str) -> Arc<str> {
        if let Some(existing) = self.paths.get(path) {
            return Arc::clone(&existing);
        }
        let fresh: Arc<str> = Arc::from(path);
        if self.paths.insert(Arc::clone(&fresh)) {
            return fresh;
        }
        // Lost a race with another thread interning the same path.
        self.paths
            .get(path)
            .map_or(fresh, |existing| Arc::clone(&existing))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
