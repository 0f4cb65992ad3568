//! Include resolution against search paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use incbuild_core::{AnalysisConfig, DirectoryTreeSnapshot, SnapshotSet, SnapshotView, normalize_path, normalized};
use incbuild_parse::{Expression, IncludeKind, MacroFunction, MacroTable};

use crate::expand::{ExpansionLimits, IncludeTarget, UnresolvedReason, expand_include};

/// Answers "is there a regular file at this path?".
pub trait FileLookup: Send + Sync {
    fn is_file(&self, path: &Path) -> bool;
}

/// Look up files on the live file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveFileSystem;

impl FileLookup for LiveFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

impl FileLookup for DirectoryTreeSnapshot {
    fn is_file(&self, path: &Path) -> bool {
        self.has_file(&normalize_path(path))
    }
}

impl FileLookup for SnapshotSet {
    fn is_file(&self, path: &Path) -> bool {
        self.has_file(&normalize_path(path))
    }
}

/// Ordered include search directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPaths {
    /// Searched for `"..."` includes only, after the including directory.
    pub quoted: Vec<PathBuf>,
    /// Searched for both forms, last.
    pub system: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn new(quoted: Vec<PathBuf>, system: Vec<PathBuf>) -> Self {
        Self { quoted, system }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            config.quoted_include_paths.clone(),
            config.system_include_paths.clone(),
        )
    }

    /// Directories to search, in order, for a target of `kind`.
    pub fn directories<'a>(&'a self, kind: IncludeKind, including_dir: &'a Path) -> Vec<&'a Path> {
        let mut dirs = Vec::with_capacity(1 + self.quoted.len() + self.system.len());
        if kind == IncludeKind::Quoted {
            dirs.push(including_dir);
            dirs.extend(self.quoted.iter().map(PathBuf::as_path));
        }
        dirs.extend(self.system.iter().map(PathBuf::as_path));
        dirs
    }
}

/// Outcome of resolving one include directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeResolution {
    /// The include as written.
    pub token: String,
    /// Files the include can refer to, one per distinct expansion.
    pub candidates: Vec<PathBuf>,
    /// Examined and absent, in search order. A file appearing at one of these
    /// paths later would change the resolution.
    pub examined: Vec<PathBuf>,
    /// Macro definitions the resolution depended on.
    pub macros_used: Vec<MacroFunction>,
    /// Alternatives that did not resolve.
    pub unresolved: Vec<UnresolvedReason>,
}

impl IncludeResolution {
    /// Every alternative found a file.
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty() && !self.candidates.is_empty()
    }

    pub fn overflowed(&self) -> bool {
        self.unresolved.iter().any(UnresolvedReason::is_overflow)
    }
}

/// Resolve an include written in `including_file`.
///
/// Quoted targets search the including file's directory, then the quoted
/// paths, then the system paths. System targets search the system paths
/// only. The first existing file wins.
pub fn resolve(
    expression: &Expression,
    including_file: &Path,
    table: &MacroTable,
    search_paths: &SearchPaths,
    files: &dyn FileLookup,
    limits: &ExpansionLimits,
) -> IncludeResolution {
    let expansion = expand_include(expression, table, limits);
    let overflowed = expansion.overflowed();
    let mut resolution = IncludeResolution {
        token: expression.spelling(),
        candidates: Vec::new(),
        examined: Vec::new(),
        macros_used: expansion.macros_used,
        unresolved: expansion.failures,
    };

    let including_dir = including_file.parent().unwrap_or_else(|| Path::new("/"));
    for target in &expansion.targets {
        match locate(target, including_dir, search_paths, files, &mut resolution.examined) {
            Some(found) if !resolution.candidates.contains(&found) => resolution.candidates.push(found),
            Some(_) => {}
            None => resolution.unresolved.push(UnresolvedReason::NotFound {
                target: match target.kind {
                    IncludeKind::Quoted => format!("\"{}\"", target.path),
                    IncludeKind::System => format!("<{}>", target.path),
                },
            }),
        }
    }

    if overflowed {
        tracing::warn!(
            file = %including_file.display(),
            token = %resolution.token,
            "macro expansion overflow, include left unresolved"
        );
    } else if !resolution.unresolved.is_empty() {
        tracing::debug!(
            file = %including_file.display(),
            token = %resolution.token,
            reasons = ?resolution.unresolved,
            "include unresolved"
        );
    }

    resolution
}

fn locate(
    target: &IncludeTarget,
    including_dir: &Path,
    search_paths: &SearchPaths,
    files: &dyn FileLookup,
    examined: &mut Vec<PathBuf>,
) -> Option<PathBuf> {
    let relative = Path::new(&target.path);
    if relative.is_absolute() {
        let path = normalized(relative);
        if files.is_file(&path) {
            return Some(path);
        }
        examined.push(path);
        return None;
    }

    for dir in search_paths.directories(target.kind, including_dir) {
        let path = normalized(&dir.join(relative));
        if files.is_file(&path) {
            return Some(path);
        }
        if !examined.contains(&path) {
            examined.push(path);
        }
    }
    None
}
