//! Per-file snapshot types.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::fingerprint::Fingerprint;

/// Type of file system entry captured in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum FileType {
    /// Regular file.
    RegularFile,
    /// Directory.
    Directory,
    /// Symbolic link that does not lead to a regular file.
    Symlink,
    /// Path that was looked up but does not exist.
    Missing,
}

/// Segments of a path relative to its snapshot root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelativePath {
    segments: Vec<CompactString>,
    is_file: bool,
}

impl RelativePath {
    /// Build from `/`-separated text.
    pub fn parse(text: &str, is_file: bool) -> Self {
        let segments = text
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .map(CompactString::from)
            .collect();
        Self { segments, is_file }
    }

    /// Build from the components of `path` below `root`.
    ///
    /// Returns `None` when `path` is not under `root`.
    pub fn between(root: &Path, path: &Path, is_file: bool) -> Option<Self> {
        let rest = path.strip_prefix(root).ok()?;
        let segments = rest
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(CompactString::new(s.to_string_lossy())),
                _ => None,
            })
            .collect();
        Some(Self { segments, is_file })
    }

    pub fn segments(&self) -> &[CompactString] {
        &self.segments
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    /// The last segment, or `""` for the root itself.
    pub fn last_name(&self) -> &str {
        self.segments.last().map_or("", CompactString::as_str)
    }

    /// `/`-joined form used for pattern matching.
    pub fn path_string(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_string())
    }
}

/// Immutable snapshot of one file system entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSnapshot {
    path: Arc<str>,
    name: CompactString,
    relative_path: RelativePath,
    file_type: FileType,
    fingerprint: Option<Fingerprint>,
    size: u64,
}

impl FileSnapshot {
    /// Snapshot of a regular file.
    pub fn regular(
        path: Arc<str>,
        relative_path: RelativePath,
        fingerprint: Fingerprint,
        size: u64,
    ) -> Self {
        Self::with_type(path, relative_path, FileType::RegularFile, Some(fingerprint), size)
    }

    /// Snapshot of a directory with the combined hash of its children.
    pub fn directory(path: Arc<str>, relative_path: RelativePath, fingerprint: Fingerprint) -> Self {
        Self::with_type(path, relative_path, FileType::Directory, Some(fingerprint), 0)
    }

    /// Snapshot of a symbolic link. The fingerprint covers the link target text.
    pub fn symlink(path: Arc<str>, relative_path: RelativePath, fingerprint: Fingerprint) -> Self {
        Self::with_type(path, relative_path, FileType::Symlink, Some(fingerprint), 0)
    }

    /// Snapshot of a path that does not exist.
    pub fn missing(path: Arc<str>, relative_path: RelativePath) -> Self {
        Self::with_type(path, relative_path, FileType::Missing, None, 0)
    }

    fn with_type(
        path: Arc<str>,
        relative_path: RelativePath,
        file_type: FileType,
        fingerprint: Option<Fingerprint>,
        size: u64,
    ) -> Self {
        let name = CompactString::from(file_name(&path));
        Self {
            path,
            name,
            relative_path,
            file_type,
            fingerprint,
            size,
        }
    }

    /// Normalized absolute path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Shared handle to the interned path.
    pub fn path_arc(&self) -> &Arc<str> {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    /// Last-known size in bytes (0 for non-files).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_type == FileType::RegularFile
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Whether the content could not be read when the snapshot was taken.
    pub fn is_unreadable(&self) -> bool {
        self.fingerprint == Some(Fingerprint::UNREADABLE)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).find(|s| !s.is_empty()).unwrap_or(path)
}

/// Lexically normalize a path: drop `.` components, fold `..`, and use `/`.
///
/// Never touches the file system, so symlinks are not resolved.
pub fn normalize_path(path: &Path) -> String {
    let mut prefix = String::new();
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;

    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().into_owned(),
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
        }
    }

    let mut out = prefix;
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// [`normalize_path`] returning a `PathBuf`.
pub fn normalized(path: &Path) -> PathBuf {
    PathBuf::from(normalize_path(path))
}
