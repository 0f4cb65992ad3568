//! Read-only file tree element view over snapshots.
//!
//! Pattern matching needs path, name, relative path and directory-ness.
//! [`SnapshotElement`] exposes exactly those from the captured snapshot.
//! Timestamps and sizes are looked up on the real file system only when
//! asked for, and byte access is refused: a snapshot element carries no
//! content.

use std::cell::OnceCell;
use std::fs::Metadata;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use crate::error::ElementError;
use crate::snapshot::{FileSnapshot, RelativePath};

/// Default permission bits reported for directories.
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Default permission bits reported for files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Capabilities a pattern matcher may ask of a file tree entry.
pub trait FileTreeElement {
    fn path(&self) -> &str;
    fn name(&self) -> &str;
    fn relative_path(&self) -> &RelativePath;
    fn is_directory(&self) -> bool;

    /// Last modification time.
    fn last_modified(&self) -> Result<SystemTime, ElementError>;

    /// Size in bytes.
    fn size(&self) -> Result<u64, ElementError>;

    /// Open the content for reading.
    fn open(&self) -> Result<Box<dyn Read>, ElementError>;

    /// Copy the content to `target`.
    fn copy_to(&self, target: &Path) -> Result<(), ElementError>;

    /// Unix permission bits.
    fn mode(&self) -> u32 {
        if self.is_directory() {
            DEFAULT_DIR_MODE
        } else {
            DEFAULT_FILE_MODE
        }
    }
}

/// [`FileTreeElement`] view of a [`FileSnapshot`].
#[derive(Debug)]
pub struct SnapshotElement<'a> {
    snapshot: &'a FileSnapshot,
    metadata: OnceCell<Result<Metadata, std::io::ErrorKind>>,
}

impl<'a> SnapshotElement<'a> {
    pub fn new(snapshot: &'a FileSnapshot) -> Self {
        Self {
            snapshot,
            metadata: OnceCell::new(),
        }
    }

    pub fn snapshot(&self) -> &'a FileSnapshot {
        self.snapshot
    }

    fn metadata(&self) -> Result<&Metadata, ElementError> {
        self.metadata
            .get_or_init(|| std::fs::metadata(self.snapshot.path()).map_err(|e| e.kind()))
            .as_ref()
            .map_err(|kind| ElementError::Metadata {
                path: self.snapshot.path().into(),
                kind: *kind,
            })
    }
}

impl FileTreeElement for SnapshotElement<'_> {
    fn path(&self) -> &str {
        self.snapshot.path()
    }

    fn name(&self) -> &str {
        self.snapshot.name()
    }

    fn relative_path(&self) -> &RelativePath {
        self.snapshot.relative_path()
    }

    fn is_directory(&self) -> bool {
        self.snapshot.is_directory()
    }

    fn last_modified(&self) -> Result<SystemTime, ElementError> {
        let metadata = self.metadata()?;
        metadata.modified().map_err(|e| ElementError::Metadata {
            path: self.snapshot.path().into(),
            kind: e.kind(),
        })
    }

    fn size(&self) -> Result<u64, ElementError> {
        Ok(self.metadata()?.len())
    }

    fn open(&self) -> Result<Box<dyn Read>, ElementError> {
        Err(ElementError::Unsupported { operation: "open" })
    }

    fn copy_to(&self, _target: &Path) -> Result<(), ElementError> {
        Err(ElementError::Unsupported { operation: "copy_to" })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fingerprint::Fingerprint;

    fn snapshot(path: &str) -> FileSnapshot {
        FileSnapshot::regular(
            Arc::from(path),
            RelativePath::parse("a.h", true),
            Fingerprint::of(b"a"),
            1,
        )
    }

    #[test]
    fn test_view_exposes_snapshot_fields() {
        let snap = snapshot("/nowhere/a.h");
        let element = SnapshotElement::new(&snap);
        assert_eq!(element.path(), "/nowhere/a.h");
        assert_eq!(element.name(), "a.h");
        assert_eq!(element.relative_path().path_string(), "a.h");
        assert!(!element.is_directory());
        assert_eq!(element.mode(), DEFAULT_FILE_MODE);
    }

    #[test]
    fn test_byte_access_is_unsupported() {
        let snap = snapshot("/nowhere/a.h");
        let element = SnapshotElement::new(&snap);
        assert!(matches!(element.open(), Err(ElementError::Unsupported { .. })));
        assert!(matches!(
            element.copy_to(Path::new("/tmp/x")),
            Err(ElementError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_metadata_is_lazy() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("a.h");
        std::fs::write(&path, "abc").unwrap();

        let snap = snapshot(path.to_str().unwrap());
        let element = SnapshotElement::new(&snap);
        assert!(element.metadata.get().is_none());
        assert_eq!(element.size().unwrap(), 3);
        assert!(element.metadata.get().is_some());
        assert!(element.last_modified().is_ok());

        let missing = snapshot("/definitely/not/here.h");
        let element = SnapshotElement::new(&missing);
        assert!(matches!(element.size(), Err(ElementError::Metadata { .. })));
    }
}
