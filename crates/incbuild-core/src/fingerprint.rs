//! Content fingerprints.

use std::fmt;
use std::io;
use std::path::Path;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// BLAKE3 content hash used as the proxy for "file changed".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Sentinel for a file that exists but could not be read.
    pub const UNREADABLE: Fingerprint = Fingerprint([0xff; 32]);

    /// Sentinel for an include that never resolved to a file.
    pub const UNRESOLVED: Fingerprint = Fingerprint([0x00; 32]);

    /// Create a fingerprint from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint an in-memory buffer.
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Fingerprint a file on disk.
    ///
    /// Large files are memory-mapped by blake3; small ones are read.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut hasher = Hasher::new();
        hasher.update_mmap(path)?;
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Combine named child fingerprints into a directory fingerprint.
    ///
    /// Children are sorted by name so the result does not depend on
    /// walk order.
    pub fn combine<'a, I>(children: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Fingerprint)>,
    {
        let mut entries: Vec<_> = children.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = Hasher::new();
        for (name, fingerprint) in entries {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update(&fingerprint.0);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Whether this is one of the reserved sentinel values.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::UNREADABLE || *self == Self::UNRESOLVED
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNREADABLE => f.write_str("Fingerprint(<unreadable>)"),
            Self::UNRESOLVED => f.write_str("Fingerprint(<unresolved>)"),
            _ => write!(f, "Fingerprint({})", self.short()),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
