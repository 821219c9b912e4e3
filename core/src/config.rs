//! Define the configuration used to open a container file.

use std::path::{Path, PathBuf};

/// Configuration for a container file.
///
/// Built with chained options and handed to [`crate::map::FileMap`] or
/// [`crate::set::FileSet`]; the facade opens the file lazily on first use.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub(crate) path: PathBuf,
    pub(crate) cache_size: u32,
    pub(crate) read_only: bool,
    pub(crate) create: bool,
    pub(crate) truncate: bool,
    pub(crate) sync: bool,
    pub(crate) signature: Option<[u8; 16]>,
}

impl TableConfig {
    /// Create a new config for the container at `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            cache_size: 512 * 1024, // 512kb default.
            read_only: false,
            create: true,
            truncate: false,
            sync: true,
            signature: None,
        }
    }

    /// Path of the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the container read-only.  Never creates, never recovers.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Do NOT create the file when it is missing.
    pub fn no_create(mut self) -> Self {
        self.create = false;
        self
    }

    /// If the file exists then truncate it on open, requires write mode.
    pub fn truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Skip the fsync at the end of every flush.  Much faster for bulk loads; a crash can then
    /// lose recently acknowledged writes, although the file stays structurally recoverable.
    pub fn no_sync(mut self) -> Self {
        self.sync = false;
        self
    }

    /// Set the page cache byte budget.
    pub fn set_cache_size(mut self, cache_bytes: u32) -> Self {
        self.cache_size = cache_bytes;
        self
    }

    /// Expect `signature` in the file header instead of the default for the container kind.
    /// Shorter values are zero padded on the right.  Panics if longer than 16 bytes.
    pub fn set_signature(mut self, signature: &[u8]) -> Self {
        if signature.len() > 16 {
            panic!("signature must be at most 16 bytes, got {}", signature.len());
        }
        let mut padded = [0_u8; 16];
        padded[..signature.len()].copy_from_slice(signature);
        self.signature = Some(padded);
        self
    }
}
