//! The dictionary facade: a persistent key to value map over a single file.
//!
//! The facade owns the open handle and the configuration.  Operations on a closed handle open
//! the file implicitly, read-write by default with a fall back to read-only when the
//! filesystem refuses write access.

use crate::comparer::{ByteKeyComparer, KeyComparer};
use crate::config::TableConfig;
use crate::element::ElementBytes;
use crate::error::insert::InsertError;
use crate::error::{FetchError, MaintainError, OpenError, RemoveError, SignatureError};
use crate::table::iter::{EntryIter, KeyIter};
use crate::table::node::TableKind;
use crate::table::TableCore;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A key to value dictionary stored in a single file.
///
/// ```no_run
/// use filemap_core::config::TableConfig;
/// use filemap_core::map::FileMap;
///
/// let mut map: FileMap<u32, String> = FileMap::new(TableConfig::new("cache.map"));
/// map.set(&7, &"seven".to_string()).unwrap();
/// assert_eq!(map.get(&7).unwrap(), "seven");
/// ```
pub struct FileMap<K, V, C = ByteKeyComparer>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    config: TableConfig,
    core: Option<TableCore<K, V, C>>,
}

impl<K, V, C> FileMap<K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    /// Create a closed handle from a config.  The file is touched on first use.
    pub fn new(config: TableConfig) -> Self {
        Self { config, core: None }
    }

    /// Create a closed handle for the file at `path` with default options.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(TableConfig::new(path))
    }

    /// Open (or reopen) the file read-write, recovering any in-flight journal record.
    pub fn open(&mut self) -> Result<(), OpenError> {
        self.close();
        let mut config = self.config.clone();
        config.read_only = false;
        self.core = Some(TableCore::open(&config, TableKind::Map)?);
        self.config.truncate = false;
        Ok(())
    }

    /// Open (or reopen) the file read-only.
    ///
    /// A pending journal record cannot be replayed without write access, so one read-write
    /// open-close cycle is attempted to recover it first; if the record is still pending after
    /// that the open refuses.
    pub fn open_read(&mut self) -> Result<(), OpenError> {
        self.close();
        let mut config = self.config.clone();
        config.read_only = true;
        match TableCore::open(&config, TableKind::Map) {
            Ok(core) => {
                self.core = Some(core);
                Ok(())
            }
            Err(OpenError::JournalPending) => {
                let mut recover = self.config.clone();
                recover.read_only = false;
                drop(TableCore::<K, V, C>::open(&recover, TableKind::Map)?);
                self.core = Some(TableCore::open(&config, TableKind::Map)?);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Close the handle, flushing any cached pages.  Harmless when already closed.
    pub fn close(&mut self) {
        self.core = None;
    }

    /// Path of the container file.
    pub fn file_path(&self) -> &Path {
        self.config.path()
    }

    /// Point the handle at a different file.  Closes the current one.
    pub fn set_file_path<P: Into<PathBuf>>(&mut self, path: P) {
        self.close();
        self.config.path = path.into();
    }

    /// True when the handle is (or would open) read-only.
    pub fn is_read_only(&self) -> bool {
        match &self.core {
            Some(core) => core.is_read_only(),
            None => self.config.read_only,
        }
    }

    /// The page cache byte budget.
    pub fn cache_size(&self) -> u32 {
        self.config.cache_size
    }

    /// Change the page cache byte budget, applied to the open handle immediately.
    pub fn set_cache_size(&mut self, cache_size: u32) {
        self.config.cache_size = cache_size;
        if let Some(core) = &mut self.core {
            core.set_cache_budget(cache_size);
        }
    }

    /// Mutations that have orphaned an item since open, compact or clear.
    pub fn fragmentation_count(&self) -> u64 {
        self.core.as_ref().map_or(0, |core| core.fragmentation_count())
    }

    /// Number of entries.
    pub fn count(&mut self) -> Result<u64, OpenError> {
        Ok(self.core()?.count())
    }

    /// True when the map holds no entries.
    pub fn is_empty(&mut self) -> Result<bool, OpenError> {
        Ok(self.core()?.count() == 0)
    }

    /// The 16 byte signature tag at the front of the file.
    pub fn signature(&mut self) -> Result<[u8; 16], OpenError> {
        Ok(self.core()?.signature())
    }

    /// Overwrite the signature tag with up to 16 bytes, zero padded on the right.  Reopens of
    /// this handle expect the new tag.
    pub fn set_signature(&mut self, signature: &[u8]) -> Result<(), SignatureError> {
        let padded = self
            .core()
            .map_err(SignatureError::Open)?
            .set_signature(signature)?;
        self.config.signature = Some(padded);
        Ok(())
    }

    /// Fetch the value stored under `key`.  Missing keys are an error, mirror of the indexer.
    pub fn get(&mut self, key: &K) -> Result<V, FetchError> {
        self.core().map_err(FetchError::Open)?.fetch(key)
    }

    /// Insert or overwrite the entry for `key`.  Overwriting orphans the old item body.
    pub fn set(&mut self, key: &K, value: &V) -> Result<(), InsertError> {
        self.core().map_err(InsertError::Open)?.assign(key, value, true)?;
        Ok(())
    }

    /// Insert a new entry; a key that is already present is an error.
    pub fn add(&mut self, key: &K, value: &V) -> Result<(), InsertError> {
        self.core().map_err(InsertError::Open)?.assign(key, value, false)?;
        Ok(())
    }

    /// Insert a new entry unless the key is present.  Returns false without writing when the
    /// key exists or the handle is read-only.
    pub fn try_add(&mut self, key: &K, value: &V) -> Result<bool, InsertError> {
        let core = self.core().map_err(InsertError::Open)?;
        if core.is_read_only() {
            return Ok(false);
        }
        match core.assign(key, value, false) {
            Ok(_) => Ok(true),
            Err(InsertError::DuplicateKey) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// True if the map holds `key`.
    pub fn contains_key(&mut self, key: &K) -> Result<bool, FetchError> {
        self.core().map_err(FetchError::Open)?.contains(key)
    }

    /// Remove the entry for `key`.  Returns false when it was not present.
    pub fn remove(&mut self, key: &K) -> Result<bool, RemoveError> {
        self.core().map_err(RemoveError::Open)?.delete(key)
    }

    /// Rewrite the item section without its orphans and truncate the reclaimed space.
    pub fn compact(&mut self) -> Result<(), MaintainError> {
        self.core().map_err(MaintainError::Open)?.compact_items()
    }

    /// Remove every entry and shrink back to the initial capacity.
    pub fn clear(&mut self) -> Result<(), MaintainError> {
        self.core().map_err(MaintainError::Open)?.clear()
    }

    /// Iterate the live entries in file order.
    pub fn iter(&mut self) -> Result<EntryIter<'_, K, V, C>, OpenError> {
        Ok(EntryIter::new(self.core()?))
    }

    /// Iterate the live keys in file order.
    pub fn keys(&mut self) -> Result<KeyIter<'_, K, V, C>, OpenError> {
        Ok(KeyIter::new(self.core()?))
    }

    /// The open handle, opening it implicitly when needed.  The implicit open is read-write
    /// unless configured otherwise, falling back to read-only when write permission is denied.
    fn core(&mut self) -> Result<&mut TableCore<K, V, C>, OpenError> {
        if self.core.is_none() {
            let opened = match TableCore::open(&self.config, TableKind::Map) {
                Err(OpenError::FileOpen(e))
                    if e.kind() == ErrorKind::PermissionDenied && !self.config.read_only =>
                {
                    let mut fallback = self.config.clone();
                    fallback.read_only = true;
                    TableCore::open(&fallback, TableKind::Map)?
                }
                other => other?,
            };
            self.core = Some(opened);
            self.config.truncate = false;
        }
        Ok(self.core.as_mut().expect("just opened"))
    }
}
