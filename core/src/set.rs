//! The hash set facade: a persistent set of keys over a single file.
//!
//! Backed by the same core as the map with unit values and a 4 byte marker per lookup slot.
//! The bulk operations mark members of the other collection and then sweep the slots, so even
//! set algebra over huge sets runs in bounded memory.

use crate::comparer::{ByteKeyComparer, KeyComparer};
use crate::config::TableConfig;
use crate::element::ElementBytes;
use crate::error::insert::InsertError;
use crate::error::{FetchError, MaintainError, OpenError, RemoveError, SetOpError, SignatureError};
use crate::table::iter::KeyIter;
use crate::table::node::TableKind;
use crate::table::TableCore;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A set of keys stored in a single file.
///
/// ```no_run
/// use filemap_core::config::TableConfig;
/// use filemap_core::set::FileSet;
///
/// let mut set: FileSet<u32> = FileSet::new(TableConfig::new("seen.set"));
/// assert!(set.add(&42).unwrap());
/// assert!(!set.add(&42).unwrap());
/// ```
pub struct FileSet<K, C = ByteKeyComparer>
where
    K: ElementBytes<K> + Debug,
    C: KeyComparer<K> + Default,
{
    config: TableConfig,
    core: Option<TableCore<K, (), C>>,
}

impl<K, C> FileSet<K, C>
where
    K: ElementBytes<K> + Debug,
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
        self.core = Some(TableCore::open(&config, TableKind::Set)?);
        self.config.truncate = false;
        Ok(())
    }

    /// Open (or reopen) the file read-only, attempting one read-write recovery cycle when a
    /// journal record is pending.
    pub fn open_read(&mut self) -> Result<(), OpenError> {
        self.close();
        let mut config = self.config.clone();
        config.read_only = true;
        match TableCore::open(&config, TableKind::Set) {
            Ok(core) => {
                self.core = Some(core);
                Ok(())
            }
            Err(OpenError::JournalPending) => {
                let mut recover = self.config.clone();
                recover.read_only = false;
                drop(TableCore::<K, (), C>::open(&recover, TableKind::Set)?);
                self.core = Some(TableCore::open(&config, TableKind::Set)?);
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

    /// Number of elements.
    pub fn count(&mut self) -> Result<u64, OpenError> {
        Ok(self.core()?.count())
    }

    /// True when the set holds no elements.
    pub fn is_empty(&mut self) -> Result<bool, OpenError> {
        Ok(self.core()?.count() == 0)
    }

    /// The 16 byte signature tag at the front of the file.
    pub fn signature(&mut self) -> Result<[u8; 16], OpenError> {
        Ok(self.core()?.signature())
    }

    /// Overwrite the signature tag with up to 16 bytes, zero padded on the right.
    pub fn set_signature(&mut self, signature: &[u8]) -> Result<(), SignatureError> {
        let padded = self
            .core()
            .map_err(SignatureError::Open)?
            .set_signature(signature)?;
        self.config.signature = Some(padded);
        Ok(())
    }

    /// Add an element.  Returns false when it was already present.
    pub fn add(&mut self, key: &K) -> Result<bool, InsertError> {
        match self.core().map_err(InsertError::Open)?.assign(key, &(), false) {
            Ok(_) => Ok(true),
            Err(InsertError::DuplicateKey) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// True if the set holds `key`.
    pub fn contains(&mut self, key: &K) -> Result<bool, FetchError> {
        self.core().map_err(FetchError::Open)?.contains(key)
    }

    /// Remove an element.  Returns false when it was not present.
    pub fn remove(&mut self, key: &K) -> Result<bool, RemoveError> {
        self.core().map_err(RemoveError::Open)?.delete(key)
    }

    /// Rewrite the item section without its orphans and truncate the reclaimed space.
    pub fn compact(&mut self) -> Result<(), MaintainError> {
        self.core().map_err(MaintainError::Open)?.compact_items()
    }

    /// Remove every element and shrink back to the initial capacity.
    pub fn clear(&mut self) -> Result<(), MaintainError> {
        self.core().map_err(MaintainError::Open)?.clear()
    }

    /// Iterate the elements in file order.
    pub fn iter(&mut self) -> Result<KeyIter<'_, K, (), C>, OpenError> {
        Ok(KeyIter::new(self.core()?))
    }

    /// Keep only the elements also present in `other`.
    pub fn intersect_with<I>(&mut self, other: I) -> Result<(), SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.writable_core()?;
        core.unmark_all()?;
        for key in other {
            core.try_mark(&key)?;
        }
        core.remove_where_marked(false)?;
        Ok(())
    }

    /// Remove every element present in `other`.
    pub fn except_with<I>(&mut self, other: I) -> Result<(), SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.writable_core()?;
        for key in other {
            core.delete(&key)?;
        }
        Ok(())
    }

    /// Keep elements present in exactly one of the two collections.
    pub fn symmetric_except_with<I>(&mut self, other: I) -> Result<(), SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.writable_core()?;
        core.unmark_all()?;
        // Elements of other that are absent here need to be added afterwards; shared
        // elements get marked and removed.
        let mut absent = Vec::new();
        for key in other {
            if !core.try_mark(&key)? {
                absent.push(key);
            }
        }
        core.remove_where_marked(true)?;
        for key in absent {
            match core.assign(&key, &(), false) {
                Ok(_) | Err(InsertError::DuplicateKey) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Add every element of `other`.
    pub fn union_with<I>(&mut self, other: I) -> Result<(), SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.writable_core()?;
        for key in other {
            match core.assign(&key, &(), false) {
                Ok(_) | Err(InsertError::DuplicateKey) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// True when the set and `other` hold exactly the same elements.
    pub fn set_equals<I>(&mut self, other: I) -> Result<bool, SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.writable_core()?;
        core.unmark_all()?;
        for key in other {
            if !core.try_mark(&key)? {
                return Ok(false);
            }
        }
        Ok(core.all_marked()?)
    }

    /// True when every element of the set is in `other`.
    pub fn is_subset_of<I>(&mut self, other: I) -> Result<bool, SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.writable_core()?;
        core.unmark_all()?;
        for key in other {
            core.try_mark(&key)?;
        }
        Ok(core.all_marked()?)
    }

    /// True when the set is a subset of `other` and `other` has at least one extra element.
    pub fn is_proper_subset_of<I>(&mut self, other: I) -> Result<bool, SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.writable_core()?;
        core.unmark_all()?;
        let mut extra = false;
        for key in other {
            if !core.try_mark(&key)? {
                extra = true;
            }
        }
        Ok(extra && core.all_marked()?)
    }

    /// True when every element of `other` is in the set.
    pub fn is_superset_of<I>(&mut self, other: I) -> Result<bool, SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.core().map_err(SetOpError::Open)?;
        for key in other {
            if !core.contains(&key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True when the set holds every element of `other` plus at least one more.
    pub fn is_proper_superset_of<I>(&mut self, other: I) -> Result<bool, SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.writable_core()?;
        core.unmark_all()?;
        for key in other {
            if !core.try_mark(&key)? {
                return Ok(false);
            }
        }
        Ok(!core.all_marked()?)
    }

    /// True when the set and `other` share at least one element.
    pub fn overlaps<I>(&mut self, other: I) -> Result<bool, SetOpError>
    where
        I: IntoIterator<Item = K>,
    {
        let core = self.core().map_err(SetOpError::Open)?;
        for key in other {
            if core.contains(&key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The open handle, opening it implicitly when needed.
    fn core(&mut self) -> Result<&mut TableCore<K, (), C>, OpenError> {
        if self.core.is_none() {
            let opened = match TableCore::open(&self.config, TableKind::Set) {
                Err(OpenError::FileOpen(e))
                    if e.kind() == ErrorKind::PermissionDenied && !self.config.read_only =>
                {
                    let mut fallback = self.config.clone();
                    fallback.read_only = true;
                    TableCore::open(&fallback, TableKind::Set)?
                }
                other => other?,
            };
            self.core = Some(opened);
            self.config.truncate = false;
        }
        Ok(self.core.as_mut().expect("just opened"))
    }

    /// The open handle, required writable.  The marker column is only usable on a handle that
    /// can write it.
    fn writable_core(&mut self) -> Result<&mut TableCore<K, (), C>, SetOpError> {
        let core = self.core().map_err(SetOpError::Open)?;
        if core.is_read_only() {
            return Err(SetOpError::ReadOnly);
        }
        Ok(core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn temp_set(dir: &tempfile::TempDir, name: &str) -> FileSet<u32> {
        FileSet::new(TableConfig::new(dir.path().join(name)).no_sync())
    }

    fn fill(set: &mut FileSet<u32>, elements: &[u32]) {
        for e in elements {
            assert!(set.add(e).unwrap());
        }
    }

    fn elements(set: &mut FileSet<u32>) -> HashSet<u32> {
        set.iter().unwrap().collect()
    }

    #[test]
    fn test_add_contains_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = temp_set(&dir, "basic.set");
        assert!(set.add(&1).unwrap());
        assert!(!set.add(&1).unwrap());
        assert!(set.contains(&1).unwrap());
        assert!(!set.contains(&2).unwrap());
        assert!(set.remove(&1).unwrap());
        assert!(!set.remove(&1).unwrap());
        assert_eq!(set.count().unwrap(), 0);
    }

    #[test]
    fn test_intersect_with() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intersect.set");
        let mut set: FileSet<u32> = FileSet::new(TableConfig::new(&path).no_sync());
        fill(&mut set, &[1, 2, 3, 4, 5]);
        set.intersect_with([4, 5, 6, 7]).unwrap();
        assert_eq!(elements(&mut set), HashSet::from([4, 5]));
        set.close();

        // The result survives a reopen.
        let mut back: FileSet<u32> = FileSet::new(TableConfig::new(&path).no_sync());
        back.open_read().unwrap();
        assert_eq!(back.count().unwrap(), 2);
        assert_eq!(elements(&mut back), HashSet::from([4, 5]));
    }

    #[test]
    fn test_symmetric_except_with() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = temp_set(&dir, "sym.set");
        fill(&mut set, &[1, 2, 3, 4, 5]);
        set.symmetric_except_with([4, 5, 6, 7]).unwrap();
        assert_eq!(elements(&mut set), HashSet::from([1, 2, 3, 6, 7]));
    }

    #[test]
    fn test_except_and_union() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = temp_set(&dir, "exun.set");
        fill(&mut set, &[1, 2, 3]);
        set.except_with([2, 9]).unwrap();
        assert_eq!(elements(&mut set), HashSet::from([1, 3]));
        set.union_with([3, 4, 5]).unwrap();
        assert_eq!(elements(&mut set), HashSet::from([1, 3, 4, 5]));
    }

    #[test]
    fn test_subset_and_superset_predicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = temp_set(&dir, "pred.set");
        fill(&mut set, &[1, 2, 3]);

        assert!(set.set_equals([1, 2, 3]).unwrap());
        assert!(set.set_equals([3, 2, 1, 1]).unwrap());
        assert!(!set.set_equals([1, 2]).unwrap());
        assert!(!set.set_equals([1, 2, 4]).unwrap());

        assert!(set.is_subset_of([1, 2, 3]).unwrap());
        assert!(set.is_subset_of([1, 2, 3, 4]).unwrap());
        assert!(!set.is_subset_of([1, 2]).unwrap());

        assert!(!set.is_proper_subset_of([1, 2, 3]).unwrap());
        assert!(set.is_proper_subset_of([1, 2, 3, 4]).unwrap());

        assert!(set.is_superset_of([1, 2]).unwrap());
        assert!(set.is_superset_of(std::iter::empty()).unwrap());
        assert!(!set.is_superset_of([1, 9]).unwrap());

        assert!(set.is_proper_superset_of([1, 2]).unwrap());
        assert!(!set.is_proper_superset_of([1, 2, 3]).unwrap());
        assert!(!set.is_proper_superset_of([9]).unwrap());

        assert!(set.overlaps([9, 3]).unwrap());
        assert!(!set.overlaps([8, 9]).unwrap());
    }

    #[test]
    fn test_bulk_ops_reject_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.set");
        {
            let mut set: FileSet<u32> = FileSet::new(TableConfig::new(&path).no_sync());
            fill(&mut set, &[1, 2]);
        }
        let mut set: FileSet<u32> =
            FileSet::new(TableConfig::new(&path).no_sync().read_only());
        assert!(matches!(
            set.intersect_with([1]),
            Err(SetOpError::ReadOnly)
        ));
        // Pure membership predicates still work.
        assert!(set.is_superset_of([1, 2]).unwrap());
        assert!(set.overlaps([2]).unwrap());
    }

    #[test]
    fn test_set_and_map_files_do_not_mix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kind.set");
        {
            let mut set: FileSet<u32> = FileSet::new(TableConfig::new(&path).no_sync());
            set.add(&1).unwrap();
        }
        let mut map: crate::map::FileMap<u32, u32> =
            crate::map::FileMap::new(TableConfig::new(&path).no_sync());
        assert!(map.open().is_err());
    }

    #[test]
    fn test_markers_survive_heavy_churn() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = temp_set(&dir, "churn.set");
        // Enough elements to force several growths.
        let all: Vec<u32> = (0..200).collect();
        for e in &all {
            set.add(e).unwrap();
        }
        assert_eq!(set.count().unwrap(), 200);
        let evens: Vec<u32> = (0..200).step_by(2).collect();
        set.intersect_with(evens.iter().copied()).unwrap();
        assert_eq!(set.count().unwrap(), 100);
        assert_eq!(elements(&mut set), evens.iter().copied().collect());
        set.compact().unwrap();
        assert_eq!(elements(&mut set), evens.iter().copied().collect());
    }
}
