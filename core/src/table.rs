//! Main module for the container engine.  This implements the core sync single threaded access
//! to the file: probing, inserts, deletes and the crash recovery performed on open.
//!
//! The core keeps essentially nothing in memory.  Every operation walks the lookup section and
//! item section through the page cache, and every mutation records its intent in the single
//! slot journal before touching committed state, so a crash at any point leaves a file the next
//! open can finish or ignore.

use crate::comparer::{ByteKeyComparer, KeyComparer};
use crate::config::TableConfig;
use crate::element::ElementBytes;
use crate::error::insert::InsertError;
use crate::error::{FetchError, LoadHeaderError, OpenError, RemoveError, SignatureError};
use crate::paged_file::PagedFile;
use crate::probe;
use crate::table::node::{
    HeaderNode, JournalNode, JournalOp, TableKind, ITEM_HEAD_SIZE, LOAD_FACTOR, LOOKUP_SECTION,
    NEVER_USED,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use tracing::debug;

pub(crate) mod compact;
pub(crate) mod grow;
pub mod iter;
pub(crate) mod journal;
pub(crate) mod markers;
pub(crate) mod node;

/// Result of probing for a key: the slot the probe ended on and the item it found.
/// `item == 0` means the key is absent and `lookup` (when non zero) is a legal insertion slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Probe {
    pub lookup: u64,
    pub item: u64,
}

/// An open container file.
///
/// Generic over the key and value element codecs plus the key comparer.  The set facade
/// instantiates this with `V = ()`.
pub(crate) struct TableCore<K, V, C = ByteKeyComparer>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    pub(crate) file: PagedFile,
    pub(crate) header: HeaderNode,
    pub(crate) node_size: u64,
    kind: TableKind,
    comparer: C,
    fragmentation: u64,
    read_only: bool,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
}

impl<K, V, C> TableCore<K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    /// Open a new or existing container file, replaying any in-flight journal record.
    pub fn open(config: &TableConfig, kind: TableKind) -> Result<Self, OpenError> {
        let read_only = config.read_only;
        let mut options = OpenOptions::new();
        options.read(true);
        if !read_only {
            options
                .write(true)
                .create(config.create)
                .truncate(config.truncate);
        }
        let file = options.open(&config.path).map_err(OpenError::FileOpen)?;
        let file = PagedFile::new(file, config.cache_size, config.sync)?;
        let node_size = kind.node_size();
        let signature = config.signature.unwrap_or_else(|| kind.signature());

        let fresh = file.len() < LOOKUP_SECTION;
        if fresh && read_only {
            return Err(OpenError::LoadHeader(LoadHeaderError::TooSmall));
        }
        let mut core = Self {
            file,
            header: HeaderNode::new(signature, node_size),
            node_size,
            kind,
            comparer: C::default(),
            fragmentation: 0,
            read_only,
            _key: PhantomData,
            _value: PhantomData,
        };
        if fresh {
            // Brand new (or mangled beyond use): lay out an empty container.
            core.apply_clear().map_err(OpenError::IO)?;
            core.journal_clear().map_err(OpenError::IO)?;
            return Ok(core);
        }

        core.header = HeaderNode::load(&mut core.file)?;
        if core.header.signature != signature {
            return Err(OpenError::LoadHeader(LoadHeaderError::InvalidSignature));
        }
        let (record, valid) = JournalNode::load(&mut core.file)?;
        if !valid {
            tracing::warn!("corrupt journal record, treating as none");
            if !read_only {
                core.journal_clear().map_err(OpenError::IO)?;
            }
        } else if record.op != JournalOp::None {
            if read_only {
                return Err(OpenError::JournalPending);
            }
            debug!(op = ?record.op, "replaying in-flight journal record");
            core.replay(record).map_err(OpenError::Replay)?;
            core.journal_clear().map_err(OpenError::Replay)?;
        }
        if !read_only && core.file.len() > core.header.eof {
            // A crash between an append and its journal record leaves invisible bytes past the
            // end pointer.  Drop them so the header matches the file again.
            core.file.set_len(core.header.eof)?;
            core.file.flush()?;
        }
        Ok(core)
    }

    /// Number of live entries.
    pub fn count(&self) -> u64 {
        self.header.count
    }

    /// True when the handle cannot mutate the file.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Mutations that have orphaned an item since open, compact or clear.
    pub fn fragmentation_count(&self) -> u64 {
        self.fragmentation
    }

    /// The 16 byte signature tag at the front of the file.
    pub fn signature(&self) -> [u8; 16] {
        self.header.signature
    }

    /// Overwrite the signature tag.  Values shorter than 16 bytes are zero padded.
    pub fn set_signature(&mut self, signature: &[u8]) -> Result<[u8; 16], SignatureError> {
        if signature.len() > 16 {
            return Err(SignatureError::TooLong);
        }
        if self.read_only {
            return Err(SignatureError::ReadOnly);
        }
        let mut padded = [0_u8; 16];
        padded[..signature.len()].copy_from_slice(signature);
        self.header.signature = padded;
        self.header.store(&mut self.file)?;
        self.file.flush()?;
        Ok(padded)
    }

    /// Change the page cache budget.
    pub fn set_cache_budget(&mut self, cache_size: u32) {
        self.file.set_cache_budget(cache_size);
    }

    /// Serialize a key into a fresh buffer.
    pub(crate) fn key_bytes(&self, key: &K) -> Result<Vec<u8>, crate::error::serialize::SerializeError> {
        let mut bytes = Vec::new();
        key.write(&mut bytes)?;
        Ok(bytes)
    }

    /// Hash a key through the comparer.
    pub(crate) fn key_hash(&self, key: &K, bytes: &[u8]) -> i32 {
        self.comparer.hash(key, bytes)
    }

    /// Probe the lookup section for a key.  Remembers the first tombstone in the chain as the
    /// insertion slot and stops at the first never-used slot.  On a writable handle a chain
    /// that crosses more than three tombstones triggers one compact-and-rebuild per call.
    pub(crate) fn find(&mut self, key: &K, bytes: &[u8], hash: i32) -> Result<Probe, FetchError> {
        self.find_inner(key, bytes, hash, !self.read_only)
    }

    /// Probe without ever rebuilding.  The marker engine uses this: a rebuild zeroes the
    /// marker column, which would corrupt an in-progress bulk set operation.
    pub(crate) fn find_no_rebuild(
        &mut self,
        key: &K,
        bytes: &[u8],
        hash: i32,
    ) -> Result<Probe, FetchError> {
        self.find_inner(key, bytes, hash, false)
    }

    fn find_inner(
        &mut self,
        key: &K,
        bytes: &[u8],
        hash: i32,
        mut may_rebuild: bool,
    ) -> Result<Probe, FetchError> {
        let first = probe::first_hash(hash);
        let offset = probe::collision_offset(hash);
        'restart: loop {
            let capacity = self.header.capacity;
            let mut empty_lookup = 0_u64;
            let mut empty_count = 0_u32;
            for k in 0..capacity {
                let lookup = self.slot_offset(probe::position(first, offset, k, capacity));
                let item = self.read_item_pointer(lookup)?;
                if item >= self.header.item_section {
                    let (_, _, stored_hash) = self.read_item_head(item)?;
                    if stored_hash == hash && self.keys_equal(item, key, bytes)? {
                        return Ok(Probe { lookup, item });
                    }
                } else if item == NEVER_USED {
                    let lookup = if empty_count > 0 { empty_lookup } else { lookup };
                    return Ok(Probe { lookup, item: 0 });
                } else {
                    // Tombstone, or garbage below the item section treated the same.
                    if empty_count == 0 {
                        empty_lookup = lookup;
                    }
                    empty_count += 1;
                    if empty_count > 3 && may_rebuild {
                        // The chain has degraded, reclaim it.  At most once per call.
                        self.rebuild_lookup().map_err(FetchError::Rebuild)?;
                        may_rebuild = false;
                        continue 'restart;
                    }
                }
            }
            // Probed every slot without hitting a never-used one.
            let lookup = if empty_count > 0 { empty_lookup } else { 0 };
            return Ok(Probe { lookup, item: 0 });
        }
    }

    /// Fetch the value stored under a key.
    pub fn fetch(&mut self, key: &K) -> Result<V, FetchError> {
        let bytes = self.key_bytes(key).map_err(FetchError::SerializeKey)?;
        let hash = self.key_hash(key, &bytes);
        let found = self.find(key, &bytes, hash)?;
        if found.item == 0 {
            return Err(FetchError::NotFound);
        }
        self.read_value(found.item)
    }

    /// True if the container holds the key.
    pub fn contains(&mut self, key: &K) -> Result<bool, FetchError> {
        let bytes = self.key_bytes(key).map_err(FetchError::SerializeKey)?;
        let hash = self.key_hash(key, &bytes);
        Ok(self.find(key, &bytes, hash)?.item != 0)
    }

    /// Insert or update an entry.  Returns true when a new entry was created, false when an
    /// existing one was overwritten.  With `overwrite` false an existing key is an error.
    pub fn assign(&mut self, key: &K, value: &V, overwrite: bool) -> Result<bool, InsertError> {
        if self.read_only {
            return Err(InsertError::ReadOnly);
        }
        let bytes = self.key_bytes(key).map_err(InsertError::SerializeKey)?;
        let hash = self.key_hash(key, &bytes);
        let mut found = self.find(key, &bytes, hash).map_err(InsertError::Lookup)?;
        let updating = found.item != 0;
        if updating && !overwrite {
            return Err(InsertError::DuplicateKey);
        }
        if !updating && (self.over_load_factor(self.header.count + 1) || found.lookup == 0) {
            self.grow()?;
            found = self.find(key, &bytes, hash).map_err(InsertError::Lookup)?;
        }
        let mut body = Vec::new();
        value.write(&mut body).map_err(InsertError::SerializeValue)?;

        // The item body goes past the end pointer first.  Those bytes are invisible until the
        // journaled slot write lands, and they are durable before the journal record is, which
        // is what lets Set's replay read the item it points at.
        let item = self.header.eof;
        let next = item + ITEM_HEAD_SIZE + bytes.len() as u64 + body.len() as u64;
        self.file.seek(SeekFrom::Start(item))?;
        self.file.write_u64::<LittleEndian>(found.lookup)?;
        self.file.write_u64::<LittleEndian>(next)?;
        self.file.write_i32::<LittleEndian>(hash)?;
        self.file.write_all(&bytes)?;
        self.file.write_all(&body)?;
        self.file.flush()?;

        let new_count = if updating {
            self.header.count
        } else {
            self.header.count + 1
        };
        self.journal_write(JournalOp::Set, found.lookup, item, new_count)?;
        self.apply_set(found.lookup, item, new_count)?;
        self.journal_clear()?;
        if updating {
            self.fragmentation += 1;
        }
        Ok(!updating)
    }

    /// Remove an entry.  Returns false when the key was not present.
    pub fn delete(&mut self, key: &K) -> Result<bool, RemoveError> {
        if self.read_only {
            return Err(RemoveError::ReadOnly);
        }
        let bytes = self.key_bytes(key).map_err(RemoveError::SerializeKey)?;
        let hash = self.key_hash(key, &bytes);
        let found = self.find(key, &bytes, hash).map_err(RemoveError::Lookup)?;
        if found.item == 0 {
            return Ok(false);
        }
        let new_count = self.header.count - 1;
        self.journal_write(JournalOp::Delete, found.lookup, 0, new_count)?;
        self.apply_delete(found.lookup, new_count)?;
        self.journal_clear()?;
        self.fragmentation += 1;
        Ok(true)
    }

    /// Delete the slot at `lookup` directly (the marker engine already resolved it).
    pub(crate) fn delete_slot(&mut self, lookup: u64) -> Result<(), io::Error> {
        let new_count = self.header.count - 1;
        self.journal_write(JournalOp::Delete, lookup, 0, new_count)?;
        self.apply_delete(lookup, new_count)?;
        self.journal_clear()?;
        self.fragmentation += 1;
        Ok(())
    }

    /// Empty the container and reset it to the initial capacity.
    pub fn clear(&mut self) -> Result<(), crate::error::MaintainError> {
        if self.read_only {
            return Err(crate::error::MaintainError::ReadOnly);
        }
        self.journal_write(JournalOp::Clear, 0, 0, 0)?;
        self.apply_clear()?;
        self.journal_clear()?;
        self.fragmentation = 0;
        Ok(())
    }

    /// True when holding `count` entries would push occupancy over the load factor.
    pub(crate) fn over_load_factor(&self, count: u64) -> bool {
        count as f64 > self.header.capacity as f64 * LOAD_FACTOR
    }

    /// Reset the fragmentation counter, compaction just removed every orphan.
    pub(crate) fn reset_fragmentation(&mut self) {
        self.fragmentation = 0;
    }

    pub(crate) fn kind(&self) -> TableKind {
        self.kind
    }

    // ----- node accessors ---------------------------------------------------------------

    /// File offset of lookup slot `position`.
    pub(crate) fn slot_offset(&self, position: u64) -> u64 {
        LOOKUP_SECTION + position * self.node_size
    }

    pub(crate) fn read_item_pointer(&mut self, lookup: u64) -> io::Result<u64> {
        self.file.seek(SeekFrom::Start(lookup))?;
        self.file.read_u64::<LittleEndian>()
    }

    pub(crate) fn write_item_pointer(&mut self, lookup: u64, item: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(lookup))?;
        self.file.write_u64::<LittleEndian>(item)
    }

    pub(crate) fn read_marker(&mut self, lookup: u64) -> io::Result<i32> {
        self.file.seek(SeekFrom::Start(lookup + 8))?;
        self.file.read_i32::<LittleEndian>()
    }

    pub(crate) fn write_marker(&mut self, lookup: u64, marker: i32) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(lookup + 8))?;
        self.file.write_i32::<LittleEndian>(marker)
    }

    /// Read just the two pointers at the front of an item node.  Unlike [`Self::read_item_head`]
    /// this stays inside a bare 16 byte orphan stub, which may be all that fits before the end
    /// of the file.
    pub(crate) fn read_item_link(&mut self, item: u64) -> io::Result<(u64, u64)> {
        self.file.seek(SeekFrom::Start(item))?;
        let lookup = self.file.read_u64::<LittleEndian>()?;
        let next = self.file.read_u64::<LittleEndian>()?;
        Ok((lookup, next))
    }

    /// Read an item node's fixed head: back-pointer, next pointer, hash code.  Only safe on
    /// nodes known to carry a hash, a trailing orphan stub may be 16 bytes short of one.
    pub(crate) fn read_item_head(&mut self, item: u64) -> io::Result<(u64, u64, i32)> {
        self.file.seek(SeekFrom::Start(item))?;
        let lookup = self.file.read_u64::<LittleEndian>()?;
        let next = self.file.read_u64::<LittleEndian>()?;
        let hash = self.file.read_i32::<LittleEndian>()?;
        Ok((lookup, next, hash))
    }

    /// Rewrite just the two pointers at the front of an item node.
    pub(crate) fn write_item_link(&mut self, item: u64, lookup: u64, next: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(item))?;
        self.file.write_u64::<LittleEndian>(lookup)?;
        self.file.write_u64::<LittleEndian>(next)
    }

    /// True when the item at `item` is referenced by the slot its back-pointer names.
    /// Anything else is an orphan: dead bytes awaiting compaction.
    pub(crate) fn is_live(&mut self, item: u64, lookup: u64) -> io::Result<bool> {
        if lookup < LOOKUP_SECTION || lookup >= self.header.item_section {
            return Ok(false);
        }
        Ok(self.read_item_pointer(lookup)? == item)
    }

    /// Compare the probe key against the key stored in an item.
    fn keys_equal(&mut self, item: u64, key: &K, bytes: &[u8]) -> Result<bool, FetchError> {
        self.file.seek(SeekFrom::Start(item + ITEM_HEAD_SIZE))?;
        self.comparer
            .equals(key, bytes, &mut self.file)
            .map_err(FetchError::DeserializeKey)
    }

    /// Decode the value of the item at `item` (skipping over its key).
    pub(crate) fn read_value(&mut self, item: u64) -> Result<V, FetchError> {
        self.file.seek(SeekFrom::Start(item + ITEM_HEAD_SIZE))?;
        let _key = K::read(&mut self.file).map_err(FetchError::DeserializeKey)?;
        V::read(&mut self.file).map_err(FetchError::DeserializeValue)
    }

    /// Decode the whole entry stored in the item at `item`.
    pub(crate) fn read_entry(&mut self, item: u64) -> Result<(K, V), FetchError> {
        self.file.seek(SeekFrom::Start(item + ITEM_HEAD_SIZE))?;
        let key = K::read(&mut self.file).map_err(FetchError::DeserializeKey)?;
        let value = V::read(&mut self.file).map_err(FetchError::DeserializeValue)?;
        Ok((key, value))
    }

    /// Copy the item at `src` to `dst`, fixing its next pointer for the new position.  The
    /// back-pointer and hash code travel with the body.  Returns the item's size.
    pub(crate) fn relocate_item(&mut self, src: u64, dst: u64, size: u64) -> io::Result<u64> {
        let mut buffer = vec![0_u8; size as usize];
        self.file.seek(SeekFrom::Start(src))?;
        self.file.read_exact(&mut buffer)?;
        buffer[8..16].copy_from_slice(&(dst + size).to_le_bytes());
        self.file.seek(SeekFrom::Start(dst))?;
        self.file.write_all(&buffer)?;
        Ok(size)
    }

    /// Zero a byte range through the page cache.
    pub(crate) fn zero_region(&mut self, start: u64, end: u64) -> io::Result<()> {
        let zeros = [0_u8; 4096];
        let mut pos = start;
        while pos < end {
            let chunk = (zeros.len() as u64).min(end - pos) as usize;
            self.file.seek(SeekFrom::Start(pos))?;
            self.file.write_all(&zeros[..chunk])?;
            pos += chunk as u64;
        }
        Ok(())
    }
}

impl<K, V, C> Drop for TableCore<K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    fn drop(&mut self) {
        if !self.read_only {
            let _ = self.file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::node::{ITEM_LINK_SIZE, JOURNAL_OFFSET};

    type TestCore = TableCore<u32, u32>;

    fn config(dir: &tempfile::TempDir, name: &str) -> TableConfig {
        TableConfig::new(dir.path().join(name)).no_sync()
    }

    fn open_map(config: &TableConfig) -> TestCore {
        TableCore::open(config, TableKind::Map).unwrap()
    }

    #[test]
    fn test_fresh_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "fresh");
        let core = open_map(&config);
        assert_eq!(core.header.capacity, 16);
        assert_eq!(core.header.count, 0);
        assert_eq!(core.header.item_section, LOOKUP_SECTION + 16 * 8);
        assert_eq!(core.header.eof, core.header.item_section);
        assert_eq!(core.file.len(), core.header.eof);
        drop(core);
        assert_eq!(
            std::fs::metadata(config.path()).unwrap().len(),
            LOOKUP_SECTION + 16 * 8
        );
    }

    #[test]
    fn test_item_chain_reaches_eof() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "chain");
        let mut core = open_map(&config);
        for i in 0..9_u32 {
            core.assign(&i, &(i * 2), false).unwrap();
        }
        core.assign(&3, &333, true).unwrap();
        core.delete(&5).unwrap();
        // Walking the item section by next pointers must land exactly on the end pointer,
        // counting live items only.
        let mut pos = core.header.item_section;
        let mut live = 0;
        while pos < core.header.eof {
            let (lookup, next) = core.read_item_link(pos).unwrap();
            if core.is_live(pos, lookup).unwrap() {
                live += 1;
            }
            pos = next;
        }
        assert_eq!(pos, core.header.eof);
        assert_eq!(live, core.header.count);
        assert_eq!(core.fragmentation_count(), 2);
    }

    /// Crash simulation: the item body went in and the journal record was written, but the
    /// slot and header writes never happened.  Reopening must finish the insert.
    #[test]
    fn test_recovery_completes_journaled_insert() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "replay_set");
        let mut core = open_map(&config);
        core.assign(&1, &10, false).unwrap();

        let bytes = core.key_bytes(&2).unwrap();
        let hash = core.key_hash(&2, &bytes);
        let found = core.find(&2, &bytes, hash).unwrap();
        assert_eq!(found.item, 0);
        let item = core.header.eof;
        let next = item + ITEM_HEAD_SIZE + bytes.len() as u64 + 4;
        core.file.seek(SeekFrom::Start(item)).unwrap();
        core.file.write_u64::<LittleEndian>(found.lookup).unwrap();
        core.file.write_u64::<LittleEndian>(next).unwrap();
        core.file.write_i32::<LittleEndian>(hash).unwrap();
        core.file.write_all(&bytes).unwrap();
        core.file.write_all(&20_u32.to_le_bytes()).unwrap();
        core.file.flush().unwrap();
        core.journal_write(JournalOp::Set, found.lookup, item, core.header.count + 1)
            .unwrap();
        drop(core);

        let mut core = open_map(&config);
        assert_eq!(core.header.count, 2);
        assert_eq!(core.fetch(&2).unwrap(), 20);
        assert_eq!(core.fetch(&1).unwrap(), 10);
        assert_eq!(core.header.eof, core.file.len());
    }

    /// Crash simulation: the item body went in but the journal record never did.  The insert
    /// must vanish and the invisible tail bytes must be dropped.
    #[test]
    fn test_crash_before_journal_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "no_journal");
        let mut core = open_map(&config);
        core.assign(&1, &10, false).unwrap();
        let committed_eof = core.header.eof;

        let bytes = core.key_bytes(&2).unwrap();
        let hash = core.key_hash(&2, &bytes);
        let found = core.find(&2, &bytes, hash).unwrap();
        let item = core.header.eof;
        let next = item + ITEM_HEAD_SIZE + bytes.len() as u64 + 4;
        core.file.seek(SeekFrom::Start(item)).unwrap();
        core.file.write_u64::<LittleEndian>(found.lookup).unwrap();
        core.file.write_u64::<LittleEndian>(next).unwrap();
        core.file.write_i32::<LittleEndian>(hash).unwrap();
        core.file.write_all(&bytes).unwrap();
        core.file.write_all(&20_u32.to_le_bytes()).unwrap();
        core.file.flush().unwrap();
        drop(core);

        assert!(std::fs::metadata(config.path()).unwrap().len() > committed_eof);
        let mut core = open_map(&config);
        assert_eq!(core.header.count, 1);
        assert!(!core.contains(&2).unwrap());
        assert_eq!(core.header.eof, committed_eof);
        assert_eq!(core.file.len(), committed_eof);
    }

    /// Crash simulation: a delete was journaled but neither the tombstone nor the header made
    /// it.  Reopening must finish the delete.
    #[test]
    fn test_recovery_completes_journaled_delete() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "replay_delete");
        let mut core = open_map(&config);
        core.assign(&1, &10, false).unwrap();
        core.assign(&2, &20, false).unwrap();

        let bytes = core.key_bytes(&1).unwrap();
        let hash = core.key_hash(&1, &bytes);
        let found = core.find(&1, &bytes, hash).unwrap();
        assert!(found.item != 0);
        core.journal_write(JournalOp::Delete, found.lookup, 0, core.header.count - 1)
            .unwrap();
        drop(core);

        let mut core = open_map(&config);
        assert_eq!(core.header.count, 1);
        assert!(!core.contains(&1).unwrap());
        assert_eq!(core.fetch(&2).unwrap(), 20);
    }

    /// A journal record with a bad checksum is treated as none and rewritten.
    #[test]
    fn test_corrupt_journal_demoted_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "corrupt");
        let mut core = open_map(&config);
        core.assign(&1, &10, false).unwrap();
        core.file.seek(SeekFrom::Start(JOURNAL_OFFSET)).unwrap();
        core.file.write_all(&[0xAB; 32]).unwrap();
        core.file.flush().unwrap();
        drop(core);

        let mut core = open_map(&config);
        assert_eq!(core.fetch(&1).unwrap(), 10);
        let (record, valid) = JournalNode::load(&mut core.file).unwrap();
        assert!(valid);
        assert_eq!(record.op, JournalOp::None);
    }

    #[test]
    fn test_grow_keeps_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "grow");
        let mut core = open_map(&config);
        for i in 0..100_u32 {
            core.assign(&i, &(1000 + i), false).unwrap();
        }
        // 100 entries need capacity 256: 0.7 * 128 < 100.
        assert_eq!(core.header.capacity, 256);
        assert_eq!(core.header.count, 100);
        assert_eq!(
            core.header.item_section,
            LOOKUP_SECTION + 256 * core.node_size
        );
        for i in 0..100_u32 {
            assert_eq!(core.fetch(&i).unwrap(), 1000 + i);
        }
        drop(core);
        let mut core = open_map(&config);
        for i in 0..100_u32 {
            assert_eq!(core.fetch(&i).unwrap(), 1000 + i);
        }
    }

    #[test]
    fn test_grow_with_orphans_compacts_them_away() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "grow_orphans");
        let mut core = open_map(&config);
        for i in 0..10_u32 {
            core.assign(&i, &i, false).unwrap();
        }
        for i in 0..10_u32 {
            core.assign(&i, &(i + 100), true).unwrap();
        }
        assert_eq!(core.fragmentation_count(), 10);
        // Push over the load factor to force a grow; the copy pass drops the orphans.
        core.assign(&11, &111, false).unwrap();
        core.assign(&12, &112, false).unwrap();
        assert_eq!(core.header.capacity, 32);
        for i in 0..10_u32 {
            assert_eq!(core.fetch(&i).unwrap(), i + 100);
        }
        // The walk sees live items plus at most connector stubs, never a dead real item.
        let mut pos = core.header.item_section;
        let mut total = 0;
        while pos < core.header.eof {
            let (lookup, next) = core.read_item_link(pos).unwrap();
            if lookup >= LOOKUP_SECTION {
                assert!(core.is_live(pos, lookup).unwrap());
                total += 1;
            }
            pos = next;
        }
        assert_eq!(total, core.header.count);
    }

    #[test]
    fn test_compact_handles_adjacent_and_trailing_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "compact_core");
        let mut core = open_map(&config);
        for i in 0..8_u32 {
            core.assign(&i, &i, false).unwrap();
        }
        // Adjacent orphans at the front, one in the middle, and a trailing one.
        core.delete(&0).unwrap();
        core.delete(&1).unwrap();
        core.delete(&4).unwrap();
        core.delete(&7).unwrap();
        let eof_before = core.header.eof;
        core.compact_items().unwrap();
        assert!(core.header.eof < eof_before);
        assert_eq!(core.fragmentation_count(), 0);
        assert_eq!(core.header.count, 4);
        for i in [2_u32, 3, 5, 6] {
            assert_eq!(core.fetch(&i).unwrap(), i);
        }
        // No orphan survives the pass.
        let mut pos = core.header.item_section;
        while pos < core.header.eof {
            let (lookup, next) = core.read_item_link(pos).unwrap();
            assert!(core.is_live(pos, lookup).unwrap());
            pos = next;
        }
        assert_eq!(pos, core.header.eof);
    }

    #[test]
    fn test_compact_empty_and_orphan_only_sections() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "compact_edge");
        let mut core = open_map(&config);
        core.compact_items().unwrap();
        assert_eq!(core.header.eof, core.header.item_section);

        for i in 0..5_u32 {
            core.assign(&i, &i, false).unwrap();
        }
        for i in 0..5_u32 {
            core.delete(&i).unwrap();
        }
        core.compact_items().unwrap();
        assert_eq!(core.header.eof, core.header.item_section);
        assert_eq!(core.header.count, 0);
    }

    #[test]
    fn test_tombstones_stay_probeable() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "tombstones");
        let mut core = open_map(&config);
        for i in 0..11_u32 {
            core.assign(&i, &i, false).unwrap();
        }
        for i in 0..11_u32 {
            if i % 2 == 1 {
                core.delete(&i).unwrap();
            }
        }
        // Every even key still resolves through chains that may cross tombstones, and
        // reinserting a deleted key reuses its tombstone.
        for i in 0..11_u32 {
            assert_eq!(core.contains(&i).unwrap(), i % 2 == 0, "key {}", i);
        }
        let count_before = core.header.count;
        core.assign(&3, &33, false).unwrap();
        assert_eq!(core.header.count, count_before + 1);
        assert_eq!(core.fetch(&3).unwrap(), 33);
    }

    #[test]
    fn test_orphan_fuse_link_size() {
        // The fuse threshold needs room for the two pointers that head an orphan.
        assert_eq!(ITEM_LINK_SIZE, 16);
        assert_eq!(ITEM_HEAD_SIZE, 20);
    }
}
