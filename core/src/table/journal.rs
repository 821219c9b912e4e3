//! Journal record management and the idempotent apply functions behind it.
//!
//! Every mutation follows the same three steps: write the journal record and flush, perform the
//! operation's writes, overwrite the journal with none and flush.  The apply functions here are
//! shared between the live path and recovery, so replaying a record after a crash re-executes
//! exactly the writes the interrupted call would have made.  Each one is safe to run from any
//! intermediate state the protocol can leave behind.

use crate::comparer::KeyComparer;
use crate::element::ElementBytes;
use crate::table::node::{HeaderNode, JournalNode, JournalOp, LOOKUP_SECTION, TOMBSTONE};
use crate::table::TableCore;
use std::fmt::Debug;
use std::io;
use tracing::debug;

impl<K, V, C> TableCore<K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    /// Record a mutation's intent.  Durable before this returns.
    pub(crate) fn journal_write(
        &mut self,
        op: JournalOp,
        lookup: u64,
        item: u64,
        sync: u64,
    ) -> io::Result<()> {
        JournalNode {
            op,
            lookup,
            item,
            sync,
        }
        .store(&mut self.file)?;
        self.file.flush_pages()
    }

    /// Mark the in-flight mutation complete.  Durable before this returns.
    pub(crate) fn journal_clear(&mut self) -> io::Result<()> {
        JournalNode::none().store(&mut self.file)?;
        self.file.flush_pages()
    }

    /// Re-execute the operation a journal record describes.  Called on open when the previous
    /// handle died between its journal write and its journal clear.
    pub(crate) fn replay(&mut self, record: JournalNode) -> io::Result<()> {
        match record.op {
            JournalOp::None => Ok(()),
            JournalOp::Set => self.apply_set(record.lookup, record.item, record.sync),
            JournalOp::Delete => self.apply_delete(record.lookup, record.sync),
            JournalOp::GrowLookupSection => {
                self.apply_grow_section(record.lookup, record.item, record.sync)
            }
            JournalOp::RebuildLookupTable => self.apply_rebuild(record.sync),
            JournalOp::WriteItemNodePointers => {
                self.apply_item_pointers(record.lookup, record.item, record.sync)
            }
            JournalOp::Truncate => self.apply_truncate(record.item),
            JournalOp::Clear => self.apply_clear(),
        }
    }

    /// Point a lookup slot at an item, adopting the item's end as the new end of file when it
    /// extends past it, and store the new count.
    pub(crate) fn apply_set(&mut self, lookup: u64, item: u64, new_count: u64) -> io::Result<()> {
        self.write_item_pointer(lookup, item)?;
        let (_, next, _) = self.read_item_head(item)?;
        if next > self.header.eof {
            self.header.eof = next;
        }
        self.header.count = new_count;
        self.header.store(&mut self.file)
    }

    /// Write a tombstone into a lookup slot and store the new count.
    pub(crate) fn apply_delete(&mut self, lookup: u64, new_count: u64) -> io::Result<()> {
        self.write_item_pointer(lookup, TOMBSTONE)?;
        self.header.count = new_count;
        self.header.store(&mut self.file)
    }

    /// Rewrite the two pointers at the front of an item node.  Used to fuse orphans.
    pub(crate) fn apply_item_pointers(
        &mut self,
        lookup: u64,
        item: u64,
        next: u64,
    ) -> io::Result<()> {
        self.write_item_link(item, lookup, next)
    }

    /// Chop the file at `end`, dropping a trailing orphan.
    pub(crate) fn apply_truncate(&mut self, end: u64) -> io::Result<()> {
        self.header.eof = end;
        self.header.store(&mut self.file)?;
        self.file.set_len(end)
    }

    /// Reset to an empty container at the initial capacity.
    pub(crate) fn apply_clear(&mut self) -> io::Result<()> {
        debug!("clearing container");
        self.file.set_len(LOOKUP_SECTION)?;
        self.header = HeaderNode::new(self.header.signature, self.node_size);
        self.header.store(&mut self.file)?;
        self.zero_region(LOOKUP_SECTION, self.header.item_section)?;
        self.file.set_len(self.header.item_section)
    }
}
