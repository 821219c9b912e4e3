//! In-place defragmentation of the item section.
//!
//! Orphans accumulate from overwrites and deletes.  Compaction slides a window of dead space
//! through the item section: adjacent orphans fuse, live items drop back into the freed space
//! (or, when the hole is too tight, hop past the end of the file and leave their old span to
//! the window), and a trailing orphan is truncated away.  Every pointer change is journaled;
//! body copies go into dead bytes first so a crash at any point leaves a consistent chain.

use crate::comparer::KeyComparer;
use crate::element::ElementBytes;
use crate::error::MaintainError;
use crate::table::node::{JournalOp, ITEM_LINK_SIZE};
use crate::table::TableCore;
use std::fmt::Debug;
use tracing::debug;

impl<K, V, C> TableCore<K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    /// Remove every orphan from the item section.  Afterwards the fragmentation count is zero
    /// and the file is no longer than it was.
    pub(crate) fn compact_items(&mut self) -> Result<(), MaintainError> {
        if self.is_read_only() {
            return Err(MaintainError::ReadOnly);
        }
        debug!("compacting item section");
        let mut item1 = self.header.item_section;
        while item1 < self.header.eof {
            let (lookup1, next1) = self.read_item_link(item1)?;
            if self.is_live(item1, lookup1)? {
                item1 = next1;
                continue;
            }
            if next1 >= self.header.eof {
                // The section ends in dead space, chop it off.
                self.journal_write(JournalOp::Truncate, 0, item1, 0)?;
                self.apply_truncate(item1)?;
                self.journal_clear()?;
                break;
            }
            let item2 = next1;
            let (lookup2, next2) = self.read_item_link(item2)?;
            if !self.is_live(item2, lookup2)? {
                // Two dead neighbors become one bigger orphan.
                self.journal_write(JournalOp::WriteItemNodePointers, lookup1, item1, next2)?;
                self.apply_item_pointers(lookup1, item1, next2)?;
                self.journal_clear()?;
                continue;
            }
            let hole = item2 - item1;
            let size = next2 - item2;
            if hole >= size + ITEM_LINK_SIZE {
                // The live item fits in the hole with room for a trailing orphan header.
                // The trailing header goes in first and flushes alone: until the relocated
                // head lands, the chain still routes through item2, so those bytes are dead.
                // Flushing the relocated node second means a crash leaves either the old
                // chain or the new one, never a half-linked walk.
                self.write_item_link(item1 + size, 0, next2)?;
                self.file.flush_pages()?;
                self.relocate_item(item2, item1, size)?;
                self.file.flush_pages()?;
                self.journal_write(JournalOp::Set, lookup2, item1, self.header.count)?;
                self.apply_set(lookup2, item1, self.header.count)?;
                self.journal_clear()?;
                item1 += size;
            } else {
                // Too tight: append the live item past the end and fuse its old span into the
                // orphan.  Set's replay adopts the copy's end as the new end of file.
                let copy = self.header.eof;
                self.relocate_item(item2, copy, size)?;
                self.file.flush_pages()?;
                self.journal_write(JournalOp::Set, lookup2, copy, self.header.count)?;
                self.apply_set(lookup2, copy, self.header.count)?;
                self.journal_clear()?;
                self.journal_write(JournalOp::WriteItemNodePointers, lookup1, item1, next2)?;
                self.apply_item_pointers(lookup1, item1, next2)?;
                self.journal_clear()?;
            }
        }
        self.reset_fragmentation();
        Ok(())
    }
}
