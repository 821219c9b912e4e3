//! Lookup section growth and the full lookup table rebuild.
//!
//! Growing doubles the capacity, which moves the item section boundary to `P = 80 +
//! new_capacity * node_size`.  Every live item is first copied past both the old end of file
//! and `P` (a compaction for free, orphans are left behind), then two journaled operations
//! commit the change: `GrowLookupSection` links the new boundary to the copies, repoints every
//! slot at them and adopts the new boundaries, and `RebuildLookupTable` re-probes every item
//! at the new capacity.  Copies are written past the committed end pointer and flushed before
//! anything is journaled, so a crash before the first journal record leaves the old state
//! untouched and a crash after it replays onto bytes that are already durable.
//!
//! The rebuild starts by zeroing the whole lookup section, so it may only ever run against an
//! item section whose every walkable node is either live or a connector stub; the copy pass
//! guarantees that here and the tombstone-triggered rebuild in `find` compacts first for the
//! same reason.

use crate::comparer::KeyComparer;
use crate::element::ElementBytes;
use crate::error::MaintainError;
use crate::probe;
use crate::table::node::{JournalOp, ITEM_LINK_SIZE, LOOKUP_SECTION};
use crate::table::TableCore;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fmt::Debug;
use std::io;
use std::io::{Seek, SeekFrom};
use tracing::debug;

impl<K, V, C> TableCore<K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    /// Double the lookup section capacity.
    pub(crate) fn grow(&mut self) -> Result<(), MaintainError> {
        if self.is_read_only() {
            return Err(MaintainError::ReadOnly);
        }
        let new_capacity = self.header.capacity * 2;
        let new_section = LOOKUP_SECTION + new_capacity * self.node_size;
        let old_eof = self.header.eof;
        debug!(new_capacity, "growing lookup section");

        // Copies land directly past the new boundary so they never fight with the growing
        // lookup section.  When old items already reach past the boundary the copies go after
        // them instead, leaving room for the connector stub the apply step writes at the
        // boundary.
        let copy_start = if old_eof <= new_section {
            new_section
        } else {
            old_eof.max(new_section + ITEM_LINK_SIZE)
        };

        // Copy every live item to the frontier.  Orphans stay behind and die with the old
        // item section.
        let mut frontier = copy_start;
        let mut pos = self.header.item_section;
        while pos < old_eof {
            let (lookup, next) = self.read_item_link(pos)?;
            if self.is_live(pos, lookup)? {
                let size = next - pos;
                self.relocate_item(pos, frontier, size)?;
                frontier += size;
            }
            pos = next;
        }
        self.file.flush_pages()?;

        self.journal_write(JournalOp::GrowLookupSection, copy_start, new_section, frontier)?;
        self.apply_grow_section(copy_start, new_section, frontier)?;
        self.journal_clear()?;

        self.journal_write(JournalOp::RebuildLookupTable, 0, 0, new_capacity)?;
        self.apply_rebuild(new_capacity)?;
        self.journal_clear()?;
        Ok(())
    }

    /// Compact away every orphan, then re-probe the whole table at the current capacity.
    /// Reclaims probe chains clogged with tombstones.
    pub(crate) fn rebuild_lookup(&mut self) -> Result<(), MaintainError> {
        self.compact_items()?;
        let capacity = self.header.capacity;
        debug!(capacity, "rebuilding lookup table");
        self.journal_write(JournalOp::RebuildLookupTable, 0, 0, capacity)?;
        self.apply_rebuild(capacity)?;
        self.journal_clear()?;
        Ok(())
    }

    /// Commit a grow: link the new item section boundary to the copied items, walk them
    /// pointing each one's slot at it, then adopt the new boundaries.
    pub(crate) fn apply_grow_section(
        &mut self,
        copy_start: u64,
        new_section: u64,
        new_eof: u64,
    ) -> io::Result<()> {
        if copy_start > new_section {
            // Old items reached past the boundary; a connector stub at the boundary jumps the
            // item walk over their remains.  Safe to (re)write any time after the journal
            // record landed, everything under it is dead once the slots repoint.
            self.write_item_link(new_section, 0, copy_start)?;
        }
        let mut pos = copy_start;
        while pos < new_eof {
            let (lookup, next) = self.read_item_link(pos)?;
            if lookup >= LOOKUP_SECTION && lookup < new_section {
                self.write_item_pointer(lookup, pos)?;
            }
            pos = next;
        }
        self.header.item_section = new_section;
        self.header.eof = new_eof;
        self.header.store(&mut self.file)?;
        if self.file.len() < new_eof {
            self.file.set_len(new_eof)?;
        }
        Ok(())
    }

    /// Zero the lookup section for `capacity` slots and re-place every item in it.  Connector
    /// stubs (back-pointer below the lookup section) are walked over; everything else must be
    /// live.  Restarting this from scratch is safe at any point since it begins by discarding
    /// all slot state.
    pub(crate) fn apply_rebuild(&mut self, capacity: u64) -> io::Result<()> {
        let section = LOOKUP_SECTION + capacity * self.node_size;
        self.zero_region(LOOKUP_SECTION, section)?;
        let mut pos = section;
        while pos < self.header.eof {
            let (lookup, next) = self.read_item_link(pos)?;
            if lookup >= LOOKUP_SECTION {
                // A real item, not a connector stub, so the hash is present.
                let (_, _, hash) = self.read_item_head(pos)?;
                let slot = self.find_chain_end(hash, capacity, section)?;
                self.write_item_pointer(slot, pos)?;
                self.file.seek(SeekFrom::Start(pos))?;
                self.file.write_u64::<LittleEndian>(slot)?;
            }
            pos = next;
        }
        self.header.capacity = capacity;
        self.header.item_section = section;
        self.header.store(&mut self.file)
    }

    /// Probe a hash's chain until the first slot not pointing into the item section.
    fn find_chain_end(&mut self, hash: i32, capacity: u64, section: u64) -> io::Result<u64> {
        let first = probe::first_hash(hash);
        let offset = probe::collision_offset(hash);
        for k in 0..capacity {
            let lookup = self.slot_offset(probe::position(first, offset, k, capacity));
            if self.read_item_pointer(lookup)? < section {
                return Ok(lookup);
            }
        }
        // Load factor keeps occupancy under capacity, a full scan cannot come up empty.
        Err(io::Error::new(
            io::ErrorKind::Other,
            "no free slot in a full probe chain",
        ))
    }
}
