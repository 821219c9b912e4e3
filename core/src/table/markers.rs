//! The per-slot marker engine behind the bulk set operations.
//!
//! Set mode lookup nodes carry a 4 byte marker next to the item pointer.  Marking members of
//! another collection and then sweeping the slots gives intersection, difference and the
//! subset predicates in bounded memory, no in-memory shadow of the set is ever built.
//!
//! Markers are scratch state: they are not journaled and every consumer zeroes them first, so
//! whatever a crash leaves in the marker column is harmless.

use crate::comparer::KeyComparer;
use crate::element::ElementBytes;
use crate::error::FetchError;
use crate::table::node::TableKind;
use crate::table::TableCore;
use std::fmt::Debug;
use std::io;

impl<K, V, C> TableCore<K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    /// Mark the slot holding `key`.  Returns false when the key is absent.
    ///
    /// Probes without the tombstone-rebuild escape hatch: a rebuild zeroes the marker column,
    /// which would wreck the bulk operation this call is part of.
    pub(crate) fn try_mark(&mut self, key: &K) -> Result<bool, FetchError> {
        debug_assert_eq!(self.kind(), TableKind::Set);
        let bytes = self.key_bytes(key).map_err(FetchError::SerializeKey)?;
        let hash = self.key_hash(key, &bytes);
        let found = self.find_no_rebuild(key, &bytes, hash)?;
        if found.item == 0 {
            return Ok(false);
        }
        self.write_marker(found.lookup, 1)?;
        Ok(true)
    }

    /// Zero every slot's marker.
    pub(crate) fn unmark_all(&mut self) -> io::Result<()> {
        debug_assert_eq!(self.kind(), TableKind::Set);
        for position in 0..self.header.capacity {
            let lookup = self.slot_offset(position);
            self.write_marker(lookup, 0)?;
        }
        Ok(())
    }

    /// True when every live slot is marked.
    pub(crate) fn all_marked(&mut self) -> io::Result<bool> {
        debug_assert_eq!(self.kind(), TableKind::Set);
        for position in 0..self.header.capacity {
            let lookup = self.slot_offset(position);
            if self.read_item_pointer(lookup)? >= self.header.item_section
                && self.read_marker(lookup)? == 0
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete every live slot whose marked state equals `marked`.  Each deletion is its own
    /// journaled mutation and orphans the item body.
    pub(crate) fn remove_where_marked(&mut self, marked: bool) -> io::Result<()> {
        debug_assert_eq!(self.kind(), TableKind::Set);
        for position in 0..self.header.capacity {
            let lookup = self.slot_offset(position);
            if self.read_item_pointer(lookup)? >= self.header.item_section
                && (self.read_marker(lookup)? != 0) == marked
            {
                self.delete_slot(lookup)?;
            }
        }
        Ok(())
    }
}
