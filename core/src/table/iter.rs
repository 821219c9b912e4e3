//! Iterators over the live entries of a container.  These walk the item section in file order
//! by following each item's next pointer, skipping orphans, so every live entry shows up
//! exactly once.  An IO or decode error ends the iteration.

use crate::comparer::{ByteKeyComparer, KeyComparer};
use crate::element::ElementBytes;
use crate::table::TableCore;
use std::fmt::Debug;

/// Iterator over the live `(key, value)` entries of a map (or `(key, ())` of a set).
pub struct EntryIter<'a, K, V, C = ByteKeyComparer>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    table: &'a mut TableCore<K, V, C>,
    pos: u64,
}

impl<'a, K, V, C> EntryIter<'a, K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    pub(crate) fn new(table: &'a mut TableCore<K, V, C>) -> Self {
        let pos = table.header.item_section;
        Self { table, pos }
    }
}

impl<K, V, C> Iterator for EntryIter<'_, K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.table.header.eof {
            let (lookup, next) = self.table.read_item_link(self.pos).ok()?;
            let current = self.pos;
            self.pos = next;
            if next <= current {
                // A cycle would mean a corrupt chain, stop rather than spin.
                return None;
            }
            if self.table.is_live(current, lookup).ok()? {
                return self.table.read_entry(current).ok();
            }
        }
        None
    }
}

/// Iterator over just the keys of a container.
pub struct KeyIter<'a, K, V, C = ByteKeyComparer>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    inner: EntryIter<'a, K, V, C>,
}

impl<'a, K, V, C> KeyIter<'a, K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    pub(crate) fn new(table: &'a mut TableCore<K, V, C>) -> Self {
        Self {
            inner: EntryIter::new(table),
        }
    }
}

impl<K, V, C> Iterator for KeyIter<'_, K, V, C>
where
    K: ElementBytes<K> + Debug,
    V: ElementBytes<V> + Debug,
    C: KeyComparer<K> + Default,
{
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }
}
