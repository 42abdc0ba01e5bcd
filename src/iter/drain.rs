use core::iter::FusedIterator;

use crate::key::Key;
use crate::map::SlotMap;
use crate::storage::Storage;

/// See [`SlotMap::drain`](crate::SlotMap::drain).
pub struct Drain<'a, T, K: Key, S: Storage<T>> {
    pub(crate) map: &'a mut SlotMap<T, K, S>,
}

impl<'a, T, K: Key, S: Storage<T>> Iterator for Drain<'a, T, K, S> {
    type Item = (K, T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.map.is_empty() {
            return None;
        }

        // Draining from the tail means the swap in remove_position is a
        // plain pop; nothing ever relocates.
        let last = self.map.len() - 1;
        Some(self.map.remove_position(last as u32))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.map.len(), Some(self.map.len()))
    }
}

impl<'a, T, K: Key, S: Storage<T>> FusedIterator for Drain<'a, T, K, S> {}
impl<'a, T, K: Key, S: Storage<T>> ExactSizeIterator for Drain<'a, T, K, S> {}

impl<'a, T, K: Key, S: Storage<T>> Drop for Drain<'a, T, K, S> {
    fn drop(&mut self) {
        // Anything not yet yielded still has to leave the map.
        while self.next().is_some() {}
    }
}
