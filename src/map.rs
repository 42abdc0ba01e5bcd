use std::marker::PhantomData;
use std::ops;

use crate::iter::{Drain, IntoIter, Iter, IterMut, Keys, Values, ValuesMut};
use crate::key::{DefaultKey, ExpiredKey, Generation, Key};
use crate::slot::{FreePointer, Slot};
use crate::storage::{CapacityStorage, Storage};

/// Container that issues a stable, copyable [`Key`] for every value inserted
/// into it, while keeping the values themselves packed into contiguous
/// storage.
///
/// Three structures cooperate under the hood: a slot table translating a
/// key's index into the value's current position, the dense value storage
/// itself, and a reverse map that lets a removal patch the slot of whichever
/// value gets relocated by the swap. Every operation that matters is O(1);
/// iteration touches only live values.
///
/// Keys are the one handle that survives mutation. References and iterators
/// follow the usual borrow rules and are invalidated by any insert or
/// removal; a [`Key`] instead stays checkable forever, and using it after
/// its value is removed is detected rather than undefined:
///
/// ```rust
/// # use cloakroom::SlotMap;
/// let mut map = SlotMap::new();
///
/// let foo = map.insert("Foo");
/// let bar = map.insert("Bar");
///
/// assert_eq!(map[foo], "Foo");
/// assert_eq!(map[bar], "Bar");
///
/// let foo_value = map.remove(foo);
/// assert_eq!(foo_value, Some("Foo"));
///
/// // The slot previously used by foo will be reused eventually, but foo
/// // itself never becomes valid again.
/// assert_eq!(map.get(foo), None);
/// ```
///
/// The key type and the backing storage are both type parameters:
/// [`DefaultKey`] splits a 64-bit word into 32 bits of index and 32 bits of
/// generation, [`CompactKey`][crate::CompactKey] packs 11 + 5 bits into a
/// `u16`, and any [`Storage`] implementation (default [`Vec`]) can hold the
/// values. Custom combinations are spelled at the type level:
///
/// ```rust
/// # use cloakroom::{CompactKey, SlotMap};
/// # use std::collections::VecDeque;
/// let mut small: SlotMap<u8, CompactKey> = SlotMap::default();
/// let key = small.insert(7);
/// assert_eq!(small[key], 7);
///
/// let mut deque_backed: SlotMap<u8, CompactKey, VecDeque<u8>> = SlotMap::default();
/// deque_backed.insert(7);
/// ```
#[derive(Debug, Clone)]
pub struct SlotMap<T, K = DefaultKey, S = Vec<T>> {
    slots: Vec<Slot>,
    values: S,
    reverse: Vec<u32>,
    free_head: Option<FreePointer>,
    free_tail: Option<FreePointer>,
    _marker: PhantomData<(K, T)>,
}

impl<T> SlotMap<T> {
    /// Construct an empty map with the default key type and `Vec` storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T, K: Key, S: Storage<T>> SlotMap<T, K, S> {
    /// Return the number of values contained in the map.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Return the current length of the slot table.
    ///
    /// This only ever grows — removals recycle slots through the free list
    /// instead of destroying them — except for [`clear`][Self::clear], which
    /// resets it to zero.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Insert a new value into the map, returning the key that names it.
    ///
    /// O(1) amortized. Never invalidates other keys. May reallocate the
    /// dense value storage and thereby invalidate outstanding references.
    ///
    /// # Panics
    ///
    /// Panics if the slot table would have to grow past `K::MAX_SLOTS`.
    pub fn insert(&mut self, value: T) -> K {
        self.insert_with_key(move |_| value)
    }

    /// Insert a value constructed by `create`, which receives the key the
    /// value is about to be issued.
    ///
    /// This is the construct-in-place form of [`insert`][Self::insert] for
    /// values that want to store their own key. The key is computed by
    /// peeking at the free list before `create` runs, and the map is not
    /// modified until `create` returns, so a panicking closure leaves the
    /// map exactly as it was.
    ///
    /// # Panics
    ///
    /// Panics if the slot table would have to grow past `K::MAX_SLOTS`.
    pub fn insert_with_key(&mut self, create: impl FnOnce(K) -> T) -> K {
        let position = self.next_position();

        let (slot_index, generation) = match self.free_head {
            Some(head) => {
                let slot_index = head.slot();
                (slot_index, self.slots[slot_index as usize].generation())
            }
            None => (self.next_slot_index(), Generation::first()),
        };

        let key = K::new(slot_index, generation.to_u32());
        let value = create(key);

        // All fallible and user code is behind us, commit the three
        // structures together.
        match self.free_head {
            Some(_) => {
                let next_free = match self.slots[slot_index as usize] {
                    Slot::Free { next_free, .. } => next_free,
                    Slot::Occupied { .. } => {
                        unreachable!("free list head pointed at an occupied slot")
                    }
                };

                self.free_head = next_free;
                if next_free.is_none() {
                    self.free_tail = None;
                }

                self.slots[slot_index as usize] = Slot::Occupied {
                    generation,
                    position,
                };
            }
            None => {
                self.slots.push(Slot::Occupied {
                    generation,
                    position,
                });
            }
        }

        self.values.push(value);
        self.reverse.push(slot_index);

        key
    }

    /// Returns true if the given key is valid for this map.
    pub fn contains_key(&self, key: K) -> bool {
        self.position_of(key).is_some()
    }

    /// The position the key's value currently occupies in dense storage, or
    /// `None` if the key is expired.
    ///
    /// Positions are only stable until the next removal; they exist to feed
    /// the position-addressed operations like [`remove_at`][Self::remove_at]
    /// and [`remove_range`][Self::remove_range].
    pub fn position(&self, key: K) -> Option<usize> {
        self.position_of(key).map(|position| position as usize)
    }

    /// Get an immutable reference to the value named by `key`, returning
    /// `None` if the key is expired.
    pub fn get(&self, key: K) -> Option<&T> {
        let position = self.position_of(key)?;
        self.values.get(position as usize)
    }

    /// Get a mutable reference to the value named by `key`, returning
    /// `None` if the key is expired.
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let position = self.position_of(key)?;
        self.values.get_mut(position as usize)
    }

    /// Like [`get`][Self::get], but surfaces an expired key as a proper
    /// [`ExpiredKey`] error instead of `None`.
    pub fn try_get(&self, key: K) -> Result<&T, ExpiredKey<K>> {
        self.get(key).ok_or(ExpiredKey(key))
    }

    /// Like [`get_mut`][Self::get_mut], but surfaces an expired key as a
    /// proper [`ExpiredKey`] error instead of `None`.
    pub fn try_get_mut(&mut self, key: K) -> Result<&mut T, ExpiredKey<K>> {
        self.get_mut(key).ok_or(ExpiredKey(key))
    }

    /// Get an immutable reference to the value named by `key` without
    /// checking that the key is valid.
    ///
    /// This is the narrow fast path for callers that can prove validity
    /// themselves, skipping the bounds and generation checks.
    ///
    /// # Safety
    ///
    /// `key` must be valid for this map — issued by it, not yet removed,
    /// and not separated from it by [`clear`][Self::clear]. Anything else
    /// is undefined behavior.
    pub unsafe fn get_unchecked(&self, key: K) -> &T {
        match self.slots.get_unchecked(key.slot() as usize) {
            Slot::Occupied { position, .. } => match self.values.get(*position as usize) {
                Some(value) => value,
                None => std::hint::unreachable_unchecked(),
            },
            Slot::Free { .. } => std::hint::unreachable_unchecked(),
        }
    }

    /// Get a mutable reference to the value named by `key` without checking
    /// that the key is valid.
    ///
    /// # Safety
    ///
    /// Same contract as [`get_unchecked`][Self::get_unchecked].
    pub unsafe fn get_unchecked_mut(&mut self, key: K) -> &mut T {
        let position = match self.slots.get_unchecked(key.slot() as usize) {
            Slot::Occupied { position, .. } => *position,
            Slot::Free { .. } => std::hint::unreachable_unchecked(),
        };

        match self.values.get_mut(position as usize) {
            Some(value) => value,
            None => std::hint::unreachable_unchecked(),
        }
    }

    /// Get mutable references to two values at once, returning `None` for
    /// whichever key is expired.
    ///
    /// # Panics
    ///
    /// Panics when the two keys are identical (same slot and generation).
    pub fn get2_mut(&mut self, key1: K, key2: K) -> (Option<&mut T>, Option<&mut T>) {
        if key1 == key2 {
            panic!("SlotMap::get2_mut called with two identical keys");
        }

        // SAFETY NOTES:
        //
        // - If the keys name different slots, they resolve to different
        //   dense positions (a slot owns exactly one position).
        // - If the keys name the same slot, at most one can be valid, since
        //   a slot has one current generation.
        // - Identical keys panic above.
        //
        // The Storage contract forbids `get_mut` from moving other elements,
        // so the first reference stays valid across the second lookup.

        let first = self.get_mut(key1).map(|value| value as *mut T);
        let second = self.get_mut(key2);
        let first = unsafe { first.map(|pointer| &mut *pointer) };

        (first, second)
    }

    /// Remove the value named by `key`, returning it if the key was valid.
    ///
    /// Removing an already-expired key is a no-op returning `None`, so
    /// removing the same key twice is safe and detectable. O(1); relocates
    /// at most one other value (the one swapped in from the end of dense
    /// storage).
    pub fn remove(&mut self, key: K) -> Option<T> {
        let position = self.position_of(key)?;
        let (_, value) = self.remove_position(position);
        Some(value)
    }

    /// Remove the value at a dense-storage `position`, returning its (now
    /// expired) key along with it.
    ///
    /// The last live value is swapped into `position`, so an
    /// erase-while-iterating loop re-examines the *same* position after a
    /// removal instead of advancing:
    ///
    /// ```rust
    /// # use cloakroom::SlotMap;
    /// # let mut map = SlotMap::new();
    /// # for i in 0..10 { map.insert(i); }
    /// let mut position = 0;
    /// while position < map.len() {
    ///     let value = *map.values().nth(position).unwrap();
    ///     if value % 2 == 0 {
    ///         map.remove_at(position);
    ///     } else {
    ///         position += 1;
    ///     }
    /// }
    /// ```
    ///
    /// (For exactly this loop, [`retain`][Self::retain] is the packaged
    /// form.)
    ///
    /// # Panics
    ///
    /// Panics if `position >= len()`.
    pub fn remove_at(&mut self, position: usize) -> (K, T) {
        assert!(
            position < self.len(),
            "remove_at position {} out of bounds (len {})",
            position,
            self.len()
        );

        self.remove_position(position as u32)
    }

    /// Remove every value whose dense-storage position falls in `range`.
    ///
    /// Positions are processed from the back of the range toward the front,
    /// so each swap-removal draws its replacement from at or beyond the
    /// position being erased — never from the unprocessed part of the range.
    /// No slot is freed twice and no replacement is silently skipped.
    ///
    /// # Panics
    ///
    /// Panics if the range is inverted or reaches past `len()`.
    pub fn remove_range<R: ops::RangeBounds<usize>>(&mut self, range: R) {
        let len = self.len();

        let first = match range.start_bound() {
            ops::Bound::Included(&start) => start,
            ops::Bound::Excluded(&start) => start + 1,
            ops::Bound::Unbounded => 0,
        };
        let last = match range.end_bound() {
            ops::Bound::Included(&end) => end + 1,
            ops::Bound::Excluded(&end) => end,
            ops::Bound::Unbounded => len,
        };

        assert!(
            first <= last && last <= len,
            "remove_range bounds {}..{} invalid for len {}",
            first,
            last,
            len
        );

        for position in (first..last).rev() {
            self.remove_position(position as u32);
        }
    }

    /// Remove all values for which `keep` returns false.
    ///
    /// `keep` sees each value exactly once, in (shifting) dense-storage
    /// order, together with its key.
    pub fn retain<F: FnMut(K, &mut T) -> bool>(&mut self, mut keep: F) {
        let mut position: u32 = 0;

        while (position as usize) < self.len() {
            let slot_index = self.reverse[position as usize];
            let generation = self.slots[slot_index as usize].generation();
            let key = K::new(slot_index, generation.to_u32());

            let value = self
                .values
                .get_mut(position as usize)
                .unwrap_or_else(|| unreachable!("reverse map longer than dense storage"));

            if keep(key, value) {
                position += 1;
            } else {
                // Swap-removal refills this position, examine it again.
                self.remove_position(position);
            }
        }
    }

    /// Remove everything and reset the slot table to length zero. O(n).
    ///
    /// This is a full reconstruction: generation counters restart, so a key
    /// captured before `clear` may compare equal to a key issued afterward.
    /// Discard old keys once you call this. [`drain`][Self::drain] is the
    /// alternative that keeps generations monotonic.
    pub fn clear(&mut self) {
        self.values.clear();
        self.reverse.clear();
        self.slots.clear();
        self.free_head = None;
        self.free_tail = None;
    }

    /// Grow the slot table to at least `slot_count` slots, linking the fresh
    /// slots into the free list. The number of live values is unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `slot_count` exceeds `K::MAX_SLOTS`.
    pub fn reserve_slots(&mut self, slot_count: usize) {
        if slot_count > K::MAX_SLOTS as usize {
            panic!(
                "cannot address more than {} slots with this key type",
                K::MAX_SLOTS
            );
        }

        while self.slots.len() < slot_count {
            let slot_index = self.slots.len() as u32;
            self.slots.push(Slot::Free {
                generation: Generation::first(),
                next_free: None,
            });
            self.push_free_tail(slot_index);
        }
    }

    /// Iterate over the key/value pairs of all live values, in dense-storage
    /// order.
    pub fn iter(&self) -> Iter<'_, T, K, S> {
        Iter {
            slots: &self.slots,
            reverse: self.reverse.iter(),
            values: self.values.iter(),
            _marker: PhantomData,
        }
    }

    /// Iterate over the key/value pairs of all live values with mutable
    /// access to each value, in dense-storage order.
    pub fn iter_mut(&mut self) -> IterMut<'_, T, K, S> {
        IterMut {
            slots: &self.slots,
            reverse: self.reverse.iter(),
            values: self.values.iter_mut(),
            _marker: PhantomData,
        }
    }

    /// Iterate over the keys of all live values, in dense-storage order.
    pub fn keys(&self) -> Keys<'_, K> {
        Keys {
            slots: &self.slots,
            reverse: self.reverse.iter(),
            _marker: PhantomData,
        }
    }

    /// Iterate over all live values, in dense-storage order.
    pub fn values(&self) -> Values<'_, T, S> {
        Values {
            inner: self.values.iter(),
        }
    }

    /// Iterate over all live values with mutable access, in dense-storage
    /// order.
    pub fn values_mut(&mut self) -> ValuesMut<'_, T, S> {
        ValuesMut {
            inner: self.values.iter_mut(),
        }
    }

    /// Returns an iterator that removes each element from the map, most
    /// recent dense position first.
    ///
    /// Unlike [`clear`][Self::clear] this keeps the slot table: every freed
    /// slot goes through the normal generation bump and free-list append,
    /// so generations stay monotonic. If the iterator is dropped before it
    /// is fully consumed, the remaining elements are still removed.
    pub fn drain(&mut self) -> Drain<'_, T, K, S> {
        Drain { map: self }
    }

    fn position_of(&self, key: K) -> Option<u32> {
        match self.slots.get(key.slot() as usize) {
            Some(&Slot::Occupied {
                generation,
                position,
            }) if generation.to_u32() == key.generation() => Some(position),
            _ => None,
        }
    }

    /// Core removal: swap-remove the value at `position`, patch the slot of
    /// the relocated value, and recycle the freed slot.
    pub(crate) fn remove_position(&mut self, position: u32) -> (K, T) {
        let slot_index = self.reverse[position as usize];
        let generation = self.slots[slot_index as usize].generation();
        let key = K::new(slot_index, generation.to_u32());

        let value = self.values.swap_remove(position as usize);
        self.reverse.swap_remove(position as usize);

        // Unless we removed the tail itself, the former last value now sits
        // at `position`; point its slot there.
        if let Some(&moved_slot) = self.reverse.get(position as usize) {
            match &mut self.slots[moved_slot as usize] {
                Slot::Occupied { position: p, .. } => *p = position,
                Slot::Free { .. } => unreachable!("reverse map names a free slot"),
            }
        }

        self.free_slot(slot_index);

        (key, value)
    }

    /// Transition `slot_index` from occupied to free: bump the generation
    /// and append to the free-list tail, or retire the slot if its
    /// generation space is used up.
    fn free_slot(&mut self, slot_index: u32) {
        let generation = self.slots[slot_index as usize].generation().next();

        self.slots[slot_index as usize] = Slot::Free {
            generation,
            next_free: None,
        };

        // The key type's top generation value is a tombstone, never issued.
        // A slot that reaches it stays off the free list for good.
        if generation.to_u32() >= K::MAX_GENERATION {
            return;
        }

        self.push_free_tail(slot_index);
    }

    /// Append an already-free slot at the tail of the free list.
    ///
    /// Freed slots queue at the tail while insertion pops from the head, so
    /// erase/insert churn rotates through every free slot instead of
    /// hammering the most recently freed one, spreading generation growth
    /// evenly across the table.
    fn push_free_tail(&mut self, slot_index: u32) {
        let pointer = FreePointer::from_slot(slot_index);

        match self.free_tail {
            Some(tail) => match &mut self.slots[tail.slot() as usize] {
                Slot::Free { next_free, .. } => *next_free = Some(pointer),
                Slot::Occupied { .. } => {
                    unreachable!("free list tail pointed at an occupied slot")
                }
            },
            None => self.free_head = Some(pointer),
        }

        self.free_tail = Some(pointer);
    }

    fn next_position(&self) -> u32 {
        self.values
            .len()
            .try_into()
            .unwrap_or_else(|_| unreachable!("dense storage outgrew the slot table"))
    }

    fn next_slot_index(&self) -> u32 {
        let next = self.slots.len();
        if next >= K::MAX_SLOTS as usize {
            panic!(
                "cannot address more than {} slots with this key type",
                K::MAX_SLOTS
            );
        }

        next as u32
    }

    #[cfg(feature = "serde")]
    pub(crate) fn slot_table(&self) -> &[Slot] {
        &self.slots
    }

    #[cfg(feature = "serde")]
    pub(crate) fn value_at(&self, position: u32) -> Option<&T> {
        self.values.get(position as usize)
    }

    /// Append one slot in its serialized state, rebuilding dense storage,
    /// reverse map, and free list as we go. Free slots enqueue in slot
    /// order; retired slots (generation at the tombstone) stay off the list.
    #[cfg(feature = "serde")]
    pub(crate) fn push_slot(&mut self, generation: Generation, value: Option<T>) {
        let slot_index = self.next_slot_index();

        match value {
            Some(value) => {
                let position = self.next_position();
                self.slots.push(Slot::Occupied {
                    generation,
                    position,
                });
                self.values.push(value);
                self.reverse.push(slot_index);
            }
            None => {
                self.slots.push(Slot::Free {
                    generation,
                    next_free: None,
                });
                if generation.to_u32() < K::MAX_GENERATION {
                    self.push_free_tail(slot_index);
                }
            }
        }
    }
}

impl<T, K: Key, S: CapacityStorage<T>> SlotMap<T, K, S> {
    /// Construct an empty map with space to hold `capacity` values (and
    /// slots) without reallocating.
    ///
    /// Only available when the backing storage has a capacity concept; see
    /// [`CapacityStorage`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            values: S::with_capacity(capacity),
            reverse: Vec::with_capacity(capacity),
            free_head: None,
            free_tail: None,
            _marker: PhantomData,
        }
    }

    /// Return the number of values the map can hold without reallocating
    /// its dense storage.
    ///
    /// Only available when the backing storage has a capacity concept; see
    /// [`CapacityStorage`].
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    /// Reserve room for at least `additional` more values.
    ///
    /// Only available when the backing storage has a capacity concept; see
    /// [`CapacityStorage`].
    pub fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
        self.reverse.reserve(additional);
    }
}

impl<T, K: Key, S: Storage<T>> Default for SlotMap<T, K, S> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            values: S::default(),
            reverse: Vec::new(),
            free_head: None,
            free_tail: None,
            _marker: PhantomData,
        }
    }
}

impl<T, K: Key, S: Storage<T>> IntoIterator for SlotMap<T, K, S> {
    type Item = (K, T);
    type IntoIter = IntoIter<T, K, S>;

    fn into_iter(self) -> Self::IntoIter {
        let SlotMap {
            slots,
            values,
            reverse,
            ..
        } = self;

        IntoIter {
            slots,
            reverse: IntoIterator::into_iter(reverse),
            values: Storage::into_iter(values),
            _marker: PhantomData,
        }
    }
}

impl<'a, T, K: Key, S: Storage<T>> IntoIterator for &'a SlotMap<T, K, S> {
    type Item = (K, &'a T);
    type IntoIter = Iter<'a, T, K, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, K: Key, S: Storage<T>> IntoIterator for &'a mut SlotMap<T, K, S> {
    type Item = (K, &'a mut T);
    type IntoIter = IterMut<'a, T, K, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T, K: Key, S: Storage<T>> ops::Index<K> for SlotMap<T, K, S> {
    type Output = T;

    fn index(&self, key: K) -> &Self::Output {
        self.get(key)
            .unwrap_or_else(|| panic!("no value for key {:?}", key))
    }
}

impl<T, K: Key, S: Storage<T>> ops::IndexMut<K> for SlotMap<T, K, S> {
    fn index_mut(&mut self, key: K) -> &mut Self::Output {
        self.get_mut(key)
            .unwrap_or_else(|| panic!("no value for key {:?}", key))
    }
}
