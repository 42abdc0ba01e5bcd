use core::fmt;
use core::hash::Hash;
use core::num::{NonZeroU16, NonZeroU32};

use thiserror::Error;

/// Tracks the generation of a slot in the slot table. Encapsulates NonZeroU32
/// to reduce the number of redundant checks needed, as well as enforcing
/// checked arithmetic when advancing a generation.
///
/// Using NonZeroU32 also lets key types built around a generation stay the
/// same size when put inside an `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub(crate) struct Generation(NonZeroU32);

impl Generation {
    #[must_use]
    pub(crate) fn first() -> Self {
        Generation(unsafe { NonZeroU32::new_unchecked(1) })
    }

    #[must_use]
    pub(crate) fn next(self) -> Self {
        let next = self
            .0
            .get()
            .checked_add(1)
            .expect("u32 overflowed calculating next generation");

        // This is safe because any u32 + 1 that didn't overflow must not be
        // zero.
        Generation(unsafe { NonZeroU32::new_unchecked(next) })
    }

    #[must_use]
    pub(crate) fn to_u32(self) -> u32 {
        self.0.get()
    }

    #[must_use]
    pub(crate) fn from_u32(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Generation)
    }
}

/// Describes a key type a [`SlotMap`][crate::SlotMap] can issue.
///
/// A key packs a slot index together with that slot's generation counter. The
/// two associated constants fix the width of each field at the type level, so
/// the map can enforce them at slot-table growth (index side) and through
/// slot retirement (generation side) without any runtime configuration.
///
/// Implementations outside this crate are possible but rarely needed;
/// [`DefaultKey`] covers general use and [`CompactKey`] covers handle tables
/// that must squeeze into 16 bits.
pub trait Key: Copy + Eq + Hash + fmt::Debug {
    /// Maximum number of slots a map keyed by this type may ever create.
    /// Growing the slot table past this bound is a fatal precondition
    /// violation and panics.
    const MAX_SLOTS: u32;

    /// Largest value the generation field can represent. The top value is
    /// reserved as a retirement tombstone and is never issued in a key, so
    /// implementations must keep this at 2 or above.
    const MAX_GENERATION: u32;

    /// Pack a slot index and generation into a key.
    ///
    /// The map only calls this with `slot < MAX_SLOTS` and `1 <= generation
    /// < MAX_GENERATION`; implementations may debug-assert those ranges.
    fn new(slot: u32, generation: u32) -> Self;

    /// The slot-table index this key refers to.
    fn slot(self) -> u32;

    /// The generation this key was issued under.
    fn generation(self) -> u32;
}

/// The standard key type: a 32-bit slot index and a 32-bit generation, an
/// even split of a 64-bit word.
///
/// The generation is stored as a NonZeroU32, which means
/// `Option<DefaultKey>` is the same size as `DefaultKey` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefaultKey {
    slot: u32,
    generation: NonZeroU32,
}

impl DefaultKey {
    /// Convert this key to an equivalent `u64`, with the slot index in the
    /// upper 32 bits and the generation in the lower 32 bits.
    ///
    /// Useful for storing keys in contexts that only traffic in integers,
    /// like FFI handles or scripting languages. Use
    /// [`from_bits`][DefaultKey::from_bits] to get a key back.
    pub fn to_bits(self) -> u64 {
        ((self.slot as u64) << 32) | (self.generation.get() as u64)
    }

    /// Reconstruct a key packed by [`to_bits`][DefaultKey::to_bits].
    ///
    /// # Panics
    ///
    /// Panics if the generation half of the value is zero, which never
    /// occurs in the output of `to_bits`.
    pub fn from_bits(bits: u64) -> Self {
        let generation = NonZeroU32::new(bits as u32)
            .expect("DefaultKey::from_bits requires a non-zero generation");

        Self {
            slot: (bits >> 32) as u32,
            generation,
        }
    }
}

impl Key for DefaultKey {
    const MAX_SLOTS: u32 = u32::MAX;
    const MAX_GENERATION: u32 = u32::MAX;

    fn new(slot: u32, generation: u32) -> Self {
        let generation =
            NonZeroU32::new(generation).expect("DefaultKey requires a non-zero generation");

        Self { slot, generation }
    }

    fn slot(self) -> u32 {
        self.slot
    }

    fn generation(self) -> u32 {
        self.generation.get()
    }
}

const COMPACT_GENERATION_BITS: u32 = 5;
const COMPACT_GENERATION_MASK: u16 = (1 << COMPACT_GENERATION_BITS) - 1;

/// A key squeezed into 16 bits: an 11-bit slot index and a 5-bit generation.
///
/// Maps keyed by `CompactKey` can address at most 2048 slots, and each slot
/// retires after its 30th reuse cycle. In exchange the key (and
/// `Option<CompactKey>`) is two bytes, which matters when handles are stored
/// by the million or packed into wire formats.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CompactKey(NonZeroU16);

impl CompactKey {
    /// Convert this key to its packed `u16` representation: slot index in
    /// the upper 11 bits, generation in the lower 5.
    pub fn to_bits(self) -> u16 {
        self.0.get()
    }

    /// Reconstruct a key packed by [`to_bits`][CompactKey::to_bits].
    ///
    /// # Panics
    ///
    /// Panics if the generation bits are zero, which never occurs in the
    /// output of `to_bits`.
    pub fn from_bits(bits: u16) -> Self {
        assert!(
            bits & COMPACT_GENERATION_MASK != 0,
            "CompactKey::from_bits requires a non-zero generation"
        );

        // The assert above covers the low bits, and therefore the whole
        // value.
        CompactKey(unsafe { NonZeroU16::new_unchecked(bits) })
    }
}

impl Key for CompactKey {
    const MAX_SLOTS: u32 = 1 << 11;
    const MAX_GENERATION: u32 = (1 << COMPACT_GENERATION_BITS) - 1;

    fn new(slot: u32, generation: u32) -> Self {
        debug_assert!(slot < Self::MAX_SLOTS);
        debug_assert!(generation >= 1 && generation <= Self::MAX_GENERATION);

        let bits = ((slot as u16) << COMPACT_GENERATION_BITS) | generation as u16;
        CompactKey(NonZeroU16::new(bits).expect("CompactKey requires a non-zero generation"))
    }

    fn slot(self) -> u32 {
        (self.0.get() >> COMPACT_GENERATION_BITS) as u32
    }

    fn generation(self) -> u32 {
        (self.0.get() & COMPACT_GENERATION_MASK) as u32
    }
}

impl fmt::Debug for CompactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactKey({}v{})", self.slot(), self.generation())
    }
}

/// Error returned by [`SlotMap::try_get`][crate::SlotMap::try_get] and
/// [`SlotMap::try_get_mut`][crate::SlotMap::try_get_mut] when a key fails
/// validation.
///
/// A key that was never issued by the map, was already removed, or belongs
/// to a different map instance all collapse into this one case; the map does
/// not distinguish among them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("key {0:?} is expired")]
pub struct ExpiredKey<K: Key>(
    /// The key that failed validation.
    pub K,
);

#[cfg(test)]
mod test {
    use super::{CompactKey, DefaultKey, ExpiredKey, Generation, Key};

    use std::mem::size_of;
    use std::num::NonZeroU32;

    #[test]
    fn first_and_next() {
        let first = Generation::first();
        assert_eq!(first.to_u32(), 1);

        let second = first.next();
        assert_eq!(second.to_u32(), 2);
    }

    #[test]
    #[should_panic(expected = "u32 overflowed calculating next generation")]
    fn panic_on_generation_overflow() {
        let max = Generation(NonZeroU32::new(u32::MAX).unwrap());
        let _next = max.next();
    }

    #[test]
    fn key_sizes() {
        assert_eq!(size_of::<DefaultKey>(), 8);
        assert_eq!(size_of::<Option<DefaultKey>>(), 8);
        assert_eq!(size_of::<CompactKey>(), 2);
        assert_eq!(size_of::<Option<CompactKey>>(), 2);
    }

    #[test]
    fn default_key_round_trip() {
        let key = DefaultKey::new(170, 12);
        assert_eq!(key.slot(), 170);
        assert_eq!(key.generation(), 12);

        let bits = key.to_bits();
        assert_eq!(bits, (170u64 << 32) | 12);
        assert_eq!(DefaultKey::from_bits(bits), key);
    }

    #[test]
    #[should_panic(expected = "non-zero generation")]
    fn default_key_bits_panic_on_zero_generation() {
        DefaultKey::from_bits(0x0000_00AA_0000_0000);
    }

    #[test]
    fn compact_key_round_trip() {
        let key = CompactKey::new(2047, 31);
        assert_eq!(key.slot(), 2047);
        assert_eq!(key.generation(), 31);
        assert_eq!(CompactKey::from_bits(key.to_bits()), key);

        let low = CompactKey::new(0, 1);
        assert_eq!(low.slot(), 0);
        assert_eq!(low.generation(), 1);
    }

    #[test]
    #[should_panic(expected = "non-zero generation")]
    fn compact_key_bits_panic_on_zero_generation() {
        CompactKey::from_bits(0b00000_00001_00000);
    }

    #[test]
    fn expired_key_display() {
        let key = DefaultKey::new(3, 7);
        let error = ExpiredKey(key);
        assert_eq!(error.to_string(), format!("key {:?} is expired", key));
    }
}
