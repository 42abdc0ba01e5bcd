use core::fmt;
use core::num::NonZeroU32;

use crate::key::Generation;

/// Links one free slot to the next, threading the free list through the slot
/// table itself. Encapsulates NonZeroU32 to prevent off-by-one errors and
/// leaking unsafety.
///
/// Uses NonZeroU32 to stay small when put inside an `Option`.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct FreePointer(NonZeroU32);

impl FreePointer {
    #[must_use]
    pub(crate) fn from_slot(slot: u32) -> Self {
        let value = slot
            .checked_add(1)
            .expect("u32 overflowed calculating free pointer from slot");

        // This is safe because any u32 + 1 that didn't overflow must not be
        // zero.
        FreePointer(unsafe { NonZeroU32::new_unchecked(value) })
    }

    #[must_use]
    pub(crate) fn slot(self) -> u32 {
        // Cannot underflow, the inner value is guaranteed non-zero.
        self.0.get() - 1
    }
}

impl fmt::Debug for FreePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FreePointer({})", self.slot())
    }
}

/// One entry of the slot table. A slot has a fixed identity (its index) but
/// alternates between owning a live value and sitting on the free list.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    /// The slot names a live value: `position` is where that value currently
    /// sits in dense storage, and `generation` is carried by the one valid
    /// key for this slot.
    Occupied {
        generation: Generation,
        position: u32,
    },

    /// The slot is unused. `generation` is what the next key issued from
    /// this slot will carry, and `next_free` points at the next slot in the
    /// free list (`None` terminates the list). A free slot whose generation
    /// has reached the key type's maximum is retired: off the list for good.
    Free {
        generation: Generation,
        next_free: Option<FreePointer>,
    },
}

impl Slot {
    pub(crate) fn generation(&self) -> Generation {
        match self {
            Slot::Occupied { generation, .. } => *generation,
            Slot::Free { generation, .. } => *generation,
        }
    }
}

#[cfg(test)]
mod test {
    use super::FreePointer;

    #[test]
    fn from_slot() {
        let pointer = FreePointer::from_slot(0);
        assert_eq!(pointer.slot(), 0);
        assert_eq!(format!("{:?}", pointer), "FreePointer(0)");
    }

    #[test]
    #[should_panic(expected = "u32 overflowed calculating free pointer from slot")]
    fn panic_on_overflow() {
        let _ = FreePointer::from_slot(u32::MAX);
    }
}
