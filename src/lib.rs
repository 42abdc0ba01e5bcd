/*!
Dense generational slot map: a container that issues small, copyable keys
for the values stored in it, keeps the values packed contiguously for fast
iteration, and detects any use of a key whose value is gone.

Lookup, insertion, and removal are all O(1). Removal swap-fills the hole
with the last value, so storage never fragments; a per-slot generation
counter makes stale keys fail validation instead of aliasing whatever was
put in the reused slot.

## Basic Examples

```rust
# use cloakroom::SlotMap;
let mut map = SlotMap::new();

let foo = map.insert("Foo");
let bar = map.insert("Bar");

assert_eq!(map[foo], "Foo");
assert_eq!(map[bar], "Bar");

map[bar] = "Replaced";
assert_eq!(map[bar], "Replaced");

let foo_value = map.remove(foo);
assert_eq!(foo_value, Some("Foo"));

// The slot previously used by foo will eventually be reused, but foo
// itself is expired for good.
assert_eq!(map.get(foo), None);
```

## Configuration

Both halves of the map are type parameters:

* The key type decides how many bits go to the slot index and how many to
  the generation counter. [`DefaultKey`] is an even 32/32 split of a `u64`;
  [`CompactKey`] packs 11 + 5 bits into a `u16` for handle tables that have
  to stay tiny.
* The backing storage for values is any [`Storage`] implementation
  (default [`Vec`], `VecDeque` also works out of the box). Capacity-style
  operations are only exposed when the storage implements
  [`CapacityStorage`], so containers without a capacity concept simply
  don't have them.

Two whole maps can be exchanged in O(1) with [`std::mem::swap`]; keys are
only meaningful against the instance currently holding their slot table.

The optional `serde` feature serializes a map so that issued keys stay
valid across a round-trip.
*/

#![forbid(missing_docs)]

mod iter;
mod key;
mod map;
mod slot;
mod storage;

#[cfg(feature = "serde")]
mod feature_serde;

pub use crate::iter::{Drain, IntoIter, Iter, IterMut, Keys, Values, ValuesMut};
pub use crate::key::{CompactKey, DefaultKey, ExpiredKey, Key};
pub use crate::map::SlotMap;
pub use crate::storage::{CapacityStorage, Storage};
