//! Contains all of the iterator types for the slot map.

mod drain;
mod into_iter;
mod iter;
mod iter_mut;
mod keys;
mod values;

pub use drain::Drain;
pub use into_iter::IntoIter;
pub use iter::Iter;
pub use iter_mut::IterMut;
pub use keys::Keys;
pub use values::{Values, ValuesMut};
