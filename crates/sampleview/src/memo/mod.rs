//! Memoized derived values.
//!
//! A [`MemoCell`] remembers the result of its most recent invocation and
//! hands it back as long as the next argument list is the *same* (by
//! [`Identity`]) as the previous one. A [`KeyedCache`] keeps every result it
//! ever computed, keyed by a hashable key, for the handful of operations that
//! are too expensive to recompute when an unrelated argument changes.

mod cell;
mod keyed;

pub use cell::MemoCell;
pub use keyed::{ByAddress, KeyedCache};

use std::rc::Rc;

/// Shallow equality used to decide whether a memoized result can be reused.
///
/// Shared values (`Rc`) compare by pointer, never by content: an upstream
/// stage that did not change hands out the same allocation, so comparing it
/// is O(1) no matter how large the underlying tables are. Plain scalars and
/// small `Copy` enums compare by value.
pub trait Identity {
    fn same(&self, other: &Self) -> bool;
}

impl<T: ?Sized> Identity for Rc<T> {
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: Identity> Identity for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Identity for f64 {
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl Identity for () {
    fn same(&self, _other: &Self) -> bool {
        true
    }
}

/// Implements [`Identity`] as plain value equality.
macro_rules! value_identity {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::memo::Identity for $ty {
                fn same(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

pub(crate) use value_identity;

value_identity!(bool, u8, u32, u64, usize, i64);

macro_rules! tuple_identity {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Identity),+> Identity for ($($name,)+) {
            fn same(&self, other: &Self) -> bool {
                $(self.$idx.same(&other.$idx))&&+
            }
        }
    };
}

tuple_identity!(A: 0);
tuple_identity!(A: 0, B: 1);
tuple_identity!(A: 0, B: 1, C: 2);
tuple_identity!(A: 0, B: 1, C: 2, D: 3);
tuple_identity!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_identity!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

/// Hit/miss counters shared by both cache kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub(crate) fn hit(self) -> Self {
        Self {
            hits: self.hits + 1,
            ..self
        }
    }

    pub(crate) fn miss(self) -> Self {
        Self {
            misses: self.misses + 1,
            ..self
        }
    }
}
