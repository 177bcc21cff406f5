//! Slot index type for the permutation vectors.
//!
//! A [`KeyedList`](crate::KeyedList) keeps two permutation vectors relating
//! positional slots and key slots. Their element type is generic so small
//! collections can use `u16` or `u8` entries and keep both vectors compact.

/// A copyable slot index.
///
/// # Example
///
/// ```
/// use nexus_keyed::Index;
///
/// let idx = u16::from_usize(300);
///
/// assert_eq!(idx.as_usize(), 300);
/// assert_eq!(u16::MAX_SLOTS, u16::MAX as usize);
/// ```
pub trait Index: Copy + Eq + core::fmt::Debug {
    /// Upper bound on the item count of a collection using this type.
    const MAX_SLOTS: usize;

    /// Widens to `usize`.
    fn as_usize(self) -> usize;

    /// Narrows from `usize`. Callers keep `val` below [`Self::MAX_SLOTS`].
    fn from_usize(val: usize) -> Self;
}

macro_rules! impl_index_for_unsigned {
    ($($ty:ty),*) => {
        $(
            impl Index for $ty {
                // Saturates to `usize::MAX` for types wider than `usize`.
                const MAX_SLOTS: usize = <$ty>::MAX as usize;

                #[inline]
                fn as_usize(self) -> usize {
                    self as usize
                }

                #[inline]
                fn from_usize(val: usize) -> Self {
                    val as Self
                }
            }
        )*
    };
}

impl_index_for_unsigned!(u8, u16, u32, u64, usize);
