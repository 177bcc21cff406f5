//! Error types for keyed collection operations.

use thiserror::Error;

/// Errors returned by [`KeyedList`](crate::KeyedList) operations.
///
/// A failed operation leaves the collection exactly as it was.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Another item already holds the key.
    #[error("an item with the same key is already present")]
    DuplicateKey,

    /// No item holds the requested key.
    #[error("key not found")]
    KeyNotFound,

    /// A position argument is outside the collection.
    #[error("position {index} out of range for length {len}")]
    OutOfRange {
        /// The rejected position.
        index: usize,
        /// Collection length at the time of the call.
        len: usize,
    },

    /// The item handed to a by-key setter carries a different key.
    #[error("item key does not match the target key")]
    KeyMismatch,

    /// The slot index type cannot address any more items.
    #[error("collection is limited to {max} items by its slot index type")]
    CapacityOverflow {
        /// Largest item count the index type supports.
        max: usize,
    },

    /// No comparator could be resolved for the key type.
    #[error("no comparator available for key type `{0}`")]
    UnsupportedKeyType(&'static str),
}

/// Result type for keyed collection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A watched item changed its key to one already held by another item.
///
/// Delivered through [`Change::ResyncFailed`](crate::Change::ResyncFailed)
/// rather than returned, because the mutation that caused it happened outside
/// the collection. The index keeps the item's previous key until the caller
/// renames the item again or removes it; see
/// [`stale_positions`](crate::KeyedList::stale_positions).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("key change at position {pos} collides with an existing item")]
pub struct ResyncFailed<K> {
    /// Position of the item whose key changed.
    pub pos: usize,
    /// Key the item now reports.
    pub new_key: K,
}
