//! Structural change notification.
//!
//! Observers register a handler with
//! [`KeyedList::subscribe`](crate::KeyedList::subscribe) and receive a
//! [`Change`] after every successful mutation. Handlers run synchronously on
//! the mutating thread, after all internal bookkeeping is complete, so an
//! observer always sees a consistent collection.
//!
//! Handlers receive borrowed items and cannot reach back into the collection:
//! the collection is mutably borrowed for the duration of the call.

use crate::error::ResyncFailed;

/// A change to a [`KeyedList`](crate::KeyedList).
#[derive(Debug)]
pub enum Change<'a, V, K> {
    /// `item` now occupies positional slot `pos`.
    Added {
        /// The inserted item.
        item: &'a V,
        /// Its position.
        pos: usize,
    },
    /// `item` left positional slot `pos`.
    Removed {
        /// The removed item.
        item: &'a V,
        /// Position it occupied.
        pos: usize,
    },
    /// The item at `pos` was replaced.
    Replaced {
        /// Previous occupant.
        old: &'a V,
        /// New occupant.
        new: &'a V,
        /// Position of the replacement.
        pos: usize,
    },
    /// `item` moved between positional slots.
    Moved {
        /// The moved item.
        item: &'a V,
        /// Position before the move.
        old_pos: usize,
        /// Position after the move.
        new_pos: usize,
    },
    /// The positional order changed wholesale (sort, clear).
    Reset,
    /// The item count changed.
    CountChanged(usize),
    /// The reserved capacity changed.
    CapacityChanged(usize),
    /// A watched item's new key collided with another item's key.
    ResyncFailed(&'a ResyncFailed<K>),
}

/// Handle returned by [`KeyedList::subscribe`](crate::KeyedList::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Handler<V, K> = Box<dyn FnMut(&Change<'_, V, K>)>;

/// Registered change handlers, invoked in registration order.
pub(crate) struct Notifier<V, K> {
    handlers: Vec<(HandlerId, Handler<V, K>)>,
    next_id: u64,
}

impl<V, K> Notifier<V, K> {
    pub(crate) const fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn subscribe<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Change<'_, V, K>) + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    #[inline]
    pub(crate) fn emit(&mut self, change: &Change<'_, V, K>) {
        for (_, handler) in &mut self.handlers {
            handler(change);
        }
    }
}

impl<V, K> core::fmt::Debug for Notifier<V, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
