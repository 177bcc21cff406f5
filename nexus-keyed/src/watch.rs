//! Live key-change tracking for shared items.
//!
//! Items shared with outside code (typically `Rc<T>` with interior
//! mutability) can change their key while they sit in a collection. Such items
//! expose a [`KeySignal`] through [`KeyChanges`] and call
//! [`KeySignal::emit`] after mutating their key-bearing field.
//!
//! A collection built with
//! [`watch_keys`](crate::KeyedList::watch_keys) subscribes to each item's
//! signal on insertion and drops the subscription on removal. Emitting never
//! touches the collection: it only records the item in a pending queue. The
//! queue is drained by [`sync`](crate::KeyedList::sync), which every mutating
//! operation calls first. Re-indexing therefore never runs inside the
//! caller's mutation, and a signal fired while a drain is in progress is left
//! for the next one.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use nexus_keyed::{ByKey, KeyChanges, KeySignal, Keyed, KeyedList};
//!
//! struct Bulb {
//!     id: Cell<u32>,
//!     signal: KeySignal,
//! }
//!
//! impl Bulb {
//!     fn new(id: u32) -> Rc<Self> {
//!         Rc::new(Self { id: Cell::new(id), signal: KeySignal::new() })
//!     }
//!
//!     fn set_id(&self, id: u32) {
//!         self.id.set(id);
//!         self.signal.emit();
//!     }
//! }
//!
//! impl Keyed for Bulb {
//!     type Key = u32;
//!     fn key(&self) -> u32 { self.id.get() }
//! }
//!
//! impl KeyChanges for Bulb {
//!     fn key_signal(&self) -> &KeySignal { &self.signal }
//! }
//!
//! let mut bulbs: KeyedList<Rc<Bulb>, ByKey> = KeyedList::new(ByKey).watch_keys();
//! let porch = Bulb::new(4);
//! bulbs.add(Rc::clone(&porch)).unwrap();
//!
//! porch.set_id(40);
//! bulbs.sync();
//!
//! assert_eq!(bulbs.index_of_key(&4), None);
//! assert_eq!(bulbs.index_of_key(&40), Some(0));
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Broadcast point an item fires after its key changes.
#[derive(Default)]
pub struct KeySignal {
    hooks: RefCell<Vec<Weak<dyn Fn()>>>,
}

impl KeySignal {
    /// Creates a signal with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook`, which runs on every [`emit`](Self::emit) until the
    /// returned [`Subscription`] is dropped.
    ///
    /// Dead subscriptions are pruned first, so the hook list stays bounded
    /// by the live count on signals that are subscribed to but never fire.
    pub fn subscribe(&self, hook: impl Fn() + 'static) -> Subscription {
        let hook: Rc<dyn Fn()> = Rc::new(hook);
        let mut hooks = self.hooks.borrow_mut();
        hooks.retain(|weak| weak.strong_count() > 0);
        hooks.push(Rc::downgrade(&hook));
        Subscription { _hook: hook }
    }

    /// Notifies every live subscriber.
    ///
    /// Dead subscriptions are pruned here. Hooks may subscribe or emit
    /// again; the hook list is not borrowed while they run.
    pub fn emit(&self) {
        let live: Vec<Rc<dyn Fn()>> = {
            let mut hooks = self.hooks.borrow_mut();
            hooks.retain(|hook| hook.strong_count() > 0);
            hooks.iter().filter_map(Weak::upgrade).collect()
        };
        for hook in live {
            hook();
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.hooks
            .borrow()
            .iter()
            .filter(|hook| hook.strong_count() > 0)
            .count()
    }
}

impl core::fmt::Debug for KeySignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeySignal")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Keeps a [`KeySignal`] hook alive. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _hook: Rc<dyn Fn()>,
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription").finish()
    }
}

/// Items able to announce key changes.
pub trait KeyChanges {
    /// Signal fired after the item's key-bearing field changes.
    fn key_signal(&self) -> &KeySignal;
}

impl<T: KeyChanges + ?Sized> KeyChanges for Rc<T> {
    #[inline]
    fn key_signal(&self) -> &KeySignal {
        (**self).key_signal()
    }
}

impl<T: KeyChanges + ?Sized> KeyChanges for Box<T> {
    #[inline]
    fn key_signal(&self) -> &KeySignal {
        (**self).key_signal()
    }
}

/// Identity of a watched item, stable across positional shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct WatchId(u64);

/// A live subscription held alongside the item it watches.
#[derive(Debug)]
pub(crate) struct Watch {
    pub(crate) id: WatchId,
    _subscription: Subscription,
}

/// Collection-side half of key watching: the pending queue and the accessor
/// that finds an item's signal.
pub(crate) struct Watcher<V> {
    signal_of: fn(&V) -> &KeySignal,
    pending: Rc<RefCell<Vec<WatchId>>>,
    next_id: u64,
}

impl<V> Watcher<V> {
    pub(crate) fn new(signal_of: fn(&V) -> &KeySignal) -> Self {
        Self {
            signal_of,
            pending: Rc::new(RefCell::new(Vec::new())),
            next_id: 0,
        }
    }

    /// Subscribes to `item`'s signal. The hook only queues the item's id.
    pub(crate) fn attach(&mut self, item: &V) -> Watch {
        let id = WatchId(self.next_id);
        self.next_id += 1;

        let pending = Rc::downgrade(&self.pending);
        let subscription = (self.signal_of)(item).subscribe(move || {
            if let Some(pending) = pending.upgrade() {
                pending.borrow_mut().push(id);
            }
        });

        Watch {
            id,
            _subscription: subscription,
        }
    }

    /// Takes the queued ids, oldest first, without duplicates.
    pub(crate) fn take_pending(&self) -> Vec<WatchId> {
        let mut queued = core::mem::take(&mut *self.pending.borrow_mut());
        let mut seen = std::collections::HashSet::with_capacity(queued.len());
        queued.retain(|id| seen.insert(*id));
        queued
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    /// Drops queued ids, used when every watched item leaves at once.
    pub(crate) fn discard_pending(&self) {
        self.pending.borrow_mut().clear();
    }
}

impl<V> core::fmt::Debug for Watcher<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Watcher")
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}
