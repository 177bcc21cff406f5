//! Dual-indexed ordered collection.
//!
//! A [`KeyedList`] is a list and a sorted map over the same items. Items sit
//! in positional order (insertion or UI order) and are simultaneously
//! reachable in ascending key order through a sorted key vector.
//!
//! # Layout
//!
//! ```text
//! positional slot i     key slot j
//! ─────────────────     ─────────────────────
//! items[i]              keys[j]
//! pos_to_key[i] ──────► j
//! i ◄────────────────── key_to_pos[j]
//! ```
//!
//! After every completed operation:
//!
//! 1. `keys` is strictly ascending under the comparator (no duplicates).
//! 2. `extract(items[key_to_pos[j]]) == keys[j]` for every key slot `j`.
//! 3. `pos_to_key` and `key_to_pos` are inverse permutations of `0..len`.
//!
//! Invariant 2 can be broken from outside only by an item whose key changes
//! without the collection hearing about it, or whose watched key change
//! collided (see [`stale_positions`](KeyedList::stale_positions)).
//!
//! # Costs
//!
//! | Operation | Cost |
//! |-----------|------|
//! | `index_of_key`, `get_by_key`, `contains_key` | O(log n) |
//! | `get`, `key_slot`, `position_of_slot` | O(1) |
//! | `add`, `insert`, `remove_at`, `remove_key`, `move_item` | O(n) |
//! | `sort`, `add_range` | O(n log n) |
//!
//! # Example
//!
//! ```
//! use nexus_keyed::{Error, KeyedList};
//!
//! #[derive(Debug)]
//! struct Bulb {
//!     id: u32,
//!     room: &'static str,
//! }
//!
//! let mut bulbs: KeyedList<Bulb, _> = KeyedList::new(|b: &Bulb| b.id);
//!
//! bulbs.add(Bulb { id: 5, room: "hall" }).unwrap();
//! bulbs.add(Bulb { id: 3, room: "porch" }).unwrap();
//! bulbs.add(Bulb { id: 8, room: "kitchen" }).unwrap();
//!
//! // Positional order is insertion order...
//! let rooms: Vec<_> = bulbs.iter().map(|b| b.room).collect();
//! assert_eq!(rooms, ["hall", "porch", "kitchen"]);
//!
//! // ...while keys stay sorted.
//! assert_eq!(bulbs.keys(), [3, 5, 8]);
//! assert_eq!(bulbs.index_of_key(&8), Some(2));
//!
//! assert_eq!(bulbs.add(Bulb { id: 3, room: "attic" }), Err(Error::DuplicateKey));
//! assert_eq!(bulbs.len(), 3);
//! ```

use core::cmp::Ordering;
use core::mem;

use tracing::{debug, trace, warn};

use crate::compare::{Compare, Natural, Registered, Registry};
use crate::config::Config;
use crate::error::{Error, ResyncFailed, Result};
use crate::event::{Change, HandlerId, Notifier};
use crate::index::Index;
use crate::key::Extract;
use crate::sort::{apply_permutation, invert, sort_permutation};
use crate::watch::{KeyChanges, KeySignal, Watch, Watcher};

/// An item plus its key-change subscription, if watched.
struct Slot<V> {
    value: V,
    watch: Option<Watch>,
}

/// A positional list and a key-sorted map over the same items.
///
/// # Type Parameters
///
/// - `V`: Item type
/// - `E`: Key extractor (see [`Extract`]); the key type is `E::Key`
/// - `C`: Key comparator (default [`Natural`])
/// - `Idx`: Slot index type for the permutation vectors (default `u32`)
pub struct KeyedList<V, E, C = Natural, Idx = u32>
where
    E: Extract<V>,
    Idx: Index,
{
    /// Items in positional order.
    items: Vec<Slot<V>>,
    /// Recorded keys in ascending order.
    keys: Vec<E::Key>,
    /// Positional slot -> key slot.
    pos_to_key: Vec<Idx>,
    /// Key slot -> positional slot.
    key_to_pos: Vec<Idx>,
    /// Reserved slots, grown in `config.auto_buffer` steps.
    capacity: usize,
    config: Config,
    extract: E,
    compare: C,
    notifier: Notifier<V, E::Key>,
    watcher: Option<Watcher<V>>,
}

// =============================================================================
// Constructors
// =============================================================================

impl<V, E> KeyedList<V, E, Natural, u32>
where
    E: Extract<V>,
    E::Key: Ord,
{
    /// Creates an empty collection ordered by the key type's [`Ord`].
    pub fn new(extract: E) -> Self {
        Self::with_config(extract, Natural, Config::default())
    }

    /// Creates a collection holding `items` in iteration order.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] if two items share a key.
    pub fn from_items<I>(extract: E, items: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
    {
        let mut list = Self::new(extract);
        list.add_range(items)?;
        Ok(list)
    }
}

impl<V, E, C> KeyedList<V, E, C, u32>
where
    E: Extract<V>,
    C: Compare<E::Key>,
{
    /// Creates an empty collection ordered by an explicit comparator.
    ///
    /// ```
    /// use nexus_keyed::{ByFn, KeyedList};
    ///
    /// let mut labels: KeyedList<String, _, _> = KeyedList::with_comparator(
    ///     |s: &String| s.clone(),
    ///     ByFn(|a: &String, b: &String| a.to_lowercase().cmp(&b.to_lowercase())),
    /// );
    /// labels.add("Porch".to_string()).unwrap();
    /// assert!(labels.add("porch".to_string()).is_err());
    /// ```
    pub fn with_comparator(extract: E, compare: C) -> Self {
        Self::with_config(extract, compare, Config::default())
    }
}

impl<V, E> KeyedList<V, E, Registered<E::Key>, u32>
where
    E: Extract<V>,
    E::Key: 'static,
{
    /// Creates an empty collection ordered by the comparator registered for
    /// the key type.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedKeyType`] if `registry` has no entry for the key
    /// type.
    pub fn with_registry(extract: E, registry: &Registry) -> Result<Self> {
        let compare = registry.resolve::<E::Key>()?;
        Ok(Self::with_config(extract, compare, Config::default()))
    }
}

impl<V, E, C, Idx> KeyedList<V, E, C, Idx>
where
    V: KeyChanges,
    E: Extract<V>,
    C: Compare<E::Key>,
    Idx: Index,
{
    /// Subscribes to every item's [`KeySignal`], now and on each insertion.
    ///
    /// Key changes reported by items are applied by [`sync`](Self::sync),
    /// which every mutating operation runs first.
    #[must_use]
    pub fn watch_keys(mut self) -> Self {
        if self.watcher.is_some() {
            return self;
        }
        let mut watcher = Watcher::new(signal_of::<V>);
        for slot in &mut self.items {
            slot.watch = Some(watcher.attach(&slot.value));
        }
        self.watcher = Some(watcher);
        self
    }
}

fn signal_of<V: KeyChanges>(item: &V) -> &KeySignal {
    item.key_signal()
}

// =============================================================================
// Core operations
// =============================================================================

impl<V, E, C, Idx> KeyedList<V, E, C, Idx>
where
    E: Extract<V>,
    C: Compare<E::Key>,
    Idx: Index,
{
    /// Creates an empty collection with explicit options.
    pub fn with_config(extract: E, compare: C, config: Config) -> Self {
        let capacity = config.initial_capacity.min(Idx::MAX_SLOTS);
        Self {
            items: Vec::with_capacity(capacity),
            keys: Vec::with_capacity(capacity),
            pos_to_key: Vec::with_capacity(capacity),
            key_to_pos: Vec::with_capacity(capacity),
            capacity,
            config,
            extract,
            compare,
            notifier: Notifier::new(),
            watcher: None,
        }
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the collection is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of reserved slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the options this collection was built with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Enables or disables dynamic mode.
    pub fn set_dynamic(&mut self, dynamic: bool) {
        self.config.dynamic = dynamic;
    }

    // -------------------------------------------------------------------------
    // Notification surface
    // -------------------------------------------------------------------------

    /// Registers a change handler. Handlers run in registration order.
    pub fn subscribe<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Change<'_, V, E::Key>) + 'static,
    {
        self.notifier.subscribe(handler)
    }

    /// Removes a change handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.notifier.unsubscribe(id)
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    /// Appends `item` and returns its position.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateKey`] if another item holds the same key.
    /// - [`Error::CapacityOverflow`] if `Idx` cannot address another item.
    pub fn add(&mut self, item: V) -> Result<usize> {
        let pos = self.items.len();
        self.insert_checked(pos, item)?;
        Ok(pos)
    }

    /// Inserts `item` at positional slot `pos`, shifting later items back.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRange`] if `pos > len`.
    /// - [`Error::DuplicateKey`] if another item holds the same key.
    /// - [`Error::CapacityOverflow`] if `Idx` cannot address another item.
    pub fn insert(&mut self, pos: usize, item: V) -> Result<()> {
        if pos > self.items.len() {
            return Err(Error::OutOfRange {
                index: pos,
                len: self.items.len(),
            });
        }
        self.insert_checked(pos, item)
    }

    fn insert_checked(&mut self, pos: usize, item: V) -> Result<()> {
        self.sync();

        let key = self.extract.extract(&item);
        let slot = match self.search(&key) {
            Ok(_) => return Err(Error::DuplicateKey),
            Err(slot) => slot,
        };
        let grew = self.ensure_room(1)?;

        self.link(pos, slot, key, item);

        self.notifier.emit(&Change::Added {
            item: &self.items[pos].value,
            pos,
        });
        self.emit_count();
        if grew {
            self.emit_capacity();
        }
        Ok(())
    }

    /// Appends every item of `items`, in order.
    ///
    /// All keys are checked against the collection and against each other
    /// before anything is stored, so on error nothing has been added.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateKey`] if any key is already present or repeats
    ///   within the batch.
    /// - [`Error::CapacityOverflow`] if `Idx` cannot address the batch.
    pub fn add_range<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
    {
        self.sync();

        let batch: Vec<V> = items.into_iter().collect();
        if batch.is_empty() {
            return Ok(());
        }
        let batch_keys: Vec<E::Key> = batch
            .iter()
            .map(|item| self.extract.extract(item))
            .collect();

        if batch_keys.iter().any(|key| self.search(key).is_ok()) {
            return Err(Error::DuplicateKey);
        }
        let mut order: Vec<usize> = (0..batch_keys.len()).collect();
        sort_permutation(&mut order, |a, b| {
            self.compare.compare(&batch_keys[a], &batch_keys[b])
        });
        let repeated = order.windows(2).any(|pair| {
            self.compare
                .compare(&batch_keys[pair[0]], &batch_keys[pair[1]])
                .is_eq()
        });
        if repeated {
            return Err(Error::DuplicateKey);
        }
        let grew = self.ensure_room(batch.len())?;

        let first = self.items.len();
        for (item, key) in batch.into_iter().zip(batch_keys) {
            let pos = self.items.len();
            let watch = self.watcher.as_mut().map(|w| w.attach(&item));
            self.items.push(Slot { value: item, watch });
            self.keys.push(key);
            self.key_to_pos.push(Idx::from_usize(pos));
            self.pos_to_key.push(Idx::from_usize(pos));
        }
        self.sort_keys();
        debug!(added = self.items.len() - first, len = self.items.len(), "bulk add");

        for pos in first..self.items.len() {
            self.notifier.emit(&Change::Added {
                item: &self.items[pos].value,
                pos,
            });
        }
        self.emit_count();
        if grew {
            self.emit_capacity();
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Removal
    // -------------------------------------------------------------------------

    /// Removes and returns the item at `pos`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `pos >= len`.
    pub fn remove_at(&mut self, pos: usize) -> Result<V> {
        self.sync();
        self.check_pos(pos)?;
        Ok(self.remove_checked(pos))
    }

    /// Removes and returns the item holding `key`.
    pub fn remove_key(&mut self, key: &E::Key) -> Option<V> {
        self.sync();
        let slot = self.search(key).ok()?;
        let pos = self.key_to_pos[slot].as_usize();
        Some(self.remove_checked(pos))
    }

    /// Removes and returns the item indexed under `item`'s current key.
    ///
    /// Matching is by key only. An item whose watched key change failed to
    /// resync is still indexed under its previous key, so its current key
    /// finds the other item holding it. Remove such items by position; see
    /// [`stale_positions`](Self::stale_positions).
    pub fn remove_item(&mut self, item: &V) -> Option<V> {
        let key = self.extract.extract(item);
        self.remove_key(&key)
    }

    fn remove_checked(&mut self, pos: usize) -> V {
        let Slot { value, watch } = self.unlink(pos);
        drop(watch);

        self.notifier.emit(&Change::Removed { item: &value, pos });
        self.emit_count();
        value
    }

    /// Removes every item and releases every key-change subscription.
    ///
    /// Capacity resets to one auto-buffer increment.
    pub fn clear(&mut self) {
        let had_items = !self.items.is_empty();
        let capacity = self.config.auto_buffer.min(Idx::MAX_SLOTS);

        self.items = Vec::with_capacity(capacity);
        self.keys = Vec::with_capacity(capacity);
        self.pos_to_key = Vec::with_capacity(capacity);
        self.key_to_pos = Vec::with_capacity(capacity);
        if let Some(watcher) = &self.watcher {
            watcher.discard_pending();
        }
        let capacity_changed = mem::replace(&mut self.capacity, capacity) != capacity;
        debug!(capacity, "cleared");

        self.notifier.emit(&Change::Reset);
        if had_items {
            self.emit_count();
        }
        if capacity_changed {
            self.emit_capacity();
        }
    }

    // -------------------------------------------------------------------------
    // Positional access
    // -------------------------------------------------------------------------

    /// Returns the item at `pos`.
    #[inline]
    pub fn get(&self, pos: usize) -> Option<&V> {
        self.items.get(pos).map(|slot| &slot.value)
    }

    /// Replaces the item at `pos`, returning the previous one.
    ///
    /// The replacement may carry a different key; its key slot moves
    /// accordingly while its position stays `pos`.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRange`] if `pos >= len`.
    /// - [`Error::DuplicateKey`] if another item holds the replacement's key.
    pub fn set(&mut self, pos: usize, item: V) -> Result<V> {
        self.sync();
        self.check_pos(pos)?;

        let key = self.extract.extract(&item);
        let slot = self.pos_to_key[pos].as_usize();
        if self.compare.compare(&key, &self.keys[slot]).is_eq() {
            self.keys[slot] = key;
        } else {
            match self.search(&key) {
                Ok(_) => return Err(Error::DuplicateKey),
                Err(insert_at) => self.rekey(slot, insert_at, key),
            }
        }
        Ok(self.replace_value(pos, item))
    }

    /// Moves the item at `from` to positional slot `to`.
    ///
    /// Items in between shift by one. Keys and the key-sorted view are not
    /// affected.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if either position is `>= len`.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.sync();
        self.check_pos(from)?;
        self.check_pos(to)?;
        if from == to {
            return Ok(());
        }

        let (lo, hi) = if from < to { (from, to) } else { (to, from) };
        if from < to {
            self.items[lo..=hi].rotate_left(1);
            self.pos_to_key[lo..=hi].rotate_left(1);
        } else {
            self.items[lo..=hi].rotate_right(1);
            self.pos_to_key[lo..=hi].rotate_right(1);
        }
        for pos in lo..=hi {
            let slot = self.pos_to_key[pos].as_usize();
            self.key_to_pos[slot] = Idx::from_usize(pos);
        }

        self.notifier.emit(&Change::Moved {
            item: &self.items[to].value,
            old_pos: from,
            new_pos: to,
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Associative access
    // -------------------------------------------------------------------------

    /// Returns `true` if an item holds `key`.
    #[inline]
    pub fn contains_key(&self, key: &E::Key) -> bool {
        self.search(key).is_ok()
    }

    /// Returns the position of the item holding `key`.
    #[inline]
    pub fn index_of_key(&self, key: &E::Key) -> Option<usize> {
        self.search(key)
            .ok()
            .map(|slot| self.key_to_pos[slot].as_usize())
    }

    /// Returns the item holding `key`.
    #[inline]
    pub fn get_by_key(&self, key: &E::Key) -> Option<&V> {
        self.index_of_key(key).map(|pos| &self.items[pos].value)
    }

    /// Returns the item holding `key`.
    ///
    /// # Errors
    ///
    /// [`Error::KeyNotFound`] if no item holds `key`.
    pub fn try_get_by_key(&self, key: &E::Key) -> Result<&V> {
        self.get_by_key(key).ok_or(Error::KeyNotFound)
    }

    /// Stores `item` under `key`, returning the item it replaced.
    ///
    /// In dynamic mode a missing key appends `item` and returns `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::KeyMismatch`] if `item`'s own key differs from `key`.
    /// - [`Error::KeyNotFound`] if `key` is missing and dynamic mode is off.
    /// - [`Error::CapacityOverflow`] if appending is impossible.
    pub fn set_by_key(&mut self, key: &E::Key, item: V) -> Result<Option<V>> {
        self.sync();

        let item_key = self.extract.extract(&item);
        if !self.compare.compare(&item_key, key).is_eq() {
            return Err(Error::KeyMismatch);
        }
        match self.search(key) {
            Ok(slot) => {
                self.keys[slot] = item_key;
                let pos = self.key_to_pos[slot].as_usize();
                Ok(Some(self.replace_value(pos, item)))
            }
            Err(_) if self.config.dynamic => self.add(item).map(|_| None),
            Err(_) => Err(Error::KeyNotFound),
        }
    }

    /// Recorded keys in ascending order.
    #[inline]
    pub fn keys(&self) -> &[E::Key] {
        &self.keys
    }

    /// Key recorded for the item at `pos`.
    #[inline]
    pub fn key_at(&self, pos: usize) -> Option<&E::Key> {
        self.pos_to_key
            .get(pos)
            .map(|slot| &self.keys[slot.as_usize()])
    }

    /// Key slot of the item at `pos`.
    #[inline]
    pub fn key_slot(&self, pos: usize) -> Option<usize> {
        self.pos_to_key.get(pos).map(|slot| slot.as_usize())
    }

    /// Position of the item in key slot `slot`.
    #[inline]
    pub fn position_of_slot(&self, slot: usize) -> Option<usize> {
        self.key_to_pos.get(slot).map(|pos| pos.as_usize())
    }

    /// Item with the smallest key.
    pub fn first_by_key(&self) -> Option<(&E::Key, &V)> {
        let pos = self.key_to_pos.first()?.as_usize();
        Some((&self.keys[0], &self.items[pos].value))
    }

    /// Item with the largest key.
    pub fn last_by_key(&self) -> Option<(&E::Key, &V)> {
        let slot = self.keys.len().checked_sub(1)?;
        let pos = self.key_to_pos[slot].as_usize();
        Some((&self.keys[slot], &self.items[pos].value))
    }

    // -------------------------------------------------------------------------
    // Iteration
    // -------------------------------------------------------------------------

    /// Iterates items in positional order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            inner: self.items.iter(),
        }
    }

    /// Iterates `(key, item)` pairs in ascending key order.
    pub fn iter_by_key(&self) -> impl DoubleEndedIterator<Item = (&E::Key, &V)> + '_ {
        self.keys
            .iter()
            .zip(&self.key_to_pos)
            .map(|(key, pos)| (key, &self.items[pos.as_usize()].value))
    }

    // -------------------------------------------------------------------------
    // Ordering
    // -------------------------------------------------------------------------

    /// Reorders positional slots with `cmp`.
    ///
    /// Keys and key lookups are unaffected except that each item reports its
    /// new position. Observers receive a single [`Change::Reset`].
    pub fn sort<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        self.sync();
        if self.items.len() < 2 {
            return;
        }

        let mut order: Vec<usize> = (0..self.items.len()).collect();
        sort_permutation(&mut order, |a, b| {
            cmp(&self.items[a].value, &self.items[b].value)
        });
        self.reorder_positions(order);
        debug!(len = self.items.len(), "sorted positions");

        self.notifier.emit(&Change::Reset);
    }

    /// Rebuilds positional order to match ascending key order.
    pub fn order_by_key(&mut self) {
        self.sync();
        if self.items.len() < 2 {
            return;
        }

        let order: Vec<usize> = self.key_to_pos.iter().map(|pos| pos.as_usize()).collect();
        self.reorder_positions(order);
        debug!(len = self.items.len(), "ordered positions by key");

        self.notifier.emit(&Change::Reset);
    }

    /// Positional slot `i` takes the item previously at `order[i]`.
    fn reorder_positions(&mut self, order: Vec<usize>) {
        let new_pos = invert(&order);
        let mut scratch = order.clone();
        apply_permutation(&mut self.items, &mut scratch);
        let mut scratch = order;
        apply_permutation(&mut self.pos_to_key, &mut scratch);
        for pos in &mut self.key_to_pos {
            *pos = Idx::from_usize(new_pos[pos.as_usize()]);
        }
    }

    /// Re-sorts the key view from the comparator alone.
    ///
    /// Used after recorded keys were changed in place. Positional order is
    /// untouched.
    fn sort_keys(&mut self) {
        let mut order: Vec<usize> = (0..self.keys.len()).collect();
        sort_permutation(&mut order, |a, b| {
            self.compare.compare(&self.keys[a], &self.keys[b])
        });

        let mut scratch = order.clone();
        apply_permutation(&mut self.keys, &mut scratch);
        let mut scratch = order;
        apply_permutation(&mut self.key_to_pos, &mut scratch);
        for (slot, pos) in self.key_to_pos.iter().enumerate() {
            self.pos_to_key[pos.as_usize()] = Idx::from_usize(slot);
        }
        trace!(len = self.keys.len(), "re-sorted keys");
    }

    // -------------------------------------------------------------------------
    // Key changes
    // -------------------------------------------------------------------------

    /// Applies `f` to the item at `pos`, then re-reads its key.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRange`] if `pos >= len`.
    /// - [`Error::DuplicateKey`] if `f` gave the item a key held by another
    ///   item. The mutation stays applied and the index keeps the item's
    ///   previous key until [`refresh_key`](Self::refresh_key) succeeds.
    pub fn modify<R, F>(&mut self, pos: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        self.sync();
        self.check_pos(pos)?;
        let out = f(&mut self.items[pos].value);
        self.refresh_key(pos)?;
        Ok(out)
    }

    /// Re-reads the key of the item at `pos` and re-indexes it if it changed.
    ///
    /// Pending watched changes are applied first, so keys they free are
    /// available. Returns `true` if the recorded key changed.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRange`] if `pos >= len`.
    /// - [`Error::DuplicateKey`] if another item holds the new key; the index
    ///   is left unchanged.
    pub fn refresh_key(&mut self, pos: usize) -> Result<bool> {
        self.sync();
        self.check_pos(pos)?;
        let key = self.extract.extract(&self.items[pos].value);
        let slot = self.pos_to_key[pos].as_usize();
        if self.compare.compare(&key, &self.keys[slot]).is_eq() {
            return Ok(false);
        }
        match self.search(&key) {
            Ok(_) => Err(Error::DuplicateKey),
            Err(insert_at) => {
                self.rekey(slot, insert_at, key);
                Ok(true)
            }
        }
    }

    /// Applies key changes reported by watched items since the last call.
    ///
    /// Returns the number of items re-indexed. Changes are applied in
    /// passes until no pass makes progress, so a key freed by one item's
    /// change can be taken by another's regardless of signal order. A change
    /// that still collides with another item's key is reported as
    /// [`Change::ResyncFailed`] and leaves that item indexed under its
    /// previous key. Collections that do not
    /// [`watch_keys`](Self::watch_keys) return `0`.
    pub fn sync(&mut self) -> usize {
        let pending = match &self.watcher {
            Some(watcher) if watcher.has_pending() => watcher.take_pending(),
            _ => return 0,
        };

        // Ids of items removed since they fired find no position.
        let mut waiting: Vec<usize> = pending
            .into_iter()
            .filter_map(|id| {
                self.items
                    .iter()
                    .position(|slot| slot.watch.as_ref().is_some_and(|w| w.id == id))
            })
            .collect();

        let mut resynced = 0;
        let mut failures = Vec::new();
        loop {
            failures.clear();
            let mut progressed = false;
            for pos in mem::take(&mut waiting) {
                match self.resync(pos) {
                    Ok(true) => {
                        resynced += 1;
                        progressed = true;
                    }
                    Ok(false) => {}
                    Err(failure) => failures.push(failure),
                }
            }
            if failures.is_empty() || !progressed {
                break;
            }
            waiting = failures.iter().map(|failure| failure.pos).collect();
        }

        for failure in &failures {
            warn!(pos = failure.pos, "watched key change collides with an existing key");
            self.notifier.emit(&Change::ResyncFailed(failure));
        }
        resynced
    }

    fn resync(&mut self, pos: usize) -> core::result::Result<bool, ResyncFailed<E::Key>> {
        let new_key = self.extract.extract(&self.items[pos].value);
        let slot = self.pos_to_key[pos].as_usize();
        if self.compare.compare(&new_key, &self.keys[slot]).is_eq() {
            return Ok(false);
        }
        if self.search(&new_key).is_ok() {
            return Err(ResyncFailed { pos, new_key });
        }

        self.keys[slot] = new_key;
        self.sort_keys();
        trace!(pos, "resynced watched key");
        Ok(true)
    }

    /// Positions whose item reports a key different from the recorded one.
    ///
    /// Empty unless an item changed its key without the collection being
    /// told, or a watched change failed to resync. Until refreshed, such an
    /// item is reachable by key only through its previous key, and
    /// [`remove_item`](Self::remove_item) on it targets whichever item holds
    /// its current key; use [`remove_at`](Self::remove_at) with the position.
    pub fn stale_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().enumerate().filter_map(|(pos, slot)| {
            let live = self.extract.extract(&slot.value);
            let recorded = &self.keys[self.pos_to_key[pos].as_usize()];
            (!self.compare.compare(&live, recorded).is_eq()).then_some(pos)
        })
    }

    // -------------------------------------------------------------------------
    // Capacity
    // -------------------------------------------------------------------------

    /// Reserves room for at least `additional` more items.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityOverflow`] if `Idx` cannot address that many items.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let required = self.required(additional)?;
        if required <= self.capacity {
            return Ok(());
        }
        self.grow_to(required);
        self.emit_capacity();
        Ok(())
    }

    /// Drops reserved slots beyond the current length.
    pub fn shrink_to_fit(&mut self) {
        self.items.shrink_to_fit();
        self.keys.shrink_to_fit();
        self.pos_to_key.shrink_to_fit();
        self.key_to_pos.shrink_to_fit();
        if mem::replace(&mut self.capacity, self.items.len()) != self.items.len() {
            self.emit_capacity();
        }
    }

    fn required(&self, additional: usize) -> Result<usize> {
        self.items
            .len()
            .checked_add(additional)
            .filter(|&required| required <= Idx::MAX_SLOTS)
            .ok_or(Error::CapacityOverflow {
                max: Idx::MAX_SLOTS,
            })
    }

    /// Grows capacity for `additional` more items. Returns `true` if it grew.
    fn ensure_room(&mut self, additional: usize) -> Result<bool> {
        let required = self.required(additional)?;
        match self.config.grown_capacity(self.capacity, required) {
            Some(capacity) => {
                self.grow_to(capacity.min(Idx::MAX_SLOTS));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn grow_to(&mut self, capacity: usize) {
        let additional = capacity - self.items.len();
        self.items.reserve(additional);
        self.keys.reserve(additional);
        self.pos_to_key.reserve(additional);
        self.key_to_pos.reserve(additional);
        debug!(from = self.capacity, to = capacity, "grew capacity");
        self.capacity = capacity;
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Bisect-left over recorded keys: `Ok(slot)` if `key` is present,
    /// otherwise `Err(slot)` with the first slot whose key is greater.
    #[inline]
    fn search(&self, key: &E::Key) -> core::result::Result<usize, usize> {
        let slot = self
            .keys
            .partition_point(|held| self.compare.compare(held, key).is_lt());
        match self.keys.get(slot) {
            Some(found) if self.compare.compare(found, key).is_eq() => Ok(slot),
            _ => Err(slot),
        }
    }

    #[inline]
    fn check_pos(&self, pos: usize) -> Result<()> {
        if pos < self.items.len() {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                index: pos,
                len: self.items.len(),
            })
        }
    }

    /// Stores `item` at positional slot `pos` and key slot `slot`, shifting
    /// every cross-reference at or above either.
    fn link(&mut self, pos: usize, slot: usize, key: E::Key, item: V) {
        for s in &mut self.pos_to_key {
            if s.as_usize() >= slot {
                *s = Idx::from_usize(s.as_usize() + 1);
            }
        }
        for p in &mut self.key_to_pos {
            if p.as_usize() >= pos {
                *p = Idx::from_usize(p.as_usize() + 1);
            }
        }

        let watch = self.watcher.as_mut().map(|w| w.attach(&item));
        self.keys.insert(slot, key);
        self.key_to_pos.insert(slot, Idx::from_usize(pos));
        self.items.insert(pos, Slot { value: item, watch });
        self.pos_to_key.insert(pos, Idx::from_usize(slot));
    }

    /// Removes positional slot `pos` and its key slot, compacting both
    /// permutation vectors.
    fn unlink(&mut self, pos: usize) -> Slot<V> {
        let slot = self.pos_to_key.remove(pos).as_usize();
        self.keys.remove(slot);
        self.key_to_pos.remove(slot);

        for s in &mut self.pos_to_key {
            if s.as_usize() > slot {
                *s = Idx::from_usize(s.as_usize() - 1);
            }
        }
        for p in &mut self.key_to_pos {
            if p.as_usize() > pos {
                *p = Idx::from_usize(p.as_usize() - 1);
            }
        }
        self.items.remove(pos)
    }

    /// Moves the recorded key at `slot` to the bisect point `insert_at`
    /// (computed before removal) and stores `key` there.
    fn rekey(&mut self, slot: usize, insert_at: usize, key: E::Key) {
        let pos = self.key_to_pos.remove(slot);
        self.keys.remove(slot);
        let target = if insert_at > slot {
            insert_at - 1
        } else {
            insert_at
        };
        self.keys.insert(target, key);
        self.key_to_pos.insert(target, pos);

        let (lo, hi) = if slot < target {
            (slot, target)
        } else {
            (target, slot)
        };
        for s in lo..=hi {
            let p = self.key_to_pos[s].as_usize();
            self.pos_to_key[p] = Idx::from_usize(s);
        }
    }

    /// Swaps in `item` at `pos` (key bookkeeping already done), moves the
    /// watch over, and notifies.
    fn replace_value(&mut self, pos: usize, item: V) -> V {
        let watch = self.watcher.as_mut().map(|w| w.attach(&item));
        let old = mem::replace(
            &mut self.items[pos],
            Slot {
                value: item,
                watch,
            },
        );
        let Slot { value: old, watch } = old;
        drop(watch);

        self.notifier.emit(&Change::Replaced {
            old: &old,
            new: &self.items[pos].value,
            pos,
        });
        old
    }

    #[inline]
    fn emit_count(&mut self) {
        self.notifier.emit(&Change::CountChanged(self.items.len()));
    }

    #[inline]
    fn emit_capacity(&mut self) {
        self.notifier.emit(&Change::CapacityChanged(self.capacity));
    }

    /// Panics if any structural invariant is broken.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let len = self.items.len();
        assert_eq!(self.keys.len(), len, "keys length");
        assert_eq!(self.pos_to_key.len(), len, "pos_to_key length");
        assert_eq!(self.key_to_pos.len(), len, "key_to_pos length");
        assert!(self.capacity >= len, "capacity below length");

        for pair in self.keys.windows(2) {
            assert!(
                self.compare.compare(&pair[0], &pair[1]).is_lt(),
                "keys not strictly ascending"
            );
        }
        for pos in 0..len {
            let slot = self.pos_to_key[pos].as_usize();
            assert!(slot < len, "pos_to_key out of range");
            assert_eq!(self.key_to_pos[slot].as_usize(), pos, "permutations not inverse");
        }
        assert_eq!(self.stale_positions().count(), 0, "recorded key differs from item");
    }
}

// =============================================================================
// Trait impls
// =============================================================================

impl<V, E, C, Idx> core::ops::Index<usize> for KeyedList<V, E, C, Idx>
where
    E: Extract<V>,
    Idx: Index,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if `pos >= len`.
    #[inline]
    fn index(&self, pos: usize) -> &V {
        &self.items[pos].value
    }
}

impl<'a, V, E, C, Idx> IntoIterator for &'a KeyedList<V, E, C, Idx>
where
    E: Extract<V>,
    C: Compare<E::Key>,
    Idx: Index,
{
    type Item = &'a V;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

impl<V, E, C, Idx> core::fmt::Debug for KeyedList<V, E, C, Idx>
where
    V: core::fmt::Debug,
    E: Extract<V>,
    Idx: Index,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyedList")
            .field("len", &self.items.len())
            .field("capacity", &self.capacity)
            .field(
                "items",
                &self.items.iter().map(|slot| &slot.value).collect::<Vec<_>>(),
            )
            .field("watched", &self.watcher.is_some())
            .finish()
    }
}

/// Iterator over items in positional order.
pub struct Iter<'a, V> {
    inner: core::slice::Iter<'a, Slot<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|slot| &slot.value)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> DoubleEndedIterator for Iter<'_, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|slot| &slot.value)
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> core::iter::FusedIterator for Iter<'_, V> {}

impl<V> core::fmt::Debug for Iter<'_, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.inner.len())
            .finish()
    }
}
