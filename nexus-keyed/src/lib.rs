//! Ordered collections indexed by position and by key at once.
//!
//! A [`KeyedList`] behaves like a `Vec` (items keep the order you insert or
//! move them into) and like a sorted map (every item has a unique key and
//! can be found by binary search) without storing anything twice.
//!
//! # Design
//!
//! Items live in one positional vector. Keys live in a second vector kept in
//! ascending order. Two permutation vectors of slot indices relate them:
//!
//! ```text
//! items       [ hall(5) | porch(3) | attic(8) | yard(1) ]   positional slots
//! pos_to_key  [    2    |    1     |    3     |    0    ]
//!
//! keys        [    1    |    3     |    5     |    8    ]   key slots
//! key_to_pos  [    3    |    1     |    0     |    2    ]
//! ```
//!
//! Positional operations (`insert`, `move_item`, `sort`) never disturb key
//! order, and key lookups always resolve to the item's current position.
//!
//! # Quick Start
//!
//! ```
//! use nexus_keyed::KeyedList;
//!
//! let mut scenes: KeyedList<(u32, &str), _> = KeyedList::new(|s: &(u32, &str)| s.0);
//!
//! scenes.add((5, "evening")).unwrap();
//! scenes.add((3, "morning")).unwrap();
//! scenes.insert(0, (8, "away")).unwrap();
//!
//! assert_eq!(scenes.index_of_key(&5), Some(1));
//! assert_eq!(scenes.keys(), [3, 5, 8]);
//!
//! scenes.move_item(0, 2).unwrap();
//! assert_eq!(scenes.index_of_key(&8), Some(2));
//! ```
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`key`] | [`Extract`] an item's key; [`Keyed`] items and [`ByKey`] |
//! | [`compare`] | [`Compare`] keys: [`Natural`], [`ByFn`], [`Registry`] |
//! | [`keyed`] | The [`KeyedList`] itself |
//! | [`event`] | [`Change`] notifications for observers |
//! | [`watch`] | [`KeySignal`] for items whose key can change in place |
//! | [`config`] | [`Config`] and the capacity growth policy |
//!
//! # Threading
//!
//! Everything here is single-threaded. Handlers and key signals use `Rc`,
//! so collections are neither `Send` nor `Sync`.
//!
//! # Feature Flags
//!
//! - `serde` - `Serialize`/`Deserialize` for [`KeyedList`] and [`Config`]

#![warn(missing_docs)]

pub mod compare;
pub mod config;
pub mod error;
pub mod event;
pub mod index;
pub mod key;
pub mod keyed;
mod sort;
pub mod watch;

#[cfg(feature = "serde")]
mod serde;

pub use compare::{ByFn, Compare, Natural, Registered, Registry};
pub use config::{Config, DEFAULT_AUTO_BUFFER};
pub use error::{Error, Result, ResyncFailed};
pub use event::{Change, HandlerId};
pub use index::Index;
pub use key::{ByKey, Extract, Keyed};
pub use keyed::{Iter, KeyedList};
pub use watch::{KeyChanges, KeySignal, Subscription};
