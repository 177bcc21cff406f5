//! Serialization boundary.
//!
//! A [`KeyedList`] serializes as a plain sequence of items in positional
//! order. Keys and permutations are derived state and are not written.
//! Deserializing rebuilds the collection through [`KeyedList::add`], so a
//! document holding two items with the same key is rejected.

use core::fmt;
use core::marker::PhantomData;

use ::serde::de::{Error as _, SeqAccess, Visitor};
use ::serde::ser::SerializeSeq;
use ::serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::compare::Compare;
use crate::config::Config;
use crate::index::Index;
use crate::key::Extract;
use crate::keyed::KeyedList;

/// Upper bound on the bytes preallocated from an untrusted length hint.
const MAX_PREALLOC_BYTES: usize = 1024 * 1024;

/// Clamps a sequence length hint so a hostile document cannot force a huge
/// allocation before any element has been read.
fn cautious_capacity<V>(hint: Option<usize>) -> usize {
    let per_item = core::mem::size_of::<V>().max(1);
    hint.unwrap_or(0).min(MAX_PREALLOC_BYTES / per_item)
}

impl<V, E, C, Idx> Serialize for KeyedList<V, E, C, Idx>
where
    V: Serialize,
    E: Extract<V>,
    C: Compare<E::Key>,
    Idx: Index,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for item in self {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

/// Deserializing requires the extractor and comparator to be constructible
/// from nothing, e.g. [`ByKey`](crate::ByKey) and [`Natural`](crate::Natural).
impl<'de, V, E, C, Idx> Deserialize<'de> for KeyedList<V, E, C, Idx>
where
    V: Deserialize<'de>,
    E: Extract<V> + Default,
    C: Compare<E::Key> + Default,
    Idx: Index,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(KeyedListVisitor {
            marker: PhantomData,
        })
    }
}

struct KeyedListVisitor<V, E, C, Idx> {
    marker: PhantomData<fn() -> (V, E, C, Idx)>,
}

impl<'de, V, E, C, Idx> Visitor<'de> for KeyedListVisitor<V, E, C, Idx>
where
    V: Deserialize<'de>,
    E: Extract<V> + Default,
    C: Compare<E::Key> + Default,
    Idx: Index,
{
    type Value = KeyedList<V, E, C, Idx>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence of items with unique keys")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let capacity = cautious_capacity::<V>(seq.size_hint()).min(Idx::MAX_SLOTS);
        let config = Config::default().with_initial_capacity(capacity);
        let mut list = KeyedList::with_config(E::default(), C::default(), config);
        while let Some(item) = seq.next_element()? {
            list.add(item).map_err(A::Error::custom)?;
        }
        Ok(list)
    }
}
