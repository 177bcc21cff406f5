//! Key extraction.
//!
//! A [`KeyedList`](crate::KeyedList) never inspects its items directly. It
//! asks an [`Extract`] implementation for each item's key, once when the item
//! enters the collection and again whenever the item reports a key change.
//!
//! Extraction must be deterministic for a given item state: two calls on an
//! unchanged item must yield keys that compare equal.

/// Resolves the key of an item.
///
/// Implemented for every `Fn(&V) -> K` closure and function pointer, and for
/// [`ByKey`] when the item type implements [`Keyed`].
///
/// # Example
///
/// ```
/// use nexus_keyed::Extract;
///
/// struct Bulb {
///     mac: u64,
///     label: String,
/// }
///
/// let by_mac = |b: &Bulb| b.mac;
/// let bulb = Bulb { mac: 0xA1, label: "porch".into() };
/// assert_eq!(by_mac.extract(&bulb), 0xA1);
/// ```
pub trait Extract<V: ?Sized> {
    /// Key type produced for each item.
    type Key;

    /// Returns the key of `item`.
    fn extract(&self, item: &V) -> Self::Key;
}

impl<V: ?Sized, K, F> Extract<V> for F
where
    F: Fn(&V) -> K,
{
    type Key = K;

    #[inline]
    fn extract(&self, item: &V) -> K {
        self(item)
    }
}

/// Items that know their own key.
///
/// Pair with [`ByKey`] to avoid spelling out an extractor closure.
///
/// # Example
///
/// ```
/// use nexus_keyed::{ByKey, KeyedList, Keyed};
///
/// #[derive(Debug)]
/// struct Scene {
///     id: u16,
///     name: &'static str,
/// }
///
/// impl Keyed for Scene {
///     type Key = u16;
///
///     fn key(&self) -> u16 {
///         self.id
///     }
/// }
///
/// let mut scenes: KeyedList<Scene, ByKey> = KeyedList::new(ByKey);
/// scenes.add(Scene { id: 7, name: "evening" }).unwrap();
/// assert_eq!(scenes.get_by_key(&7).map(|s| s.name), Some("evening"));
/// ```
pub trait Keyed {
    /// Key type of this item.
    type Key;

    /// Returns this item's current key.
    fn key(&self) -> Self::Key;
}

impl<T: Keyed + ?Sized> Keyed for std::rc::Rc<T> {
    type Key = T::Key;

    #[inline]
    fn key(&self) -> T::Key {
        (**self).key()
    }
}

impl<T: Keyed + ?Sized> Keyed for Box<T> {
    type Key = T::Key;

    #[inline]
    fn key(&self) -> T::Key {
        (**self).key()
    }
}

/// Extractor that delegates to [`Keyed::key`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByKey;

impl<V: Keyed + ?Sized> Extract<V> for ByKey {
    type Key = V::Key;

    #[inline]
    fn extract(&self, item: &V) -> V::Key {
        item.key()
    }
}
