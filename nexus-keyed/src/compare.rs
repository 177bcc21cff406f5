//! Key ordering.
//!
//! The key-sorted view is ordered by a [`Compare`] implementation chosen when
//! the collection is built. The choice is made once, by the constructor used:
//!
//! 1. [`KeyedList::with_comparator`](crate::KeyedList::with_comparator) takes
//!    an explicit comparator.
//! 2. [`KeyedList::new`](crate::KeyedList::new) uses [`Natural`] and requires
//!    `K: Ord`.
//! 3. [`KeyedList::with_registry`](crate::KeyedList::with_registry) looks the
//!    key type up in a [`Registry`] and fails with
//!    [`Error::UnsupportedKeyType`] if nothing was registered for it.
//!
//! No operation re-resolves the comparator afterwards.

use core::any::{Any, TypeId};
use core::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};

/// Total order over keys.
///
/// Implementations must be consistent: antisymmetric, transitive, and
/// deterministic for unchanged keys. Keys comparing `Equal` are duplicates.
pub trait Compare<K: ?Sized> {
    /// Compares two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders keys by their [`Ord`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Natural;

impl<K: Ord + ?Sized> Compare<K> for Natural {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Orders keys with a caller-supplied closure.
///
/// # Example
///
/// ```
/// use nexus_keyed::{ByFn, Compare};
///
/// // Case-insensitive labels.
/// let cmp = ByFn(|a: &String, b: &String| a.to_lowercase().cmp(&b.to_lowercase()));
/// assert!(cmp.compare(&"Porch".to_string(), &"porch".to_string()).is_eq());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ByFn<F>(pub F);

impl<K: ?Sized, F> Compare<K> for ByFn<F>
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        (self.0)(a, b)
    }
}

/// Comparator resolved from a [`Registry`].
pub struct Registered<K: ?Sized> {
    cmp: Rc<dyn Fn(&K, &K) -> Ordering>,
}

impl<K: ?Sized> Clone for Registered<K> {
    fn clone(&self) -> Self {
        Self {
            cmp: Rc::clone(&self.cmp),
        }
    }
}

impl<K: ?Sized> core::fmt::Debug for Registered<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registered")
            .field("key", &core::any::type_name::<K>())
            .finish()
    }
}

impl<K: ?Sized> Compare<K> for Registered<K> {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        (self.cmp)(a, b)
    }
}

/// Comparators for key types that have no [`Ord`] implementation.
///
/// A registry is an ordinary value owned by the caller; there is no global
/// instance. Register once at startup and pass it to every
/// [`KeyedList::with_registry`](crate::KeyedList::with_registry) call.
///
/// # Example
///
/// ```
/// use nexus_keyed::{Compare, Registry};
///
/// #[derive(Clone, Copy, PartialEq)]
/// struct Hue(f32);
///
/// let mut registry = Registry::new();
/// registry.register(|a: &Hue, b: &Hue| a.0.total_cmp(&b.0));
///
/// let cmp = registry.resolve::<Hue>().unwrap();
/// assert!(cmp.compare(&Hue(0.1), &Hue(0.5)).is_lt());
/// assert!(registry.resolve::<f64>().is_err());
/// ```
#[derive(Default)]
pub struct Registry {
    entries: HashMap<TypeId, Box<dyn Any>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `cmp` for key type `K`, replacing any previous entry.
    pub fn register<K, F>(&mut self, cmp: F) -> &mut Self
    where
        K: 'static,
        F: Fn(&K, &K) -> Ordering + 'static,
    {
        let registered: Registered<K> = Registered { cmp: Rc::new(cmp) };
        self.entries
            .insert(TypeId::of::<K>(), Box::new(registered));
        self
    }

    /// Resolves the comparator for `K`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedKeyType`] if nothing was registered for `K`.
    pub fn resolve<K: 'static>(&self) -> Result<Registered<K>> {
        self.entries
            .get(&TypeId::of::<K>())
            .and_then(|entry| entry.downcast_ref::<Registered<K>>())
            .cloned()
            .ok_or(Error::UnsupportedKeyType(core::any::type_name::<K>()))
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.entries.len())
            .finish()
    }
}
