//! Construction options and the capacity growth policy.

/// Default auto-buffer increment.
pub const DEFAULT_AUTO_BUFFER: usize = 10;

/// Options for a [`KeyedList`](crate::KeyedList).
///
/// # Example
///
/// ```
/// use nexus_keyed::{Config, KeyedList, Natural};
///
/// let config = Config::default().with_auto_buffer(32).with_dynamic(true);
/// let mut list: KeyedList<u32, _, Natural, u16> =
///     KeyedList::with_config(|v: &u32| *v, Natural, config);
/// list.add(1).unwrap();
/// assert_eq!(list.capacity(), 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Capacity growth increment. `0` grows exactly to the required size.
    pub auto_buffer: usize,
    /// When set, assigning a missing key through
    /// [`set_by_key`](crate::KeyedList::set_by_key) appends the item instead
    /// of failing with [`KeyNotFound`](crate::Error::KeyNotFound).
    pub dynamic: bool,
    /// Slots reserved at construction.
    pub initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_buffer: DEFAULT_AUTO_BUFFER,
            dynamic: false,
            initial_capacity: 0,
        }
    }
}

impl Config {
    /// Sets the capacity growth increment.
    #[must_use]
    pub const fn with_auto_buffer(mut self, auto_buffer: usize) -> Self {
        self.auto_buffer = auto_buffer;
        self
    }

    /// Enables or disables dynamic mode.
    #[must_use]
    pub const fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Sets the number of slots reserved at construction.
    #[must_use]
    pub const fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Capacity to grow to so that `required` slots fit, or `None` if
    /// `current` already suffices.
    ///
    /// Growth happens in whole increments of `auto_buffer`, so a run of
    /// single insertions reallocates once per increment.
    pub(crate) fn grown_capacity(&self, current: usize, required: usize) -> Option<usize> {
        if required <= current {
            return None;
        }
        if self.auto_buffer == 0 {
            return Some(required);
        }
        let missing = required - current;
        let steps = missing.div_ceil(self.auto_buffer);
        Some(current.saturating_add(steps.saturating_mul(self.auto_buffer)))
    }
}
