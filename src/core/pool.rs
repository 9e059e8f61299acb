//! Fixed-capacity object pools
//!
//! All kernel objects live in pools owned by the kernel and are addressed
//! by stable indices wrapped in handle newtypes. Slots are reused after
//! release; a handle is only valid while its object is alive.

use core::ops::{Index, IndexMut};

/// Fixed-capacity pool of `N` slots
pub struct Pool<T, const N: usize> {
    slots: [Option<T>; N],
}

impl<T, const N: usize> Pool<T, N> {
    pub fn new() -> Self {
        Pool {
            slots: [const { None }; N],
        }
    }

    /// Place `value` in a free slot, returning its index.
    pub fn insert(&mut self, value: T) -> Option<usize> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(value);
                return Some(i);
            }
        }
        None
    }

    /// Free a slot, returning its value.
    pub fn remove(&mut self, idx: usize) -> Option<T> {
        self.slots[idx].take()
    }

    /// Whether `idx` addresses a live object
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        idx < N && self.slots[idx].is_some()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Iterate over live objects with their indices
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }
}

impl<T, const N: usize> Index<usize> for Pool<T, N> {
    type Output = T;

    #[inline(always)]
    fn index(&self, idx: usize) -> &T {
        self.slots[idx].as_ref().expect("stale handle")
    }
}

impl<T, const N: usize> IndexMut<usize> for Pool<T, N> {
    #[inline(always)]
    fn index_mut(&mut self, idx: usize) -> &mut T {
        self.slots[idx].as_mut().expect("stale handle")
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
